//! The manga library: data types and the persistent store behind it.

pub mod sqlite;
pub mod store;
pub mod types;

pub use sqlite::SqliteStore;
pub use store::{DynStore, Store, StoreUnit, UnitFn};
pub use types::{Chapter, HistoryEntry, LibraryRecord, Manga, MangaKey, SourceId, TrackerLink};
