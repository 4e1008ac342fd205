//! Watari Core - Headless engine for migrating a manga library between sources.
//!
//! This crate moves library entries from one source's catalog to another's,
//! carrying reading history and tracker links along. It can be used
//! programmatically without any HTTP/RPC layer; the `watari-rpc` crate wraps
//! it in a JSON-RPC server.
//!
//! A migration runs in two phases. The search phase fans out over the
//! library entries, asks each entry's candidate sources for a replacement,
//! and records the first hit per entry. The commit phase then applies the
//! recorded matches to the store: the catalog record moves to its new
//! identity, history is replayed onto the new chapter list, and tracker
//! links are rebound.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use watari_core::{
//!     EventBus, MigrationOptions, MigrationSession, SourceId, SourceRegistry, SqliteStore, Store,
//! };
//!
//! #[tokio::main]
//! async fn main() -> watari_core::Result<()> {
//!     let store = Arc::new(SqliteStore::new("/path/to/library.db")?);
//!     let registry = Arc::new(SourceRegistry::new());
//!     // ... register sources ...
//!
//!     let session = MigrationSession::new(
//!         store.clone(),
//!         registry,
//!         EventBus::default(),
//!         MigrationOptions::default(),
//!     );
//!     for record in store.list_records()? {
//!         session.add_manga(record.manga).await;
//!     }
//!     session
//!         .set_candidates(vec![SourceId::new("mangadex")])
//!         .await?;
//!
//!     session.start_search().await?;
//!     let summary = session.commit_migration().await?;
//!     println!("Migrated {} entries", summary.reports.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod library;
pub mod migrate;
pub mod source;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{EventConfig, MigrationOptions, MigrationStrategy, SearchConfig, StoreConfig};
pub use error::{Result, WatariError};
pub use events::{EventBus, WatariEvent};
pub use library::{
    Chapter, DynStore, HistoryEntry, LibraryRecord, Manga, MangaKey, SourceId, SqliteStore, Store,
    StoreUnit, TrackerLink, UnitFn,
};
pub use migrate::{
    ItemKey, ItemStatus, MatchEngine, MatchOutcome, MatchResult, MigrationExecutor,
    MigrationReport, MigrationSession, MigrationState, MigrationSummary, SessionState,
    SubsystemOutcome,
};
pub use source::{DynSource, HttpSource, Source, SourceInfo, SourceRegistry};
