//! Storage abstraction for the manga library.
//!
//! All writes go through a unit of work: [`Store::with_unit`] hands the
//! closure a [`StoreUnit`], runs it, and commits only if the closure returns
//! `Ok`. Any error rolls the whole unit back. Reads outside a unit see the
//! last committed state.

use crate::error::Result;
use crate::library::types::{Chapter, HistoryEntry, LibraryRecord, Manga, MangaKey, TrackerLink};
use std::sync::Arc;

/// Boxed unit-of-work closure passed to [`Store::with_unit`].
pub type UnitFn<'a> = Box<dyn FnOnce(&mut dyn StoreUnit) -> Result<()> + Send + 'a>;

/// Shared handle to a library store.
pub type DynStore = Arc<dyn Store>;

/// Read access to the library plus the unit-of-work entry point.
pub trait Store: Send + Sync {
    /// Look up a library record by identity.
    fn get_record(&self, key: &MangaKey) -> Result<Option<LibraryRecord>>;

    /// List all library records.
    fn list_records(&self) -> Result<Vec<LibraryRecord>>;

    /// Chapters stored under the given manga identity.
    fn chapters_for(&self, key: &MangaKey) -> Result<Vec<Chapter>>;

    /// History rows stored under the given manga identity.
    fn history_for(&self, key: &MangaKey) -> Result<Vec<HistoryEntry>>;

    /// Tracker links bound to the given manga identity.
    fn tracker_links_for(&self, key: &MangaKey) -> Result<Vec<TrackerLink>>;

    /// Whether a link for `tracker_id` already exists on the given identity.
    fn has_tracker_link(&self, tracker_id: &str, key: &MangaKey) -> Result<bool>;

    /// Run a unit of work. Commits if the closure returns `Ok`, rolls back
    /// otherwise.
    fn with_unit(&self, f: UnitFn<'_>) -> Result<()>;
}

/// Mutating operations available inside a unit of work.
///
/// Reads through a unit observe the unit's own uncommitted writes.
pub trait StoreUnit {
    fn get_record(&mut self, key: &MangaKey) -> Result<Option<LibraryRecord>>;

    /// Insert or update a library record.
    fn upsert_record(&mut self, record: &LibraryRecord) -> Result<()>;

    /// Rewrite the record currently stored at `key` with the given manga,
    /// including its identity. Record-level metadata such as the added date
    /// and pin position is preserved. No-op if `key` has no record.
    fn replace_record(&mut self, key: &MangaKey, manga: &Manga) -> Result<()>;

    /// Delete a library record. Returns whether a record existed.
    fn delete_record(&mut self, key: &MangaKey) -> Result<bool>;

    /// Insert chapters under the given manga identity.
    fn insert_chapters(&mut self, key: &MangaKey, chapters: &[Chapter]) -> Result<()>;

    /// Delete all chapters under the given manga identity.
    fn delete_chapters(&mut self, key: &MangaKey) -> Result<usize>;

    fn history_for(&mut self, key: &MangaKey) -> Result<Vec<HistoryEntry>>;

    fn insert_history(&mut self, entry: &HistoryEntry) -> Result<()>;

    /// Delete all history rows under the given manga identity.
    fn delete_history(&mut self, key: &MangaKey) -> Result<usize>;

    /// Mark the given chapters of `key` as completed, creating history rows
    /// where none exist. Each row's progress marker is taken from the
    /// chapter's number. Returns the number of chapters marked.
    fn mark_chapters_completed(&mut self, key: &MangaKey, chapter_ids: &[String]) -> Result<usize>;

    fn tracker_links_for(&mut self, key: &MangaKey) -> Result<Vec<TrackerLink>>;

    fn has_tracker_link(&mut self, tracker_id: &str, key: &MangaKey) -> Result<bool>;

    /// Create a tracker link and return its row id.
    fn insert_tracker_link(&mut self, tracker_id: &str, key: &MangaKey, entry_id: &str)
        -> Result<i64>;

    /// Point an existing tracker link at a different manga identity.
    fn rebind_tracker_link(&mut self, link_id: i64, key: &MangaKey) -> Result<()>;
}
