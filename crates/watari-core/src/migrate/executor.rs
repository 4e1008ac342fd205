//! Applies a confirmed match to the library store.
//!
//! One migrated item touches three store subsystems: the catalog record,
//! the chapters-plus-history pair, and the tracker links. Each subsystem
//! runs in its own unit of work, so a failure in one leaves the other two
//! committed. The per-item report records which parts went through.

use crate::error::{Result, WatariError};
use crate::library::{Chapter, DynStore, Manga, MangaKey};
use crate::migrate::types::{MigrationReport, SubsystemOutcome};
use tracing::{debug, warn};

pub struct MigrationExecutor {
    store: DynStore,
}

impl MigrationExecutor {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Replace `old` with `new` in the library, carrying history and
    /// trackers forward. `new_chapters` is the destination's chapter list
    /// as fetched during the search phase.
    ///
    /// Failures are contained per subsystem and reported, never raised.
    pub fn migrate(&self, old: &Manga, new: &Manga, new_chapters: &[Chapter]) -> MigrationReport {
        let catalog = self
            .migrate_catalog(&old.key, new)
            .unwrap_or_else(|err| self.failed("catalog", &old.key, err));

        let history = self
            .migrate_history(&old.key, &new.key, new_chapters)
            .unwrap_or_else(|err| self.failed("history", &old.key, err));

        let trackers = self
            .migrate_trackers(&old.key, &new.key)
            .unwrap_or_else(|err| self.failed("trackers", &old.key, err));

        MigrationReport {
            from: old.key.clone(),
            to: new.key.clone(),
            catalog,
            history,
            trackers,
        }
    }

    fn failed(&self, subsystem: &str, key: &MangaKey, err: WatariError) -> SubsystemOutcome {
        warn!("{} migration for {} failed: {}", subsystem, key, err);
        SubsystemOutcome::Failed(err.to_string())
    }

    /// Move the catalog record from `old_key` to the new identity.
    ///
    /// When a record already exists at the destination identity, the match
    /// merges into it: the old record is deleted and the surviving one is
    /// refreshed with the freshly fetched manga data. Otherwise the old
    /// record is rewritten in place. Either way the surviving row keeps its
    /// added date and pin position.
    fn migrate_catalog(&self, old_key: &MangaKey, new: &Manga) -> Result<SubsystemOutcome> {
        let mut merged = false;
        self.store.with_unit(Box::new(|unit| {
            if new.key != *old_key && unit.get_record(&new.key)?.is_some() {
                unit.delete_record(old_key)?;
                unit.replace_record(&new.key, new)?;
                merged = true;
                return Ok(());
            }
            unit.replace_record(old_key, new)
        }))?;

        if merged {
            debug!("Merged {} into existing record {}", old_key, new.key);
        }
        Ok(SubsystemOutcome::Migrated)
    }

    /// Replace the stored chapters and replay reading progress.
    ///
    /// The maximum numeric progress marker across the old history becomes
    /// the read threshold: every new chapter at or below it is marked
    /// completed. Old chapters and history are dropped wholesale.
    fn migrate_history(
        &self,
        old_key: &MangaKey,
        new_key: &MangaKey,
        new_chapters: &[Chapter],
    ) -> Result<SubsystemOutcome> {
        let mut marked = 0;
        self.store.with_unit(Box::new(|unit| {
            let old_history = unit.history_for(old_key)?;
            let max_read = old_history.iter().filter_map(|h| h.progress).reduce(f32::max);

            unit.delete_chapters(old_key)?;
            unit.delete_history(old_key)?;
            unit.insert_chapters(new_key, new_chapters)?;

            if let Some(max_read) = max_read {
                let read_ids: Vec<String> = new_chapters
                    .iter()
                    .filter(|c| c.chapter_num.is_some_and(|n| n <= max_read))
                    .map(|c| c.chapter_id.clone())
                    .collect();
                if !read_ids.is_empty() {
                    marked = unit.mark_chapters_completed(new_key, &read_ids)?;
                }
            }
            Ok(())
        }))?;

        debug!(
            "History moved {} -> {}: {} chapters stored, {} marked read",
            old_key,
            new_key,
            new_chapters.len(),
            marked
        );
        Ok(SubsystemOutcome::Migrated)
    }

    /// Rebind tracker links from the old identity to the new one.
    ///
    /// A link is skipped when the destination already holds a link for the
    /// same tracker, so a tracker never ends up bound to one manga twice.
    /// Skipped links stay bound to the old identity.
    fn migrate_trackers(&self, old_key: &MangaKey, new_key: &MangaKey) -> Result<SubsystemOutcome> {
        let mut moved = 0usize;
        let mut blocked = 0usize;

        self.store.with_unit(Box::new(|unit| {
            for link in unit.tracker_links_for(old_key)? {
                if unit.has_tracker_link(&link.tracker_id, new_key)? {
                    debug!(
                        "Tracker {} already linked to {}, leaving link {} behind",
                        link.tracker_id, new_key, link.id
                    );
                    blocked += 1;
                    continue;
                }
                unit.rebind_tracker_link(link.id, new_key)?;
                moved += 1;
            }
            Ok(())
        }))?;

        if blocked > 0 {
            debug!("{} tracker links left on {}", blocked, old_key);
        }
        Ok(if moved > 0 {
            SubsystemOutcome::Migrated
        } else {
            SubsystemOutcome::Skipped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{HistoryEntry, LibraryRecord, SqliteStore, Store};
    use chrono::Utc;
    use std::sync::Arc;

    fn store() -> DynStore {
        Arc::new(SqliteStore::in_memory().unwrap())
    }

    fn manga(source: &str, id: &str, title: &str) -> Manga {
        Manga::new(MangaKey::new(source, id)).with_title(title)
    }

    fn seed_record(store: &DynStore, manga: &Manga, pinned: Option<i64>) {
        let record = LibraryRecord {
            manga: manga.clone(),
            added_at: Utc::now(),
            pinned_order: pinned,
        };
        store
            .with_unit(Box::new(|unit| unit.upsert_record(&record)))
            .unwrap();
    }

    fn chapter(key: &MangaKey, id: &str, num: f32) -> Chapter {
        Chapter {
            chapter_num: Some(num),
            ..Chapter::new(key.clone(), id)
        }
    }

    fn seed_history(store: &DynStore, key: &MangaKey, chapter_id: &str, progress: f32) {
        let entry = HistoryEntry {
            manga_key: key.clone(),
            chapter_id: chapter_id.to_string(),
            completed: true,
            progress: Some(progress),
            last_read: Some(Utc::now()),
        };
        store
            .with_unit(Box::new(|unit| unit.insert_history(&entry)))
            .unwrap();
    }

    #[test]
    fn test_catalog_renames_in_place_when_destination_absent() {
        let store = store();
        let old = manga("alpha", "m1", "Old");
        let new = manga("beta", "m9", "New");
        seed_record(&store, &old, Some(2));

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);

        assert_eq!(report.catalog, SubsystemOutcome::Migrated);
        assert!(store.get_record(&old.key).unwrap().is_none());
        let moved = store.get_record(&new.key).unwrap().unwrap();
        assert_eq!(moved.manga.title.as_deref(), Some("New"));
        assert_eq!(moved.pinned_order, Some(2));
    }

    #[test]
    fn test_catalog_merges_into_existing_destination() {
        let store = store();
        let old = manga("alpha", "m1", "Old");
        let new = manga("beta", "m9", "Fetched Title");
        let existing = manga("beta", "m9", "Already In Library");
        seed_record(&store, &old, None);
        seed_record(&store, &existing, Some(7));

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);

        assert_eq!(report.catalog, SubsystemOutcome::Migrated);
        assert!(store.get_record(&old.key).unwrap().is_none());
        // The destination row survives with its metadata, but its manga
        // data is refreshed from the fetch.
        let kept = store.get_record(&new.key).unwrap().unwrap();
        assert_eq!(kept.manga.title.as_deref(), Some("Fetched Title"));
        assert_eq!(kept.pinned_order, Some(7));
    }

    #[test]
    fn test_history_replay_marks_up_to_threshold() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");
        seed_record(&store, &old, None);
        store
            .with_unit(Box::new(|unit| {
                unit.insert_chapters(
                    &old.key,
                    &[chapter(&old.key, "o1", 1.0), chapter(&old.key, "o2", 12.5)],
                )
            }))
            .unwrap();
        seed_history(&store, &old.key, "o2", 12.5);

        let new_chapters = vec![
            chapter(&new.key, "n10", 10.0),
            chapter(&new.key, "n12", 12.0),
            chapter(&new.key, "n13", 13.0),
            chapter(&new.key, "n15", 15.0),
        ];

        let report =
            MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &new_chapters);

        assert_eq!(report.history, SubsystemOutcome::Migrated);
        assert!(store.chapters_for(&old.key).unwrap().is_empty());
        assert!(store.history_for(&old.key).unwrap().is_empty());
        assert_eq!(store.chapters_for(&new.key).unwrap().len(), 4);

        let read: Vec<String> = store
            .history_for(&new.key)
            .unwrap()
            .into_iter()
            .filter(|h| h.completed)
            .map(|h| h.chapter_id)
            .collect();
        assert_eq!(read, vec!["n10".to_string(), "n12".to_string()]);
    }

    #[test]
    fn test_history_without_progress_marks_nothing() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");
        seed_record(&store, &old, None);

        let new_chapters = vec![chapter(&new.key, "n1", 1.0)];
        let report =
            MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &new_chapters);

        assert_eq!(report.history, SubsystemOutcome::Migrated);
        assert!(store.history_for(&new.key).unwrap().is_empty());
        assert_eq!(store.chapters_for(&new.key).unwrap().len(), 1);
    }

    #[test]
    fn test_unnumbered_chapters_are_never_marked() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");
        seed_record(&store, &old, None);
        store
            .with_unit(Box::new(|unit| {
                unit.insert_chapters(&old.key, &[chapter(&old.key, "o1", 5.0)])
            }))
            .unwrap();
        seed_history(&store, &old.key, "o1", 5.0);

        let oneshot = Chapter::new(new.key.clone(), "special");
        let new_chapters = vec![chapter(&new.key, "n1", 1.0), oneshot];

        MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &new_chapters);

        let read: Vec<String> = store
            .history_for(&new.key)
            .unwrap()
            .into_iter()
            .map(|h| h.chapter_id)
            .collect();
        assert_eq!(read, vec!["n1".to_string()]);
    }

    #[test]
    fn test_trackers_rebind_and_skip_duplicates() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");
        seed_record(&store, &old, None);

        store
            .with_unit(Box::new(|unit| {
                unit.insert_tracker_link("anilist", &old.key, "111")?;
                unit.insert_tracker_link("mal", &old.key, "222")?;
                // The destination already tracks this manga on anilist.
                unit.insert_tracker_link("anilist", &new.key, "999")?;
                Ok(())
            }))
            .unwrap();

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);

        assert_eq!(report.trackers, SubsystemOutcome::Migrated);
        // mal moved, anilist stayed behind on the old identity.
        assert!(store.has_tracker_link("mal", &new.key).unwrap());
        assert!(store.has_tracker_link("anilist", &new.key).unwrap());
        assert!(store.has_tracker_link("anilist", &old.key).unwrap());
        assert!(!store.has_tracker_link("mal", &old.key).unwrap());
    }

    #[test]
    fn test_trackers_all_blocked_reports_skipped() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");

        store
            .with_unit(Box::new(|unit| {
                unit.insert_tracker_link("anilist", &old.key, "111")?;
                unit.insert_tracker_link("anilist", &new.key, "999")?;
                Ok(())
            }))
            .unwrap();

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);
        assert_eq!(report.trackers, SubsystemOutcome::Skipped);
    }

    #[test]
    fn test_no_trackers_reports_skipped() {
        let store = store();
        let old = manga("alpha", "m1", "Example");
        let new = manga("beta", "m9", "Example");
        seed_record(&store, &old, None);

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);
        assert_eq!(report.trackers, SubsystemOutcome::Skipped);
        assert!(report.fully_migrated());
    }

    #[test]
    fn test_same_identity_refreshes_in_place() {
        let store = store();
        let old = manga("alpha", "m1", "Stale Title");
        let new = manga("alpha", "m1", "Fresh Title");
        seed_record(&store, &old, Some(7));

        let report = MigrationExecutor::new(Arc::clone(&store)).migrate(&old, &new, &[]);

        assert_eq!(report.catalog, SubsystemOutcome::Migrated);
        let record = store.get_record(&new.key).unwrap().unwrap();
        assert_eq!(record.manga.title.as_deref(), Some("Fresh Title"));
        assert_eq!(record.pinned_order, Some(7));
    }
}
