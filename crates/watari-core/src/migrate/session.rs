//! A two-phase migration session.
//!
//! Phase one searches every item's candidate sources concurrently and
//! records matches; phase two applies the recorded matches to the store.
//! Between the phases the caller inspects per-item results, withdraws items
//! it does not want migrated, and then commits the rest. Nothing touches
//! the store until [`MigrationSession::commit_migration`] is called.

use crate::cancel::CancellationToken;
use crate::config::MigrationOptions;
use crate::error::{Result, WatariError};
use crate::events::{EventBus, WatariEvent};
use crate::library::{DynStore, Manga, MangaKey, SourceId};
use crate::migrate::coordinator::{SearchCoordinator, SessionItem, StateTable};
use crate::migrate::executor::MigrationExecutor;
use crate::migrate::matcher::MatchEngine;
use crate::migrate::types::{
    ItemKey, MatchResult, MigrationState, MigrationSummary, SessionState,
};
use crate::source::SourceRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Status of one session item, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub key: ItemKey,
    pub state: MigrationState,
    pub manga: Manga,
    /// Destination identity, once a replacement has been found.
    pub matched: Option<MangaKey>,
    /// Chapter count of the found replacement.
    pub matched_chapters: Option<usize>,
}

/// One bulk migration, from item intake to commit.
pub struct MigrationSession {
    store: DynStore,
    registry: Arc<SourceRegistry>,
    events: EventBus,
    options: MigrationOptions,
    cancel: CancellationToken,
    table: StateTable,
    /// Presentation order of the working set.
    order: RwLock<Vec<ItemKey>>,
    candidates: RwLock<Vec<SourceId>>,
    state: RwLock<SessionState>,
}

impl MigrationSession {
    pub fn new(
        store: DynStore,
        registry: Arc<SourceRegistry>,
        events: EventBus,
        options: MigrationOptions,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            options,
            cancel: CancellationToken::new(),
            table: Arc::new(RwLock::new(HashMap::new())),
            order: RwLock::new(Vec::new()),
            candidates: RwLock::new(Vec::new()),
            state: RwLock::new(SessionState::Idle),
        }
    }

    /// Add one library entry to the working set and return its key.
    pub async fn add_manga(&self, manga: Manga) -> ItemKey {
        let key = ItemKey::new();
        self.table.write().await.insert(key, SessionItem::new(manga));
        self.order.write().await.push(key);
        key
    }

    /// Add several entries, returning their keys in the same order.
    pub async fn add_all(&self, manga: Vec<Manga>) -> Vec<ItemKey> {
        let mut keys = Vec::with_capacity(manga.len());
        for entry in manga {
            keys.push(self.add_manga(entry).await);
        }
        keys
    }

    /// Set the ordered list of candidate sources for the next search run.
    pub async fn set_candidates(&self, candidates: Vec<SourceId>) -> Result<()> {
        if *self.state.read().await == SessionState::Running {
            return Err(WatariError::SessionBusy);
        }
        *self.candidates.write().await = candidates;
        Ok(())
    }

    pub async fn candidates(&self) -> Vec<SourceId> {
        self.candidates.read().await.clone()
    }

    /// Withdraw an item from the session. Its library data is not touched.
    pub async fn remove_item(&self, key: &ItemKey) -> Result<()> {
        if self.table.write().await.remove(key).is_none() {
            return Err(WatariError::ItemNotFound {
                key: key.to_string(),
            });
        }
        self.order.write().await.retain(|k| k != key);
        Ok(())
    }

    /// Request cancellation. No further provider lookups are started and
    /// the session can no longer be committed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    /// Number of items that currently hold a recorded match.
    pub async fn matched_count(&self) -> usize {
        self.table
            .read()
            .await
            .values()
            .filter(|item| item.matched.is_some())
            .count()
    }

    /// The recorded match for one item, if any.
    pub async fn match_for(&self, key: &ItemKey) -> Option<MatchResult> {
        self.table.read().await.get(key).and_then(|item| item.matched.clone())
    }

    /// Per-item status in presentation order.
    pub async fn status(&self) -> Vec<ItemStatus> {
        let order = self.order.read().await;
        let table = self.table.read().await;
        order
            .iter()
            .filter_map(|key| {
                table.get(key).map(|item| ItemStatus {
                    key: *key,
                    state: item.state,
                    manga: item.manga.clone(),
                    matched: item.matched.as_ref().map(|m| m.manga.key.clone()),
                    matched_chapters: item.matched.as_ref().map(|m| m.chapters.len()),
                })
            })
            .collect()
    }

    /// Run the search phase to completion.
    ///
    /// Every item ends in a terminal per-item state. Items whose search
    /// found a replacement hold a recorded match afterwards; searching
    /// again overwrites previous matches.
    pub async fn start_search(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Running {
                return Err(WatariError::SessionBusy);
            }
            *state = SessionState::Running;
        }

        let items: Vec<(ItemKey, Manga)> = {
            let order = self.order.read().await;
            let table = self.table.read().await;
            order
                .iter()
                .filter_map(|key| table.get(key).map(|item| (*key, item.manga.clone())))
                .collect()
        };
        let candidates: Arc<[SourceId]> = self.candidates.read().await.clone().into();

        info!(
            "Searching {} candidate sources for {} entries",
            candidates.len(),
            items.len()
        );

        let engine = Arc::new(MatchEngine::new(
            Arc::clone(&self.registry),
            self.options.clone(),
            self.cancel.clone(),
        ));
        let coordinator =
            SearchCoordinator::new(engine, Arc::clone(&self.table), self.events.clone());
        coordinator.run(items, candidates).await;

        *self.state.write().await = SessionState::Done;
        info!(
            "Search finished: {} of {} entries matched",
            self.matched_count().await,
            self.len().await
        );
        Ok(())
    }

    /// Apply every recorded match to the store.
    ///
    /// Items without a match are skipped. Per-item store failures are
    /// contained in the returned summary; the phase itself only fails when
    /// the session was cancelled or never completed a search.
    pub async fn commit_migration(&self) -> Result<MigrationSummary> {
        self.cancel.check()?;
        {
            let state = self.state.read().await;
            if *state != SessionState::Done {
                return Err(WatariError::SessionNotReady {
                    state: state.to_string(),
                });
            }
        }

        let batch: Vec<(Manga, MatchResult)> = {
            let order = self.order.read().await;
            let table = self.table.read().await;
            order
                .iter()
                .filter_map(|key| table.get(key))
                .filter_map(|item| {
                    item.matched
                        .clone()
                        .map(|matched| (item.manga.clone(), matched))
                })
                .collect()
        };
        let skipped = self.len().await.saturating_sub(batch.len());

        info!("Migrating {} entries ({} skipped)", batch.len(), skipped);

        let executor = Arc::new(MigrationExecutor::new(Arc::clone(&self.store)));
        let mut tasks = JoinSet::new();
        for (old, matched) in batch {
            let executor = Arc::clone(&executor);
            tasks.spawn(async move { executor.migrate(&old, &matched.manga, &matched.chapters) });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => warn!("Migration task aborted: {}", err),
            }
        }

        // Per-pair notifications first, then exactly one refresh for the
        // library and one for history, after all items are done.
        for report in &reports {
            self.events.emit(WatariEvent::MangaMigrated {
                from: report.from.clone(),
                to: report.to.clone(),
            });
        }
        self.events.emit(WatariEvent::LibraryChanged);
        self.events.emit(WatariEvent::HistoryChanged);

        let failed = reports.iter().filter(|r| !r.fully_migrated()).count();
        if failed > 0 {
            warn!("{} entries migrated with partial failures", failed);
        }
        info!(
            "Migration finished: {} migrated, {} skipped",
            reports.len(),
            skipped
        );

        Ok(MigrationSummary { reports, skipped })
    }
}
