//! Concurrent fan-out of the search phase.
//!
//! The coordinator owns the search run for one batch of items: it marks the
//! whole batch running, spawns one search task per item, and waits until
//! every task has settled its slot in the shared state table. Slots are only
//! ever transitioned by their own task, so concurrent writes never touch the
//! same entry.

use crate::events::{EventBus, WatariEvent};
use crate::library::{Manga, SourceId};
use crate::migrate::matcher::MatchEngine;
use crate::migrate::types::{ItemKey, MatchOutcome, MatchResult, MigrationState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::warn;

/// One library entry inside a session.
#[derive(Debug, Clone)]
pub(crate) struct SessionItem {
    pub manga: Manga,
    pub state: MigrationState,
    pub matched: Option<MatchResult>,
}

impl SessionItem {
    pub(crate) fn new(manga: Manga) -> Self {
        Self {
            manga,
            state: MigrationState::Idle,
            matched: None,
        }
    }
}

/// Per-item state shared between search tasks and status queries.
pub(crate) type StateTable = Arc<RwLock<HashMap<ItemKey, SessionItem>>>;

pub(crate) struct SearchCoordinator {
    engine: Arc<MatchEngine>,
    table: StateTable,
    events: EventBus,
}

impl SearchCoordinator {
    pub(crate) fn new(engine: Arc<MatchEngine>, table: StateTable, events: EventBus) -> Self {
        Self {
            engine,
            table,
            events,
        }
    }

    /// Run the search phase over the given items and wait for every task.
    pub(crate) async fn run(&self, items: Vec<(ItemKey, Manga)>, candidates: Arc<[SourceId]>) {
        // The whole batch flips to running before the first network call.
        {
            let mut table = self.table.write().await;
            for (key, _) in &items {
                if let Some(item) = table.get_mut(key) {
                    item.state = MigrationState::Running;
                    self.events.emit(WatariEvent::SearchStateChanged {
                        item: *key,
                        state: MigrationState::Running,
                    });
                }
            }
        }

        let mut tasks = JoinSet::new();
        for (key, manga) in items {
            let engine = Arc::clone(&self.engine);
            let table = Arc::clone(&self.table);
            let events = self.events.clone();
            let candidates = Arc::clone(&candidates);

            tasks.spawn(async move {
                let outcome = engine.search_item(&manga, &candidates).await;

                let transition = {
                    let mut table = table.write().await;
                    match table.get_mut(&key) {
                        Some(item) => {
                            let state = match outcome {
                                MatchOutcome::Found(result) => {
                                    item.matched = Some(result);
                                    MigrationState::Done
                                }
                                MatchOutcome::NotFound => MigrationState::Failed,
                            };
                            item.state = state;
                            Some(state)
                        }
                        // The item was withdrawn while its search was in flight.
                        None => None,
                    }
                };

                if let Some(state) = transition {
                    events.emit(WatariEvent::SearchStateChanged { item: key, state });
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!("Search task aborted: {}", err);
            }
        }

        // A task that died leaves its slot running; settle those as failed so
        // the phase always ends with every item in a terminal state.
        let mut table = self.table.write().await;
        for (key, item) in table.iter_mut() {
            if item.state == MigrationState::Running {
                item.state = MigrationState::Failed;
                self.events.emit(WatariEvent::SearchStateChanged {
                    item: *key,
                    state: MigrationState::Failed,
                });
            }
        }
    }
}
