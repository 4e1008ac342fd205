//! Per-item replacement search across candidate sources.
//!
//! The engine walks the user's candidate sources in order and takes the
//! first result of the first source that returns any. A source that errors
//! or returns nothing is skipped; follow-up fetches for full metadata and
//! chapters degrade gracefully instead of discarding the hit.

use crate::cancel::CancellationToken;
use crate::config::{MigrationOptions, MigrationStrategy};
use crate::error::{Result, WatariError};
use crate::library::{Manga, SourceId};
use crate::migrate::types::{MatchOutcome, MatchResult};
use crate::source::{DynSource, SourceRegistry};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds a replacement for a single library entry.
pub struct MatchEngine {
    registry: Arc<SourceRegistry>,
    options: MigrationOptions,
    cancel: CancellationToken,
}

impl MatchEngine {
    pub fn new(
        registry: Arc<SourceRegistry>,
        options: MigrationOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            options,
            cancel,
        }
    }

    /// Search the candidate sources, in order, for a replacement.
    ///
    /// Returns [`MatchOutcome::NotFound`] when the entry has no usable title,
    /// when every candidate comes up empty or errors, or when the session is
    /// cancelled mid-search.
    pub async fn search_item(&self, manga: &Manga, candidates: &[SourceId]) -> MatchOutcome {
        let Some(title) = manga.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("Entry {} has no title to search by", manga.key);
            return MatchOutcome::NotFound;
        };

        for source_id in candidates {
            if self.cancel.is_cancelled() {
                debug!("Search cancelled before reaching {}", source_id);
                return MatchOutcome::NotFound;
            }

            let Some(source) = self.registry.get(source_id).await else {
                debug!("Candidate source {} is not registered", source_id);
                continue;
            };

            match self.try_source(source, title).await {
                Ok(Some(result)) => {
                    debug!(
                        "Matched {} -> {} ({} chapters)",
                        manga.key,
                        result.manga.key,
                        result.chapters.len()
                    );
                    return MatchOutcome::Found(result);
                }
                Ok(None) => {}
                Err(err) if err.is_retryable() => {
                    debug!("Source {} unreachable: {}", source_id, err);
                }
                Err(err) => {
                    warn!("Search on {} failed: {}", source_id, err);
                }
            }
        }

        MatchOutcome::NotFound
    }

    /// Probe one source for a replacement.
    ///
    /// `Err` means the search call itself failed and the source should be
    /// skipped. `Ok(None)` means the source answered with no results.
    async fn try_source(&self, source: DynSource, title: &str) -> Result<Option<MatchResult>> {
        let hits = self.with_deadline(source.search(title)).await?;

        let candidate = match self.options.strategy {
            MigrationStrategy::FirstAlternative => hits.into_iter().next(),
        };
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        // From here on the match is kept: a failed details fetch falls back
        // to the search hit, a failed chapter fetch to an empty list.
        let details = {
            let fetched = self.with_deadline(source.manga_details(&candidate)).await;
            match fetched {
                Ok(manga) => manga,
                Err(err) => {
                    debug!(
                        "Details fetch on {} failed, keeping search hit: {}",
                        source.info().id,
                        err
                    );
                    candidate
                }
            }
        };

        let chapters = {
            let fetched = self.with_deadline(source.chapter_list(&details)).await;
            match fetched {
                Ok(chapters) => chapters,
                Err(err) => {
                    debug!("Chapter fetch on {} failed: {}", source.info().id, err);
                    Vec::new()
                }
            }
        };

        Ok(Some(MatchResult {
            manga: details,
            chapters,
        }))
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(WatariError::Timeout(self.options.call_timeout)),
        }
    }
}
