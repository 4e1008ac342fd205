//! Source layer: the remote catalogs manga can be migrated between.
//!
//! A [`Source`] answers three questions about a remote catalog: what matches
//! a title search, what the full metadata of an entry is, and which chapters
//! an entry has. The engine never talks to a concrete source type; it looks
//! sources up in the [`SourceRegistry`] by id and goes through the trait.

pub mod http;

use crate::error::Result;
use crate::library::{Chapter, Manga, SourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub use http::HttpSource;

/// Descriptive metadata for a registered source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: SourceId,
    pub name: String,
    pub lang: Option<String>,
    pub base_url: Option<String>,
}

/// A remote catalog of manga.
#[async_trait]
pub trait Source: Send + Sync {
    fn info(&self) -> &SourceInfo;

    /// Search the catalog by free-text query, best matches first.
    async fn search(&self, query: &str) -> Result<Vec<Manga>>;

    /// Fetch full metadata for a manga previously returned by this source.
    async fn manga_details(&self, manga: &Manga) -> Result<Manga>;

    /// Fetch the chapter list for a manga previously returned by this source.
    async fn chapter_list(&self, manga: &Manga) -> Result<Vec<Chapter>>;
}

/// Shared handle to a source.
pub type DynSource = Arc<dyn Source>;

/// Registry of available sources, keyed by source id.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<SourceId, DynSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any previous source with the same id.
    pub async fn register(&self, source: DynSource) {
        let id = source.info().id.clone();
        let mut sources = self.sources.write().await;
        if sources.insert(id.clone(), source).is_some() {
            debug!("Replaced source registration: {}", id);
        }
    }

    pub async fn get(&self, id: &SourceId) -> Option<DynSource> {
        self.sources.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &SourceId) -> bool {
        self.sources.read().await.contains_key(id)
    }

    /// Metadata for all registered sources, ordered by id.
    pub async fn list(&self) -> Vec<SourceInfo> {
        let sources = self.sources.read().await;
        let mut infos: Vec<SourceInfo> = sources.values().map(|s| s.info().clone()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MangaKey;

    struct MockSource {
        info: SourceInfo,
    }

    impl MockSource {
        fn new(id: &str) -> Self {
            Self {
                info: SourceInfo {
                    id: SourceId::new(id),
                    name: id.to_uppercase(),
                    lang: Some("en".into()),
                    base_url: None,
                },
            }
        }
    }

    #[async_trait]
    impl Source for MockSource {
        fn info(&self) -> &SourceInfo {
            &self.info
        }

        async fn search(&self, query: &str) -> Result<Vec<Manga>> {
            Ok(vec![
                Manga::new(MangaKey::new(self.info.id.clone(), "hit")).with_title(query)
            ])
        }

        async fn manga_details(&self, manga: &Manga) -> Result<Manga> {
            Ok(manga.clone())
        }

        async fn chapter_list(&self, _manga: &Manga) -> Result<Vec<Chapter>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("alpha"))).await;

        assert!(registry.get(&SourceId::new("alpha")).await.is_some());
        assert!(registry.get(&SourceId::new("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_id() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("beta"))).await;
        registry.register(Arc::new(MockSource::new("alpha"))).await;

        let infos = registry.list().await;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].id, SourceId::new("alpha"));
        assert_eq!(infos[1].id, SourceId::new("beta"));
    }

    #[tokio::test]
    async fn test_register_replaces_same_id() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("alpha"))).await;
        registry.register(Arc::new(MockSource::new("alpha"))).await;

        assert_eq!(registry.len().await, 1);
    }
}
