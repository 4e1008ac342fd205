//! Core data types for the manga library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of a manga: the source it lives on plus the source-local id.
///
/// Two manga with the same local id on different sources are distinct
/// entries; identity comparisons must always use the full key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaKey {
    pub source_id: SourceId,
    pub manga_id: String,
}

impl MangaKey {
    pub fn new(source_id: impl Into<SourceId>, manga_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            manga_id: manga_id.into(),
        }
    }
}

impl fmt::Display for MangaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_id, self.manga_id)
    }
}

/// A manga entry as known to a source or to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manga {
    pub key: MangaKey,
    pub title: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Manga {
    /// Create a manga with the given identity and no metadata.
    pub fn new(key: MangaKey) -> Self {
        Self {
            key,
            title: None,
            author: None,
            artist: None,
            description: None,
            cover_url: None,
            url: None,
            tags: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A chapter of a manga, as listed by its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Identity of the manga this chapter belongs to.
    pub manga_key: MangaKey,
    /// Source-local chapter id, unique within the manga.
    pub chapter_id: String,
    pub title: Option<String>,
    /// Numeric chapter marker. Absent for specials and oneshots.
    pub chapter_num: Option<f32>,
    pub volume_num: Option<f32>,
    pub scanlator: Option<String>,
    pub lang: Option<String>,
    /// Position in the source's own listing, used as a stable sort fallback.
    pub source_order: u32,
}

impl Chapter {
    pub fn new(manga_key: MangaKey, chapter_id: impl Into<String>) -> Self {
        Self {
            manga_key,
            chapter_id: chapter_id.into(),
            title: None,
            chapter_num: None,
            volume_num: None,
            scanlator: None,
            lang: None,
            source_order: 0,
        }
    }
}

/// A reading-history row for one chapter of one manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub manga_key: MangaKey,
    pub chapter_id: String,
    pub completed: bool,
    /// Numeric progress marker, normally the chapter number of the entry.
    pub progress: Option<f32>,
    pub last_read: Option<DateTime<Utc>>,
}

/// A link binding a library manga to an entry on an external tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerLink {
    /// Store-assigned row id.
    pub id: i64,
    /// Which tracker service this link belongs to.
    pub tracker_id: String,
    /// The library manga the link is bound to.
    pub manga_key: MangaKey,
    /// Tracker-side entry id.
    pub entry_id: String,
}

/// A library row: the manga plus record-level metadata that must survive
/// a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRecord {
    pub manga: Manga,
    pub added_at: DateTime<Utc>,
    /// User pin position, if pinned.
    pub pinned_order: Option<i64>,
}
