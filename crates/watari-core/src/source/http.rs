//! HTTP-backed source speaking the plain Watari source API.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET /search?query=<q>&limit=<n>` returns `{"manga": [..]}`
//! - `GET /manga/<id>` returns one manga object
//! - `GET /manga/<id>/chapters` returns `{"chapters": [..]}`

use crate::config::SearchConfig;
use crate::error::{Result, WatariError};
use crate::library::{Chapter, Manga, MangaKey};
use crate::source::{Source, SourceInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

/// A source reached over HTTP.
pub struct HttpSource {
    info: SourceInfo,
    base_url: Url,
    client: Client,
}

impl HttpSource {
    /// Create a source from its registry metadata.
    ///
    /// Fails if the metadata carries no base URL or the URL does not parse.
    pub fn new(info: SourceInfo) -> Result<Self> {
        let raw = info.base_url.clone().ok_or_else(|| WatariError::Config {
            message: format!("Source {} has no base URL", info.id),
        })?;
        let base_url = Url::parse(&raw).map_err(|e| WatariError::Config {
            message: format!("Invalid base URL for source {}: {}", info.id, e),
        })?;

        let client = Client::builder()
            .timeout(SearchConfig::CALL_TIMEOUT)
            .user_agent(SearchConfig::USER_AGENT)
            .build()
            .map_err(|e| WatariError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            info,
            base_url,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WatariError::Network {
                message: format!("Request to source {} failed: {}", self.info.id, e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatariError::SourceApi {
                source_id: self.info.id.to_string(),
                message: format!("HTTP {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        response.json::<T>().await.map_err(|e| WatariError::Json {
            message: format!("Failed to parse response from source {}: {}", self.info.id, e),
            source: None,
        })
    }

    fn convert_manga(&self, dto: ApiManga) -> Manga {
        Manga {
            key: MangaKey::new(self.info.id.clone(), dto.id),
            title: dto.title,
            author: dto.author,
            artist: dto.artist,
            description: dto.description,
            cover_url: dto.cover_url,
            url: dto.url,
            tags: dto.tags,
        }
    }

    fn convert_chapter(&self, manga_key: &MangaKey, order: u32, dto: ApiChapter) -> Chapter {
        Chapter {
            manga_key: manga_key.clone(),
            chapter_id: dto.id,
            title: dto.title,
            chapter_num: dto.chapter_num,
            volume_num: dto.volume_num,
            scanlator: dto.scanlator,
            lang: dto.lang,
            source_order: order,
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn search(&self, query: &str) -> Result<Vec<Manga>> {
        let url = self.endpoint(&format!(
            "/search?query={}&limit={}",
            urlencoding::encode(query),
            SearchConfig::PAGE_LIMIT
        ));

        let page: ApiSearchResponse = self.get_json(url).await?;
        Ok(page
            .manga
            .into_iter()
            .map(|dto| self.convert_manga(dto))
            .collect())
    }

    async fn manga_details(&self, manga: &Manga) -> Result<Manga> {
        let url = self.endpoint(&format!(
            "/manga/{}",
            urlencoding::encode(&manga.key.manga_id)
        ));

        let dto: ApiManga = self.get_json(url).await?;
        Ok(self.convert_manga(dto))
    }

    async fn chapter_list(&self, manga: &Manga) -> Result<Vec<Chapter>> {
        let url = self.endpoint(&format!(
            "/manga/{}/chapters",
            urlencoding::encode(&manga.key.manga_id)
        ));

        let page: ApiChapterResponse = self.get_json(url).await?;
        Ok(page
            .chapters
            .into_iter()
            .enumerate()
            .map(|(idx, dto)| self.convert_chapter(&manga.key, idx as u32, dto))
            .collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiManga {
    id: String,
    title: Option<String>,
    author: Option<String>,
    artist: Option<String>,
    description: Option<String>,
    cover_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    manga: Vec<ApiManga>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChapter {
    id: String,
    title: Option<String>,
    chapter_num: Option<f32>,
    volume_num: Option<f32>,
    scanlator: Option<String>,
    lang: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChapterResponse {
    chapters: Vec<ApiChapter>,
}
