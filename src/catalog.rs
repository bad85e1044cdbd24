//! Catalog and history collaborator ports
//!
//! The engine never owns title metadata: season/episode enumeration and
//! cross-reference ids come from a catalog collaborator, and watch history is
//! a fire-and-forget sink. Both are traits so tests substitute fakes; a
//! TMDB-backed implementation is provided for the real application.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{EpisodeRef, MediaKind, TitleRef};

/// Season/episode enumeration and cross-reference lookup
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Season numbers known for a series, ascending, specials excluded
    async fn season_numbers(&self, id: u64) -> Result<Vec<u32>>;

    /// Episode entries for one season of a series
    async fn season_episodes(&self, id: u64, season: u32) -> Result<Vec<EpisodeRef>>;

    /// External cross-reference id (IMDb-style) used for caption lookup
    async fn cross_reference_id(&self, id: u64, kind: MediaKind) -> Result<Option<String>>;
}

/// Fire-and-forget watch history sink, called once per playback session
pub trait WatchHistory: Send + Sync {
    fn record_watched(&self, title: &TitleRef);
}

/// History sink that drops everything (default for tests and headless use)
#[derive(Debug, Default)]
pub struct NullHistory;

impl WatchHistory for NullHistory {
    fn record_watched(&self, _title: &TitleRef) {}
}

// =============================================================================
// TMDB-backed implementation
// =============================================================================

/// TMDB API error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Resource not found (404)")]
    NotFound,

    #[error("Rate limited (429), retries exhausted")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Catalog client backed by the TMDB REST API
pub struct TmdbCatalog {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl TmdbCatalog {
    /// Create a new catalog client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.themoviedb.org/3")
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            max_retries: 3,
        }
    }

    /// Make an authenticated GET request with retry logic for rate limits
    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Accept", "application/json")
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await?;
                    let parsed: T = serde_json::from_str(&body).map_err(|e| {
                        CatalogError::InvalidResponse(format!("JSON parse error: {}", e))
                    })?;
                    return Ok(parsed);
                }
                StatusCode::NOT_FOUND => {
                    return Err(CatalogError::NotFound.into());
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    if retries >= self.max_retries {
                        return Err(CatalogError::RateLimited.into());
                    }

                    // Get Retry-After header or default to exponential backoff
                    let wait_secs = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(2u64.pow(retries));

                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    continue;
                }
                status => {
                    return Err(CatalogError::ServerError(status.as_u16()).into());
                }
            }
        }
    }
}

#[async_trait]
impl CatalogClient for TmdbCatalog {
    async fn season_numbers(&self, id: u64) -> Result<Vec<u32>> {
        let endpoint = format!("/tv/{}", id);
        let response: TvResponse = self.get(&endpoint).await?;

        // Filter out specials (season 0)
        Ok(response
            .seasons
            .into_iter()
            .map(|s| s.season_number)
            .filter(|&n| n > 0)
            .collect())
    }

    async fn season_episodes(&self, id: u64, season: u32) -> Result<Vec<EpisodeRef>> {
        let endpoint = format!("/tv/{}/season/{}", id, season);
        let response: SeasonResponse = self.get(&endpoint).await?;
        Ok(response
            .episodes
            .into_iter()
            .map(|e| EpisodeRef {
                number: e.episode_number,
                name: e.name,
            })
            .collect())
    }

    async fn cross_reference_id(&self, id: u64, kind: MediaKind) -> Result<Option<String>> {
        let endpoint = match kind {
            MediaKind::Movie => format!("/movie/{}/external_ids", id),
            MediaKind::Series => format!("/tv/{}/external_ids", id),
        };
        let response: ExternalIds = self.get(&endpoint).await?;
        Ok(response.imdb_id.filter(|s| !s.is_empty()))
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct TvResponse {
    seasons: Vec<SeasonRaw>,
}

#[derive(Debug, Deserialize)]
struct SeasonRaw {
    season_number: u32,
}

#[derive(Debug, Deserialize)]
struct SeasonResponse {
    episodes: Vec<EpisodeRaw>,
}

#[derive(Debug, Deserialize)]
struct EpisodeRaw {
    episode_number: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    imdb_id: Option<String>,
}
