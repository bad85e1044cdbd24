//! Upstream aggregator API client
//!
//! Talks to a consumet-style aggregator that fronts the individual movie
//! sites. Each provider exposes the same three endpoints:
//! search (`/movies/{provider}/{query}`), media info (`.../info?id=`) and
//! stream sources (`.../watch?episodeId=&mediaId=`).

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{EmbeddedTrack, SourceVariant};

/// One search hit from an upstream provider, normalized at the boundary
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    /// Free-form type tag as the provider reports it ("Movie", "TV Series"...)
    pub result_type: String,
    /// Release year parsed from the provider's release date, when present
    pub release_year: Option<u16>,
}

/// An episode entry from a provider's media info
#[derive(Debug, Clone)]
pub struct ProviderEpisode {
    pub id: String,
    pub number: Option<u32>,
    pub season: Option<u32>,
}

/// Media info for one matched title
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub id: String,
    pub episodes: Vec<ProviderEpisode>,
}

/// Stream sources plus embedded subtitle URLs for one episode
#[derive(Debug, Clone, Default)]
pub struct EpisodeSources {
    pub sources: Vec<SourceVariant>,
    pub subtitles: Vec<EmbeddedTrack>,
}

/// Client for the consumet-style upstream API
pub struct UpstreamClient {
    base_url: String,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn provider_base(&self, provider: &str) -> String {
        format!("{}/movies/{}", self.base_url, provider)
    }

    /// Search a provider by title text
    pub async fn search(&self, provider: &str, title: &str) -> Result<Vec<SearchHit>> {
        let url = format!(
            "{}/{}",
            self.provider_base(provider),
            urlencoding::encode(title)
        );
        let data: SearchResponse = self.fetch_json(&url).await?;
        Ok(data
            .results
            .into_iter()
            .map(|r| r.into_search_hit())
            .collect())
    }

    /// Fetch media info (episode list) for a matched title
    pub async fn media_info(&self, provider: &str, media_id: &str) -> Result<MediaInfo> {
        let url = format!(
            "{}/info?id={}",
            self.provider_base(provider),
            urlencoding::encode(media_id)
        );
        let data: MediaInfoRaw = self.fetch_json(&url).await?;
        Ok(MediaInfo {
            id: data.id,
            episodes: data
                .episodes
                .unwrap_or_default()
                .into_iter()
                .map(|e| ProviderEpisode {
                    id: e.id,
                    number: e.number,
                    season: e.season,
                })
                .collect(),
        })
    }

    /// Fetch stream sources for one episode entry
    pub async fn episode_sources(
        &self,
        provider: &str,
        episode_id: &str,
        media_id: &str,
    ) -> Result<EpisodeSources> {
        let url = format!(
            "{}/watch?episodeId={}&mediaId={}",
            self.provider_base(provider),
            urlencoding::encode(episode_id),
            urlencoding::encode(media_id)
        );
        let data: SourcesRaw = self.fetch_json(&url).await?;

        let sources = data
            .sources
            .into_iter()
            .map(|s| {
                let is_playlist = s.is_m3u8.unwrap_or_else(|| s.url.contains(".m3u8"));
                SourceVariant {
                    url: s.url,
                    quality_label: s.quality.unwrap_or_else(|| "auto".to_string()),
                    is_segmented_playlist: is_playlist,
                }
            })
            .collect();

        let subtitles = data
            .subtitles
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                let lang = s.lang.unwrap_or_else(|| "Unknown".to_string());
                EmbeddedTrack {
                    url: s.url,
                    label: lang.clone(),
                    language_code: lang,
                }
            })
            .collect();

        Ok(EpisodeSources { sources, subtitles })
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("upstream request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("upstream returned HTTP {}", status);
        }

        let text = response.text().await.context("failed to read body")?;
        serde_json::from_str(&text).context("failed to parse upstream JSON")
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHitRaw>,
}

#[derive(Debug, Deserialize)]
struct SearchHitRaw {
    id: String,
    title: Option<String>,
    #[serde(rename = "type")]
    result_type: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
}

impl SearchHitRaw {
    fn into_search_hit(self) -> SearchHit {
        // Providers report dates as "2022", "2022-03-04" or junk; leading
        // digits are the year if there are at least four of them.
        let release_year = self.release_date.as_deref().and_then(parse_year);
        SearchHit {
            id: self.id,
            title: self.title.unwrap_or_default(),
            result_type: self.result_type.unwrap_or_default(),
            release_year,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaInfoRaw {
    id: String,
    episodes: Option<Vec<EpisodeRaw>>,
}

#[derive(Debug, Deserialize)]
struct EpisodeRaw {
    id: String,
    number: Option<u32>,
    season: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SourcesRaw {
    #[serde(default)]
    sources: Vec<SourceRaw>,
    subtitles: Option<Vec<SubtitleRaw>>,
}

#[derive(Debug, Deserialize)]
struct SourceRaw {
    url: String,
    quality: Option<String>,
    #[serde(rename = "isM3U8")]
    is_m3u8: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SubtitleRaw {
    url: String,
    lang: Option<String>,
}

/// Parse a year from the leading digits of a release date string
fn parse_year(date: &str) -> Option<u16> {
    let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 4 {
        digits[..4].parse().ok()
    } else {
        None
    }
}
