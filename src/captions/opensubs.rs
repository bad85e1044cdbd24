//! External Subtitle Database Client
//!
//! Queries the OpenSubtitles REST endpoint by IMDB id (plus season/episode
//! for series). No API key; identifies itself with the VLSub agent string the
//! endpoint accepts. Download links are rewritten so the body arrives as
//! plain UTF-8 text instead of a gzip archive.

use anyhow::{anyhow, Result};
use serde::Deserialize;

const USER_AGENT_HEADER: &str = "X-User-Agent";
const USER_AGENT_VALUE: &str = "VLSub 0.10.2";

/// One externally-hosted subtitle file from the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCaption {
    /// Rewritten direct-download URL (plain text, UTF-8)
    pub url: String,
    pub language_code: String,
    /// Human-readable language name from the database
    pub language_display_name: String,
}

/// Raw search entry from the REST endpoint
#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(rename = "SubDownloadLink")]
    sub_download_link: Option<String>,
    #[serde(rename = "ISO639")]
    iso639: Option<String>,
    #[serde(rename = "LanguageName")]
    language_name: Option<String>,
    #[serde(rename = "SubFormat")]
    sub_format: Option<String>,
}

pub struct OpenSubsClient {
    base_url: String,
    client: reqwest::Client,
}

impl OpenSubsClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://rest.opensubtitles.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create with custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Search subtitles for a title.
    ///
    /// `season`/`episode` narrow the query for series; movies pass `None`.
    pub async fn search(
        &self,
        imdb_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Vec<ExternalCaption>> {
        let url = self.search_url(imdb_id, season, episode);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT_HEADER, USER_AGENT_VALUE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("subtitle search failed: {}", response.status()));
        }

        let entries: Vec<SearchEntry> = response.json().await?;

        let captions = entries
            .into_iter()
            .filter(|e| {
                e.sub_format
                    .as_deref()
                    .map(|f| f.eq_ignore_ascii_case("srt") || f.eq_ignore_ascii_case("vtt"))
                    .unwrap_or(true)
            })
            .filter_map(|e| {
                let link = e.sub_download_link?;
                Some(ExternalCaption {
                    url: rewrite_download_link(&link),
                    language_code: e.iso639.unwrap_or_default(),
                    language_display_name: e.language_name.unwrap_or_default(),
                })
            })
            .collect();

        Ok(captions)
    }

    /// Path segments in the order the endpoint expects:
    /// `/search/episode-3/imdbid-0944947/season-2`
    fn search_url(&self, imdb_id: &str, season: Option<u32>, episode: Option<u32>) -> String {
        let imdb = imdb_id.trim_start_matches("tt");
        let mut url = format!("{}/search", self.base_url);
        if let Some(e) = episode {
            url.push_str(&format!("/episode-{}", e));
        }
        url.push_str(&format!("/imdbid-{}", imdb));
        if let Some(s) = season {
            url.push_str(&format!("/season-{}", s));
        }
        url
    }
}

impl Default for OpenSubsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a gzipped archive link into a direct plain-text UTF-8 link
fn rewrite_download_link(link: &str) -> String {
    let stripped = link.strip_suffix(".gz").unwrap_or(link);
    stripped.replace("download/", "download/subencoding-utf8/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_strips_gz_and_forces_utf8() {
        let link = "https://dl.opensubtitles.org/en/download/file/1957500417.gz";
        assert_eq!(
            rewrite_download_link(link),
            "https://dl.opensubtitles.org/en/download/subencoding-utf8/file/1957500417"
        );
    }

    #[test]
    fn test_rewrite_leaves_plain_links_alone() {
        let link = "https://example.com/subs/file.srt";
        assert_eq!(rewrite_download_link(link), link);
    }

    #[test]
    fn test_search_url_movie() {
        let client = OpenSubsClient::with_base_url("http://localhost");
        assert_eq!(
            client.search_url("tt0133093", None, None),
            "http://localhost/search/imdbid-0133093"
        );
    }

    #[test]
    fn test_search_url_episode() {
        let client = OpenSubsClient::with_base_url("http://localhost");
        assert_eq!(
            client.search_url("0944947", Some(2), Some(3)),
            "http://localhost/search/episode-3/imdbid-0944947/season-2"
        );
    }
}
