//! Caption Pipeline
//!
//! Merges embedded subtitle tracks with hits from the external database,
//! groups them for menu display, and turns the selected track into a flat
//! cue list. Caption failures never interrupt playback; they are logged and
//! the cue list is simply left empty.

pub mod opensubs;
pub mod parser;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::models::{CaptionCue, CaptionTrack, EmbeddedTrack, TrackOrigin};
use opensubs::ExternalCaption;

/// One menu group: tracks sharing a language family, in merge order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionGroup {
    /// Family key, e.g. "english" for "English" and "English (CC)"
    pub family: String,
    pub tracks: Vec<CaptionTrack>,
}

pub struct CaptionPipeline {
    client: reqwest::Client,
    /// CORS-proxy prefix the raw URL is appended to (percent-encoded)
    proxy_prefix: String,
    tracks: Vec<CaptionTrack>,
    selected_url: Option<String>,
    cues: Vec<CaptionCue>,
}

impl CaptionPipeline {
    pub fn new(proxy_prefix: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            proxy_prefix: proxy_prefix.into(),
            tracks: Vec::new(),
            selected_url: None,
            cues: Vec::new(),
        }
    }

    /// Replace the track list for a new episode.
    ///
    /// Embedded tracks come first, then external hits; duplicates (same URL)
    /// keep their first occurrence. Any previous selection is dropped.
    pub fn set_tracks(&mut self, embedded: &[EmbeddedTrack], external: Vec<ExternalCaption>) {
        let mut merged: Vec<CaptionTrack> = Vec::new();

        for t in embedded {
            if merged.iter().any(|m| m.url == t.url) {
                continue;
            }
            merged.push(CaptionTrack {
                url: t.url.clone(),
                language_code: t.language_code.clone(),
                label: if t.label.is_empty() {
                    t.language_code.clone()
                } else {
                    t.label.clone()
                },
                origin: TrackOrigin::Embedded,
            });
        }

        for e in external {
            if merged.iter().any(|m| m.url == e.url) {
                continue;
            }
            merged.push(CaptionTrack {
                url: e.url,
                language_code: e.language_code,
                label: e.language_display_name,
                origin: TrackOrigin::ExternalDb,
            });
        }

        debug!(tracks = merged.len(), "caption track list rebuilt");
        self.tracks = merged;
        self.selected_url = None;
        self.cues.clear();
    }

    pub fn tracks(&self) -> &[CaptionTrack] {
        &self.tracks
    }

    /// Tracks grouped by language family, groups ordered by first appearance
    pub fn groups(&self) -> Vec<CaptionGroup> {
        let mut groups: Vec<CaptionGroup> = Vec::new();
        for track in &self.tracks {
            let key = track.family_key();
            match groups.iter_mut().find(|g| g.family == key) {
                Some(g) => g.tracks.push(track.clone()),
                None => groups.push(CaptionGroup {
                    family: key,
                    tracks: vec![track.clone()],
                }),
            }
        }
        groups
    }

    /// URL of the currently selected track, if any
    pub fn selected_url(&self) -> Option<&str> {
        self.selected_url.as_deref()
    }

    /// Select a track (or `None` to turn captions off).
    ///
    /// `None` clears the cue list immediately. `Some` fetches and parses the
    /// track; on failure the error is logged, captions are left off, and
    /// playback is untouched.
    pub async fn select_track(&mut self, url: Option<&str>) {
        let Some(url) = url else {
            self.selected_url = None;
            self.cues.clear();
            return;
        };

        // Clear stale cues up front so a slow fetch never shows the old track
        self.cues.clear();
        self.selected_url = Some(url.to_string());

        match self.fetch_cues(url).await {
            Ok(cues) => {
                debug!(cues = cues.len(), "caption track loaded");
                self.cues = cues;
            }
            Err(e) => {
                warn!(url, error = %e, "caption track failed to load, captions off");
                self.selected_url = None;
            }
        }
    }

    /// Cues active at the given playback time; pure, no side effects
    pub fn active_cues_at(&self, time_seconds: f64) -> Vec<&CaptionCue> {
        parser::active_cues_at(&self.cues, time_seconds)
    }

    pub fn has_cues(&self) -> bool {
        !self.cues.is_empty()
    }

    /// Direct fetch first; when the body does not parse (hotlink-protected
    /// hosts serve HTML error pages), retry once through the CORS proxy.
    async fn fetch_cues(&self, url: &str) -> Result<Vec<CaptionCue>> {
        match self.fetch_and_parse(url).await {
            Ok(cues) => Ok(cues),
            Err(direct_err) => {
                let proxied = format!("{}{}", self.proxy_prefix, urlencoding::encode(url));
                debug!(error = %direct_err, "direct caption fetch failed, retrying via proxy");
                self.fetch_and_parse(&proxied)
                    .await
                    .with_context(|| format!("direct fetch failed first: {direct_err}"))
            }
        }
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<Vec<CaptionCue>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("caption fetch returned HTTP {}", response.status()));
        }
        let body = response.text().await?;
        Ok(parser::parse_cues(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded(url: &str, label: &str) -> EmbeddedTrack {
        EmbeddedTrack {
            url: url.to_string(),
            language_code: "en".to_string(),
            label: label.to_string(),
        }
    }

    fn external(url: &str, name: &str) -> ExternalCaption {
        ExternalCaption {
            url: url.to_string(),
            language_code: "en".to_string(),
            language_display_name: name.to_string(),
        }
    }

    #[test]
    fn test_merge_dedupes_by_url() {
        let mut pipeline = CaptionPipeline::new("http://proxy/?url=");
        pipeline.set_tracks(
            &[embedded("http://a/en.vtt", "English")],
            vec![
                external("http://a/en.vtt", "English"),
                external("http://b/en.srt", "English"),
            ],
        );
        assert_eq!(pipeline.tracks().len(), 2);
        assert_eq!(pipeline.tracks()[0].origin, TrackOrigin::Embedded);
        assert_eq!(pipeline.tracks()[1].url, "http://b/en.srt");
    }

    #[test]
    fn test_groups_ordered_by_first_appearance() {
        let mut pipeline = CaptionPipeline::new("http://proxy/?url=");
        pipeline.set_tracks(
            &[
                embedded("http://a/1", "Spanish"),
                embedded("http://a/2", "English"),
                embedded("http://a/3", "English (CC)"),
            ],
            vec![external("http://b/1", "Spanish")],
        );
        let groups = pipeline.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].family, "spanish");
        assert_eq!(groups[0].tracks.len(), 2);
        assert_eq!(groups[1].family, "english");
        assert_eq!(groups[1].tracks.len(), 2);
    }

    #[test]
    fn test_set_tracks_drops_selection() {
        let mut pipeline = CaptionPipeline::new("http://proxy/?url=");
        pipeline.selected_url = Some("http://a/old".to_string());
        pipeline.cues.push(CaptionCue {
            start_seconds: 0.0,
            end_seconds: 1.0,
            text: "old".to_string(),
        });
        pipeline.set_tracks(&[embedded("http://a/new", "English")], vec![]);
        assert!(pipeline.selected_url().is_none());
        assert!(!pipeline.has_cues());
    }

    #[tokio::test]
    async fn test_select_none_clears_immediately() {
        let mut pipeline = CaptionPipeline::new("http://proxy/?url=");
        pipeline.cues.push(CaptionCue {
            start_seconds: 0.0,
            end_seconds: 1.0,
            text: "x".to_string(),
        });
        pipeline.selected_url = Some("http://a/x".to_string());
        pipeline.select_track(None).await;
        assert!(!pipeline.has_cues());
        assert!(pipeline.selected_url().is_none());
    }
}
