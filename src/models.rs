//! Data structures and types for the playback engine
//!
//! Contains all shared models used across the engine organized by domain:
//! - **Request**: what the user asked to watch
//! - **Candidate**: a resolved, playable stream descriptor from one provider
//! - **Captions**: subtitle tracks and timed cues
//! - **Session**: the single source of truth for all playback UI

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Request Models
// =============================================================================

/// Media kind discriminator for resolution requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "Movie"),
            MediaKind::Series => write!(f, "Series"),
        }
    }
}

/// A request to resolve a playable stream for one title/episode.
///
/// Immutable per resolution attempt; episode changes produce a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Title text used for upstream search
    pub title_text: String,
    pub kind: MediaKind,
    /// Release year, when known, used for the ±2 year match filter
    pub release_year: Option<u16>,
    /// Catalog id of the title (for cross-reference lookups)
    pub external_id: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl StreamRequest {
    /// Build a movie request
    pub fn movie(title: impl Into<String>, year: Option<u16>) -> Self {
        Self {
            title_text: title.into(),
            kind: MediaKind::Movie,
            release_year: year,
            external_id: None,
            season: None,
            episode: None,
        }
    }

    /// Build a series request for a specific episode
    pub fn series(title: impl Into<String>, year: Option<u16>, season: u32, episode: u32) -> Self {
        Self {
            title_text: title.into(),
            kind: MediaKind::Series,
            release_year: year,
            external_id: None,
            season: Some(season),
            episode: Some(episode),
        }
    }

    /// Attach a catalog id for cross-reference lookups
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => write!(f, "{} S{:02}E{:02}", self.title_text, s, e),
            _ => write!(f, "{}", self.title_text),
        }
    }
}

// =============================================================================
// Candidate Models
// =============================================================================

/// One playable rendition URL inside a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVariant {
    pub url: String,
    /// Upstream quality label ("auto", "1080", ...)
    pub quality_label: String,
    /// Whether the URL is a segmented (HLS) playlist rather than a flat file
    pub is_segmented_playlist: bool,
}

/// A subtitle URL carried alongside the stream sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedTrack {
    pub url: String,
    pub language_code: String,
    pub label: String,
}

/// A resolved, playable stream descriptor from one provider for one
/// title/episode.
///
/// Produced by the resolver; the session controller is the only writer and
/// discards (never mutates) it when advancing to a different episode/title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCandidate {
    pub provider_name: String,
    pub media_id: String,
    pub episode_id: String,
    /// Ordered, best first
    pub sources: Vec<SourceVariant>,
    pub subtitle_tracks: Vec<EmbeddedTrack>,
}

impl StreamCandidate {
    /// Pick the source to feed the delivery layer: prefer a segmented
    /// playlist, otherwise the first entry.
    pub fn preferred_source(&self) -> Option<&SourceVariant> {
        self.sources
            .iter()
            .find(|s| s.is_segmented_playlist)
            .or_else(|| self.sources.first())
    }
}

impl fmt::Display for StreamCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} sources, {} subs)",
            self.provider_name,
            self.sources.len(),
            self.subtitle_tracks.len()
        )
    }
}

// =============================================================================
// Caption Models
// =============================================================================

/// Where a caption track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackOrigin {
    /// Delivered alongside the stream candidate
    Embedded,
    /// Fetched from the external subtitle database
    ExternalDb,
}

/// A selectable caption track, deduplicated by URL across origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub url: String,
    pub language_code: String,
    /// Display label ("English", "English (CC)", ...)
    pub label: String,
    pub origin: TrackOrigin,
}

impl CaptionTrack {
    /// Coarse language-family key derived from the display label.
    ///
    /// "English" and "English (CC)" share a family; "Spanish" does not.
    /// Falls back to the language code when the label is empty.
    pub fn family_key(&self) -> String {
        let base = self
            .label
            .split(['(', '[', '-'])
            .next()
            .unwrap_or("")
            .trim();
        if base.is_empty() {
            self.language_code.to_lowercase()
        } else {
            base.to_lowercase()
        }
    }
}

impl fmt::Display for CaptionTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label, self.language_code)
    }
}

/// A single timed caption text unit, immutable once parsed
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Cue payload; may carry inline markup, rendered by the UI layer
    pub text: String,
}

impl CaptionCue {
    /// Whether the cue interval contains the given playback time
    pub fn contains(&self, time_seconds: f64) -> bool {
        time_seconds >= self.start_seconds && time_seconds < self.end_seconds
    }
}

// =============================================================================
// Session Models
// =============================================================================

/// In-player modal panels, shown mutually exclusively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    Episodes,
    Seasons,
    CaptionsMenu,
    QualityMenu,
}

/// Explicit rendition choice for the delivery layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreference {
    /// Encoder-driven adaptive selection
    #[default]
    Auto,
    /// Lock to the rendition with this height
    Height(u32),
}

impl fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityPreference::Auto => write!(f, "Auto"),
            QualityPreference::Height(h) => write!(f, "{}p", h),
        }
    }
}

/// Reference to a title for the watch-history collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRef {
    pub external_id: Option<String>,
    pub kind: MediaKind,
    pub title: String,
}

/// An episode entry from the catalog's season listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub number: u32,
    pub name: String,
}

/// The session controller's exclusive-write playback state.
///
/// Created when playback starts for a title, fully reset on every episode
/// change that requires a new candidate, destroyed when playback exits.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub current_candidate: Option<StreamCandidate>,
    pub selected_season: u32,
    pub current_episode: u32,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// 0.0..=100.0, monotone per candidate except for explicit seeks
    pub progress_percent: f64,
    pub duration_seconds: f64,
    pub volume: f64,
    pub is_muted: bool,
    pub is_fullscreen: bool,
    pub active_overlay: Option<Overlay>,
    pub selected_caption: Option<CaptionTrack>,
    pub selected_quality: QualityPreference,
    pub ui_visible: bool,
}

impl PlaybackSession {
    /// Fresh session positioned at the given episode, playback not yet started
    pub fn new(season: u32, episode: u32, volume: f64, muted: bool) -> Self {
        Self {
            current_candidate: None,
            selected_season: season,
            current_episode: episode,
            is_playing: false,
            is_buffering: true,
            progress_percent: 0.0,
            duration_seconds: 0.0,
            volume: volume.clamp(0.0, 1.0),
            is_muted: muted,
            is_fullscreen: false,
            active_overlay: None,
            selected_caption: None,
            selected_quality: QualityPreference::Auto,
            ui_visible: true,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn track(label: &str, code: &str) -> CaptionTrack {
        CaptionTrack {
            url: format!("https://subs.example/{}.srt", label),
            language_code: code.into(),
            label: label.into(),
            origin: TrackOrigin::ExternalDb,
        }
    }

    #[test]
    fn test_family_key_groups_cc_variants() {
        assert_eq!(track("English", "en").family_key(), "english");
        assert_eq!(track("English (CC)", "en").family_key(), "english");
        assert_eq!(track("English [SDH]", "en").family_key(), "english");
        assert_eq!(track("Spanish", "es").family_key(), "spanish");
    }

    #[test]
    fn test_family_key_falls_back_to_code() {
        assert_eq!(track("", "pt").family_key(), "pt");
    }

    #[test]
    fn test_cue_contains_half_open_interval() {
        let cue = CaptionCue {
            start_seconds: 10.0,
            end_seconds: 12.5,
            text: "hello".into(),
        };
        assert!(cue.contains(10.0));
        assert!(cue.contains(12.4));
        assert!(!cue.contains(12.5));
        assert!(!cue.contains(9.9));
    }

    #[test]
    fn test_preferred_source_picks_playlist() {
        let candidate = StreamCandidate {
            provider_name: "goku".into(),
            media_id: "m1".into(),
            episode_id: "e1".into(),
            sources: vec![
                SourceVariant {
                    url: "https://cdn.example/file.mp4".into(),
                    quality_label: "720".into(),
                    is_segmented_playlist: false,
                },
                SourceVariant {
                    url: "https://cdn.example/master.m3u8".into(),
                    quality_label: "auto".into(),
                    is_segmented_playlist: true,
                },
            ],
            subtitle_tracks: vec![],
        };
        assert_eq!(
            candidate.preferred_source().unwrap().url,
            "https://cdn.example/master.m3u8"
        );
    }

    #[test]
    fn test_stream_request_display() {
        let movie = StreamRequest::movie("The Batman", Some(2022));
        assert_eq!(movie.to_string(), "The Batman");

        let ep = StreamRequest::series("Dark", Some(2017), 2, 3);
        assert_eq!(ep.to_string(), "Dark S02E03");
    }

    #[test]
    fn test_session_volume_clamped() {
        let session = PlaybackSession::new(1, 1, 1.7, false);
        assert_eq!(session.volume, 1.0);
        let session = PlaybackSession::new(1, 1, -0.3, false);
        assert_eq!(session.volume, 0.0);
    }
}
