//! Engine configuration
//!
//! Handles config file loading/saving and playback tuning constants.
//! Config is stored at ~/.config/reelplay/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default upstream aggregator API for provider search/info/watch calls
const DEFAULT_UPSTREAM_BASE: &str = "https://consumet-api-halv.onrender.com";

/// Default CORS-relaxing proxy prefix for caption retries
const DEFAULT_CAPTION_PROXY: &str = "https://corsproxy.io/?url=";

/// Playback tuning constants driven by the session controller.
///
/// Values mirror the stock player behavior; all are overridable from the
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    /// Seconds of playback before the skip-intro window is offered
    pub skip_intro_after_secs: f64,
    /// How long the skip-intro window stays visible without interaction
    pub skip_intro_visible_secs: f64,
    /// Fixed forward jump applied by "skip intro"
    pub skip_intro_jump_secs: f64,
    /// Normalized progress (percent) at which the next-episode prompt shows
    pub next_episode_prompt_pct: f64,
    /// Normalized progress (percent) that auto-advances to the next episode
    pub auto_advance_pct: f64,
    /// Idle seconds before player chrome hides during playback
    pub inactivity_hide_secs: f64,
    /// Arrow-key seek step
    pub seek_step_secs: f64,
    /// Arrow-key volume step
    pub volume_step: f64,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            skip_intro_after_secs: 5.0,
            skip_intro_visible_secs: 15.0,
            skip_intro_jump_secs: 80.0,
            next_episode_prompt_pct: 98.0,
            auto_advance_pct: 99.5,
            inactivity_hide_secs: 3.0,
            seek_step_secs: 10.0,
            volume_step: 0.1,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the consumet-style upstream API
    pub upstream_base_url: String,
    /// Fixed provider fallback order
    pub providers: Vec<String>,
    /// Proxy prefix used when a caption fetch returns unparseable content
    pub caption_proxy_url: String,
    /// Initial volume handed to new sessions (the UI persists changes)
    pub initial_volume: f64,
    /// Initial mute state handed to new sessions
    pub initial_muted: bool,
    pub tuning: PlayerTuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base_url: DEFAULT_UPSTREAM_BASE.to_string(),
            providers: default_providers(),
            caption_proxy_url: DEFAULT_CAPTION_PROXY.to_string(),
            initial_volume: 1.0,
            initial_muted: false,
            tuning: PlayerTuning::default(),
        }
    }
}

/// Fixed fallback order; first successful provider wins
pub fn default_providers() -> Vec<String> {
    ["goku", "flixhq", "himovies", "sflix"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Get config file path (~/.config/reelplay/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reelplay").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }
}
