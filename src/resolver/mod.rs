//! Provider Resolver
//!
//! Turns a [`StreamRequest`] into a playable [`StreamCandidate`] by walking a
//! fixed, ordered list of upstream providers. Each provider is searched,
//! matched, and probed for sources; the first provider for which every step
//! succeeds wins and no further providers are tried. Per-provider failures
//! are logged and absorbed; only exhausting the whole list is an error.
//!
//! The resolver holds no state between calls and is safe to invoke
//! concurrently for different requests.

pub mod upstream;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{MediaKind, StreamCandidate, StreamRequest};
use upstream::{ProviderEpisode, SearchHit, UpstreamClient};

/// Resolution failure: no provider produced a playable candidate.
///
/// Surfaced by the controller as a terminal per-episode "unavailable" state,
/// never retried automatically.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no provider produced a playable stream for \"{title}\"")]
    AllProvidersFailed { title: String },
}

/// Fixed-order multi-provider resolver
pub struct Resolver {
    upstream: UpstreamClient,
    providers: Vec<String>,
}

impl Resolver {
    pub fn new(upstream: UpstreamClient, providers: Vec<String>) -> Self {
        Self {
            upstream,
            providers,
        }
    }

    /// Resolve a playable candidate for the request.
    ///
    /// First successful provider wins; later providers are never consulted
    /// once one succeeds, even if they would rank "better".
    pub async fn resolve(&self, request: &StreamRequest) -> Result<StreamCandidate, ResolveError> {
        for provider in &self.providers {
            match self.try_provider(provider, request).await {
                Ok(Some(candidate)) => {
                    debug!(provider, %request, "resolved stream candidate");
                    return Ok(candidate);
                }
                Ok(None) => {
                    debug!(provider, %request, "provider had no usable match");
                }
                Err(err) => {
                    // Provider errors never abort the fallback chain
                    warn!(provider, %request, error = %err, "provider failed");
                }
            }
        }

        Err(ResolveError::AllProvidersFailed {
            title: request.title_text.clone(),
        })
    }

    /// Run the full search→match→info→episode→sources chain on one provider.
    ///
    /// `Ok(None)` means the provider answered but had nothing usable;
    /// `Err` means a call genuinely failed.
    async fn try_provider(
        &self,
        provider: &str,
        request: &StreamRequest,
    ) -> anyhow::Result<Option<StreamCandidate>> {
        let hits = self.upstream.search(provider, &request.title_text).await?;
        if hits.is_empty() {
            return Ok(None);
        }

        let Some(hit) = best_match(&hits, request) else {
            return Ok(None);
        };

        let info = self.upstream.media_info(provider, &hit.id).await?;
        if info.episodes.is_empty() {
            return Ok(None);
        }

        let Some(episode) = pick_episode(&info.episodes, request) else {
            return Ok(None);
        };

        let fetched = self
            .upstream
            .episode_sources(provider, &episode.id, &info.id)
            .await?;
        if fetched.sources.is_empty() {
            return Ok(None);
        }

        Ok(Some(StreamCandidate {
            provider_name: provider.to_string(),
            media_id: info.id,
            episode_id: episode.id.clone(),
            sources: fetched.sources,
            subtitle_tracks: fetched.subtitles,
        }))
    }
}

// =============================================================================
// Matching
// =============================================================================

/// Lowercase, alphanumeric-only form used for fuzzy title comparison
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Whether the provider's free-form type tag is compatible with the request
fn kind_matches(kind: MediaKind, result_type: &str) -> bool {
    if result_type.is_empty() {
        // Providers that omit the tag are given the benefit of the doubt
        return true;
    }
    let lower = result_type.to_lowercase();
    match kind {
        MediaKind::Series => ["tv series", "tv", "ona", "ova", "special"]
            .iter()
            .any(|t| lower.contains(t)),
        MediaKind::Movie => ["movie", "special"].iter().any(|t| lower.contains(t)),
    }
}

/// Year filter: within ±2 years when both sides are known
fn year_matches(requested: Option<u16>, found: Option<u16>) -> bool {
    match (requested, found) {
        (Some(want), Some(got)) => want.abs_diff(got) <= 2,
        _ => true,
    }
}

/// Select the best search hit for the request.
///
/// A hit passes when its normalized title contains (or is contained by) the
/// requested one, its type tag is compatible, and its year is within
/// tolerance. If nothing passes all three filters, the first result is used
/// as a fuzzy fallback when its title still overlaps the request's.
fn best_match<'a>(hits: &'a [SearchHit], request: &StreamRequest) -> Option<&'a SearchHit> {
    let wanted = normalize_title(&request.title_text);

    for hit in hits {
        let found = normalize_title(&hit.title);
        let title_match = found.contains(&wanted) || wanted.contains(&found);
        if title_match
            && kind_matches(request.kind, &hit.result_type)
            && year_matches(request.release_year, hit.release_year)
        {
            return Some(hit);
        }
    }

    let first = hits.first()?;
    let found = normalize_title(&first.title);
    if found.contains(&wanted) || wanted.contains(&found) {
        Some(first)
    } else {
        None
    }
}

/// Locate the episode entry matching the request.
///
/// Series: season and number must both match; when the requested season is 1,
/// providers that omit season tags are accommodated by matching on number
/// alone. Movies: the first (only) entry.
fn pick_episode<'a>(
    episodes: &'a [ProviderEpisode],
    request: &StreamRequest,
) -> Option<&'a ProviderEpisode> {
    match request.kind {
        MediaKind::Movie => episodes.first(),
        MediaKind::Series => {
            let season = request.season.unwrap_or(1);
            let number = request.episode.unwrap_or(1);

            let exact = episodes
                .iter()
                .find(|ep| ep.season == Some(season) && ep.number == Some(number));
            if exact.is_some() {
                return exact;
            }

            if season == 1 {
                return episodes.iter().find(|ep| ep.number == Some(number));
            }
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
