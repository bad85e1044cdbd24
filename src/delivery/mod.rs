//! Segment Delivery Layer
//!
//! Feeds the chosen adaptive-bitrate source into a playback sink and keeps it
//! playing despite upstream quirks:
//! - every manifest and segment fetch carries the trust headers of the
//!   provider that produced the URL ([`origins`]);
//! - all traffic goes through the privileged tunnel ([`transport`]) because
//!   in-process requests cannot set those headers;
//! - fatal errors are recovered by class (reload / media-buffer recovery) and
//!   only unrecoverable ones tear the session down;
//! - the rendition ladder is surfaced for explicit quality selection.

pub mod hls;
pub mod origins;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{QualityPreference, StreamCandidate};
use hls::VariantStream;
use origins::{trust_headers, TrustHeaders, BROWSER_USER_AGENT};
use transport::{PrivilegedTransport, ResponseKind, TransportRequest};

/// Error class, decides the recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Manifest/segment fetch failures
    Network,
    /// Decode and media-buffer failures
    Media,
    /// Everything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Media => write!(f, "media"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// A streaming error reported by the player core or the fetch path
#[derive(Debug, Clone, Error)]
#[error("{kind} error (fatal: {fatal}): {detail}")]
pub struct DeliveryError {
    pub kind: ErrorKind,
    pub fatal: bool,
    pub detail: String,
}

impl DeliveryError {
    pub fn network(fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            fatal,
            detail: detail.into(),
        }
    }

    pub fn media(fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Media,
            fatal,
            detail: detail.into(),
        }
    }

    pub fn other(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Other,
            fatal: true,
            detail: detail.into(),
        }
    }
}

/// What the layer did about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Fatal network error: the load was reissued from the beginning
    Reloaded,
    /// Fatal media error: in-place media-buffer recovery was attempted
    Recovered,
    /// Unrecoverable: session torn down, surface terminal "unavailable"
    TornDown,
    /// Non-fatal: logged, playback untouched
    Ignored,
}

/// The adaptive-bitrate player core behind the delivery layer.
///
/// Kept behind a trait so tests can substitute a fake core.
pub trait PlayerSink: Send {
    /// (Re)load the stream from the beginning
    fn load(&mut self, manifest_url: &str);
    /// Attempt in-place media-buffer recovery without restarting the load
    fn recover_media(&mut self);
    /// Switch rendition; `None` restores automatic selection. Must not reset
    /// playback position.
    fn set_rendition(&mut self, height: Option<u32>);
    /// Stop playback and release the media pipeline
    fn stop(&mut self);
}

/// Identity of one attached stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle {
    id: Uuid,
    pub provider: String,
    pub source_url: String,
}

/// The delivery layer itself; owns the sink while a stream is attached
pub struct SegmentDelivery {
    transport: Arc<dyn PrivilegedTransport>,
    sink: Option<Box<dyn PlayerSink>>,
    handle: Option<DeliveryHandle>,
    headers: Option<TrustHeaders>,
    variants: Vec<VariantStream>,
    selected: QualityPreference,
}

impl SegmentDelivery {
    pub fn new(transport: Arc<dyn PrivilegedTransport>) -> Self {
        Self {
            transport,
            sink: None,
            handle: None,
            headers: None,
            variants: Vec::new(),
            selected: QualityPreference::Auto,
        }
    }

    /// Attach a candidate's preferred source to the sink.
    ///
    /// Fetches the manifest through the tunnel (verifying the stream is
    /// reachable with the provider's trust headers), parses the rendition
    /// ladder if it is a master playlist, and starts the load.
    pub async fn attach(
        &mut self,
        candidate: &StreamCandidate,
        mut sink: Box<dyn PlayerSink>,
    ) -> Result<DeliveryHandle, DeliveryError> {
        let source = candidate
            .preferred_source()
            .ok_or_else(|| DeliveryError::other("candidate has no sources"))?;

        // Replacing a live stream must release its media pipeline first
        if let Some(mut previous) = self.sink.take() {
            previous.stop();
        }
        self.handle = None;
        self.headers = None;

        let headers = trust_headers(&candidate.provider_name, &source.url);

        self.variants.clear();
        if source.is_segmented_playlist {
            let manifest = self.fetch_text(&source.url, &headers).await?;
            if hls::is_master_playlist(&manifest) {
                self.variants = hls::parse_master_playlist(&manifest, &source.url);
            }
        }

        sink.load(&source.url);

        let handle = DeliveryHandle {
            id: Uuid::new_v4(),
            provider: candidate.provider_name.clone(),
            source_url: source.url.clone(),
        };
        debug!(
            provider = %handle.provider,
            renditions = self.variants.len(),
            "attached stream"
        );

        self.sink = Some(sink);
        self.headers = Some(headers);
        self.handle = Some(handle.clone());
        self.selected = QualityPreference::Auto;
        Ok(handle)
    }

    /// Detach and stop; a handle from an earlier attach is ignored.
    ///
    /// Returns the stopped sink so the caller can reuse it for the next
    /// episode's attach.
    pub fn detach(&mut self, handle: &DeliveryHandle) -> Option<Box<dyn PlayerSink>> {
        if self.handle.as_ref().map(|h| h.id) != Some(handle.id) {
            return None;
        }
        let mut sink = self.sink.take();
        if let Some(s) = sink.as_mut() {
            s.stop();
        }
        self.handle = None;
        self.headers = None;
        self.variants.clear();
        self.selected = QualityPreference::Auto;
        sink
    }

    /// Whether a stream is currently attached
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Fetch a manifest or caption-sized text resource for the attached
    /// stream, carrying its trust headers
    pub async fn fetch_manifest(&self, url: &str) -> Result<String, DeliveryError> {
        let headers = self
            .headers
            .as_ref()
            .ok_or_else(|| DeliveryError::other("no stream attached"))?;
        self.fetch_text(url, headers).await
    }

    /// Fetch a media segment byte-exact for the attached stream
    pub async fn fetch_segment(&self, url: &str) -> Result<bytes::Bytes, DeliveryError> {
        let headers = self
            .headers
            .as_ref()
            .ok_or_else(|| DeliveryError::other("no stream attached"))?;

        let response = self
            .transport
            .request(self.tunneled(url, headers, ResponseKind::Binary))
            .await
            .map_err(|e| DeliveryError::network(true, e.to_string()))?;

        if !response.is_success() {
            return Err(DeliveryError::network(
                true,
                format!("segment fetch returned HTTP {}", response.status),
            ));
        }

        match response.body {
            transport::TransportBody::Binary(bytes) => Ok(bytes),
            transport::TransportBody::Text(text) => {
                // A misbehaving tunnel; keep the bytes anyway
                Ok(bytes::Bytes::from(text.into_bytes()))
            }
        }
    }

    /// Available rendition heights, descending; empty for non-master sources
    pub fn rendition_heights(&self) -> Vec<u32> {
        hls::rendition_heights(&self.variants)
    }

    /// Currently selected rendition
    pub fn selected_rendition(&self) -> QualityPreference {
        self.selected
    }

    /// Switch rendition. Idempotent; re-selecting the current preference is a
    /// no-op and never resets playback position.
    pub fn select_rendition(&mut self, preference: QualityPreference) {
        if preference == self.selected {
            return;
        }
        if let QualityPreference::Height(h) = preference {
            if !self.rendition_heights().contains(&h) {
                warn!(height = h, "requested rendition not in ladder, ignoring");
                return;
            }
        }
        self.selected = preference;
        if let Some(sink) = self.sink.as_mut() {
            match preference {
                QualityPreference::Auto => sink.set_rendition(None),
                QualityPreference::Height(h) => sink.set_rendition(Some(h)),
            }
        }
    }

    /// Classify and act on a streaming error.
    ///
    /// Fatal network errors reissue the load from the beginning; fatal media
    /// errors attempt in-place recovery; other fatal errors tear the session
    /// down. Non-fatal errors are logged and otherwise ignored.
    pub fn handle_error(&mut self, error: &DeliveryError) -> Recovery {
        if !error.fatal {
            debug!(kind = %error.kind, detail = %error.detail, "transient stream error");
            return Recovery::Ignored;
        }

        match error.kind {
            ErrorKind::Network => {
                warn!(detail = %error.detail, "fatal network error, reloading stream");
                if let (Some(sink), Some(handle)) = (self.sink.as_mut(), self.handle.as_ref()) {
                    sink.load(&handle.source_url);
                }
                Recovery::Reloaded
            }
            ErrorKind::Media => {
                warn!(detail = %error.detail, "fatal media error, recovering buffer");
                if let Some(sink) = self.sink.as_mut() {
                    sink.recover_media();
                }
                Recovery::Recovered
            }
            ErrorKind::Other => {
                warn!(detail = %error.detail, "unrecoverable stream error, tearing down");
                if let Some(mut sink) = self.sink.take() {
                    sink.stop();
                }
                self.handle = None;
                self.headers = None;
                self.variants.clear();
                Recovery::TornDown
            }
        }
    }

    fn tunneled(&self, url: &str, headers: &TrustHeaders, kind: ResponseKind) -> TransportRequest {
        TransportRequest::get(url, kind)
            .header("Referer", &headers.referer)
            .header("Origin", &headers.origin)
            .header("User-Agent", BROWSER_USER_AGENT)
    }

    async fn fetch_text(
        &self,
        url: &str,
        headers: &TrustHeaders,
    ) -> Result<String, DeliveryError> {
        let response = self
            .transport
            .request(self.tunneled(url, headers, ResponseKind::Text))
            .await
            .map_err(|e| DeliveryError::network(true, e.to_string()))?;

        if !response.is_success() {
            return Err(DeliveryError::network(
                true,
                format!("manifest fetch returned HTTP {}", response.status),
            ));
        }

        response
            .body
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| DeliveryError::other("tunnel returned binary for text request"))
    }
}
