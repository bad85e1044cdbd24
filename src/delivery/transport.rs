//! Privileged network tunnel port
//!
//! The host application's in-process networking stack refuses to set
//! `Referer`/`Origin` on its own requests, so every manifest and segment
//! fetch is tunneled through a privileged channel that performs the real
//! HTTP call with the caller's exact headers and hands back the raw bytes.
//! Binary payloads are never reinterpreted as UTF-8.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// How the caller intends to consume the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// UTF-8 text (playlists, caption files)
    Text,
    /// Raw bytes (media segments), passed through untouched
    Binary,
}

/// One tunneled request; each request is self-contained and carries its own
/// headers, so concurrent tunnel traffic shares no per-request state.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub response_kind: ResponseKind,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>, response_kind: ResponseKind) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            response_kind,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response body, shaped by the requested [`ResponseKind`]
#[derive(Debug, Clone)]
pub enum TransportBody {
    Text(String),
    Binary(Bytes),
}

impl TransportBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TransportBody::Text(s) => Some(s),
            TransportBody::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TransportBody::Text(s) => s.as_bytes(),
            TransportBody::Binary(b) => b,
        }
    }
}

/// Tunneled response with status, headers, and exact byte content
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: TransportBody,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("tunnel request failed: {0}")]
    Io(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// The privileged tunnel capability.
///
/// Process-wide shared resource; implementations must tolerate concurrent
/// segment, manifest, and metadata fetches.
#[async_trait]
pub trait PrivilegedTransport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production tunnel backed by a dedicated reqwest client.
///
/// Runs outside the sandboxed networking path, so it may set `Referer`,
/// `Origin` and `User-Agent` freely.
pub struct HttpTunnel {
    client: reqwest::Client,
}

impl HttpTunnel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpTunnel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrivilegedTransport for HttpTunnel {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| TransportError::Io(format!("bad method {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        // Always read raw bytes first; only text responses get decoded, so
        // segment payloads survive byte-exact.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let body = match request.response_kind {
            ResponseKind::Binary => TransportBody::Binary(bytes),
            ResponseKind::Text => {
                TransportBody::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        };

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
