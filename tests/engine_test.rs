//! Engine Integration Tests
//!
//! Drives a full session through the real async components: resolve against
//! a mock upstream, attach delivery through a fake privileged transport,
//! merge embedded and external caption tracks, and auto-advance to the next
//! episode with the playback sink handed from one episode to the next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockito::Server;

use reelplay::catalog::{CatalogClient, WatchHistory};
use reelplay::delivery::transport::{
    PrivilegedTransport, TransportBody, TransportError, TransportRequest, TransportResponse,
};
use reelplay::delivery::PlayerSink;
use reelplay::models::{EpisodeRef, MediaKind, TitleRef};
use reelplay::session::SessionPhase;
use reelplay::{Config, Engine, OpenSubsClient, PlaybackTarget};

const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
1080/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n\
720/index.m3u8\n";

const STREAM_URL: &str = "https://cdn.example/master.m3u8";

const MEDIA_INFO: &str = r#"{
    "id": "tv/dark",
    "episodes": [
        {"id": "ep-101", "number": 1, "season": 1},
        {"id": "ep-102", "number": 2, "season": 1}
    ]
}"#;

const SOURCES: &str = r#"{
    "sources": [
        {"url": "https://cdn.example/master.m3u8", "quality": "auto", "isM3U8": true}
    ],
    "subtitles": [
        {"url": "https://cdn.example/en.vtt", "lang": "English"}
    ]
}"#;

const SUBTITLE_BODY: &str = "1\n00:00:01,000 --> 00:00:03,000\nWas ist Zeit?\n\n";

// =============================================================================
// Fakes
// =============================================================================

struct FakeTransport {
    bodies: HashMap<String, TransportBody>,
}

impl FakeTransport {
    fn with_text(url: &str, body: &str) -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(url.to_string(), TransportBody::Text(body.to_string()));
        Self { bodies }
    }
}

#[async_trait]
impl PrivilegedTransport for FakeTransport {
    async fn request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let body = self
            .bodies
            .get(&request.url)
            .cloned()
            .ok_or_else(|| TransportError::Io(format!("no canned response for {}", request.url)))?;
        Ok(TransportResponse {
            status: 200,
            headers: Vec::new(),
            body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkCall {
    Load(String),
    Stop,
}

#[derive(Clone)]
struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlayerSink for RecordingSink {
    fn load(&mut self, manifest_url: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Load(manifest_url.to_string()));
    }

    fn recover_media(&mut self) {}

    fn set_rendition(&mut self, _height: Option<u32>) {}

    fn stop(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::Stop);
    }
}

struct FakeCatalog;

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn season_numbers(&self, _id: u64) -> anyhow::Result<Vec<u32>> {
        Ok(vec![1])
    }

    async fn season_episodes(&self, _id: u64, season: u32) -> anyhow::Result<Vec<EpisodeRef>> {
        assert_eq!(season, 1);
        Ok(vec![
            EpisodeRef {
                number: 1,
                name: "Secrets".to_string(),
            },
            EpisodeRef {
                number: 2,
                name: "Lies".to_string(),
            },
        ])
    }

    async fn cross_reference_id(
        &self,
        _id: u64,
        _kind: MediaKind,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some("tt5753856".to_string()))
    }
}

#[derive(Clone)]
struct RecordingHistory {
    watched: Arc<Mutex<Vec<TitleRef>>>,
}

impl RecordingHistory {
    fn new() -> Self {
        Self {
            watched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn count(&self) -> usize {
        self.watched.lock().unwrap().len()
    }
}

impl WatchHistory for RecordingHistory {
    fn record_watched(&self, title: &TitleRef) {
        self.watched.lock().unwrap().push(title.clone());
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn dark_target() -> PlaybackTarget {
    PlaybackTarget {
        title: TitleRef {
            external_id: None,
            kind: MediaKind::Series,
            title: "Dark".to_string(),
        },
        catalog_id: 70523,
        release_year: Some(2017),
        season: 1,
        episode: 1,
    }
}

fn test_config(upstream_url: &str) -> Config {
    Config {
        upstream_base_url: upstream_url.to_string(),
        providers: vec!["goku".to_string()],
        ..Config::default()
    }
}

async fn mock_episode(server: &mut Server, episode_id: &str) {
    server
        .mock("GET", "/movies/goku/Dark")
        .with_status(200)
        .with_body(
            r#"{"results": [
                {"id": "tv/dark", "title": "Dark", "type": "TV Series", "releaseDate": "2017-12-01"}
            ]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/movies/goku/info?id=tv%2Fdark")
        .with_status(200)
        .with_body(MEDIA_INFO)
        .create_async()
        .await;
    server
        .mock(
            "GET",
            format!("/movies/goku/watch?episodeId={}&mediaId=tv%2Fdark", episode_id).as_str(),
        )
        .with_status(200)
        .with_body(SOURCES)
        .create_async()
        .await;
}

// =============================================================================
// Full Flow
// =============================================================================

#[tokio::test]
async fn test_resolve_attach_and_caption_flow() {
    let mut server = Server::new_async().await;
    mock_episode(&mut server, "ep-101").await;

    // external subtitle hit for S01E01; download link gets the utf-8 rewrite
    let subs_url = format!("{}/download/sub-en.gz", server.url());
    server
        .mock("GET", "/search/episode-1/imdbid-5753856/season-1")
        .with_status(200)
        .with_body(format!(
            r#"[{{"SubDownloadLink": "{}", "ISO639": "en", "LanguageName": "English", "SubFormat": "srt"}}]"#,
            subs_url
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/download/subencoding-utf8/sub-en")
        .with_status(200)
        .with_body(SUBTITLE_BODY)
        .create_async()
        .await;

    let sink = RecordingSink::new();
    let history = RecordingHistory::new();
    let mut engine = Engine::new(
        &test_config(&server.url()),
        dark_target(),
        Arc::new(FakeTransport::with_text(STREAM_URL, MASTER)),
        Arc::new(FakeCatalog),
        Arc::new(history.clone()),
        Box::new(sink.clone()),
    )
    .with_subs_client(OpenSubsClient::with_base_url(server.url()));

    engine.start(0.0).await;

    assert_eq!(engine.phase(), SessionPhase::Playing);
    assert_eq!(sink.calls(), vec![SinkCall::Load(STREAM_URL.to_string())]);
    assert_eq!(history.count(), 1);
    assert_eq!(engine.rendition_heights(), vec![1080, 720]);

    // embedded and external English land in one language group
    let groups = engine.caption_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].family, "english");
    assert_eq!(groups[0].tracks.len(), 2);

    // selecting the external track fetches and parses its cues
    let external = groups[0].tracks[1].clone();
    engine.select_caption(Some(external)).await;
    let cues = engine.active_cues_at(2.0);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].text, "Was ist Zeit?");
}

#[tokio::test]
async fn test_auto_advance_resolves_next_episode_and_reuses_sink() {
    let mut server = Server::new_async().await;
    mock_episode(&mut server, "ep-101").await;
    mock_episode(&mut server, "ep-102").await;

    // no external subtitle hits for either episode
    for episode in [1, 2] {
        server
            .mock(
                "GET",
                format!("/search/episode-{}/imdbid-5753856/season-1", episode).as_str(),
            )
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
    }

    let sink = RecordingSink::new();
    let history = RecordingHistory::new();
    let mut engine = Engine::new(
        &test_config(&server.url()),
        dark_target(),
        Arc::new(FakeTransport::with_text(STREAM_URL, MASTER)),
        Arc::new(FakeCatalog),
        Arc::new(history.clone()),
        Box::new(sink.clone()),
    )
    .with_subs_client(OpenSubsClient::with_base_url(server.url()));

    engine.start(0.0).await;
    assert_eq!(engine.session().current_episode, 1);

    // crossing the auto-advance threshold re-resolves episode 2 and hands
    // the stopped sink to the new stream
    engine.tick(1.0, 3599.0, 3600.0).await;

    assert_eq!(engine.session().current_episode, 2);
    assert_eq!(engine.phase(), SessionPhase::Playing);
    assert_eq!(
        sink.calls(),
        vec![
            SinkCall::Load(STREAM_URL.to_string()),
            SinkCall::Stop,
            SinkCall::Load(STREAM_URL.to_string()),
        ]
    );
    // the watch is recorded once per session, not once per episode
    assert_eq!(history.count(), 1);
}

#[tokio::test]
async fn test_failed_resolution_marks_session_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/movies/goku/Dark")
        .with_status(200)
        .with_body(r#"{"results": []}"#)
        .create_async()
        .await;

    let sink = RecordingSink::new();
    let mut engine = Engine::new(
        &test_config(&server.url()),
        dark_target(),
        Arc::new(FakeTransport::with_text(STREAM_URL, MASTER)),
        Arc::new(FakeCatalog),
        Arc::new(RecordingHistory::new()),
        Box::new(sink.clone()),
    );

    engine.start(0.0).await;

    assert_eq!(engine.phase(), SessionPhase::Unavailable);
    assert!(sink.calls().is_empty());
}
