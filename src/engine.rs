//! Engine root driver
//!
//! Owns one playback session end to end: the controller plus the resolver,
//! delivery layer, caption pipeline and collaborator ports, translating the
//! controller's queued [`SessionEvent`]s into component calls. The embedding
//! UI feeds it clock ticks and user commands and reads the
//! [`PlaybackSession`] snapshot back; every resolution commits through the
//! controller's generation ticket, so superseded work can never leak into a
//! newer episode's state.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::captions::opensubs::{ExternalCaption, OpenSubsClient};
use crate::captions::{CaptionGroup, CaptionPipeline};
use crate::catalog::{CatalogClient, WatchHistory};
use crate::config::Config;
use crate::delivery::transport::PrivilegedTransport;
use crate::delivery::{DeliveryHandle, PlayerSink, SegmentDelivery};
use crate::models::{
    CaptionCue, CaptionTrack, MediaKind, PlaybackSession, QualityPreference, StreamCandidate,
    StreamRequest, TitleRef,
};
use crate::resolver::{upstream::UpstreamClient, Resolver};
use crate::session::{AdvanceOutcome, SessionController, SessionEvent, SessionPhase};

/// Everything needed to start playback of one title
#[derive(Debug, Clone)]
pub struct PlaybackTarget {
    pub title: TitleRef,
    /// Catalog id used for season/episode enumeration and cross-reference
    pub catalog_id: u64,
    pub release_year: Option<u16>,
    pub season: u32,
    pub episode: u32,
}

pub struct Engine {
    controller: SessionController,
    resolver: Resolver,
    delivery: SegmentDelivery,
    captions: CaptionPipeline,
    subs: OpenSubsClient,
    catalog: Arc<dyn CatalogClient>,
    history: Arc<dyn WatchHistory>,

    title: TitleRef,
    catalog_id: u64,
    release_year: Option<u16>,
    /// Lazily resolved external id for caption lookup
    cross_ref: Option<String>,

    handle: Option<DeliveryHandle>,
    /// Sink parked between episodes; attach consumes it, detach returns it
    idle_sink: Option<Box<dyn PlayerSink>>,
    /// Episode list currently installed in the controller
    loaded_season: Option<u32>,
    last_now: f64,
}

impl Engine {
    pub fn new(
        config: &Config,
        target: PlaybackTarget,
        transport: Arc<dyn PrivilegedTransport>,
        catalog: Arc<dyn CatalogClient>,
        history: Arc<dyn WatchHistory>,
        sink: Box<dyn PlayerSink>,
    ) -> Self {
        let controller = SessionController::new(
            target.title.clone(),
            target.season,
            target.episode,
            config.initial_volume,
            config.initial_muted,
            config.tuning.clone(),
        );
        Self {
            controller,
            resolver: Resolver::new(
                UpstreamClient::new(config.upstream_base_url.clone()),
                config.providers.clone(),
            ),
            delivery: SegmentDelivery::new(transport),
            captions: CaptionPipeline::new(config.caption_proxy_url.clone()),
            subs: OpenSubsClient::new(),
            catalog,
            history,
            title: target.title,
            catalog_id: target.catalog_id,
            release_year: target.release_year,
            cross_ref: None,
            handle: None,
            idle_sink: Some(sink),
            loaded_season: None,
            last_now: 0.0,
        }
    }

    /// Swap the subtitle database client (for testing)
    pub fn with_subs_client(mut self, subs: OpenSubsClient) -> Self {
        self.subs = subs;
        self
    }

    pub fn session(&self) -> &PlaybackSession {
        self.controller.session()
    }

    pub fn phase(&self) -> SessionPhase {
        self.controller.phase()
    }

    /// Direct access for synchronous user commands (play/pause, seek,
    /// overlays, volume); their follow-up events are pumped on the next tick
    pub fn controller(&mut self) -> &mut SessionController {
        &mut self.controller
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Enumerate seasons/episodes (series only) and resolve the first stream
    pub async fn start(&mut self, now_seconds: f64) {
        self.last_now = now_seconds;
        if self.title.kind == MediaKind::Series {
            match self.catalog.season_numbers(self.catalog_id).await {
                Ok(seasons) => self.controller.set_season_numbers(seasons),
                Err(e) => warn!(error = %e, "season list fetch failed"),
            }
            let season = self.controller.session().selected_season;
            self.prepare_season(season).await;
        }
        self.resolve_current().await;
        self.pump_events().await;
    }

    /// One tick of the media clock; drives thresholds and auto-advance
    pub async fn tick(&mut self, now_seconds: f64, position_seconds: f64, duration_seconds: f64) {
        self.last_now = now_seconds;
        let outcome = self
            .controller
            .tick(now_seconds, position_seconds, duration_seconds);
        if outcome == Some(AdvanceOutcome::EndOfSeries) {
            self.release_delivery();
        }
        self.pump_events().await;
    }

    /// Manual "next episode" command
    pub async fn next_episode(&mut self) {
        if self.controller.advance_episode() == AdvanceOutcome::EndOfSeries {
            debug!("next-episode at end of series, ignoring");
        }
        self.pump_events().await;
    }

    /// Stop playback and release the media pipeline
    pub fn shutdown(&mut self) {
        self.release_delivery();
    }

    // -------------------------------------------------------------------------
    // Captions and quality
    // -------------------------------------------------------------------------

    pub fn caption_groups(&self) -> Vec<CaptionGroup> {
        self.captions.groups()
    }

    pub async fn select_caption(&mut self, track: Option<CaptionTrack>) {
        self.controller.select_caption(track);
        self.pump_events().await;
    }

    pub fn active_cues_at(&self, time_seconds: f64) -> Vec<&CaptionCue> {
        self.captions.active_cues_at(time_seconds)
    }

    pub fn rendition_heights(&self) -> Vec<u32> {
        self.delivery.rendition_heights()
    }

    pub fn select_quality(&mut self, preference: QualityPreference) {
        self.controller.select_quality(preference);
        self.delivery.select_rendition(preference);
    }

    // -------------------------------------------------------------------------
    // Event pump
    // -------------------------------------------------------------------------

    /// Drain controller events and act on them until the queue settles.
    ///
    /// A single pass can queue follow-ups (an `EpisodeAdvanced` resolution
    /// commits and queues `Ready`), so the loop runs until empty.
    async fn pump_events(&mut self) {
        loop {
            let events = self.controller.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    SessionEvent::Ready => self.attach_current().await,
                    SessionEvent::Unavailable => self.release_delivery(),
                    SessionEvent::WatchStarted(title) => self.history.record_watched(&title),
                    SessionEvent::EpisodeAdvanced { season, .. } => {
                        self.release_delivery();
                        self.prepare_season(season).await;
                        self.resolve_current().await;
                    }
                    SessionEvent::CueSetChanged => {
                        let url = self
                            .controller
                            .session()
                            .selected_caption
                            .as_ref()
                            .map(|t| t.url.clone());
                        self.captions.select_track(url.as_deref()).await;
                    }
                }
            }
        }
    }

    async fn resolve_current(&mut self) {
        let request = self.current_request();
        let ticket = self.controller.begin_resolution();
        let result = self.resolver.resolve(&request).await;
        self.controller.commit_resolution(ticket, result);
    }

    async fn attach_current(&mut self) {
        let Some(candidate) = self.controller.session().current_candidate.clone() else {
            return;
        };
        let Some(sink) = self.idle_sink.take() else {
            warn!("no playback sink available for attach");
            return;
        };
        match self.delivery.attach(&candidate, sink).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.load_caption_tracks(&candidate).await;
                self.controller.start_playback(self.last_now);
            }
            Err(e) => {
                warn!(error = %e, "delivery attach failed");
                self.controller.mark_unavailable();
            }
        }
    }

    fn release_delivery(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(sink) = self.delivery.detach(&handle) {
                self.idle_sink = Some(sink);
            }
        }
    }

    /// Make sure the controller holds the episode list for `season`
    async fn prepare_season(&mut self, season: u32) {
        if self.title.kind != MediaKind::Series || self.loaded_season == Some(season) {
            return;
        }
        match self.catalog.season_episodes(self.catalog_id, season).await {
            Ok(episodes) => {
                self.controller.set_episode_list(episodes);
                self.loaded_season = Some(season);
            }
            Err(e) => warn!(season, error = %e, "episode list fetch failed"),
        }
    }

    fn current_request(&self) -> StreamRequest {
        let session = self.controller.session();
        let mut request = match self.title.kind {
            MediaKind::Movie => StreamRequest::movie(self.title.title.clone(), self.release_year),
            MediaKind::Series => StreamRequest::series(
                self.title.title.clone(),
                self.release_year,
                session.selected_season,
                session.current_episode,
            ),
        };
        if let Some(id) = &self.title.external_id {
            request = request.with_external_id(id.clone());
        }
        request
    }

    async fn load_caption_tracks(&mut self, candidate: &StreamCandidate) {
        let external = self.external_captions().await;
        self.captions.set_tracks(&candidate.subtitle_tracks, external);
    }

    /// External subtitle hits for the current episode; every failure here is
    /// absorbed, captions just stay embedded-only
    async fn external_captions(&mut self) -> Vec<ExternalCaption> {
        if self.cross_ref.is_none() {
            match self
                .catalog
                .cross_reference_id(self.catalog_id, self.title.kind)
                .await
            {
                Ok(id) => self.cross_ref = id,
                Err(e) => warn!(error = %e, "cross-reference lookup failed"),
            }
        }
        let Some(id) = self.cross_ref.clone() else {
            return Vec::new();
        };

        let session = self.controller.session();
        let (season, episode) = match self.title.kind {
            MediaKind::Series => (
                Some(session.selected_season),
                Some(session.current_episode),
            ),
            MediaKind::Movie => (None, None),
        };
        match self.subs.search(&id, season, episode).await {
            Ok(captions) => captions,
            Err(e) => {
                warn!(error = %e, "subtitle database lookup failed");
                Vec::new()
            }
        }
    }
}
