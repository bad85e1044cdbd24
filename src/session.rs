//! Playback Session Controller
//!
//! Reducer-style state machine over [`PlaybackSession`]. The controller is
//! the single writer of the session value; everything else (resolver,
//! delivery, captions, UI) talks to it through commands and reads snapshots.
//!
//! The driver loop feeds it three kinds of input:
//! - resolution results, committed against a generation ticket so a
//!   superseded resolution can never overwrite a newer episode's state;
//! - clock ticks carrying the media position, which drive the skip-intro
//!   window, the next-episode prompt, auto-advance and the inactivity timer;
//! - user commands (play/pause, seek, overlays, track and quality choices).
//!
//! Discrete outputs are queued as [`SessionEvent`]s and drained with
//! [`SessionController::take_events`].

use tracing::{debug, info, warn};

use crate::config::PlayerTuning;
use crate::models::{
    CaptionTrack, EpisodeRef, Overlay, PlaybackSession, QualityPreference, StreamCandidate,
    TitleRef,
};
use crate::resolver::ResolveError;

// =============================================================================
// Controller Types
// =============================================================================

/// Coarse lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a resolution to commit
    Resolving,
    /// Candidate in hand, delivery not yet started
    Ready,
    Playing,
    Paused,
    /// Advancing to another episode, about to re-enter Resolving
    EpisodeChanging,
    /// Last known episode finished
    Ended,
    /// Terminal for this episode, no auto-retry
    Unavailable,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Ended | SessionPhase::Unavailable)
    }
}

/// Identity of one resolution attempt; stale results fail the compare at
/// commit time and are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTicket(u64);

/// Discrete outputs for the embedding layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A candidate committed; attach delivery and start playback
    Ready,
    /// Resolution or delivery failed terminally for this episode
    Unavailable,
    /// The session moved to another episode; re-resolve
    EpisodeAdvanced { season: u32, episode: u32 },
    /// Caption selection changed; rebuild the cue set
    CueSetChanged,
    /// Playback actually started; record once per session
    WatchStarted(TitleRef),
}

/// What an advance-episode request amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Next episode exists in the current season's list
    SameSeason { episode: u32 },
    /// Current season exhausted; the driver must fetch this season's episode
    /// list before resolving
    NextSeason { season: u32 },
    /// No further episode known
    EndOfSeries,
}

// =============================================================================
// Session Controller
// =============================================================================

pub struct SessionController {
    title: TitleRef,
    session: PlaybackSession,
    phase: SessionPhase,
    tuning: PlayerTuning,
    events: Vec<SessionEvent>,

    /// Monotonically increasing; the current value is the only ticket that
    /// may commit
    generation: u64,

    /// Known season numbers for the title, ascending
    season_numbers: Vec<u32>,
    /// Episode list of the selected season, ascending by number
    episodes: Vec<EpisodeRef>,

    last_position_seconds: f64,
    /// Set by seek commands so the next tick accepts a non-monotone position
    seek_expected: bool,
    last_activity_at: f64,

    // per-episode one-shots
    skip_intro_visible: bool,
    skip_intro_shown: bool,
    skip_intro_shown_at: f64,
    next_episode_prompt_visible: bool,
    auto_advance_fired: bool,

    // once per controller lifetime
    watch_recorded: bool,
}

impl SessionController {
    pub fn new(
        title: TitleRef,
        season: u32,
        episode: u32,
        initial_volume: f64,
        initial_muted: bool,
        tuning: PlayerTuning,
    ) -> Self {
        Self {
            title,
            session: PlaybackSession::new(season, episode, initial_volume, initial_muted),
            phase: SessionPhase::Resolving,
            tuning,
            events: Vec::new(),
            generation: 0,
            season_numbers: Vec::new(),
            episodes: Vec::new(),
            last_position_seconds: 0.0,
            seek_expected: false,
            last_activity_at: 0.0,
            skip_intro_visible: false,
            skip_intro_shown: false,
            skip_intro_shown_at: 0.0,
            next_episode_prompt_visible: false,
            auto_advance_fired: false,
            watch_recorded: false,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn skip_intro_visible(&self) -> bool {
        self.skip_intro_visible
    }

    pub fn next_episode_prompt_visible(&self) -> bool {
        self.next_episode_prompt_visible
    }

    /// Drain queued events in emission order
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Catalog data
    // -------------------------------------------------------------------------

    pub fn set_season_numbers(&mut self, mut seasons: Vec<u32>) {
        seasons.sort_unstable();
        self.season_numbers = seasons;
    }

    /// Install the episode list for the selected season. When the session
    /// points at an episode number that is not in the list (season switch
    /// with an unusual first episode), it snaps to the first entry.
    pub fn set_episode_list(&mut self, mut episodes: Vec<EpisodeRef>) {
        episodes.sort_by_key(|e| e.number);
        if !episodes.iter().any(|e| e.number == self.session.current_episode) {
            if let Some(first) = episodes.first() {
                self.session.current_episode = first.number;
            }
        }
        self.episodes = episodes;
    }

    // -------------------------------------------------------------------------
    // Resolution lifecycle
    // -------------------------------------------------------------------------

    /// Enter `Resolving` for the current episode.
    ///
    /// Invalidates the previous candidate, caption selection and quality
    /// selection, and supersedes any in-flight resolution.
    pub fn begin_resolution(&mut self) -> ResolutionTicket {
        self.generation += 1;
        self.phase = SessionPhase::Resolving;
        self.session.current_candidate = None;
        self.session.selected_caption = None;
        self.session.selected_quality = QualityPreference::Auto;
        self.session.is_playing = false;
        self.session.is_buffering = true;
        self.session.progress_percent = 0.0;
        self.session.ui_visible = true;
        self.reset_episode_flags();
        debug!(
            generation = self.generation,
            season = self.session.selected_season,
            episode = self.session.current_episode,
            "resolution started"
        );
        ResolutionTicket(self.generation)
    }

    /// Commit a resolution result. Returns `false` when the ticket is stale,
    /// in which case nothing was mutated.
    pub fn commit_resolution(
        &mut self,
        ticket: ResolutionTicket,
        result: Result<StreamCandidate, ResolveError>,
    ) -> bool {
        if ticket.0 != self.generation {
            debug!(
                stale = ticket.0,
                current = self.generation,
                "discarding superseded resolution"
            );
            return false;
        }

        match result {
            Ok(candidate) => {
                info!(provider = %candidate.provider_name, "candidate committed");
                self.session.current_candidate = Some(candidate);
                self.session.is_buffering = false;
                self.phase = SessionPhase::Ready;
                self.events.push(SessionEvent::Ready);
            }
            Err(e) => {
                warn!(error = %e, "resolution failed, episode unavailable");
                self.session.is_buffering = false;
                self.session.ui_visible = true;
                self.phase = SessionPhase::Unavailable;
                self.events.push(SessionEvent::Unavailable);
            }
        }
        true
    }

    /// A fatal delivery error not recoverable by the player core; terminal
    /// for the current episode only
    pub fn mark_unavailable(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.session.is_playing = false;
        self.session.ui_visible = true;
        self.phase = SessionPhase::Unavailable;
        self.events.push(SessionEvent::Unavailable);
    }

    // -------------------------------------------------------------------------
    // Playback commands
    // -------------------------------------------------------------------------

    /// `Ready -> Playing`; first entry records the watch
    pub fn start_playback(&mut self, now_seconds: f64) {
        if self.phase != SessionPhase::Ready {
            return;
        }
        self.phase = SessionPhase::Playing;
        self.session.is_playing = true;
        self.last_activity_at = now_seconds;
        if !self.watch_recorded {
            self.watch_recorded = true;
            self.events
                .push(SessionEvent::WatchStarted(self.title.clone()));
        }
    }

    pub fn toggle_play(&mut self, now_seconds: f64) {
        match self.phase {
            SessionPhase::Playing => {
                self.phase = SessionPhase::Paused;
                self.session.is_playing = false;
                // pausing always shows chrome
                self.session.ui_visible = true;
            }
            SessionPhase::Paused => {
                self.phase = SessionPhase::Playing;
                self.session.is_playing = true;
                self.last_activity_at = now_seconds;
            }
            SessionPhase::Ready => self.start_playback(now_seconds),
            _ => {}
        }
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.session.is_buffering = buffering;
    }

    /// Seek to an absolute position, as a percentage of the duration
    pub fn seek_to_percent(&mut self, percent: f64) {
        if self.phase.is_terminal() {
            return;
        }
        self.session.progress_percent = percent.clamp(0.0, 100.0);
        self.seek_expected = true;
    }

    /// Relative seek in seconds; positive forward, negative back
    pub fn seek_by(&mut self, delta_seconds: f64) {
        if self.session.duration_seconds <= 0.0 {
            return;
        }
        let target = (self.last_position_seconds + delta_seconds)
            .clamp(0.0, self.session.duration_seconds);
        self.seek_to_percent(target / self.session.duration_seconds * 100.0);
    }

    pub fn seek_forward(&mut self) {
        self.seek_by(self.tuning.seek_step_secs);
    }

    pub fn seek_backward(&mut self) {
        self.seek_by(-self.tuning.seek_step_secs);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.session.volume = volume.clamp(0.0, 1.0);
    }

    pub fn adjust_volume(&mut self, delta: f64) {
        self.set_volume(self.session.volume + delta);
    }

    pub fn volume_up(&mut self) {
        self.adjust_volume(self.tuning.volume_step);
    }

    pub fn volume_down(&mut self) {
        self.adjust_volume(-self.tuning.volume_step);
    }

    pub fn toggle_mute(&mut self) {
        self.session.is_muted = !self.session.is_muted;
    }

    pub fn toggle_fullscreen(&mut self) {
        self.session.is_fullscreen = !self.session.is_fullscreen;
    }

    // -------------------------------------------------------------------------
    // Overlays and chrome
    // -------------------------------------------------------------------------

    /// Open an overlay; any previously open one closes first. Overlays force
    /// chrome visible and suppress the inactivity timer.
    pub fn open_overlay(&mut self, overlay: Overlay) {
        self.session.active_overlay = Some(overlay);
        self.session.ui_visible = true;
    }

    pub fn close_overlay(&mut self) {
        self.session.active_overlay = None;
    }

    /// Pointer movement, click or key press
    pub fn notify_activity(&mut self, now_seconds: f64) {
        self.last_activity_at = now_seconds;
        self.session.ui_visible = true;
    }

    // -------------------------------------------------------------------------
    // Captions and quality
    // -------------------------------------------------------------------------

    pub fn select_caption(&mut self, track: Option<CaptionTrack>) {
        self.session.selected_caption = track;
        self.events.push(SessionEvent::CueSetChanged);
    }

    pub fn select_quality(&mut self, preference: QualityPreference) {
        self.session.selected_quality = preference;
    }

    // -------------------------------------------------------------------------
    // Skip intro
    // -------------------------------------------------------------------------

    /// Accept the skip-intro prompt. Returns the position (seconds) the
    /// driver should seek the sink to.
    pub fn skip_intro(&mut self) -> Option<f64> {
        if !self.skip_intro_visible {
            return None;
        }
        self.skip_intro_visible = false;
        let target = self.last_position_seconds + self.tuning.skip_intro_jump_secs;
        let target = if self.session.duration_seconds > 0.0 {
            target.min(self.session.duration_seconds)
        } else {
            target
        };
        self.seek_expected = true;
        Some(target)
    }

    pub fn dismiss_skip_intro(&mut self) {
        self.skip_intro_visible = false;
    }

    // -------------------------------------------------------------------------
    // Episode advance
    // -------------------------------------------------------------------------

    /// Jump to a specific episode of the selected season (episode overlay)
    pub fn choose_episode(&mut self, episode: u32) {
        self.enter_episode(self.session.selected_season, episode);
    }

    /// Jump to another season; the driver must install its episode list and
    /// re-resolve
    pub fn choose_season(&mut self, season: u32) {
        self.enter_episode(season, 1);
    }

    /// Advance to the next episode.
    ///
    /// Prefers the next number in the current season's episode list; when the
    /// season is exhausted and a later season exists, switches to it (the
    /// driver re-fetches that season's list); otherwise a no-op apart from
    /// reporting end of series.
    pub fn advance_episode(&mut self) -> AdvanceOutcome {
        let current = self.session.current_episode;
        if let Some(next) = self
            .episodes
            .iter()
            .map(|e| e.number)
            .find(|&n| n > current)
        {
            self.enter_episode(self.session.selected_season, next);
            return AdvanceOutcome::SameSeason { episode: next };
        }

        let season = self.session.selected_season;
        if let Some(&next_season) = self.season_numbers.iter().find(|&&s| s > season) {
            self.episodes.clear();
            self.enter_episode(next_season, 1);
            return AdvanceOutcome::NextSeason {
                season: next_season,
            };
        }

        AdvanceOutcome::EndOfSeries
    }

    fn enter_episode(&mut self, season: u32, episode: u32) {
        self.session.selected_season = season;
        self.session.current_episode = episode;
        self.phase = SessionPhase::EpisodeChanging;
        self.events
            .push(SessionEvent::EpisodeAdvanced { season, episode });
    }

    // -------------------------------------------------------------------------
    // Progress tick
    // -------------------------------------------------------------------------

    /// Process one tick of the media clock.
    ///
    /// `now_seconds` is a monotonic wall clock, `position_seconds` and
    /// `duration_seconds` come from the playback sink. Repeated ticks with
    /// identical input are side-effect free. Returns the advance outcome when
    /// the auto-advance threshold fires (once per episode).
    pub fn tick(
        &mut self,
        now_seconds: f64,
        position_seconds: f64,
        duration_seconds: f64,
    ) -> Option<AdvanceOutcome> {
        if !matches!(self.phase, SessionPhase::Playing | SessionPhase::Paused) {
            return None;
        }

        self.last_position_seconds = position_seconds;
        if duration_seconds > 0.0 {
            self.session.duration_seconds = duration_seconds;
            let percent = (position_seconds / duration_seconds * 100.0).clamp(0.0, 100.0);
            // rewinds are only honored after an explicit seek
            if self.seek_expected || percent >= self.session.progress_percent {
                self.session.progress_percent = percent;
                self.seek_expected = false;
            }
        }

        if self.phase != SessionPhase::Playing {
            // paused: chrome stays visible, thresholds do not advance
            self.session.ui_visible = true;
            return None;
        }

        // skip-intro window, one-shot per episode
        if !self.skip_intro_shown && position_seconds > self.tuning.skip_intro_after_secs {
            self.skip_intro_shown = true;
            self.skip_intro_visible = true;
            self.skip_intro_shown_at = now_seconds;
        }
        if self.skip_intro_visible
            && now_seconds - self.skip_intro_shown_at >= self.tuning.skip_intro_visible_secs
        {
            self.skip_intro_visible = false;
        }

        self.next_episode_prompt_visible =
            self.session.progress_percent >= self.tuning.next_episode_prompt_pct;

        // inactivity hide, only while playing with no overlay open
        if self.session.active_overlay.is_none() {
            if now_seconds - self.last_activity_at >= self.tuning.inactivity_hide_secs {
                self.session.ui_visible = false;
            }
        } else {
            self.session.ui_visible = true;
        }

        if self.session.progress_percent >= self.tuning.auto_advance_pct && !self.auto_advance_fired
        {
            self.auto_advance_fired = true;
            let outcome = self.advance_episode();
            if outcome == AdvanceOutcome::EndOfSeries {
                self.phase = SessionPhase::Ended;
                self.session.is_playing = false;
                self.session.ui_visible = true;
            }
            return Some(outcome);
        }

        None
    }

    fn reset_episode_flags(&mut self) {
        self.skip_intro_visible = false;
        self.skip_intro_shown = false;
        self.skip_intro_shown_at = 0.0;
        self.next_episode_prompt_visible = false;
        self.auto_advance_fired = false;
        self.last_position_seconds = 0.0;
        self.seek_expected = false;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
