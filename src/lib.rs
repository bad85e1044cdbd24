//! ReelPlay - Streaming playback engine
//!
//! Resolves playable streams from a fixed provider fallback chain, feeds them
//! through a privileged network tunnel with per-provider trust headers, merges
//! embedded and external caption tracks, and drives the whole thing from a
//! single-writer playback session state machine.
//!
//! # Modules
//!
//! - `models` - Session, candidate and caption data structures
//! - `config` - On-disk configuration and player tuning constants
//! - `catalog` - Metadata catalog client (seasons, episodes, cross-reference ids)
//! - `resolver` - Provider fallback chain producing stream candidates
//! - `delivery` - Segment delivery: trust headers, privileged tunnel, HLS ladder
//! - `captions` - Track merge/grouping, subtitle database client, cue parsing
//! - `session` - Playback session controller state machine

pub mod captions;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod models;
pub mod resolver;
pub mod session;

// Re-export commonly used types
pub use models::{
    CaptionCue, CaptionTrack, EmbeddedTrack, EpisodeRef, MediaKind, Overlay, PlaybackSession,
    QualityPreference, SourceVariant, StreamCandidate, StreamRequest, TitleRef, TrackOrigin,
};

pub use captions::opensubs::OpenSubsClient;
pub use captions::{CaptionGroup, CaptionPipeline};
pub use catalog::{CatalogClient, TmdbCatalog, WatchHistory};
pub use config::{Config, PlayerTuning};
pub use engine::{Engine, PlaybackTarget};

pub use delivery::{
    transport::{HttpTunnel, PrivilegedTransport},
    DeliveryHandle, PlayerSink, Recovery, SegmentDelivery,
};
pub use resolver::{ResolveError, Resolver};
pub use session::{
    AdvanceOutcome, ResolutionTicket, SessionController, SessionEvent, SessionPhase,
};
