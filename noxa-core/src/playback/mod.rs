//! Playback: the queue, the engine that drives it, and the service task that
//! owns the engine.

use std::{path::PathBuf, time::Duration};

use crate::state::SongId;

mod engine;
pub use engine::PlaybackEngine;

mod output;
#[cfg(feature = "audio")]
pub use output::PlaybackThread;
pub use output::{AudioOutput, OutputEvent};

mod queue;
pub use queue::{PlayQueue, RecentlyPlayed};

mod recommend;
pub use recommend::{MAX_RECOMMENDATIONS, recommend};

mod service;
pub use service::{PlaybackRequest, PlaybackRequestHandle, PlaybackService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}
impl PlaybackState {
    /// The playback rate reported to the system.
    pub fn rate(self) -> f64 {
        match self {
            PlaybackState::Playing => 1.0,
            PlaybackState::Idle | PlaybackState::Paused => 0.0,
        }
    }
}

/// Where a song's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    File(PathBuf),
    Url(String),
}
impl std::fmt::Display for PlaybackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackSource::File(path) => write!(f, "{}", path.display()),
            PlaybackSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// What the system's "now playing" display should show.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingInfo {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<Duration>,
    pub elapsed: Duration,
    pub rate: f64,
    /// A local image file, if one is available yet.
    pub artwork: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackStarted(NowPlayingInfo),
    StateChanged {
        state: PlaybackState,
        elapsed: Duration,
    },
    PositionChanged(Duration),
    /// Artwork for the current song became available after it started.
    ArtworkLoaded {
        song_id: SongId,
        path: PathBuf,
    },
    QueueChanged {
        len: usize,
        current_index: Option<usize>,
    },
}
