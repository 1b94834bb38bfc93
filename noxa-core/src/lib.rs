pub mod config;
pub mod connectivity;
pub mod media_server;
pub mod offline;
pub mod playback;

mod error;
pub use error::{OfflineError, OfflineResult};

pub use noxa_api as na;
pub use noxa_state as state;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use media_server::MediaServer;
pub use offline::{OfflinePaths, OfflineStore, OfflineView};
pub use playback::{
    NowPlayingInfo, PlaybackEngine, PlaybackEvent, PlaybackRequest, PlaybackRequestHandle,
    PlaybackService, PlaybackSource, PlaybackState,
};
