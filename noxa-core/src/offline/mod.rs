//! The offline cache: downloaded songs and playlists, mirrored to local storage.
//!
//! A single task owns the [`OfflineIndex`]. [`OfflineStore`] handles send it
//! mutation requests and read the [`OfflineView`] it publishes after each one,
//! so reads never observe a half-applied change.

mod index;
pub use index::{Artwork, OfflineIndex, OfflinePlaylist, OfflineTrack, Orphans};

mod store;
pub(crate) use store::artwork_extension;
pub use store::{ArtworkLocation, OfflinePaths, OfflineStore, OfflineView};

/// The status message set when a playlist download finishes.
pub const DOWNLOAD_READY_MESSAGE: &str = "Offline download ready";
