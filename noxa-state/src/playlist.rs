use serde::{Deserialize, Serialize};

use crate::na;

/// A playlist ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub u64);
impl std::fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A playlist, as `noxa` cares about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    /// The playlist ID
    pub id: PlaylistId,
    /// The playlist name
    pub name: String,
    /// The playlist description
    #[serde(default)]
    pub description: Option<String>,
    /// The cover image URL
    #[serde(default)]
    pub cover_url: Option<String>,
    /// The number of tracks in the playlist
    #[serde(default)]
    pub track_count: u32,
    /// The creation date
    #[serde(default)]
    pub created_at: Option<String>,
    /// The owning user's ID
    #[serde(default)]
    pub user_id: Option<u64>,
}
impl From<na::PlaylistRecord> for Playlist {
    fn from(record: na::PlaylistRecord) -> Self {
        Playlist {
            id: PlaylistId(record.id),
            name: record.name,
            description: record.description,
            cover_url: record.cover_url,
            track_count: record.track_count,
            created_at: record.created_at,
            user_id: record.user_id,
        }
    }
}
impl Playlist {
    /// A copy for display that prefers offline data: the cached artwork replaces
    /// the cover, and the cached song count replaces the server's count.
    pub fn with_offline_overrides(&self, artwork: Option<String>, cached_songs: usize) -> Playlist {
        Playlist {
            cover_url: artwork.or_else(|| self.cover_url.clone()),
            track_count: cached_songs as u32,
            ..self.clone()
        }
    }
}
