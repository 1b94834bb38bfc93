use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Client, ClientResult, PlaylistTrackItem, SongRecord};

/// A playlist owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    /// The unique identifier
    pub id: u64,
    /// The playlist name
    pub name: String,
    /// The playlist description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The cover image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// The number of tracks in the playlist
    #[serde(default)]
    pub track_count: u32,
    /// The creation date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// The owning user's ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

/// A new position for a playlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistReorderItem {
    /// The identifier of the playlist entry
    pub playlist_track_id: u64,
    /// The position to move it to
    pub position: u32,
}

/// Playlist endpoints. These all require a session.
impl Client {
    /// Fetch the signed-in user's playlists.
    pub async fn fetch_playlists(&self) -> ClientResult<Vec<PlaylistRecord>> {
        #[derive(Deserialize)]
        struct PlaylistsResponse {
            playlists: Vec<PlaylistRecord>,
        }

        Ok(self
            .request_json::<PlaylistsResponse>(Method::GET, "/api/playlists", &[], None, "playlists")
            .await?
            .playlists)
    }

    /// Fetch the songs of a playlist, in playlist order.
    pub async fn fetch_playlist_songs(&self, playlist_id: u64) -> ClientResult<Vec<SongRecord>> {
        #[derive(Deserialize)]
        struct PlaylistTracksResponse {
            tracks: Vec<PlaylistTrackItem>,
        }

        let response = self
            .request_json::<PlaylistTracksResponse>(
                Method::GET,
                &format!("/api/playlists/{playlist_id}/tracks"),
                &[],
                None,
                "playlist tracks",
            )
            .await?;
        Ok(response
            .tracks
            .into_iter()
            .map(PlaylistTrackItem::into_song)
            .collect())
    }

    /// Create a playlist.
    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> ClientResult<()> {
        let mut payload = json!({ "name": name });
        if let Some(description) = description {
            payload["description"] = json!(description);
        }
        self.basic_operation(Method::POST, "/api/playlists", Some(payload), "Playlist created")
            .await?;
        Ok(())
    }

    /// Rename a playlist and/or change its description.
    pub async fn update_playlist(
        &self,
        playlist_id: u64,
        name: &str,
        description: Option<&str>,
    ) -> ClientResult<()> {
        let mut payload = json!({ "name": name });
        if let Some(description) = description {
            payload["description"] = json!(description);
        }
        self.basic_operation(
            Method::PUT,
            &format!("/api/playlists/{playlist_id}"),
            Some(payload),
            "Playlist updated",
        )
        .await?;
        Ok(())
    }

    /// Delete a playlist.
    pub async fn delete_playlist(&self, playlist_id: u64) -> ClientResult<()> {
        self.basic_operation(
            Method::DELETE,
            &format!("/api/playlists/{playlist_id}"),
            None,
            "Playlist deleted",
        )
        .await?;
        Ok(())
    }

    /// Move playlist entries to new positions.
    pub async fn reorder_playlist(
        &self,
        playlist_id: u64,
        orders: &[PlaylistReorderItem],
    ) -> ClientResult<()> {
        let orders: Vec<_> = orders
            .iter()
            .map(|o| json!({ "playlist_track_id": o.playlist_track_id, "position": o.position }))
            .collect();
        self.basic_operation(
            Method::PUT,
            &format!("/api/playlists/{playlist_id}/reorder"),
            Some(json!({ "trackOrders": orders })),
            "Playlist reordered",
        )
        .await?;
        Ok(())
    }

    /// Add a library song to a playlist.
    pub async fn add_track_to_playlist(&self, playlist_id: u64, song_id: u64) -> ClientResult<()> {
        self.basic_operation(
            Method::POST,
            &format!("/api/playlists/{playlist_id}/tracks"),
            Some(json!({ "musicId": song_id })),
            "Added to playlist",
        )
        .await?;
        Ok(())
    }

    /// Remove a song from a playlist. The song stays in the library.
    pub async fn remove_track_from_playlist(
        &self,
        playlist_id: u64,
        song_id: u64,
    ) -> ClientResult<()> {
        self.basic_operation(
            Method::DELETE,
            &format!("/api/playlists/{playlist_id}/tracks/{song_id}"),
            None,
            "Removed from playlist",
        )
        .await?;
        Ok(())
    }
}
