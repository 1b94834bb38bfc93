use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Client, ClientError, ClientResult,
    request::{Auth, BasicResponse, decode},
};

/// The state of a server-side download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Looking for a source for the track.
    Searching,
    /// Transferring the track.
    Downloading,
    /// The track is in the library.
    Completed,
    /// The job failed.
    Failed,
    /// The job was cancelled.
    Cancelled,
    /// Anything the client doesn't know about.
    Unknown,
}
impl DownloadStatus {
    /// Parse the server's status string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "searching" => DownloadStatus::Searching,
            "downloading" => DownloadStatus::Downloading,
            "completed" => DownloadStatus::Completed,
            "failed" => DownloadStatus::Failed,
            "cancelled" | "canceled" => DownloadStatus::Cancelled,
            _ => DownloadStatus::Unknown,
        }
    }

    /// Returns a human-readable name for the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Searching => "Searching",
            DownloadStatus::Downloading => "Downloading",
            DownloadStatus::Completed => "Completed",
            DownloadStatus::Failed => "Failed",
            DownloadStatus::Cancelled => "Cancelled",
            DownloadStatus::Unknown => "Unknown",
        }
    }

    /// Whether the job may still change state.
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadStatus::Searching | DownloadStatus::Downloading)
    }
}
impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A server-side download job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadItem {
    /// The job identifier
    pub id: String,
    /// The requested title
    pub title: String,
    /// The requested artist
    pub artist: String,
    /// The requested album
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// The raw status string; see [`DownloadItem::status`]
    #[serde(rename = "status")]
    pub status_raw: String,
    /// Progress in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    /// When the job was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// When the job finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// The playlist the track will be added to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<u64>,
    /// The user who requested the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    /// Where the file ended up on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}
impl DownloadItem {
    /// The parsed status.
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::parse(&self.status_raw)
    }
}

/// Server-side download jobs. These are unrelated to the local offline cache.
impl Client {
    /// List the user's download jobs.
    pub async fn fetch_downloads(&self) -> ClientResult<Vec<DownloadItem>> {
        #[derive(Deserialize)]
        struct DownloadListResponse {
            downloads: Vec<DownloadItem>,
        }

        let response = self
            .request_raw(Method::GET, "/api/download/list", &[], None, Auth::Session)
            .await?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        match decode::<DownloadListResponse>(&response.bytes, "download list") {
            Ok(list) => Ok(list.downloads),
            Err(e) => match BasicResponse::parse(&response.bytes) {
                Some(BasicResponse {
                    error: Some(message),
                    ..
                })
                | Some(BasicResponse {
                    message: Some(message),
                    ..
                }) => Err(ClientError::ServerError {
                    status: response.status.as_u16(),
                    message,
                }),
                _ => Err(e),
            },
        }
    }

    /// Ask the server to find and download a track.
    pub async fn add_download(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
        playlist_id: Option<u64>,
    ) -> ClientResult<()> {
        let mut payload = json!({ "title": title, "artist": artist });
        if let Some(album) = album.filter(|a| !a.is_empty()) {
            payload["album"] = json!(album);
        }
        if let Some(playlist_id) = playlist_id {
            payload["playlistId"] = json!(playlist_id);
        }
        self.download_action("/api/download/add", payload).await
    }

    /// Import a single track from a Spotify URL.
    pub async fn import_spotify_track(&self, url: &str, playlist_id: Option<u64>) -> ClientResult<()> {
        let mut payload = json!({ "url": url });
        if let Some(playlist_id) = playlist_id {
            payload["playlistId"] = json!(playlist_id);
        }
        self.download_action("/api/url-download/song", payload)
            .await
    }

    /// Import every track of a Spotify playlist.
    pub async fn import_spotify_playlist(
        &self,
        playlist_url: &str,
        playlist_id: Option<u64>,
    ) -> ClientResult<()> {
        let mut payload = json!({ "playlistUrl": playlist_url });
        if let Some(playlist_id) = playlist_id {
            payload["playlistId"] = json!(playlist_id);
        }
        self.download_action("/api/spotify-playlist/import", payload)
            .await
    }

    /// Cancel a running download job.
    pub async fn cancel_download(&self, id: &str) -> ClientResult<()> {
        self.basic_operation(
            Method::DELETE,
            &format!("/api/download/cancel/{id}"),
            None,
            "Download cancelled",
        )
        .await?;
        Ok(())
    }

    /// Delete a download job from the list.
    pub async fn delete_download(&self, id: &str) -> ClientResult<()> {
        self.basic_operation(
            Method::DELETE,
            &format!("/api/download/delete/{id}"),
            None,
            "Download deleted",
        )
        .await?;
        Ok(())
    }

    /// Unlike [`Client::basic_operation`], download actions must answer with the envelope.
    async fn download_action(&self, endpoint: &str, payload: serde_json::Value) -> ClientResult<()> {
        let response = self
            .request_raw(Method::POST, endpoint, &[], Some(payload), Auth::Session)
            .await?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        let envelope = BasicResponse::parse(&response.bytes).ok_or_else(|| {
            ClientError::DecodingFailed(serde::de::Error::custom(
                "download action did not answer with a status envelope",
            ))
        })?;
        envelope.into_result(response.status, "Request failed")?;
        Ok(())
    }
}
