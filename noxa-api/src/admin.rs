use std::collections::HashMap;

use reqwest::Method;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Client, ClientError, ClientResult,
    request::{Auth, BasicResponse, decode},
};

/// Credentials for the admin endpoints. These are HTTP Basic, separate from the user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredentials {
    /// The admin user name
    pub username: String,
    /// The admin password
    pub password: String,
}

/// Server-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AdminStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_songs: u64,
    #[serde(default)]
    pub total_playlists: u64,
    #[serde(default)]
    pub total_downloads: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_used: Option<String>,
}

/// Versions of the tools the server downloads with, keyed by tool name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminVersionInfo {
    /// Tool name to version string
    #[serde(default)]
    pub versions: HashMap<String, String>,
}

/// A summary of who is online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AdminUserStatusResponse {
    #[serde(default)]
    pub summary: AdminUserSummary,
    #[serde(default)]
    pub users: Vec<AdminUser>,
}

/// User counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AdminUserSummary {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub online: u64,
    #[serde(default)]
    pub offline: u64,
}

/// A user as the admin endpoints see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AdminUser {
    pub id: u64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

/// Admin endpoints. These use the admin credentials rather than the session.
impl Client {
    /// Fetch server-wide statistics.
    pub async fn fetch_admin_stats(&self) -> ClientResult<AdminStats> {
        self.admin_json(Method::GET, "/api/admin/stats", "admin stats")
            .await
    }

    /// Fetch which users are online.
    pub async fn fetch_admin_user_status(&self) -> ClientResult<AdminUserStatusResponse> {
        self.admin_json(Method::GET, "/api/admin/user-status", "admin user status")
            .await
    }

    /// Fetch the versions of the server's download tools.
    pub async fn check_admin_versions(&self) -> ClientResult<AdminVersionInfo> {
        self.admin_json(Method::GET, "/api/admin/check-versions", "admin versions")
            .await
    }

    /// Update yt-dlp on the server.
    pub async fn update_ytdlp(&self) -> ClientResult<String> {
        self.admin_update("/api/admin/update-ytdlp", "yt-dlp updated")
            .await
    }

    /// Update spotdl on the server.
    pub async fn update_spotdl(&self) -> ClientResult<String> {
        self.admin_update("/api/admin/update-spotdl", "spotdl updated")
            .await
    }

    async fn admin_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        what: &str,
    ) -> ClientResult<T> {
        let response = self
            .request_raw(method, path, &[], None, Auth::Admin)
            .await?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        decode(&response.bytes, what)
    }

    async fn admin_update(&self, path: &str, default_message: &str) -> ClientResult<String> {
        let response = self
            .request_raw(Method::POST, path, &[], None, Auth::Admin)
            .await?;
        let message = match BasicResponse::parse(&response.bytes) {
            Some(envelope) => envelope.into_result(response.status, "Update failed")?,
            None => None,
        };
        Ok(message.unwrap_or_else(|| default_message.to_string()))
    }
}
