use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    Client, ClientError, ClientResult, SongRecord,
    request::{Auth, RawResponse},
};

/// Counts for the whole library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    /// The number of songs
    pub total_songs: u64,
    /// The number of distinct artists
    pub total_artists: u64,
    /// The number of distinct albums
    pub total_albums: u64,
    /// The storage used, formatted by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_storage: Option<String>,
    /// The storage used in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_storage_bytes: Option<u64>,
}

/// The contents of a song file, as streamed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SongFile {
    /// The raw audio data
    pub bytes: Vec<u8>,
    /// The file extension to store it under, without the leading dot
    pub extension: String,
}

/// Library endpoints.
impl Client {
    /// Fetch library songs. `None` for `limit` fetches everything from `offset` on.
    pub async fn fetch_songs(
        &self,
        limit: Option<u32>,
        offset: u32,
    ) -> ClientResult<Vec<SongRecord>> {
        let mut parameters = vec![("offset", offset.to_string())];
        if let Some(limit) = limit {
            parameters.push(("limit", limit.to_string()));
        }
        self.request_json(
            Method::GET,
            "/api/library/library",
            &parameters,
            None,
            "library",
        )
        .await
    }

    /// Search the library by title, artist and album.
    pub async fn search_songs(&self, query: &str) -> ClientResult<Vec<SongRecord>> {
        self.request_json(
            Method::GET,
            "/api/library/search",
            &[("q", query.to_string()), ("limit", "50".to_string())],
            None,
            "library search",
        )
        .await
    }

    /// Fetch counts for the whole library.
    pub async fn fetch_library_stats(&self) -> ClientResult<LibraryStats> {
        self.request_json(Method::GET, "/api/library/stats", &[], None, "library stats")
            .await
    }

    /// The URL a song is streamed from. Requests to it need the bearer token.
    pub fn stream_url(&self, song_id: u64) -> String {
        format!("{}/api/library/stream/{song_id}", self.base_url())
    }

    /// Download a song file in full.
    pub async fn fetch_stream(&self, song_id: u64) -> ClientResult<SongFile> {
        let response = self
            .request_raw(
                Method::GET,
                &format!("/api/library/stream/{song_id}"),
                &[],
                None,
                Auth::Session,
            )
            .await?;
        let response = ensure_success(response)?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }

        let extension = response
            .content_disposition
            .as_deref()
            .and_then(extension_from_disposition)
            .or_else(|| {
                response
                    .content_type
                    .as_deref()
                    .and_then(extension_from_content_type)
            })
            .unwrap_or_else(|| "mp3".to_string());

        Ok(SongFile {
            bytes: response.bytes,
            extension,
        })
    }

    /// Fetch arbitrary bytes, such as artwork. `url` may be absolute, or a path on the server.
    pub async fn fetch_bytes(&self, url: &str) -> ClientResult<Vec<u8>> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            reqwest::Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?
        } else {
            self.url(&format!("/{}", url.trim_start_matches('/')))?
        };

        // The token only goes to our own server; artwork may live on other hosts.
        let own_server = self.is_own_server(&url);
        let mut request = self.client.get(url);
        if own_server && let Some(token) = self.auth_token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && own_server {
            self.clear_session();
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ClientError::ServerError {
                status: status.as_u16(),
                message: format!("Failed to fetch {}", response.url()),
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        Ok(bytes.into())
    }

    fn is_own_server(&self, url: &reqwest::Url) -> bool {
        reqwest::Url::parse(&self.base_url()).is_ok_and(|base| base.origin() == url.origin())
    }

    /// Add every song on the server to the user's library.
    pub async fn add_all_to_library(&self) -> ClientResult<String> {
        Ok(self
            .basic_operation(
                Method::POST,
                "/api/library/add-all-to-my-library",
                None,
                "Added music to your library",
            )
            .await?
            .unwrap_or_else(|| "Added music to your library".to_string()))
    }

    /// Remove a song from the library, optionally deleting its file on the server.
    pub async fn delete_track(&self, song_id: u64, delete_file: bool) -> ClientResult<()> {
        let response = self
            .request_raw(
                Method::DELETE,
                &format!("/api/library/{song_id}"),
                &[("deleteFile", delete_file.to_string())],
                None,
                Auth::Session,
            )
            .await?;
        ensure_success(response)?;
        Ok(())
    }

    /// Check that the server is reachable and answering.
    pub async fn ping(&self) -> ClientResult<()> {
        let response = self
            .request_raw(
                Method::GET,
                "/api/library/library",
                &[("limit", "1".to_string())],
                None,
                Auth::Session,
            )
            .await?;
        if response.status != StatusCode::OK {
            return Err(ClientError::InvalidResponse);
        }
        Ok(())
    }
}

fn ensure_success(response: RawResponse) -> ClientResult<RawResponse> {
    if response.status.is_success() {
        return Ok(response);
    }
    let message = crate::request::BasicResponse::parse(&response.bytes)
        .and_then(|r| r.error.or(r.message))
        .unwrap_or_else(|| {
            response
                .status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    Err(ClientError::ServerError {
        status: response.status.as_u16(),
        message,
    })
}

fn extension_from_disposition(disposition: &str) -> Option<String> {
    let filename = disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"');
    let (_, extension) = filename.rsplit_once('.')?;
    (!extension.is_empty()).then(|| extension.to_lowercase())
}

fn extension_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    let extension = match mime.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/ogg" | "audio/vorbis" => "ogg",
        "audio/opus" => "opus",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        _ => return None,
    };
    Some(extension.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_stats_camel_case() {
        let stats: LibraryStats = serde_json::from_str(
            r#"{"totalSongs":120,"totalArtists":30,"totalAlbums":12,"totalStorage":"1.2 GB"}"#,
        )
        .unwrap();
        assert_eq!(stats.total_songs, 120);
        assert_eq!(stats.total_storage.as_deref(), Some("1.2 GB"));
        assert_eq!(stats.total_storage_bytes, None);
    }

    #[test]
    fn test_stream_url() {
        let client = Client::new("https://music.example.com/");
        assert_eq!(
            client.stream_url(7),
            "https://music.example.com/api/library/stream/7"
        );
    }

    /// Serve one HTTP request with `status`, returning the request head.
    async fn serve_once(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = vec![];
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response =
                format!("HTTP/1.1 {status}\r\ncontent-length: 3\r\nconnection: close\r\n\r\nart");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&head).to_lowercase()
        });
        (address, task)
    }

    fn signed_in(base_url: &str) -> Client {
        Client::with_session(
            base_url,
            Some(crate::Session {
                token: "secret-token".to_string(),
                user: crate::User {
                    id: 1,
                    username: "listener".to_string(),
                    email: None,
                    is_admin: None,
                    last_login: None,
                },
            }),
        )
    }

    #[tokio::test]
    async fn test_fetch_bytes_keeps_token_off_other_hosts() {
        let (address, task) = serve_once("200 OK").await;
        let client = signed_in("https://music.example.com");

        let bytes = client
            .fetch_bytes(&format!("{address}/covers/cover.jpg"))
            .await
            .unwrap();
        assert_eq!(bytes, b"art");
        let head = task.await.unwrap();
        assert!(head.starts_with("get /covers/cover.jpg"));
        assert!(!head.contains("authorization"));
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_fetch_bytes_sends_token_to_own_server() {
        let (address, task) = serve_once("200 OK").await;
        let client = signed_in(&address);

        client.fetch_bytes("uploads/cover.jpg").await.unwrap();
        let head = task.await.unwrap();
        assert!(head.contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn test_fetch_bytes_unauthorized_clears_session() {
        let (address, task) = serve_once("401 Unauthorized").await;
        let client = signed_in(&address);

        let result = client.fetch_bytes(&client.stream_url(7)).await;
        assert!(matches!(result, Err(ClientError::Unauthorized)));
        assert!(!client.is_authenticated());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_bytes_unauthorized_elsewhere_keeps_session() {
        let (address, task) = serve_once("401 Unauthorized").await;
        let client = signed_in("https://music.example.com");

        let result = client.fetch_bytes(&format!("{address}/cover.jpg")).await;
        assert!(matches!(
            result,
            Err(ClientError::ServerError { status: 401, .. })
        ));
        assert!(client.is_authenticated());
        task.await.unwrap();
    }

    #[test]
    fn test_extension_detection() {
        assert_eq!(
            extension_from_disposition(r#"attachment; filename="Track 01.FLAC""#).as_deref(),
            Some("flac")
        );
        assert_eq!(extension_from_disposition("inline"), None);
        assert_eq!(
            extension_from_content_type("audio/mpeg; charset=binary").as_deref(),
            Some("mp3")
        );
        assert_eq!(extension_from_content_type("application/octet-stream"), None);
    }
}
