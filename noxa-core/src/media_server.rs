use std::future::Future;

use crate::{
    na,
    state::{Song, SongId},
};

/// What the offline cache and the playback engine need from the server.
///
/// Implemented by [`na::Client`]; tests substitute their own.
pub trait MediaServer: Send + Sync + 'static {
    /// The base URL, used to resolve relative artwork paths.
    fn base_url(&self) -> String;

    /// The URL a song streams from, if the server address is usable.
    fn stream_url(&self, song_id: SongId) -> Option<String>;

    /// Download a song file in full.
    fn fetch_song_file(
        &self,
        song_id: SongId,
    ) -> impl Future<Output = na::ClientResult<na::SongFile>> + Send;

    /// Fetch arbitrary bytes (artwork, or a remote stream).
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = na::ClientResult<Vec<u8>>> + Send;

    /// Fetch the whole library.
    fn fetch_library(&self) -> impl Future<Output = na::ClientResult<Vec<Song>>> + Send;

    /// Check that the server is answering.
    fn ping(&self) -> impl Future<Output = na::ClientResult<()>> + Send;
}

impl MediaServer for na::Client {
    fn base_url(&self) -> String {
        na::Client::base_url(self)
    }

    fn stream_url(&self, song_id: SongId) -> Option<String> {
        is_http_url(&na::Client::base_url(self)).then(|| na::Client::stream_url(self, song_id.0))
    }

    async fn fetch_song_file(&self, song_id: SongId) -> na::ClientResult<na::SongFile> {
        self.fetch_stream(song_id.0).await
    }

    async fn fetch_bytes(&self, url: &str) -> na::ClientResult<Vec<u8>> {
        na::Client::fetch_bytes(self, url).await
    }

    async fn fetch_library(&self) -> na::ClientResult<Vec<Song>> {
        crate::state::fetch_all_songs(self, |fetched, total| {
            tracing::debug!("Fetched {fetched} songs ({total} total)");
        })
        .await
    }

    async fn ping(&self) -> na::ClientResult<()> {
        na::Client::ping(self).await
    }
}

/// Whether `url` looks like something an HTTP client could request.
pub fn is_http_url(url: &str) -> bool {
    ["http://", "https://"]
        .into_iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}
