use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rand::{SeedableRng as _, rngs::StdRng};
use tokio::sync::{broadcast, mpsc};

use super::{
    AudioOutput, NowPlayingInfo, OutputEvent, PlayQueue, PlaybackEvent, PlaybackRequest,
    PlaybackSource, PlaybackState, RecentlyPlayed, recommend,
};
use crate::{
    Connectivity, MediaServer, OfflineStore, na,
    media_server::is_http_url,
    offline::{ArtworkLocation, artwork_extension},
    state::{Playlist, Song, SongId},
};

/// Artwork fetched for the now-playing display.
pub(crate) struct ResolvedArtwork {
    pub song_id: SongId,
    pub path: PathBuf,
}

/// Owns the queue and decides what plays next.
///
/// The engine is not shared; [`super::PlaybackService`] runs it on a task
/// and feeds it requests and output events in order.
pub struct PlaybackEngine<S, O> {
    server: Arc<S>,
    output: O,
    offline: Option<OfflineStore>,
    connectivity: Connectivity,

    queue: PlayQueue,
    recent: RecentlyPlayed,
    library_cache: Vec<Song>,
    state: PlaybackState,
    position: Duration,
    rng: StdRng,

    events: broadcast::Sender<PlaybackEvent>,
    artwork_tx: mpsc::UnboundedSender<ResolvedArtwork>,
    artwork_rx: Option<mpsc::UnboundedReceiver<ResolvedArtwork>>,
    now_playing_dir: PathBuf,
    fallback_base_url: String,
}

impl<S: MediaServer, O: AudioOutput> PlaybackEngine<S, O> {
    /// Going back within this much of a song restarts it instead.
    pub const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

    pub fn new(server: Arc<S>, output: O, connectivity: Connectivity) -> Self {
        let (events, _) = broadcast::channel(100);
        let (artwork_tx, artwork_rx) = mpsc::unbounded_channel();
        Self {
            server,
            output,
            offline: None,
            connectivity,
            queue: PlayQueue::default(),
            recent: RecentlyPlayed::default(),
            library_cache: vec![],
            state: PlaybackState::Idle,
            position: Duration::ZERO,
            rng: StdRng::from_os_rng(),
            events,
            artwork_tx,
            artwork_rx: Some(artwork_rx),
            now_playing_dir: std::env::temp_dir().join("noxa").join("NowPlaying"),
            fallback_base_url: na::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Prefer cached files, and fall back to cached songs for recommendations.
    pub fn with_offline_store(mut self, offline: OfflineStore) -> Self {
        self.offline = Some(offline);
        self
    }

    pub fn with_now_playing_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.now_playing_dir = dir.into();
        self
    }

    pub fn with_fallback_base_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_base_url = url.into();
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<PlaybackEvent> {
        self.events.clone()
    }

    pub(crate) fn take_artwork_results(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<ResolvedArtwork>> {
        self.artwork_rx.take()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn recently_played(&self) -> &RecentlyPlayed {
        &self.recent
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.queue.current()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Seed the library used for recommendations, saving a fetch.
    pub fn set_library(&mut self, songs: Vec<Song>) {
        self.library_cache = songs;
    }

    pub async fn handle(&mut self, request: PlaybackRequest) {
        match request {
            PlaybackRequest::Play(song) => self.play(song),
            PlaybackRequest::PlayQueue {
                songs,
                start_at,
                playlist,
            } => self.play_queue(songs, start_at, playlist),
            PlaybackRequest::Next => self.next().await,
            PlaybackRequest::Previous => self.previous(),
            PlaybackRequest::RemoveCurrent => self.remove_current_song_from_queue(),
            PlaybackRequest::TogglePlayPause => self.toggle_play_pause(),
            PlaybackRequest::Pause => self.pause(),
            PlaybackRequest::Resume => self.resume(),
            PlaybackRequest::Seek(position) => self.seek(position),
            PlaybackRequest::SeekBy(offset) => self.seek_by(offset),
            PlaybackRequest::ClearQueue => self.clear_queue(),
            PlaybackRequest::SetLibrary(songs) => self.set_library(songs),
        }
    }

    pub async fn handle_output(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::TrackEnded(song_id) => self.track_ended(song_id).await,
            OutputEvent::Position(position) => self.position_changed(position),
            OutputEvent::LoadFailed { song_id, error } => self.output_failed(song_id, &error),
        }
    }

    /// Play a single song, replacing the queue.
    pub fn play(&mut self, song: Song) {
        self.play_queue(vec![song], 0, None);
    }

    /// Replace the queue and start playing at `start_at` (clamped). An empty
    /// list is ignored.
    pub fn play_queue(&mut self, songs: Vec<Song>, start_at: usize, playlist: Option<Playlist>) {
        if self.queue.replace(songs, start_at, playlist).is_none() {
            tracing::debug!("Ignoring request to play an empty queue");
            return;
        }
        self.queue_changed();
        self.play_current();
    }

    /// Advance the queue. At the end, the queue is extended with
    /// recommendations; if there are none, playback pauses.
    pub async fn next(&mut self) {
        if self.queue.is_empty() {
            self.output.stop();
            self.position = Duration::ZERO;
            self.set_state(PlaybackState::Idle);
            return;
        }

        if self.queue.advance().is_some() {
            self.queue_changed();
            self.play_current();
            return;
        }

        let recommendations = self.recommendations().await;
        tracing::info!("Queue finished; {} recommendations", recommendations.len());
        if self.queue.append_recommendations(recommendations).is_some() {
            self.queue_changed();
            self.play_current();
        } else {
            self.pause();
        }
    }

    /// Restart the current song if it has been playing for a while,
    /// otherwise go back one song.
    pub fn previous(&mut self) {
        if self.position > Self::RESTART_THRESHOLD {
            self.seek(Duration::ZERO);
        } else if self.queue.step_back().is_some() {
            self.queue_changed();
            self.play_current();
        } else {
            self.seek(Duration::ZERO);
        }
    }

    pub fn remove_current_song_from_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let has_next = self.queue.remove_current().is_some();
        self.queue_changed();
        if has_next {
            self.play_current();
        } else {
            self.output.stop();
            self.position = Duration::ZERO;
            self.set_state(PlaybackState::Idle);
        }
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused | PlaybackState::Idle => self.resume(),
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.output.pause();
        self.set_state(PlaybackState::Paused);
    }

    /// Resume after a pause. When idle, starts the current song again.
    pub fn resume(&mut self) {
        match self.state {
            PlaybackState::Paused => {
                self.output.play();
                self.set_state(PlaybackState::Playing);
            }
            PlaybackState::Idle if self.queue.current().is_some() => self.play_current(),
            PlaybackState::Idle | PlaybackState::Playing => {}
        }
    }

    pub fn seek(&mut self, position: Duration) {
        if self.state == PlaybackState::Idle {
            return;
        }
        self.output.seek(position);
        self.position_changed(position);
    }

    /// Seek relative to the current position, in seconds.
    pub fn seek_by(&mut self, offset_secs: f64) {
        let mut target = (self.position.as_secs_f64() + offset_secs).max(0.0);
        if let Some(duration) = self.current_song().and_then(|s| s.duration) {
            target = target.min(duration as f64);
        }
        self.seek(Duration::from_secs_f64(target));
    }

    /// The output finished a song. Stale notifications are ignored.
    pub async fn track_ended(&mut self, song_id: SongId) {
        if self.current_song().map(|s| s.id) != Some(song_id) {
            tracing::debug!("Ignoring end of {song_id}: no longer current");
            return;
        }
        self.next().await;
    }

    pub fn clear_queue(&mut self) {
        self.output.stop();
        self.queue.clear();
        self.position = Duration::ZERO;
        self.queue_changed();
        self.set_state(PlaybackState::Idle);
    }

    pub fn position_changed(&mut self, position: Duration) {
        self.position = position;
        let _ = self.events.send(PlaybackEvent::PositionChanged(position));
    }

    pub fn output_failed(&mut self, song_id: SongId, error: &str) {
        tracing::warn!("Failed to play {song_id}: {error}");
        if self.current_song().map(|s| s.id) == Some(song_id) {
            self.set_state(PlaybackState::Paused);
        }
    }

    pub(crate) fn artwork_resolved(&mut self, artwork: ResolvedArtwork) {
        if self.current_song().map(|s| s.id) != Some(artwork.song_id) {
            return;
        }
        let _ = self.events.send(PlaybackEvent::ArtworkLoaded {
            song_id: artwork.song_id,
            path: artwork.path,
        });
    }

    /// The information a system "now playing" display needs.
    pub fn now_playing(&self) -> Option<NowPlayingInfo> {
        let song = self.current_song()?;
        Some(NowPlayingInfo {
            song_id: song.id,
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            duration: song.duration.map(|d| Duration::from_secs(d.into())),
            elapsed: self.position,
            rate: self.state.rate(),
            artwork: self.local_artwork(song.id),
        })
    }

    /// Where a song would be played from: the cached file, the server's
    /// stream URL, or the fallback server's stream URL, in that order.
    pub fn resolve_source(&self, song: &Song) -> Option<PlaybackSource> {
        if let Some(path) = self.offline.as_ref().and_then(|o| o.local_path(song.id))
            && path.exists()
        {
            return Some(PlaybackSource::File(path));
        }
        if let Some(url) = self.server.stream_url(song.id) {
            return Some(PlaybackSource::Url(url));
        }
        is_http_url(&self.fallback_base_url).then(|| {
            PlaybackSource::Url(format!(
                "{}/api/library/stream/{}",
                self.fallback_base_url.trim_end_matches('/'),
                song.id
            ))
        })
    }

    fn play_current(&mut self) {
        let Some(song) = self.queue.current().cloned() else {
            return;
        };
        let Some(source) = self.resolve_source(&song) else {
            tracing::warn!("Cannot play {}: no source available", song.title);
            return;
        };
        tracing::info!("Playing {} from {source}", song.title);

        self.recent.record(&song);
        self.position = Duration::ZERO;
        self.output.load(source, song.id);
        self.output.play();
        self.state = PlaybackState::Playing;

        if let Some(info) = self.now_playing() {
            let needs_artwork = info.artwork.is_none();
            let _ = self.events.send(PlaybackEvent::TrackStarted(info));
            if needs_artwork {
                self.fetch_artwork(&song);
            }
        }
        self.set_state(PlaybackState::Playing);
    }

    async fn recommendations(&mut self) -> Vec<Song> {
        if self.library_cache.is_empty() && !self.connectivity.is_offline() {
            match self.server.fetch_library().await {
                Ok(songs) => self.library_cache = songs,
                Err(e) => tracing::warn!("Failed to fetch library for recommendations: {e}"),
            }
        }

        let offline_songs;
        let library: &[Song] = if self.library_cache.is_empty() {
            offline_songs = self
                .offline
                .as_ref()
                .map(|o| o.all_downloaded_songs())
                .unwrap_or_default();
            &offline_songs
        } else {
            &self.library_cache
        };
        recommend(&self.queue, &self.recent, library, &mut self.rng)
    }

    /// Cached artwork for a song. Asking the store also schedules a fetch
    /// into the cache if it doesn't have one.
    fn local_artwork(&self, song_id: SongId) -> Option<PathBuf> {
        match self.offline.as_ref()?.artwork_path(song_id)? {
            ArtworkLocation::File(path) if path.exists() => Some(path),
            _ => None,
        }
    }

    fn fetch_artwork(&self, song: &Song) {
        if self.connectivity.is_offline() {
            return;
        }
        let Some(url) = song.album_art_url(&self.server.base_url()) else {
            return;
        };

        let server = self.server.clone();
        let dir = self.now_playing_dir.clone();
        let tx = self.artwork_tx.clone();
        let song_id = song.id;
        tokio::spawn(async move {
            match save_now_playing_artwork(&*server, &dir, song_id, &url).await {
                Ok(path) => {
                    let _ = tx.send(ResolvedArtwork { song_id, path });
                }
                Err(e) => tracing::debug!("Failed to fetch now-playing artwork for {song_id}: {e}"),
            }
        });
    }

    fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
        let _ = self.events.send(PlaybackEvent::StateChanged {
            state,
            elapsed: self.position,
        });
    }

    fn queue_changed(&self) {
        let _ = self.events.send(PlaybackEvent::QueueChanged {
            len: self.queue.len(),
            current_index: self.queue.current_index(),
        });
    }
}

async fn save_now_playing_artwork<S: MediaServer>(
    server: &S,
    dir: &Path,
    song_id: SongId,
    url: &str,
) -> crate::OfflineResult<PathBuf> {
    let bytes = server.fetch_bytes(url).await?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("now_playing_{song_id}.{}", artwork_extension(url)));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        OfflinePaths,
        test_support::{FakeServer, playlist, song},
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(PlaybackSource, SongId),
        Play,
        Pause,
        Stop,
        Seek(Duration),
    }

    #[derive(Default, Clone)]
    struct FakeOutput(Arc<Mutex<Vec<Call>>>);
    impl FakeOutput {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        fn loaded(&self) -> Vec<SongId> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Load(_, id) => Some(id),
                    _ => None,
                })
                .collect()
        }

        fn last(&self) -> Option<Call> {
            self.0.lock().unwrap().last().cloned()
        }
    }
    impl AudioOutput for FakeOutput {
        fn load(&mut self, source: PlaybackSource, song_id: SongId) {
            self.0.lock().unwrap().push(Call::Load(source, song_id));
        }
        fn play(&mut self) {
            self.0.lock().unwrap().push(Call::Play);
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().push(Call::Pause);
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().push(Call::Stop);
        }
        fn seek(&mut self, position: Duration) {
            self.0.lock().unwrap().push(Call::Seek(position));
        }
    }

    fn engine(server: FakeServer) -> (PlaybackEngine<FakeServer, FakeOutput>, FakeOutput) {
        let output = FakeOutput::default();
        let engine = PlaybackEngine::new(Arc::new(server), output.clone(), Connectivity::fixed(false))
            .with_rng(StdRng::seed_from_u64(42))
            .with_now_playing_dir(std::env::temp_dir().join("noxa-test-now-playing"));
        (engine, output)
    }

    fn ids(songs: &[Song]) -> Vec<u64> {
        songs.iter().map(|s| s.id.0).collect()
    }

    #[tokio::test]
    async fn test_play_queue_clamps_and_streams() {
        let (mut engine, output) = engine(FakeServer::new());
        let mut events = engine.subscribe();

        engine.play_queue(vec![song(1, "A"), song(2, "A")], 5, Some(playlist(1)));

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(2)));
        assert_eq!(
            output.calls()[..2],
            [
                Call::Load(
                    PlaybackSource::Url("https://fake.example/api/library/stream/2".into()),
                    SongId(2)
                ),
                Call::Play
            ]
        );
        assert_eq!(engine.recently_played().iter().next().map(|s| s.id), Some(SongId(2)));

        let mut started = None;
        while let Ok(event) = events.try_recv() {
            if let PlaybackEvent::TrackStarted(info) = event {
                started = Some(info);
            }
        }
        let started = started.unwrap();
        assert_eq!(started.title, "Song 2");
        assert_eq!(started.duration, Some(Duration::from_secs(200)));
        assert_eq!(started.rate, 1.0);
    }

    #[tokio::test]
    async fn test_empty_queue_is_ignored() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.play_queue(vec![], 0, None);
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(output.calls().is_empty());
    }

    #[tokio::test]
    async fn test_source_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(FakeServer::new());
        let store = OfflineStore::spawn(OfflinePaths::new(dir.path()), server.clone()).unwrap();
        store.download_song(song(1, "A"), None);
        store.wait_until_idle().await;

        let engine = PlaybackEngine::new(server, FakeOutput::default(), Connectivity::fixed(false))
            .with_offline_store(store.clone());
        assert_eq!(
            engine.resolve_source(&song(1, "A")),
            Some(PlaybackSource::File(store.local_path(SongId(1)).unwrap()))
        );
        assert_eq!(
            engine.resolve_source(&song(2, "A")),
            Some(PlaybackSource::Url(
                "https://fake.example/api/library/stream/2".into()
            ))
        );

        // A cached entry whose file has gone missing is streamed instead.
        std::fs::remove_file(store.local_path(SongId(1)).unwrap()).unwrap();
        assert!(matches!(
            engine.resolve_source(&song(1, "A")),
            Some(PlaybackSource::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_base_url() {
        let mut server = FakeServer::new();
        server.base_url = String::new();
        let (mut engine, output) = engine(server);
        assert_eq!(
            engine.resolve_source(&song(9, "A")),
            Some(PlaybackSource::Url(
                "https://stream.noxamusic.com/api/library/stream/9".into()
            ))
        );

        engine = engine.with_fallback_base_url("not a url");
        assert_eq!(engine.resolve_source(&song(9, "A")), None);
        engine.play(song(9, "A"));
        assert!(output.calls().is_empty());
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_previous() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.play_queue(vec![song(1, "A"), song(2, "A")], 1, None);

        engine.position_changed(Duration::from_secs(10));
        engine.previous();
        assert_eq!(output.last(), Some(Call::Seek(Duration::ZERO)));
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(2)));

        engine.position_changed(Duration::from_secs(1));
        engine.previous();
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(1)));
        assert_eq!(output.loaded(), vec![SongId(2), SongId(1)]);

        engine.previous();
        assert_eq!(output.last(), Some(Call::Seek(Duration::ZERO)));
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(1)));
    }

    #[tokio::test]
    async fn test_next_falls_back_to_recommendations() {
        let mut server = FakeServer::new();
        server.library = vec![song(1, "A"), song(2, "A"), song(3, "B"), song(4, "A")];
        let (mut engine, output) = engine(server);

        engine.play_queue(vec![song(1, "A")], 0, Some(playlist(1)));
        engine.next().await;

        let queue = engine.queue();
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.current_index(), Some(1));
        assert!(queue.playlist().is_none());
        // Same-artist songs come first.
        let mut appended = ids(&queue.songs()[1..3]);
        appended.sort();
        assert_eq!(appended, vec![2, 4]);
        assert_eq!(queue.songs()[3].id, SongId(3));
        assert_eq!(output.loaded().len(), 2);
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_library_is_fetched_once() {
        let mut server = FakeServer::new();
        server.library = (1..30).map(|id| song(id, "A")).collect();
        let (mut engine, _) = engine(server);

        engine.play(song(0, "A"));
        engine.next().await;
        for _ in 0..10 {
            engine.next().await;
        }
        assert_eq!(engine.server.library_fetches.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(engine.queue().len(), 21);
    }

    #[tokio::test]
    async fn test_next_without_recommendations_pauses() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.play(song(1, "A"));
        engine.next().await;

        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(output.last(), Some(Call::Pause));
        assert_eq!(engine.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_recommendations_use_offline_songs() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(FakeServer::new());
        server.library_fails.store(true, std::sync::atomic::Ordering::SeqCst);
        let store = OfflineStore::spawn(OfflinePaths::new(dir.path()), server.clone()).unwrap();
        store.download_song(song(5, "A"), None);
        store.wait_until_idle().await;

        let mut engine = PlaybackEngine::new(server.clone(), FakeOutput::default(), Connectivity::fixed(false))
            .with_offline_store(store);
        engine.play(song(1, "A"));
        engine.next().await;
        assert_eq!(ids(engine.queue().songs()), vec![1, 5]);
        assert_eq!(server.library_fetches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_skips_library_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = FakeServer::new();
        server.library = vec![song(2, "A")];
        let server = Arc::new(server);
        let store = OfflineStore::spawn(OfflinePaths::new(dir.path()), server.clone()).unwrap();
        store.download_song(song(5, "A"), None);
        store.wait_until_idle().await;

        let mut engine = PlaybackEngine::new(server.clone(), FakeOutput::default(), Connectivity::fixed(true))
            .with_offline_store(store);
        engine.play(song(1, "A"));
        engine.next().await;
        assert_eq!(ids(engine.queue().songs()), vec![1, 5]);
        assert_eq!(server.library_fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_next_on_empty_queue_goes_idle() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.next().await;
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(output.calls(), vec![Call::Stop]);
    }

    #[tokio::test]
    async fn test_remove_current_song() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.play_queue(vec![song(1, "A"), song(2, "A")], 0, None);

        engine.remove_current_song_from_queue();
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(2)));
        assert_eq!(output.loaded(), vec![SongId(1), SongId(2)]);

        engine.remove_current_song_from_queue();
        assert!(engine.queue().is_empty());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(output.last(), Some(Call::Stop));

        engine.remove_current_song_from_queue();
        assert_eq!(output.last(), Some(Call::Stop));
    }

    #[tokio::test]
    async fn test_toggle_pause_resume() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.toggle_play_pause();
        assert!(output.calls().is_empty());

        engine.play(song(1, "A"));
        engine.toggle_play_pause();
        assert_eq!(engine.state(), PlaybackState::Paused);
        engine.pause();
        engine.toggle_play_pause();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(output.calls()[2..], [Call::Pause, Call::Play]);

        engine.clear_queue();
        assert_eq!(engine.state(), PlaybackState::Idle);
        engine.resume();
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_seek_by_clamps() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.seek_by(10.0);
        assert!(output.calls().is_empty());

        engine.play(song(1, "A"));
        engine.seek_by(-5.0);
        assert_eq!(output.last(), Some(Call::Seek(Duration::ZERO)));
        engine.seek_by(500.0);
        assert_eq!(output.last(), Some(Call::Seek(Duration::from_secs(200))));
        assert_eq!(engine.position(), Duration::from_secs(200));
    }

    #[tokio::test]
    async fn test_stale_track_end_is_ignored() {
        let (mut engine, output) = engine(FakeServer::new());
        engine.play_queue(vec![song(1, "A"), song(2, "A"), song(3, "A")], 0, None);
        engine.next().await;

        engine.track_ended(SongId(1)).await;
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(2)));

        engine.handle_output(OutputEvent::TrackEnded(SongId(2))).await;
        assert_eq!(engine.current_song().map(|s| s.id), Some(SongId(3)));
        assert_eq!(output.loaded(), vec![SongId(1), SongId(2), SongId(3)]);
    }

    #[tokio::test]
    async fn test_load_failure_pauses() {
        let (mut engine, _) = engine(FakeServer::new());
        engine.play(song(1, "A"));
        engine
            .handle_output(OutputEvent::LoadFailed {
                song_id: SongId(1),
                error: "bad data".into(),
            })
            .await;
        assert_eq!(engine.state(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_artwork_published_only_while_current() {
        let (mut engine, _) = engine(FakeServer::new());
        let mut artwork = engine.take_artwork_results().unwrap();
        let mut events = engine.subscribe();

        engine.play(song(1, "A"));
        let resolved = artwork.recv().await.unwrap();
        assert_eq!(resolved.song_id, SongId(1));
        assert!(resolved.path.exists());
        engine.artwork_resolved(resolved);

        engine.artwork_resolved(ResolvedArtwork {
            song_id: SongId(9),
            path: PathBuf::from("/nowhere"),
        });

        let loaded: Vec<SongId> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                PlaybackEvent::ArtworkLoaded { song_id, .. } => Some(song_id),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, vec![SongId(1)]);
    }
}
