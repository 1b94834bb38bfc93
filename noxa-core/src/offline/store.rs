use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use super::{Artwork, DOWNLOAD_READY_MESSAGE, OfflineIndex, OfflinePlaylist, Orphans};
use crate::{
    MediaServer, OfflineError, OfflineResult,
    state::{Playlist, PlaylistId, Song, SongId},
};

/// Where the cache lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflinePaths {
    pub root: PathBuf,
    pub songs_dir: PathBuf,
    pub artwork_dir: PathBuf,
    pub metadata_path: PathBuf,
}
impl OfflinePaths {
    pub const METADATA_FILENAME: &str = "offline-metadata.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            songs_dir: root.join("Songs"),
            artwork_dir: root.join("Artwork"),
            metadata_path: root.join(Self::METADATA_FILENAME),
            root,
        }
    }

    pub fn song_path(&self, file_name: &str) -> PathBuf {
        self.songs_dir.join(file_name)
    }

    pub fn artwork_path(&self, file_name: &str) -> PathBuf {
        self.artwork_dir.join(file_name)
    }

    fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.songs_dir)?;
        std::fs::create_dir_all(&self.artwork_dir)
    }

    /// Read the metadata snapshot. A missing snapshot is an empty cache.
    pub fn load_index(&self) -> OfflineResult<OfflineIndex> {
        match std::fs::read(&self.metadata_path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OfflineIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the metadata snapshot. The new snapshot is written beside the
    /// old one and renamed over it, so a crash leaves one or the other.
    pub fn save_index(&self, index: &OfflineIndex) -> OfflineResult<()> {
        let tmp = self
            .root
            .join(format!("{}.tmp", Self::METADATA_FILENAME));
        std::fs::write(&tmp, serde_json::to_vec_pretty(index)?)?;
        std::fs::rename(&tmp, &self.metadata_path)?;
        Ok(())
    }
}

/// Where a piece of cached artwork can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkLocation {
    File(PathBuf),
    Url(String),
}

/// An immutable snapshot of the offline cache, published after every change.
#[derive(Debug, Clone)]
pub struct OfflineView {
    paths: Arc<OfflinePaths>,
    index: Arc<OfflineIndex>,
    progress: BTreeMap<PlaylistId, f64>,
    active_playlists: BTreeSet<PlaylistId>,
    active_songs: BTreeSet<SongId>,
    pending_artwork: BTreeSet<SongId>,
    status_message: Option<String>,
}
impl OfflineView {
    pub fn index(&self) -> &OfflineIndex {
        &self.index
    }

    pub fn paths(&self) -> &OfflinePaths {
        &self.paths
    }

    pub fn is_song_downloaded(&self, song_id: SongId) -> bool {
        self.index.contains_song(song_id)
    }

    pub fn is_playlist_downloaded(&self, playlist_id: PlaylistId) -> bool {
        self.index.contains_playlist(playlist_id)
    }

    pub fn is_song_downloading(&self, song_id: SongId) -> bool {
        self.active_songs.contains(&song_id)
    }

    pub fn is_playlist_downloading(&self, playlist_id: PlaylistId) -> bool {
        self.active_playlists.contains(&playlist_id)
    }

    /// Progress in `[0, 1]` of a playlist download in flight.
    pub fn download_progress(&self, playlist_id: PlaylistId) -> Option<f64> {
        self.progress.get(&playlist_id).copied()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// The cached file for a song. Absent means the song must be streamed.
    pub fn local_path(&self, song_id: SongId) -> Option<PathBuf> {
        self.index
            .track(song_id)
            .map(|t| self.paths.song_path(&t.file_name))
    }

    pub fn songs_for_playlist(&self, playlist_id: PlaylistId) -> Vec<Song> {
        self.index.songs_for_playlist(playlist_id)
    }

    pub fn downloaded_playlists(&self) -> Vec<OfflinePlaylist> {
        self.index.playlists().cloned().collect()
    }

    /// Cached playlists as they should be listed while offline.
    pub fn display_playlists(&self) -> Vec<Playlist> {
        self.index
            .playlists()
            .map(|p| p.display_playlist(&self.paths.artwork_dir))
            .collect()
    }

    pub fn all_downloaded_songs(&self) -> Vec<Song> {
        self.index.tracks().map(|t| t.song.clone()).collect()
    }

    /// A song's cached artwork, without scheduling a fetch.
    pub fn artwork(&self, song_id: SongId) -> Option<ArtworkLocation> {
        self.locate(self.index.track(song_id)?.artwork.as_ref()?)
    }

    pub fn playlist_artwork(&self, playlist_id: PlaylistId) -> Option<ArtworkLocation> {
        self.locate(self.index.playlist(playlist_id)?.artwork.as_ref()?)
    }

    /// Whether nothing is downloading and no artwork fetch is pending.
    pub fn is_idle(&self) -> bool {
        self.active_playlists.is_empty()
            && self.active_songs.is_empty()
            && self.pending_artwork.is_empty()
    }

    fn needs_artwork(&self, song_id: SongId) -> bool {
        self.index
            .track(song_id)
            .is_some_and(|t| !matches!(t.artwork, Some(Artwork::Local { .. })))
            && !self.pending_artwork.contains(&song_id)
    }

    fn locate(&self, artwork: &Artwork) -> Option<ArtworkLocation> {
        Some(match artwork {
            Artwork::Local { file_name } => ArtworkLocation::File(self.paths.artwork_path(file_name)),
            Artwork::Remote { url } => ArtworkLocation::Url(url.clone()),
        })
    }
}

/// A handle on the offline cache. Cheap to clone.
///
/// Reads are answered from the latest published [`OfflineView`]. Mutations
/// are queued to the task that owns the index and take effect in order.
#[derive(Clone)]
pub struct OfflineStore {
    tx: mpsc::UnboundedSender<Message>,
    view: watch::Receiver<Arc<OfflineView>>,
}
impl OfflineStore {
    /// Load the cache at `paths` and start the task that owns it.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S: MediaServer>(paths: OfflinePaths, server: Arc<S>) -> OfflineResult<Self> {
        paths.create_dirs()?;
        let index = match paths.load_index() {
            Ok(index) => index,
            Err(OfflineError::Json(e)) => {
                tracing::warn!(
                    "Failed to load offline cache from {}: {e}; starting empty",
                    paths.metadata_path.display()
                );
                OfflineIndex::default()
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            "Loaded offline cache: {} tracks, {} playlists",
            index.tracks().count(),
            index.playlists().count()
        );

        let paths = Arc::new(paths);
        let index = Arc::new(index);
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(Arc::new(OfflineView {
            paths: paths.clone(),
            index: index.clone(),
            progress: BTreeMap::new(),
            active_playlists: BTreeSet::new(),
            active_songs: BTreeSet::new(),
            pending_artwork: BTreeSet::new(),
            status_message: None,
        }));

        let actor = StoreActor {
            server,
            paths,
            tx: tx.downgrade(),
            view_tx,
            index,
            in_flight: HashMap::new(),
            active_playlists: BTreeMap::new(),
            progress: BTreeMap::new(),
            pending_artwork: BTreeSet::new(),
            status_message: None,
            next_generation: 0,
        };
        tokio::spawn(actor.run(rx));

        Ok(Self { tx, view })
    }

    /// The latest snapshot.
    pub fn view(&self) -> Arc<OfflineView> {
        self.view.borrow().clone()
    }

    /// A receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<OfflineView>> {
        self.view.clone()
    }

    pub fn is_song_downloaded(&self, song_id: SongId) -> bool {
        self.view().is_song_downloaded(song_id)
    }

    pub fn is_playlist_downloaded(&self, playlist_id: PlaylistId) -> bool {
        self.view().is_playlist_downloaded(playlist_id)
    }

    pub fn is_song_downloading(&self, song_id: SongId) -> bool {
        self.view().is_song_downloading(song_id)
    }

    pub fn is_playlist_downloading(&self, playlist_id: PlaylistId) -> bool {
        self.view().is_playlist_downloading(playlist_id)
    }

    pub fn download_progress(&self, playlist_id: PlaylistId) -> Option<f64> {
        self.view().download_progress(playlist_id)
    }

    pub fn status_message(&self) -> Option<String> {
        self.view().status_message().map(str::to_string)
    }

    pub fn local_path(&self, song_id: SongId) -> Option<PathBuf> {
        self.view().local_path(song_id)
    }

    pub fn songs_for_playlist(&self, playlist_id: PlaylistId) -> Vec<Song> {
        self.view().songs_for_playlist(playlist_id)
    }

    pub fn downloaded_playlists(&self) -> Vec<OfflinePlaylist> {
        self.view().downloaded_playlists()
    }

    pub fn all_downloaded_songs(&self) -> Vec<Song> {
        self.view().all_downloaded_songs()
    }

    pub fn playlist_artwork(&self, playlist_id: PlaylistId) -> Option<ArtworkLocation> {
        self.view().playlist_artwork(playlist_id)
    }

    /// A song's cached artwork. If it was never stored locally, a fetch is
    /// scheduled in the background and later calls will see the file.
    pub fn artwork_path(&self, song_id: SongId) -> Option<ArtworkLocation> {
        let view = self.view();
        if view.needs_artwork(song_id) {
            self.send(Message::EnsureArtwork(song_id));
        }
        view.artwork(song_id)
    }

    /// Download a song, optionally as part of a playlist.
    ///
    /// Does nothing if the song is already being fetched, apart from adding
    /// `playlist` to the playlists it will be stored under. If the song is
    /// already cached, only the playlist association is added.
    pub fn download_song(&self, song: Song, playlist: Option<Playlist>) {
        self.send(Message::DownloadSong { song, playlist });
    }

    /// Download every song of a playlist that isn't cached yet. Does nothing
    /// for an empty song list, or while the playlist is already downloading.
    pub fn download_playlist(&self, playlist: Playlist, songs: Vec<Song>) {
        if songs.is_empty() {
            return;
        }
        self.send(Message::DownloadPlaylist { playlist, songs });
    }

    /// Remove a song from the cache and from every playlist.
    pub fn remove_song(&self, song_id: SongId) {
        self.send(Message::RemoveSong(song_id));
    }

    /// Remove a playlist, deleting songs that no other playlist references.
    pub fn remove_playlist(&self, playlist_id: PlaylistId) {
        self.send(Message::RemovePlaylist(playlist_id));
    }

    /// Remove a song from one playlist only.
    pub fn detach(&self, song_id: SongId, playlist_id: PlaylistId) {
        self.send(Message::Detach {
            song_id,
            playlist_id,
        });
    }

    /// Keep a cached playlist's name and description in step with the server.
    pub fn update_playlist_metadata(&self, playlist: Playlist) {
        self.send(Message::UpdatePlaylistMetadata(playlist));
    }

    /// Fetch artwork for every cached song that doesn't have it locally.
    pub fn retry_missing_artwork(&self) {
        self.send(Message::RetryMissingArtwork);
    }

    pub fn clear_status_message(&self) {
        self.send(Message::ClearStatusMessage);
    }

    /// Wait until every request sent so far has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Flush(tx));
        let _ = rx.await;
    }

    /// Wait until all downloads and artwork fetches have finished.
    pub async fn wait_until_idle(&self) {
        self.flush().await;
        let mut view = self.view.clone();
        let _ = view.wait_for(|v| v.is_idle()).await;
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            tracing::warn!("Offline store is no longer running");
        }
    }
}

enum Message {
    DownloadSong {
        song: Song,
        playlist: Option<Playlist>,
    },
    DownloadPlaylist {
        playlist: Playlist,
        songs: Vec<Song>,
    },
    RemoveSong(SongId),
    RemovePlaylist(PlaylistId),
    Detach {
        song_id: SongId,
        playlist_id: PlaylistId,
    },
    UpdatePlaylistMetadata(Playlist),
    EnsureArtwork(SongId),
    RetryMissingArtwork,
    ClearStatusMessage,
    Flush(oneshot::Sender<()>),

    // Sent by background tasks.
    Claim {
        song: Song,
        playlist: Playlist,
        generation: u64,
        reply: oneshot::Sender<Claim>,
    },
    SongFetched {
        song: Song,
        result: Result<FetchedSong, String>,
    },
    ArtworkFetched {
        song_id: SongId,
        file_name: Option<String>,
    },
    Progress {
        playlist_id: PlaylistId,
        generation: u64,
        completed: usize,
        total: usize,
    },
    PlaylistFinished {
        playlist_id: PlaylistId,
        generation: u64,
    },
}

/// The answer to a playlist download asking to fetch a song.
enum Claim {
    /// Already cached; the playlist has been attached.
    Cached,
    /// Someone else is fetching it. Resolves to whether that succeeded.
    Joined(oneshot::Receiver<bool>),
    /// Go ahead and fetch it.
    Granted,
    /// The playlist was removed while downloading.
    Abandoned,
}

enum ClaimOutcome {
    Cached,
    InFlight,
    Granted,
    Abandoned,
}

struct InFlight {
    /// Playlists to attach on completion, with the download generation that
    /// asked (if any).
    claimants: Vec<(Playlist, Option<u64>)>,
    /// Whether anyone asked for the song on its own.
    standalone: bool,
    notify: Vec<oneshot::Sender<bool>>,
}

struct FetchedSong {
    file_name: String,
    artwork_file: Option<String>,
}

struct StoreActor<S> {
    server: Arc<S>,
    paths: Arc<OfflinePaths>,
    tx: mpsc::WeakUnboundedSender<Message>,
    view_tx: watch::Sender<Arc<OfflineView>>,

    index: Arc<OfflineIndex>,
    in_flight: HashMap<SongId, InFlight>,
    /// Playlists downloading, and the generation of the download.
    active_playlists: BTreeMap<PlaylistId, u64>,
    progress: BTreeMap<PlaylistId, f64>,
    pending_artwork: BTreeSet<SongId>,
    status_message: Option<String>,
    next_generation: u64,
}
impl<S: MediaServer> StoreActor<S> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        tracing::debug!("Offline store shut down");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::DownloadSong { song, playlist } => {
                match self.claim(&song, playlist.as_ref(), None) {
                    ClaimOutcome::Granted => {
                        tracing::info!("Downloading {} for offline use", song.title);
                        self.spawn_fetch(song);
                    }
                    ClaimOutcome::InFlight => {
                        tracing::debug!("{} is already downloading", song.title);
                    }
                    ClaimOutcome::Cached | ClaimOutcome::Abandoned => {}
                }
            }
            Message::DownloadPlaylist { playlist, songs } => {
                if songs.is_empty() || self.active_playlists.contains_key(&playlist.id) {
                    return;
                }
                let generation = self.next_generation;
                self.next_generation += 1;
                self.active_playlists.insert(playlist.id, generation);
                self.progress.insert(playlist.id, 0.0);
                tracing::info!(
                    "Downloading playlist {} ({} songs)",
                    playlist.name,
                    songs.len()
                );
                self.spawn_playlist(playlist, songs, generation);
            }
            Message::RemoveSong(song_id) => {
                let Some(orphans) = self.index_mut().remove_song(song_id) else {
                    return;
                };
                self.delete_orphans(orphans);
                self.persist();
            }
            Message::RemovePlaylist(playlist_id) => {
                if self.active_playlists.remove(&playlist_id).is_some() {
                    tracing::info!("Abandoning download of playlist {playlist_id}");
                }
                self.progress.remove(&playlist_id);
                if let Some(orphans) = self.index_mut().remove_playlist(playlist_id) {
                    self.delete_orphans(orphans);
                    self.persist();
                }
            }
            Message::Detach {
                song_id,
                playlist_id,
            } => {
                let Some(orphans) = self.index_mut().detach(song_id, playlist_id) else {
                    return;
                };
                self.delete_orphans(orphans);
                self.persist();
            }
            Message::UpdatePlaylistMetadata(playlist) => {
                if self.index_mut().update_playlist_metadata(playlist) {
                    self.persist();
                }
            }
            Message::EnsureArtwork(song_id) => {
                self.ensure_artwork(song_id);
            }
            Message::RetryMissingArtwork => {
                let base_url = self.server.base_url();
                for song in self.index.songs_missing_artwork(&base_url) {
                    self.ensure_artwork(song.id);
                }
            }
            Message::ClearStatusMessage => {
                self.status_message = None;
            }
            Message::Flush(reply) => {
                let _ = reply.send(());
                return;
            }
            Message::Claim {
                song,
                playlist,
                generation,
                reply,
            } => {
                let claim = match self.claim(&song, Some(&playlist), Some(generation)) {
                    ClaimOutcome::Cached => Claim::Cached,
                    ClaimOutcome::Granted => Claim::Granted,
                    ClaimOutcome::Abandoned => Claim::Abandoned,
                    ClaimOutcome::InFlight => {
                        let (tx, rx) = oneshot::channel();
                        if let Some(in_flight) = self.in_flight.get_mut(&song.id) {
                            in_flight.notify.push(tx);
                        }
                        Claim::Joined(rx)
                    }
                };
                let _ = reply.send(claim);
            }
            Message::SongFetched { song, result } => {
                self.complete(song, result);
            }
            Message::ArtworkFetched { song_id, file_name } => {
                self.pending_artwork.remove(&song_id);
                if let Some(file_name) = file_name {
                    match self.index_mut().set_track_artwork(song_id, file_name.clone()) {
                        Some(orphans) => {
                            self.delete_orphans(orphans);
                            self.persist();
                        }
                        // The song was removed while its artwork was in flight.
                        None => remove_file(&self.paths.artwork_path(&file_name)),
                    }
                }
            }
            Message::Progress {
                playlist_id,
                generation,
                completed,
                total,
            } => {
                if self.active_playlists.get(&playlist_id) != Some(&generation) {
                    return;
                }
                let value = (completed as f64 / total.max(1) as f64).min(1.0);
                self.progress.insert(playlist_id, value);
            }
            Message::PlaylistFinished {
                playlist_id,
                generation,
            } => {
                if self.active_playlists.get(&playlist_id) != Some(&generation) {
                    return;
                }
                self.active_playlists.remove(&playlist_id);
                self.progress.remove(&playlist_id);
                self.status_message = Some(DOWNLOAD_READY_MESSAGE.to_string());
                tracing::info!("Finished downloading playlist {playlist_id}");
            }
        }
        self.publish();
    }

    /// Decide who fetches `song`. See [`Claim`].
    fn claim(
        &mut self,
        song: &Song,
        playlist: Option<&Playlist>,
        generation: Option<u64>,
    ) -> ClaimOutcome {
        if let (Some(playlist), Some(generation)) = (playlist, generation)
            && self.active_playlists.get(&playlist.id) != Some(&generation)
        {
            return ClaimOutcome::Abandoned;
        }

        if let Some(in_flight) = self.in_flight.get_mut(&song.id) {
            match playlist {
                Some(playlist) => {
                    if !in_flight.claimants.iter().any(|(p, _)| p.id == playlist.id) {
                        in_flight.claimants.push((playlist.clone(), generation));
                    }
                }
                None => in_flight.standalone = true,
            }
            return ClaimOutcome::InFlight;
        }

        if self.index.contains_song(song.id) {
            if let Some(playlist) = playlist {
                let base_url = self.server.base_url();
                if self
                    .index_mut()
                    .attach(song.id, playlist, &base_url, Utc::now())
                {
                    self.persist();
                }
            }
            return ClaimOutcome::Cached;
        }

        self.in_flight.insert(
            song.id,
            InFlight {
                claimants: playlist.map(|p| (p.clone(), generation)).into_iter().collect(),
                standalone: playlist.is_none(),
                notify: vec![],
            },
        );
        ClaimOutcome::Granted
    }

    fn complete(&mut self, song: Song, result: Result<FetchedSong, String>) {
        let Some(InFlight {
            claimants,
            standalone,
            notify,
        }) = self.in_flight.remove(&song.id)
        else {
            tracing::warn!("Received a download for {} that nobody asked for", song.title);
            if let Ok(fetched) = result {
                self.delete_orphans(fetched.into_orphans());
            }
            return;
        };

        let stored = match result {
            Err(error) => {
                tracing::warn!("Offline download failed for {}: {error}", song.title);
                self.status_message = Some(format!("Failed to download {}", song.title));
                false
            }
            Ok(fetched) => {
                let playlists: Vec<Playlist> = claimants
                    .into_iter()
                    .filter(|(playlist, generation)| {
                        generation.is_none_or(|g| self.active_playlists.get(&playlist.id) == Some(&g))
                    })
                    .map(|(playlist, _)| playlist)
                    .collect();

                if playlists.is_empty() && !standalone {
                    tracing::info!(
                        "Discarding {}: its playlist was removed during the download",
                        song.title
                    );
                    self.delete_orphans(fetched.into_orphans());
                    false
                } else {
                    let base_url = self.server.base_url();
                    let now = Utc::now();
                    let song_id = song.id;
                    let title = song.title.clone();
                    let index = self.index_mut();
                    let orphans = index.store(
                        song,
                        None,
                        fetched.file_name,
                        fetched.artwork_file,
                        &base_url,
                        now,
                    );
                    for playlist in &playlists {
                        index.attach(song_id, playlist, &base_url, now);
                    }
                    self.delete_orphans(orphans);
                    self.persist();
                    tracing::info!("Downloaded {title}");
                    true
                }
            }
        };

        for tx in notify {
            let _ = tx.send(stored);
        }
    }

    fn ensure_artwork(&mut self, song_id: SongId) {
        if self.pending_artwork.contains(&song_id) {
            return;
        }
        let Some(track) = self.index.track(song_id) else {
            return;
        };
        if matches!(track.artwork, Some(Artwork::Local { .. }))
            || track.song.album_art_url(&self.server.base_url()).is_none()
        {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        let song = track.song.clone();
        let server = self.server.clone();
        let paths = self.paths.clone();
        self.pending_artwork.insert(song_id);
        tokio::spawn(async move {
            let file_name = fetch_artwork(&*server, &paths, &song).await;
            let _ = tx.send(Message::ArtworkFetched { song_id, file_name });
        });
    }

    fn spawn_fetch(&self, song: Song) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let server = self.server.clone();
        let paths = self.paths.clone();
        tokio::spawn(async move {
            let result = fetch_song(&*server, &paths, &song)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Message::SongFetched { song, result });
        });
    }

    fn spawn_playlist(&self, playlist: Playlist, songs: Vec<Song>, generation: u64) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let server = self.server.clone();
        let paths = self.paths.clone();
        tokio::spawn(drive_playlist(server, paths, tx, playlist, songs, generation));
    }

    fn index_mut(&mut self) -> &mut OfflineIndex {
        Arc::make_mut(&mut self.index)
    }

    fn persist(&self) {
        if let Err(e) = self.paths.save_index(&self.index) {
            tracing::error!("Failed to save offline cache: {e}");
        }
    }

    fn delete_orphans(&self, orphans: Orphans) {
        for file_name in &orphans.songs {
            remove_file(&self.paths.song_path(file_name));
        }
        for file_name in &orphans.artwork {
            remove_file(&self.paths.artwork_path(file_name));
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(Arc::new(OfflineView {
            paths: self.paths.clone(),
            index: self.index.clone(),
            progress: self.progress.clone(),
            active_playlists: self.active_playlists.keys().copied().collect(),
            active_songs: self.in_flight.keys().copied().collect(),
            pending_artwork: self.pending_artwork.clone(),
            status_message: self.status_message.clone(),
        }));
    }
}

impl FetchedSong {
    fn into_orphans(self) -> Orphans {
        Orphans {
            songs: vec![self.file_name],
            artwork: self.artwork_file.into_iter().collect(),
        }
    }
}

/// Download a playlist's songs one at a time. A song that fails is skipped
/// and doesn't count towards progress.
async fn drive_playlist<S: MediaServer>(
    server: Arc<S>,
    paths: Arc<OfflinePaths>,
    tx: mpsc::UnboundedSender<Message>,
    playlist: Playlist,
    songs: Vec<Song>,
    generation: u64,
) {
    let playlist_id = playlist.id;
    let total = songs.len();
    let mut completed = 0;

    for song in songs {
        let (reply_tx, reply_rx) = oneshot::channel();
        let claim = Message::Claim {
            song: song.clone(),
            playlist: playlist.clone(),
            generation,
            reply: reply_tx,
        };
        if tx.send(claim).is_err() {
            return;
        }
        let Ok(claim) = reply_rx.await else {
            return;
        };

        let stored = match claim {
            Claim::Cached => true,
            Claim::Joined(done) => done.await.unwrap_or(false),
            Claim::Granted => {
                let result = fetch_song(&*server, &paths, &song)
                    .await
                    .map_err(|e| e.to_string());
                let stored = result.is_ok();
                let _ = tx.send(Message::SongFetched { song, result });
                stored
            }
            Claim::Abandoned => return,
        };

        if stored {
            completed += 1;
            let _ = tx.send(Message::Progress {
                playlist_id,
                generation,
                completed,
                total,
            });
        }
    }

    let _ = tx.send(Message::PlaylistFinished {
        playlist_id,
        generation,
    });
}

async fn fetch_song<S: MediaServer>(
    server: &S,
    paths: &OfflinePaths,
    song: &Song,
) -> OfflineResult<FetchedSong> {
    let file = server.fetch_song_file(song.id).await?;
    tokio::fs::create_dir_all(&paths.songs_dir).await?;
    let file_name = format!(
        "song_{}_{}.{}",
        song.id,
        uuid::Uuid::new_v4(),
        sanitize_extension(Some(&file.extension), "mp3")
    );
    tokio::fs::write(paths.song_path(&file_name), &file.bytes).await?;

    let artwork_file = fetch_artwork(server, paths, song).await;
    Ok(FetchedSong {
        file_name,
        artwork_file,
    })
}

/// Best effort: failures are logged and yield `None`.
async fn fetch_artwork<S: MediaServer>(
    server: &S,
    paths: &OfflinePaths,
    song: &Song,
) -> Option<String> {
    let url = song.album_art_url(&server.base_url())?;
    let result: OfflineResult<String> = async {
        let bytes = server.fetch_bytes(&url).await?;
        tokio::fs::create_dir_all(&paths.artwork_dir).await?;
        let file_name = format!(
            "art_{}_{}.{}",
            song.id,
            uuid::Uuid::new_v4(),
            artwork_extension(&url)
        );
        tokio::fs::write(paths.artwork_path(&file_name), bytes).await?;
        Ok(file_name)
    }
    .await;

    match result {
        Ok(file_name) => Some(file_name),
        Err(e) => {
            tracing::debug!("Failed to fetch artwork for {}: {e}", song.title);
            None
        }
    }
}

/// The extension to store artwork fetched from `url` under.
pub(crate) fn artwork_extension(url: &str) -> String {
    sanitize_extension(url_extension(url), "jpg")
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last_segment = path.rsplit('/').next()?;
    let (_, extension) = last_segment.rsplit_once('.')?;
    Some(extension)
}

fn sanitize_extension(extension: Option<&str>, default: &str) -> String {
    extension
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| (1..=5).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| default.to_string())
}

fn remove_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to delete {}: {e}", path.display()),
    }
}
