#[cfg(not(feature = "audio"))]
pub async fn run(
    _app: &crate::App,
    _song_ids: Vec<u64>,
    _playlist_id: Option<u64>,
) -> anyhow::Result<()> {
    anyhow::bail!("noxa was built without audio support; rebuild with `--features audio`")
}

#[cfg(feature = "audio")]
pub use audio::run;

#[cfg(feature = "audio")]
mod audio {
    use std::time::Duration;

    use noxa_core::{
        ConnectivityMonitor, MediaServer as _, OfflineStore, PlaybackEngine, PlaybackEvent,
        PlaybackRequest, PlaybackService, PlaybackState,
        playback::PlaybackThread,
        state::{Playlist, PlaylistId, Song, SongId},
    };
    use tokio::sync::{broadcast::error::RecvError, mpsc};

    use crate::App;

    /// Play until the queue is cleared or the user hits Ctrl-C.
    pub async fn run(app: &App, song_ids: Vec<u64>, playlist_id: Option<u64>) -> anyhow::Result<()> {
        let store = app.offline_store()?;
        let monitor = if app.config.connectivity.probe_enabled {
            ConnectivityMonitor::with_probe(
                app.client.clone(),
                Duration::from_secs(app.config.connectivity.probe_interval_secs.max(1)),
            )
        } else {
            ConnectivityMonitor::new()
        };

        let library = match app.client.fetch_library().await {
            Ok(songs) => songs,
            Err(e) => {
                tracing::warn!("Failed to fetch library ({e}); using cached songs");
                monitor.set_offline(true);
                store.all_downloaded_songs()
            }
        };
        let (songs, playlist) = match playlist_id {
            Some(playlist_id) => playlist_queue(app, &store, playlist_id).await,
            None if song_ids.is_empty() => (library.clone(), None),
            None => {
                let songs = song_ids
                    .iter()
                    .filter_map(|&id| library.iter().find(|s| s.id == SongId(id)).cloned())
                    .collect();
                (songs, None)
            }
        };
        if songs.is_empty() {
            anyhow::bail!("Nothing to play");
        }

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let output = PlaybackThread::new(
            app.client.clone(),
            tokio::runtime::Handle::current(),
            output_tx,
        );
        let engine = PlaybackEngine::new(app.client.clone(), output, monitor.subscribe())
            .with_offline_store(store.clone())
            .with_now_playing_dir(app.config.playback.resolve_now_playing_dir()?)
            .with_fallback_base_url(app.config.playback.fallback_base_url.clone());

        let service = PlaybackService::spawn(engine, output_rx);
        let handle = service.handle();
        let mut events = handle.subscribe();

        #[cfg(feature = "media-controls")]
        let mut controls = match noxa_client_shared::controls::Controls::new(None, handle.clone())
        {
            Ok(controls) => Some(controls),
            Err(e) => {
                tracing::warn!("Failed to initialize media controls: {e:?}");
                None
            }
        };

        handle.send(PlaybackRequest::SetLibrary(library));
        handle.play_queue(songs, 0, playlist);

        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(PlaybackEvent::TrackStarted(info)) => {
                        println!("Now playing: {} - {}", info.artist, info.title);
                    }
                    Ok(PlaybackEvent::StateChanged { state: PlaybackState::Paused, .. }) => {
                        println!("Paused");
                    }
                    Ok(PlaybackEvent::StateChanged { state: PlaybackState::Idle, .. })
                    | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.clear_queue();
                    break;
                }
                _ = ticker.tick() => {
                    #[cfg(feature = "media-controls")]
                    if let Some(controls) = &mut controls {
                        controls.update();
                    }
                }
            }
        }

        // Let the engine stop the output before the service goes away.
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(service);
        store.flush().await;
        Ok(())
    }

    /// The songs of a playlist, from the server or from the offline cache.
    async fn playlist_queue(
        app: &App,
        store: &OfflineStore,
        playlist_id: u64,
    ) -> (Vec<Song>, Option<Playlist>) {
        match app.client.fetch_playlist_songs(playlist_id).await {
            Ok(records) => {
                let playlist = app.find_playlist(playlist_id).await.ok();
                (records.into_iter().map(Song::from).collect(), playlist)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch playlist {playlist_id} ({e}); using cached songs");
                let view = store.view();
                let id = PlaylistId(playlist_id);
                let playlist = view
                    .index()
                    .playlist(id)
                    .map(|p| p.display_playlist(&view.paths().artwork_dir));
                (view.songs_for_playlist(id), playlist)
            }
        }
    }
}
