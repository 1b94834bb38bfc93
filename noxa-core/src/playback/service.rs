use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use super::{AudioOutput, OutputEvent, PlaybackEngine, PlaybackEvent};
use crate::{
    MediaServer,
    state::{Playlist, Song},
};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackRequest {
    Play(Song),
    PlayQueue {
        songs: Vec<Song>,
        start_at: usize,
        playlist: Option<Playlist>,
    },
    Next,
    Previous,
    RemoveCurrent,
    TogglePlayPause,
    Pause,
    Resume,
    Seek(Duration),
    /// Relative seek, in seconds.
    SeekBy(f64),
    ClearQueue,
    /// Seed the library used for recommendations.
    SetLibrary(Vec<Song>),
}

/// A cloneable way to control a running [`PlaybackService`].
#[derive(Clone)]
pub struct PlaybackRequestHandle {
    tx: mpsc::UnboundedSender<PlaybackRequest>,
    events: broadcast::Sender<PlaybackEvent>,
}
impl PlaybackRequestHandle {
    pub fn send(&self, request: PlaybackRequest) {
        if self.tx.send(request).is_err() {
            tracing::warn!("Playback service is no longer running");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn play(&self, song: Song) {
        self.send(PlaybackRequest::Play(song));
    }

    pub fn play_queue(&self, songs: Vec<Song>, start_at: usize, playlist: Option<Playlist>) {
        self.send(PlaybackRequest::PlayQueue {
            songs,
            start_at,
            playlist,
        });
    }

    pub fn next(&self) {
        self.send(PlaybackRequest::Next);
    }

    pub fn previous(&self) {
        self.send(PlaybackRequest::Previous);
    }

    pub fn toggle_play_pause(&self) {
        self.send(PlaybackRequest::TogglePlayPause);
    }

    pub fn pause(&self) {
        self.send(PlaybackRequest::Pause);
    }

    pub fn resume(&self) {
        self.send(PlaybackRequest::Resume);
    }

    pub fn seek(&self, position: Duration) {
        self.send(PlaybackRequest::Seek(position));
    }

    pub fn clear_queue(&self) {
        self.send(PlaybackRequest::ClearQueue);
    }
}

/// Runs a [`PlaybackEngine`] on its own task.
///
/// Requests, output events and artwork results are applied one at a time, so
/// a slow recommendation fetch holds back later requests rather than racing
/// them.
pub struct PlaybackService {
    handle: PlaybackRequestHandle,
    task: tokio::task::JoinHandle<()>,
}
impl PlaybackService {
    /// Start the service. `output_events` are the events the engine's
    /// [`AudioOutput`] reports.
    pub fn spawn<S: MediaServer, O: AudioOutput>(
        mut engine: PlaybackEngine<S, O>,
        mut output_events: mpsc::UnboundedReceiver<OutputEvent>,
    ) -> Self {
        let (tx, mut requests) = mpsc::unbounded_channel();
        let handle = PlaybackRequestHandle {
            tx,
            events: engine.event_sender(),
        };
        let mut artwork = engine
            .take_artwork_results()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = requests.recv() => {
                        let Some(request) = request else {
                            break;
                        };
                        tracing::debug!("Playback request: {request:?}");
                        engine.handle(request).await;
                    }
                    Some(event) = output_events.recv() => {
                        engine.handle_output(event).await;
                    }
                    Some(resolved) = artwork.recv() => {
                        engine.artwork_resolved(resolved);
                    }
                }
            }
            tracing::debug!("Playback service stopped");
        });

        Self { handle, task }
    }

    pub fn handle(&self) -> PlaybackRequestHandle {
        self.handle.clone()
    }
}
impl Drop for PlaybackService {
    fn drop(&mut self) {
        self.task.abort();
    }
}
