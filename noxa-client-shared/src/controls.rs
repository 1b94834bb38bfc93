use std::time::Duration;

use noxa_core::{NowPlayingInfo, PlaybackEvent, PlaybackRequest, PlaybackRequestHandle, PlaybackState};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition, PlatformConfig,
    SeekDirection,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// How far a plain "seek forward/backward" moves.
const SEEK_STEP: Duration = Duration::from_secs(10);

/// Bridges the system's media controls (MPRIS, SMTC, MPNowPlayingInfoCenter)
/// to a playback service.
pub struct Controls {
    controls: MediaControls,
    events: broadcast::Receiver<PlaybackEvent>,
    now_playing: Option<NowPlayingInfo>,
    state: PlaybackState,
}

impl Controls {
    pub fn new(
        hwnd: Option<*mut std::ffi::c_void>,
        playback: PlaybackRequestHandle,
    ) -> Result<Self, souvlaki::Error> {
        let mut controls = MediaControls::new(PlatformConfig {
            dbus_name: "noxa",
            display_name: "Noxa Music",
            hwnd,
        })?;

        let events = playback.subscribe();
        controls.attach(move |event: MediaControlEvent| match request_for(&event) {
            Some(request) => playback.send(request),
            None => tracing::debug!("Unhandled media control event: {:?}", event),
        })?;

        Ok(Self {
            controls,
            events,
            now_playing: None,
            state: PlaybackState::Idle,
        })
    }

    /// Publish everything that happened since the last call.
    pub fn update(&mut self) {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Media controls skipped {skipped} playback events");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            if let Err(e) = self.apply(event) {
                tracing::warn!("Failed to update media controls: {:?}", e);
            }
        }
    }

    fn apply(&mut self, event: PlaybackEvent) -> Result<(), souvlaki::Error> {
        match event {
            PlaybackEvent::TrackStarted(info) => {
                set_metadata(&mut self.controls, &info)?;
                self.state = PlaybackState::Playing;
                let progress = Some(MediaPosition(info.elapsed));
                self.now_playing = Some(info);
                self.controls.set_playback(MediaPlayback::Playing { progress })
            }
            PlaybackEvent::StateChanged { state, elapsed } => {
                self.state = state;
                let progress = Some(MediaPosition(elapsed));
                let playback = match state {
                    PlaybackState::Playing => MediaPlayback::Playing { progress },
                    PlaybackState::Paused => MediaPlayback::Paused { progress },
                    PlaybackState::Idle => {
                        self.now_playing = None;
                        self.controls.set_metadata(MediaMetadata::default())?;
                        MediaPlayback::Stopped
                    }
                };
                self.controls.set_playback(playback)
            }
            PlaybackEvent::PositionChanged(position) => {
                if let Some(info) = &mut self.now_playing {
                    info.elapsed = position;
                }
                let progress = Some(MediaPosition(position));
                match self.state {
                    PlaybackState::Playing => {
                        self.controls.set_playback(MediaPlayback::Playing { progress })
                    }
                    PlaybackState::Paused => {
                        self.controls.set_playback(MediaPlayback::Paused { progress })
                    }
                    PlaybackState::Idle => Ok(()),
                }
            }
            PlaybackEvent::ArtworkLoaded { song_id, path } => match &mut self.now_playing {
                Some(info) if info.song_id == song_id => {
                    info.artwork = Some(path);
                    set_metadata(&mut self.controls, info)
                }
                _ => Ok(()),
            },
            PlaybackEvent::QueueChanged { .. } => Ok(()),
        }
    }
}

fn set_metadata(controls: &mut MediaControls, info: &NowPlayingInfo) -> Result<(), souvlaki::Error> {
    let cover_url = info
        .artwork
        .as_ref()
        .map(|path| format!("file://{}", path.display()));
    controls.set_metadata(MediaMetadata {
        title: Some(&info.title),
        artist: Some(&info.artist),
        album: info.album.as_deref(),
        cover_url: cover_url.as_deref(),
        duration: info.duration,
    })
}

/// The playback request a media control event asks for.
fn request_for(event: &MediaControlEvent) -> Option<PlaybackRequest> {
    Some(match event {
        MediaControlEvent::Play => PlaybackRequest::Resume,
        MediaControlEvent::Pause => PlaybackRequest::Pause,
        MediaControlEvent::Toggle => PlaybackRequest::TogglePlayPause,
        MediaControlEvent::Next => PlaybackRequest::Next,
        MediaControlEvent::Previous => PlaybackRequest::Previous,
        MediaControlEvent::Stop => PlaybackRequest::ClearQueue,
        MediaControlEvent::Seek(direction) => {
            PlaybackRequest::SeekBy(SEEK_STEP.as_secs_f64() * seek_direction_to_sign(*direction))
        }
        MediaControlEvent::SeekBy(direction, duration) => {
            PlaybackRequest::SeekBy(duration.as_secs_f64() * seek_direction_to_sign(*direction))
        }
        MediaControlEvent::SetPosition(position) => PlaybackRequest::Seek(position.0),
        _ => return None,
    })
}

fn seek_direction_to_sign(direction: SeekDirection) -> f64 {
    if direction == SeekDirection::Forward {
        1.0
    } else {
        -1.0
    }
}
