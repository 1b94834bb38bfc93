use std::time::Duration;

use super::PlaybackSource;
use crate::state::SongId;

/// Something that can play one song at a time.
///
/// Calls return immediately; loading happens in the background and problems
/// are reported as [`OutputEvent`]s.
pub trait AudioOutput: Send + 'static {
    /// Stop whatever is playing and start loading `source`. Playback begins
    /// once loaded, unless paused in the meantime.
    fn load(&mut self, source: PlaybackSource, song_id: SongId);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration);
}

/// Reports from an [`AudioOutput`] back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    TrackEnded(SongId),
    Position(Duration),
    LoadFailed { song_id: SongId, error: String },
}

#[cfg(feature = "audio")]
pub use rodio_output::PlaybackThread;

#[cfg(feature = "audio")]
mod rodio_output {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use tokio::sync::mpsc;

    use super::{AudioOutput, OutputEvent};
    use crate::{MediaServer, playback::PlaybackSource, state::SongId};

    enum Command {
        Load {
            generation: u64,
            song_id: SongId,
            data: Vec<u8>,
        },
        Play,
        Pause,
        Stop,
        Seek(Duration),
    }

    /// Plays audio through the default output device on a dedicated thread.
    ///
    /// Song data is read or fetched on the Tokio runtime and handed to the
    /// thread once complete. Each load bumps a generation counter; data that
    /// arrives for an older generation is dropped.
    pub struct PlaybackThread<S> {
        server: Arc<S>,
        runtime: tokio::runtime::Handle,
        tx: std::sync::mpsc::Sender<Command>,
        events: mpsc::UnboundedSender<OutputEvent>,
        generation: Arc<AtomicU64>,
        _thread_handle: std::thread::JoinHandle<()>,
    }
    impl<S: MediaServer> PlaybackThread<S> {
        pub fn new(
            server: Arc<S>,
            runtime: tokio::runtime::Handle,
            events: mpsc::UnboundedSender<OutputEvent>,
        ) -> Self {
            let (tx, rx) = std::sync::mpsc::channel();
            let generation = Arc::new(AtomicU64::new(0));
            let thread_handle = std::thread::spawn({
                let events = events.clone();
                let generation = generation.clone();
                move || run(rx, generation, events)
            });

            Self {
                server,
                runtime,
                tx,
                events,
                generation,
                _thread_handle: thread_handle,
            }
        }

        fn send(&self, command: Command) {
            if self.tx.send(command).is_err() {
                tracing::warn!("Playback thread is not running");
            }
        }
    }

    impl<S: MediaServer> AudioOutput for PlaybackThread<S> {
        fn load(&mut self, source: PlaybackSource, song_id: SongId) {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.send(Command::Stop);

            let server = self.server.clone();
            let tx = self.tx.clone();
            let events = self.events.clone();
            let current = self.generation.clone();
            self.runtime.spawn(async move {
                let data = match &source {
                    PlaybackSource::File(path) => {
                        tokio::fs::read(path).await.map_err(|e| e.to_string())
                    }
                    PlaybackSource::Url(url) => {
                        server.fetch_bytes(url).await.map_err(|e| e.to_string())
                    }
                };
                if current.load(Ordering::SeqCst) != generation {
                    tracing::debug!("Discarding stale load of {source:?}");
                    return;
                }
                match data {
                    Ok(data) => {
                        let _ = tx.send(Command::Load {
                            generation,
                            song_id,
                            data,
                        });
                    }
                    Err(error) => {
                        let _ = events.send(OutputEvent::LoadFailed { song_id, error });
                    }
                }
            });
        }

        fn play(&mut self) {
            self.send(Command::Play);
        }

        fn pause(&mut self) {
            self.send(Command::Pause);
        }

        fn stop(&mut self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.send(Command::Stop);
        }

        fn seek(&mut self, position: Duration) {
            self.send(Command::Seek(position));
        }
    }

    fn run(
        rx: std::sync::mpsc::Receiver<Command>,
        generation: Arc<AtomicU64>,
        events: mpsc::UnboundedSender<OutputEvent>,
    ) {
        let stream_handle = match rodio::OutputStreamBuilder::open_default_stream() {
            Ok(stream_handle) => stream_handle,
            Err(e) => {
                tracing::error!("Failed to open audio output: {e}");
                return;
            }
        };
        let sink = rodio::Sink::connect_new(stream_handle.mixer());
        sink.set_volume(1.0);

        const POSITION_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

        let mut current: Option<SongId> = None;
        // Whether the next load should start paused.
        let mut hold = false;
        let mut last_position_update = Instant::now();

        loop {
            loop {
                let command = match rx.try_recv() {
                    Ok(command) => command,
                    Err(std::sync::mpsc::TryRecvError::Empty) => break,
                    Err(std::sync::mpsc::TryRecvError::Disconnected) => return,
                };
                match command {
                    Command::Load {
                        generation: load_generation,
                        song_id,
                        data,
                    } => {
                        if load_generation != generation.load(Ordering::SeqCst) {
                            continue;
                        }
                        sink.clear();
                        current = None;
                        let decoder = rodio::decoder::DecoderBuilder::new()
                            .with_byte_len(data.len() as u64)
                            .with_data(std::io::Cursor::new(data))
                            .build();
                        match decoder {
                            Ok(decoder) => {
                                sink.append(decoder);
                                if !hold {
                                    sink.play();
                                }
                                current = Some(song_id);
                            }
                            Err(e) => {
                                let _ = events.send(OutputEvent::LoadFailed {
                                    song_id,
                                    error: e.to_string(),
                                });
                            }
                        }
                    }
                    Command::Play => {
                        hold = false;
                        sink.play();
                    }
                    Command::Pause => {
                        hold = true;
                        sink.pause();
                    }
                    Command::Stop => {
                        sink.clear();
                        current = None;
                    }
                    Command::Seek(position) => {
                        if let Err(e) = sink.try_seek(position) {
                            tracing::warn!("Failed to seek to position {position:?}: {e}");
                        }
                    }
                }
            }

            if let Some(song_id) = current
                && sink.empty()
            {
                current = None;
                let _ = events.send(OutputEvent::TrackEnded(song_id));
            }

            let now = Instant::now();
            if now.duration_since(last_position_update) >= POSITION_UPDATE_INTERVAL {
                last_position_update = now;
                if current.is_some() && !sink.is_paused() {
                    let _ = events.send(OutputEvent::Position(sink.get_pos()));
                }
            }

            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
