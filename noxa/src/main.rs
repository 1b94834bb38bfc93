mod play;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use noxa_client_shared::config::Config;
use noxa_core::{
    self as nc, OfflinePaths, OfflineStore, na,
    state::{Playlist, PlaylistId, Song, SongId},
};
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser)]
#[command(author, version, about = "A client for Noxa Music", long_about = None)]
struct Args {
    /// Config file to use instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login { username: String, password: String },
    /// Create an account and sign in
    Signup { username: String, password: String },
    /// Forget the session
    Logout,
    /// List songs in the library
    Songs {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Search the library, or the providers with --online
    Search {
        query: String,
        #[arg(long)]
        online: bool,
    },
    /// List playlists; cached ones are marked with `*`
    Playlists,
    /// Manage the offline cache
    Offline {
        #[command(subcommand)]
        command: OfflineCommand,
    },
    /// Play songs by ID (the whole library if none are given), or a playlist
    Play {
        song_ids: Vec<u64>,
        #[arg(long)]
        playlist: Option<u64>,
    },
    /// List download jobs on the server
    Downloads,
    /// Show library statistics, or server statistics with --admin
    Stats {
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum OfflineCommand {
    /// List cached playlists and songs
    List,
    /// Download a playlist for offline use
    Download { playlist_id: u64 },
    /// Remove a cached playlist
    Remove { playlist_id: u64 },
    /// Remove a cached song from one playlist, or from the cache entirely
    RemoveSong {
        song_id: u64,
        #[arg(long)]
        playlist: Option<u64>,
    },
    /// Fetch artwork for cached songs that don't have it yet
    RetryArtwork,
}

pub(crate) struct App {
    config: Config,
    config_path: PathBuf,
    client: Arc<na::Client>,
}
impl App {
    fn offline_store(&self) -> anyhow::Result<OfflineStore> {
        let cache_dir = self.config.offline.resolve_cache_dir()?;
        OfflineStore::spawn(OfflinePaths::new(cache_dir.clone()), self.client.clone())
            .with_context(|| format!("Failed to open offline cache at {}", cache_dir.display()))
    }

    async fn find_playlist(&self, playlist_id: u64) -> anyhow::Result<Playlist> {
        self.client
            .fetch_playlists()
            .await
            .context("Failed to fetch playlists")?
            .into_iter()
            .find(|p| p.id == playlist_id)
            .map(Playlist::from)
            .with_context(|| format!("No playlist with ID {playlist_id}"))
    }

    fn remember_session(&mut self, session: Option<&na::Session>) -> anyhow::Result<()> {
        self.config.session.set(session);
        self.config.save(&self.config_path)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let client = Arc::new(na::Client::with_session(
        config.server.base_url.clone(),
        config.session.to_session(),
    ));
    client.set_admin_credentials(config.admin.to_credentials());

    let mut app = App {
        config,
        config_path,
        client,
    };

    let result = run(&mut app, args.command).await;
    // A 401 drops the client's session; don't resume it on the next run.
    if app
        .config
        .session
        .forget_if_cleared(app.client.session().as_ref())
    {
        tracing::warn!("The server rejected the saved session; sign in again");
        app.config.save(&app.config_path)?;
    }
    result
}

async fn run(app: &mut App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { username, password } => {
            let session = app
                .client
                .login(&username, &password)
                .await
                .context("Sign in failed")?;
            app.remember_session(Some(&session))?;
            println!("Signed in as {}", session.user.username);
        }
        Command::Signup { username, password } => {
            let session = app
                .client
                .signup(&username, &password)
                .await
                .context("Sign up failed")?;
            app.remember_session(Some(&session))?;
            println!("Created account {}", session.user.username);
        }
        Command::Logout => {
            app.client.logout();
            app.remember_session(None)?;
            println!("Signed out");
        }
        Command::Songs { limit, offset } => {
            let songs = app.client.fetch_songs(limit, offset).await?;
            for song in songs.into_iter().map(Song::from) {
                print_song(&song);
            }
        }
        Command::Search { query, online } => {
            if online {
                let tracks = app
                    .client
                    .search_online_tracks(&query, na::OnlineSearchType::Tracks)
                    .await?;
                for track in tracks {
                    println!("{:<24} {}  ({})", track.id, track.title, track.subtitle());
                }
            } else {
                for song in app.client.search_songs(&query).await?.into_iter().map(Song::from) {
                    print_song(&song);
                }
            }
        }
        Command::Playlists => list_playlists(app).await?,
        Command::Offline { command } => offline(app, command).await?,
        Command::Play { song_ids, playlist } => play::run(app, song_ids, playlist).await?,
        Command::Downloads => {
            for item in app.client.fetch_downloads().await? {
                let progress = item
                    .progress
                    .map(|p| format!(" {p}%"))
                    .unwrap_or_default();
                println!(
                    "{}  {:<11}{progress}  {} - {}",
                    item.id,
                    item.status().as_str(),
                    item.artist,
                    item.title
                );
            }
        }
        Command::Stats { admin } => {
            if admin {
                let stats = app.client.fetch_admin_stats().await?;
                println!("Users:     {}", stats.total_users);
                println!("Songs:     {}", stats.total_songs);
                println!("Playlists: {}", stats.total_playlists);
                println!("Downloads: {}", stats.total_downloads);
                if let Some(storage) = stats.storage_used {
                    println!("Storage:   {storage}");
                }
            } else {
                let stats = app.client.fetch_library_stats().await?;
                println!("Songs:   {}", stats.total_songs);
                println!("Artists: {}", stats.total_artists);
                println!("Albums:  {}", stats.total_albums);
                if let Some(storage) = stats.total_storage {
                    println!("Storage: {storage}");
                }
            }
        }
    }

    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let log_dir = nc::config::data_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("noxa.log"))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false);
    // Stdout is for command output; only problems go to the terminal.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("noxa=info")),
        )
        .init();
    Ok(())
}

async fn list_playlists(app: &App) -> anyhow::Result<()> {
    let store = app.offline_store()?;
    match app.client.fetch_playlists().await {
        Ok(records) => {
            for playlist in records.into_iter().map(Playlist::from) {
                let marker = if store.is_playlist_downloaded(playlist.id) {
                    '*'
                } else {
                    ' '
                };
                print_playlist(marker, &playlist);
                store.update_playlist_metadata(playlist);
            }
            store.flush().await;
        }
        Err(e) => {
            tracing::warn!("Failed to fetch playlists ({e}); showing cached playlists");
            for playlist in store.view().display_playlists() {
                print_playlist('*', &playlist);
            }
        }
    }
    Ok(())
}

async fn offline(app: &App, command: OfflineCommand) -> anyhow::Result<()> {
    let store = app.offline_store()?;
    match command {
        OfflineCommand::List => {
            let view = store.view();
            for playlist in view.display_playlists() {
                print_playlist('*', &playlist);
                for song in view.songs_for_playlist(playlist.id) {
                    print!("    ");
                    print_song(&song);
                }
            }
            let loose: Vec<_> = view
                .index()
                .tracks()
                .filter(|t| t.playlist_ids.is_empty())
                .collect();
            if !loose.is_empty() {
                println!("Other songs");
                for track in loose {
                    print!("    ");
                    print_song(&track.song);
                }
            }
        }
        OfflineCommand::Download { playlist_id } => {
            let playlist = app.find_playlist(playlist_id).await?;
            let songs: Vec<Song> = app
                .client
                .fetch_playlist_songs(playlist_id)
                .await
                .context("Failed to fetch playlist songs")?
                .into_iter()
                .map(Song::from)
                .collect();
            if songs.is_empty() {
                println!("{} has no songs", playlist.name);
                return Ok(());
            }

            let total = songs.len();
            let name = playlist.name.clone();
            store.download_playlist(playlist, songs);
            store.flush().await;

            let mut view = store.subscribe();
            loop {
                {
                    let view = view.borrow_and_update();
                    if let Some(progress) = view.download_progress(PlaylistId(playlist_id)) {
                        eprint!("\r{name}: {:>3.0}%", progress * 100.0);
                    }
                    if view.is_idle() {
                        break;
                    }
                }
                if view.changed().await.is_err() {
                    break;
                }
            }
            eprintln!();

            if let Some(message) = store.status_message() {
                println!("{message}");
            }
            println!(
                "{} of {total} songs cached",
                store.songs_for_playlist(PlaylistId(playlist_id)).len()
            );
        }
        OfflineCommand::Remove { playlist_id } => {
            store.remove_playlist(PlaylistId(playlist_id));
            store.flush().await;
            println!("Removed playlist {playlist_id} from the offline cache");
        }
        OfflineCommand::RemoveSong { song_id, playlist } => {
            match playlist {
                Some(playlist_id) => store.detach(SongId(song_id), PlaylistId(playlist_id)),
                None => store.remove_song(SongId(song_id)),
            }
            store.flush().await;
            println!("Removed song {song_id}");
        }
        OfflineCommand::RetryArtwork => {
            store.retry_missing_artwork();
            store.wait_until_idle().await;
            let missing = store
                .view()
                .index()
                .songs_missing_artwork(&app.client.base_url())
                .len();
            println!("{missing} songs still have no cached artwork");
        }
    }
    Ok(())
}

fn print_song(song: &Song) {
    let album = song
        .album
        .as_deref()
        .map(|a| format!(" [{a}]"))
        .unwrap_or_default();
    println!(
        "{:>6}  {} - {}{album}  {}",
        song.id,
        song.artist,
        song.title,
        song.duration_string()
    );
}

fn print_playlist(marker: char, playlist: &Playlist) {
    println!(
        "{marker}{:>5}  {} ({} songs)",
        playlist.id, playlist.name, playlist.track_count
    );
}
