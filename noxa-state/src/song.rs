use serde::{Deserialize, Serialize};

use crate::na;

/// A song ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub u64);
impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A song, as `noxa` cares about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// The song ID
    pub id: SongId,
    /// The song title
    pub title: String,
    /// The song artist
    pub artist: String,
    /// The album name
    #[serde(default)]
    pub album: Option<String>,
    /// The duration in seconds
    #[serde(default)]
    pub duration: Option<u32>,
    /// The path of the file on the server
    #[serde(default)]
    pub file_path: Option<String>,
    /// The album cover path as the server reported it; see [`Song::album_art_url`]
    #[serde(default)]
    pub album_cover_path: Option<String>,
    /// Where the song was obtained from
    #[serde(default)]
    pub source: Option<String>,
    /// The identifier of the track at its source
    #[serde(default)]
    pub track_id: Option<String>,
    /// When the song was added to the library
    #[serde(default)]
    pub added_at: Option<String>,
    /// Whether the song is a local upload
    #[serde(default)]
    pub is_local: Option<bool>,
    /// The playlist entry this song was listed as, if any
    #[serde(default)]
    pub playlist_track_id: Option<u64>,
}
impl From<na::SongRecord> for Song {
    fn from(record: na::SongRecord) -> Self {
        Song {
            id: SongId(record.id),
            title: record.title,
            artist: record.artist,
            album: record.album.filter(|a| !a.is_empty()),
            duration: record.duration,
            file_path: record.file_path,
            album_cover_path: record.album_cover,
            source: record.source,
            track_id: record.track_id,
            added_at: record.added_at,
            is_local: record.is_local,
            playlist_track_id: record.playlist_track_id,
        }
    }
}
impl Song {
    /// The album art as an absolute URL, resolving relative paths against `base_url`.
    pub fn album_art_url(&self, base_url: &str) -> Option<String> {
        album_art_url(self.album_cover_path.as_deref()?, base_url)
    }

    /// The duration as `m:ss`; `0:00` when unknown.
    pub fn duration_string(&self) -> String {
        let duration = self.duration.unwrap_or_default();
        format!("{}:{:02}", duration / 60, duration % 60)
    }
}

/// Resolve an artwork path against `base_url`. Absolute URLs pass through;
/// relative paths lose one leading `/`. Empty paths have no artwork.
pub fn album_art_url(path: &str, base_url: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    Some(format!("{}/{path}", base_url.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(cover: Option<&str>) -> Song {
        Song::from(na::SongRecord {
            id: 1,
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: Some(String::new()),
            duration: Some(185),
            file_path: None,
            album_cover: cover.map(str::to_string),
            source: None,
            track_id: None,
            added_at: None,
            is_local: None,
            playlist_track_id: None,
        })
    }

    #[test]
    fn test_album_art_url_resolution() {
        let base = "https://stream.noxamusic.com";
        assert_eq!(
            song(Some("/covers/1.jpg")).album_art_url(base).as_deref(),
            Some("https://stream.noxamusic.com/covers/1.jpg")
        );
        assert_eq!(
            song(Some("covers/1.jpg")).album_art_url(base).as_deref(),
            Some("https://stream.noxamusic.com/covers/1.jpg")
        );
        assert_eq!(
            song(Some("https://cdn.example.com/a.png"))
                .album_art_url(base)
                .as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(song(Some("")).album_art_url(base), None);
        assert_eq!(song(None).album_art_url(base), None);
    }

    #[test]
    fn test_empty_album_is_dropped() {
        assert_eq!(song(None).album, None);
    }

    #[test]
    fn test_duration_string() {
        assert_eq!(song(None).duration_string(), "3:05");
        let mut unknown = song(None);
        unknown.duration = None;
        assert_eq!(unknown.duration_string(), "0:00");
    }

    #[test]
    fn test_song_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&SongId(7)).unwrap(), "7");
    }
}
