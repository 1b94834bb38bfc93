use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

/// A song in the server's library, as returned by the library and playlist endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    /// The unique identifier
    pub id: u64,
    /// The song title
    pub title: String,
    /// The artist name
    pub artist: String,
    /// The album name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// The duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// The path of the file on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// The album cover path; either absolute or relative to the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_cover: Option<String>,
    /// Where the song was obtained from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The identifier of the track at its source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    /// When the song was added to the library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
    /// Whether the song is a local upload
    #[serde(default, rename = "isLocal", skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    /// The identifier of the playlist entry, when listed as part of a playlist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_track_id: Option<u64>,
}

/// An entry of a playlist's track listing.
///
/// The server is inconsistent about the shape of these: the song may be the
/// entry itself, or nested under a `song` or `track` key next to the
/// `playlist_track_id` and `position`. All three are accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistTrackItem {
    /// The identifier of the playlist entry
    pub playlist_track_id: Option<u64>,
    /// The position within the playlist
    pub position: Option<u32>,
    /// The song itself
    pub song: SongRecord,
}
impl PlaylistTrackItem {
    /// The song with its playlist entry id filled in from the wrapper when missing.
    pub fn into_song(self) -> SongRecord {
        let mut song = self.song;
        if song.playlist_track_id.is_none() {
            song.playlist_track_id = self.playlist_track_id;
        }
        song
    }
}
impl<'de> Deserialize<'de> for PlaylistTrackItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;

        if let Ok(song) = SongRecord::deserialize(&value) {
            return Ok(PlaylistTrackItem {
                playlist_track_id: song.playlist_track_id,
                position: None,
                song,
            });
        }

        #[derive(Deserialize)]
        struct Nested {
            playlist_track_id: Option<u64>,
            position: Option<u32>,
            song: Option<SongRecord>,
            track: Option<SongRecord>,
        }
        let nested = Nested::deserialize(&value).map_err(D::Error::custom)?;
        let song = nested
            .song
            .or(nested.track)
            .ok_or_else(|| D::Error::custom("playlist entry has no song payload"))?;

        Ok(PlaylistTrackItem {
            playlist_track_id: nested.playlist_track_id,
            position: nested.position,
            song,
        })
    }
}
