use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Playlist, PlaylistId, Song, SongId};

/// Cached artwork for a track or playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artwork {
    /// A file in the artwork directory.
    Local { file_name: String },
    /// Not fetched (yet); the URL it would come from.
    Remote { url: String },
}
impl Artwork {
    pub fn local_file_name(&self) -> Option<&str> {
        match self {
            Artwork::Local { file_name } => Some(file_name),
            Artwork::Remote { .. } => None,
        }
    }

    fn remote(url: Option<String>) -> Option<Self> {
        url.filter(|u| !u.is_empty())
            .map(|url| Artwork::Remote { url })
    }
}

/// A downloaded song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineTrack {
    pub song: Song,
    /// The file name within the songs directory.
    pub file_name: String,
    pub playlist_ids: BTreeSet<PlaylistId>,
    pub artwork: Option<Artwork>,
    pub downloaded_at: DateTime<Utc>,
}

/// A playlist with at least one downloaded song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflinePlaylist {
    pub playlist: Playlist,
    /// Member songs in playlist order, without duplicates.
    pub song_ids: Vec<SongId>,
    pub downloaded_at: DateTime<Utc>,
    pub artwork: Option<Artwork>,
}
impl OfflinePlaylist {
    /// The playlist as it should be shown while offline, with local artwork
    /// resolved against `artwork_dir`.
    pub fn display_playlist(&self, artwork_dir: &Path) -> Playlist {
        let artwork = self.artwork.as_ref().map(|a| match a {
            Artwork::Local { file_name } => artwork_dir.join(file_name).display().to_string(),
            Artwork::Remote { url } => url.clone(),
        });
        self.playlist
            .with_offline_overrides(artwork, self.song_ids.len())
    }
}

/// Files that nothing references any more. Names are relative to the songs
/// and artwork directories respectively.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Orphans {
    pub songs: Vec<String>,
    pub artwork: Vec<String>,
}
impl Orphans {
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty() && self.artwork.is_empty()
    }

    fn extend(&mut self, other: Orphans) {
        self.songs.extend(other.songs);
        self.artwork.extend(other.artwork);
    }
}

/// The offline index: which songs and playlists are cached, and how they relate.
///
/// This is plain data; the store owns the only mutable copy and turns the
/// [`Orphans`] returned by removals into file deletions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Snapshot", into = "Snapshot")]
pub struct OfflineIndex {
    playlists: BTreeMap<PlaylistId, OfflinePlaylist>,
    tracks: BTreeMap<SongId, OfflineTrack>,
}

/// The on-disk shape: `{ "playlists": [...], "tracks": [...] }`.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    playlists: Vec<OfflinePlaylist>,
    #[serde(default)]
    tracks: Vec<OfflineTrack>,
}
impl From<Snapshot> for OfflineIndex {
    fn from(snapshot: Snapshot) -> Self {
        OfflineIndex {
            playlists: snapshot
                .playlists
                .into_iter()
                .map(|p| (p.playlist.id, p))
                .collect(),
            tracks: snapshot
                .tracks
                .into_iter()
                .map(|t| (t.song.id, t))
                .collect(),
        }
    }
}
impl From<OfflineIndex> for Snapshot {
    fn from(index: OfflineIndex) -> Self {
        Snapshot {
            playlists: index.playlists.into_values().collect(),
            tracks: index.tracks.into_values().collect(),
        }
    }
}

impl OfflineIndex {
    pub fn track(&self, song_id: SongId) -> Option<&OfflineTrack> {
        self.tracks.get(&song_id)
    }

    pub fn playlist(&self, playlist_id: PlaylistId) -> Option<&OfflinePlaylist> {
        self.playlists.get(&playlist_id)
    }

    pub fn contains_song(&self, song_id: SongId) -> bool {
        self.tracks.contains_key(&song_id)
    }

    pub fn contains_playlist(&self, playlist_id: PlaylistId) -> bool {
        self.playlists.contains_key(&playlist_id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &OfflineTrack> {
        self.tracks.values()
    }

    pub fn playlists(&self) -> impl Iterator<Item = &OfflinePlaylist> {
        self.playlists.values()
    }

    /// The cached songs of a playlist, in playlist order.
    pub fn songs_for_playlist(&self, playlist_id: PlaylistId) -> Vec<Song> {
        self.playlists
            .get(&playlist_id)
            .map(|p| {
                p.song_ids
                    .iter()
                    .filter_map(|id| self.tracks.get(id))
                    .map(|t| t.song.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a completed download, optionally under a playlist.
    ///
    /// Without fetched artwork, the song's remote artwork URL is kept so that
    /// it can be fetched later.
    pub fn store(
        &mut self,
        song: Song,
        playlist: Option<&Playlist>,
        file_name: String,
        artwork_file: Option<String>,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> Orphans {
        let mut orphans = Orphans::default();
        let song_id = song.id;
        let remote_artwork = Artwork::remote(song.album_art_url(base_url));

        let track = self.tracks.entry(song_id).or_insert_with(|| OfflineTrack {
            song: song.clone(),
            file_name: file_name.clone(),
            playlist_ids: BTreeSet::new(),
            artwork: None,
            downloaded_at: now,
        });
        if track.file_name != file_name {
            orphans.songs.push(std::mem::replace(&mut track.file_name, file_name));
        }
        track.song = song;
        let mut replaced_artwork = None;
        match artwork_file {
            Some(file_name) => {
                if let Some(old) = track.artwork.as_ref().and_then(Artwork::local_file_name) {
                    orphans.artwork.push(old.to_string());
                    replaced_artwork = Some((old.to_string(), file_name.clone()));
                }
                track.artwork = Some(Artwork::Local { file_name });
            }
            None if track.artwork.is_none() => track.artwork = remote_artwork,
            None => {}
        }
        if let Some((old, new)) = replaced_artwork {
            self.adopt_artwork(&old, &new);
        }

        if let Some(playlist) = playlist {
            self.attach(song_id, playlist, base_url, now);
        }
        orphans
    }

    /// Add an already cached song to a playlist, creating the playlist entry
    /// if needed. Returns false if the song isn't cached.
    pub fn attach(
        &mut self,
        song_id: SongId,
        playlist: &Playlist,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(track) = self.tracks.get_mut(&song_id) else {
            return false;
        };
        track.playlist_ids.insert(playlist.id);

        let entry = self
            .playlists
            .entry(playlist.id)
            .or_insert_with(|| OfflinePlaylist {
                playlist: playlist.clone(),
                song_ids: vec![],
                downloaded_at: now,
                artwork: None,
            });
        if entry.artwork.is_none() {
            entry.artwork = track
                .artwork
                .clone()
                .or_else(|| Artwork::remote(playlist.cover_url.clone()))
                .or_else(|| Artwork::remote(track.song.album_art_url(base_url)));
        }
        if !entry.song_ids.contains(&song_id) {
            entry.song_ids.push(song_id);
        }
        true
    }

    /// Remove a song from every playlist and from the cache.
    pub fn remove_song(&mut self, song_id: SongId) -> Option<Orphans> {
        let track = self.tracks.remove(&song_id)?;
        for playlist_id in &track.playlist_ids {
            self.remove_member(*playlist_id, song_id);
        }
        Some(self.orphan_track(track))
    }

    /// Remove a playlist. Songs that no other playlist references go with it.
    pub fn remove_playlist(&mut self, playlist_id: PlaylistId) -> Option<Orphans> {
        let entry = self.playlists.remove(&playlist_id)?;
        let mut orphans = Orphans::default();
        for song_id in entry.song_ids {
            orphans.extend(self.release(song_id, playlist_id));
        }
        Some(orphans)
    }

    /// Remove a song from one playlist. The song itself is only removed once
    /// no playlist references it.
    pub fn detach(&mut self, song_id: SongId, playlist_id: PlaylistId) -> Option<Orphans> {
        let is_member = self
            .tracks
            .get(&song_id)
            .is_some_and(|t| t.playlist_ids.contains(&playlist_id));
        if !is_member {
            return None;
        }
        self.remove_member(playlist_id, song_id);
        Some(self.release(song_id, playlist_id))
    }

    /// Replace a cached playlist's metadata, keeping its members and artwork.
    pub fn update_playlist_metadata(&mut self, playlist: Playlist) -> bool {
        match self.playlists.get_mut(&playlist.id) {
            Some(entry) if entry.playlist != playlist => {
                entry.playlist = playlist;
                true
            }
            _ => false,
        }
    }

    /// Point a track at newly fetched artwork. Returns the replaced local file, if any.
    pub fn set_track_artwork(&mut self, song_id: SongId, file_name: String) -> Option<Orphans> {
        let track = self.tracks.get_mut(&song_id)?;
        let previous = track.artwork.replace(Artwork::Local {
            file_name: file_name.clone(),
        });

        let mut orphans = Orphans::default();
        if let Some(old) = previous.as_ref().and_then(Artwork::local_file_name) {
            orphans.artwork.push(old.to_string());
            self.adopt_artwork(old, &file_name);
        }
        // Playlists that were waiting on this song's artwork pick it up.
        for playlist_id in self.tracks[&song_id].playlist_ids.clone() {
            if let Some(entry) = self.playlists.get_mut(&playlist_id)
                && (entry.artwork.is_none() || entry.artwork == previous)
                && entry.song_ids.first() == Some(&song_id)
            {
                entry.artwork = Some(Artwork::Local {
                    file_name: file_name.clone(),
                });
            }
        }
        Some(orphans)
    }

    /// Cached songs whose artwork exists remotely but hasn't been stored locally.
    pub fn songs_missing_artwork(&self, base_url: &str) -> Vec<Song> {
        self.tracks
            .values()
            .filter(|t| !matches!(t.artwork, Some(Artwork::Local { .. })))
            .filter(|t| t.song.album_art_url(base_url).is_some())
            .map(|t| t.song.clone())
            .collect()
    }

    fn remove_member(&mut self, playlist_id: PlaylistId, song_id: SongId) {
        if let Some(entry) = self.playlists.get_mut(&playlist_id) {
            entry.song_ids.retain(|id| *id != song_id);
            if entry.song_ids.is_empty() {
                self.playlists.remove(&playlist_id);
            }
        }
    }

    /// Drop `playlist_id`'s claim on a song, removing the song if it was the last one.
    fn release(&mut self, song_id: SongId, playlist_id: PlaylistId) -> Orphans {
        let Some(track) = self.tracks.get_mut(&song_id) else {
            return Orphans::default();
        };
        track.playlist_ids.remove(&playlist_id);
        if !track.playlist_ids.is_empty() {
            return Orphans::default();
        }
        match self.tracks.remove(&song_id) {
            Some(track) => self.orphan_track(track),
            None => Orphans::default(),
        }
    }

    fn orphan_track(&mut self, track: OfflineTrack) -> Orphans {
        let mut orphans = Orphans {
            songs: vec![track.file_name],
            artwork: vec![],
        };
        if let Some(file_name) = track.artwork.as_ref().and_then(Artwork::local_file_name) {
            orphans.artwork.push(file_name.to_string());
            self.forget_artwork(file_name);
        }
        orphans
    }

    /// Playlists borrowing a deleted artwork file fall back to their own cover.
    /// Playlists showing the local file `old` switch to its replacement `new`.
    fn adopt_artwork(&mut self, old: &str, new: &str) {
        for entry in self.playlists.values_mut() {
            if entry.artwork.as_ref().and_then(Artwork::local_file_name) == Some(old) {
                entry.artwork = Some(Artwork::Local {
                    file_name: new.to_string(),
                });
            }
        }
    }

    fn forget_artwork(&mut self, file_name: &str) {
        for entry in self.playlists.values_mut() {
            if entry.artwork.as_ref().and_then(Artwork::local_file_name) == Some(file_name) {
                entry.artwork = Artwork::remote(entry.playlist.cover_url.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://stream.noxamusic.com";

    fn song(id: u64, artist: &str) -> Song {
        Song {
            id: SongId(id),
            title: format!("Song {id}"),
            artist: artist.to_string(),
            album: None,
            duration: Some(200),
            file_path: None,
            album_cover_path: Some(format!("/covers/{id}.jpg")),
            source: None,
            track_id: None,
            added_at: None,
            is_local: None,
            playlist_track_id: None,
        }
    }

    fn playlist(id: u64) -> Playlist {
        Playlist {
            id: PlaylistId(id),
            name: format!("Playlist {id}"),
            description: None,
            cover_url: None,
            track_count: 0,
            created_at: None,
            user_id: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_store_under_playlist() {
        let mut index = OfflineIndex::default();
        let orphans = index.store(
            song(7, "Y"),
            Some(&playlist(3)),
            "song_7_a.mp3".into(),
            Some("art_7_a.jpg".into()),
            BASE,
            now(),
        );
        assert!(orphans.is_empty());

        let track = index.track(SongId(7)).unwrap();
        assert_eq!(track.file_name, "song_7_a.mp3");
        assert_eq!(track.playlist_ids, BTreeSet::from([PlaylistId(3)]));

        let entry = index.playlist(PlaylistId(3)).unwrap();
        assert_eq!(entry.song_ids, vec![SongId(7)]);
        assert_eq!(
            entry.artwork,
            Some(Artwork::Local {
                file_name: "art_7_a.jpg".into()
            })
        );
    }

    #[test]
    fn test_store_without_artwork_keeps_remote_url() {
        let mut index = OfflineIndex::default();
        index.store(song(1, "A"), None, "f".into(), None, BASE, now());
        assert_eq!(
            index.track(SongId(1)).unwrap().artwork,
            Some(Artwork::Remote {
                url: "https://stream.noxamusic.com/covers/1.jpg".into()
            })
        );
        assert_eq!(index.songs_missing_artwork(BASE).len(), 1);
    }

    #[test]
    fn test_playlist_artwork_prefers_cover_over_remote_song_art() {
        let mut index = OfflineIndex::default();
        let mut with_cover = playlist(2);
        with_cover.cover_url = Some("https://cdn/p2.jpg".into());
        let mut no_art = song(1, "A");
        no_art.album_cover_path = None;

        index.store(no_art, Some(&with_cover), "f".into(), None, BASE, now());
        assert_eq!(
            index.playlist(PlaylistId(2)).unwrap().artwork,
            Some(Artwork::Remote {
                url: "https://cdn/p2.jpg".into()
            })
        );
    }

    #[test]
    fn test_attach_dedupes_members() {
        let mut index = OfflineIndex::default();
        index.store(song(1, "A"), Some(&playlist(1)), "f".into(), None, BASE, now());
        assert!(index.attach(SongId(1), &playlist(1), BASE, now()));
        assert!(index.attach(SongId(1), &playlist(2), BASE, now()));
        assert!(!index.attach(SongId(99), &playlist(1), BASE, now()));

        assert_eq!(index.playlist(PlaylistId(1)).unwrap().song_ids, vec![SongId(1)]);
        assert_eq!(
            index.track(SongId(1)).unwrap().playlist_ids,
            BTreeSet::from([PlaylistId(1), PlaylistId(2)])
        );
    }

    #[test]
    fn test_detach_is_per_playlist() {
        let mut index = OfflineIndex::default();
        index.store(song(1, "A"), Some(&playlist(1)), "f1".into(), None, BASE, now());
        index.attach(SongId(1), &playlist(2), BASE, now());
        index.store(song(2, "A"), Some(&playlist(1)), "f2".into(), None, BASE, now());

        let orphans = index.detach(SongId(1), PlaylistId(1)).unwrap();
        assert!(orphans.is_empty());
        assert!(index.contains_song(SongId(1)));
        assert_eq!(index.songs_for_playlist(PlaylistId(2)).len(), 1);
        assert_eq!(index.songs_for_playlist(PlaylistId(1))[0].id, SongId(2));

        let orphans = index.detach(SongId(1), PlaylistId(2)).unwrap();
        assert_eq!(orphans.songs, vec!["f1".to_string()]);
        assert!(!index.contains_song(SongId(1)));
        assert!(!index.contains_playlist(PlaylistId(2)));

        assert!(index.detach(SongId(1), PlaylistId(2)).is_none());
    }

    #[test]
    fn test_remove_playlist_keeps_shared_songs() {
        let mut index = OfflineIndex::default();
        index.store(song(7, "Y"), Some(&playlist(3)), "f7".into(), Some("a7".into()), BASE, now());
        index.store(song(8, "Y"), Some(&playlist(3)), "f8".into(), None, BASE, now());
        index.attach(SongId(8), &playlist(4), BASE, now());

        let orphans = index.remove_playlist(PlaylistId(3)).unwrap();
        assert_eq!(orphans.songs, vec!["f7".to_string()]);
        assert_eq!(orphans.artwork, vec!["a7".to_string()]);
        assert!(!index.contains_song(SongId(7)));
        assert!(index.contains_song(SongId(8)));
        assert!(!index.contains_playlist(PlaylistId(3)));
        assert!(index.contains_playlist(PlaylistId(4)));
    }

    #[test]
    fn test_remove_song_drops_emptied_playlists() {
        let mut index = OfflineIndex::default();
        index.store(song(1, "A"), Some(&playlist(1)), "f1".into(), None, BASE, now());
        index.store(song(2, "A"), Some(&playlist(1)), "f2".into(), None, BASE, now());
        index.attach(SongId(1), &playlist(2), BASE, now());

        let orphans = index.remove_song(SongId(1)).unwrap();
        assert_eq!(orphans.songs, vec!["f1".to_string()]);
        assert!(!index.contains_playlist(PlaylistId(2)));
        assert_eq!(index.playlist(PlaylistId(1)).unwrap().song_ids, vec![SongId(2)]);
        assert!(index.remove_song(SongId(1)).is_none());
    }

    #[test]
    fn test_set_track_artwork_updates_waiting_playlist() {
        let mut index = OfflineIndex::default();
        let mut bare = song(1, "A");
        bare.album_cover_path = None;
        index.store(bare, Some(&playlist(1)), "f".into(), None, BASE, now());
        assert_eq!(index.playlist(PlaylistId(1)).unwrap().artwork, None);

        let orphans = index.set_track_artwork(SongId(1), "art.png".into()).unwrap();
        assert!(orphans.is_empty());
        let local = Some(Artwork::Local {
            file_name: "art.png".into(),
        });
        assert_eq!(index.track(SongId(1)).unwrap().artwork, local);
        assert_eq!(index.playlist(PlaylistId(1)).unwrap().artwork, local);

        let orphans = index.set_track_artwork(SongId(1), "art2.png".into()).unwrap();
        assert_eq!(orphans.artwork, vec!["art.png".to_string()]);
    }

    #[test]
    fn test_replaced_artwork_carries_over_to_playlists() {
        let mut index = OfflineIndex::default();
        let mut with_cover = playlist(4);
        with_cover.cover_url = Some("https://cdn/p4.jpg".into());
        index.store(
            song(1, "A"),
            Some(&with_cover),
            "f".into(),
            Some("art.jpg".into()),
            BASE,
            now(),
        );
        let local = |file_name: &str| {
            Some(Artwork::Local {
                file_name: file_name.into(),
            })
        };
        assert_eq!(index.playlist(PlaylistId(4)).unwrap().artwork, local("art.jpg"));

        let orphans = index.set_track_artwork(SongId(1), "art2.jpg".into()).unwrap();
        assert_eq!(orphans.artwork, vec!["art.jpg".to_string()]);
        assert_eq!(index.playlist(PlaylistId(4)).unwrap().artwork, local("art2.jpg"));

        // A fresh download with new artwork does the same.
        let orphans = index.store(
            song(1, "A"),
            None,
            "f".into(),
            Some("art3.jpg".into()),
            BASE,
            now(),
        );
        assert_eq!(orphans.artwork, vec!["art2.jpg".to_string()]);
        assert_eq!(index.playlist(PlaylistId(4)).unwrap().artwork, local("art3.jpg"));
    }

    #[test]
    fn test_update_playlist_metadata() {
        let mut index = OfflineIndex::default();
        index.store(song(1, "A"), Some(&playlist(1)), "f".into(), None, BASE, now());

        let mut renamed = playlist(1);
        renamed.name = "Renamed".into();
        assert!(index.update_playlist_metadata(renamed.clone()));
        assert!(!index.update_playlist_metadata(renamed));
        assert!(!index.update_playlist_metadata(playlist(9)));

        let entry = index.playlist(PlaylistId(1)).unwrap();
        assert_eq!(entry.playlist.name, "Renamed");
        assert_eq!(entry.display_playlist(Path::new("/art")).track_count, 1);
    }

    #[test]
    fn test_snapshot_shape() {
        let mut index = OfflineIndex::default();
        index.store(song(7, "Y"), Some(&playlist(3)), "f7".into(), Some("a7".into()), BASE, now());

        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["playlists"].as_array().unwrap().len(), 1);
        assert_eq!(value["tracks"][0]["file_name"], "f7");
        assert_eq!(value["tracks"][0]["artwork"]["kind"], "local");

        let reloaded: OfflineIndex = serde_json::from_value(value).unwrap();
        assert_eq!(reloaded, index);
    }
}
