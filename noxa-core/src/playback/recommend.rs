use std::collections::HashSet;

use rand::Rng;

use super::{PlayQueue, RecentlyPlayed};
use crate::state::{Song, SongId};

/// How many songs are appended when the queue runs out.
pub const MAX_RECOMMENDATIONS: usize = 10;

const SHARED_ARTIST_SCORE: f64 = 10.0;
const QUEUE_ARTIST_SCORE: f64 = 15.0;
const QUEUE_ALBUM_SCORE: f64 = 8.0;
const MAX_JITTER: f64 = 5.0;

/// Pick songs from `library` to follow the queue.
///
/// Songs already queued are skipped. The rest are scored by how well their
/// artist and album match the queue and recent history, with a little noise
/// so that the same queue doesn't always continue the same way.
pub fn recommend(
    queue: &PlayQueue,
    recent: &RecentlyPlayed,
    library: &[Song],
    rng: &mut impl Rng,
) -> Vec<Song> {
    let queued: HashSet<SongId> = queue.songs().iter().map(|s| s.id).collect();
    let queue_artists: HashSet<String> = queue
        .songs()
        .iter()
        .map(|s| s.artist.to_lowercase())
        .collect();
    let queue_albums: HashSet<String> = queue
        .songs()
        .iter()
        .filter_map(|s| s.album.as_ref().map(|a| a.to_lowercase()))
        .collect();
    let known_artists: HashSet<String> = recent
        .iter()
        .map(|s| s.artist.to_lowercase())
        .chain(queue_artists.iter().cloned())
        .collect();

    let mut scored: Vec<(f64, &Song)> = library
        .iter()
        .filter(|song| !queued.contains(&song.id))
        .map(|song| {
            let artist = song.artist.to_lowercase();
            let mut score = 0.0;
            if known_artists.contains(&artist) {
                score += SHARED_ARTIST_SCORE;
            }
            if queue_artists.contains(&artist) {
                score += QUEUE_ARTIST_SCORE;
            }
            if song
                .album
                .as_ref()
                .is_some_and(|a| queue_albums.contains(&a.to_lowercase()))
            {
                score += QUEUE_ALBUM_SCORE;
            }
            score += rng.random_range(0.0..MAX_JITTER);
            (score, song)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|(_, song)| song.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::test_support::{song, song_on_album};

    fn queue_of(songs: Vec<Song>) -> PlayQueue {
        let mut queue = PlayQueue::default();
        queue.replace(songs, 0, None);
        queue
    }

    #[test]
    fn test_excludes_queued_songs() {
        let queue = queue_of(vec![song(1, "A"), song(2, "A")]);
        let library = vec![song(1, "A"), song(2, "A"), song(3, "B")];
        let picks = recommend(
            &queue,
            &RecentlyPlayed::default(),
            &library,
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(picks.iter().map(|s| s.id.0).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_prefers_queue_artist() {
        let queue = queue_of(vec![song(1, "Artist A")]);
        let library = vec![song(2, "artist a"), song(3, "Artist B")];

        for seed in 0..50 {
            let picks = recommend(
                &queue,
                &RecentlyPlayed::default(),
                &library,
                &mut StdRng::seed_from_u64(seed),
            );
            assert_eq!(picks[0].id.0, 2, "seed {seed}");
        }
    }

    #[test]
    fn test_recent_artist_and_album_boosts() {
        let queue = queue_of(vec![song_on_album(1, "A", "Blue")]);
        let mut recent = RecentlyPlayed::default();
        recent.record(&song(50, "R"));
        let library = vec![
            song(2, "Z"),
            song(3, "R"),
            song_on_album(4, "Y", "BLUE"),
        ];

        for seed in 0..50 {
            let picks = recommend(&queue, &recent, &library, &mut StdRng::seed_from_u64(seed));
            // Recent artist (+10) and album match (+8) both beat no match.
            assert_eq!(picks.last().unwrap().id.0, 2, "seed {seed}");
        }
    }

    #[test]
    fn test_caps_and_empty_library() {
        let queue = queue_of(vec![song(0, "A")]);
        let library: Vec<Song> = (1..40).map(|id| song(id, "B")).collect();
        let mut rng = StdRng::seed_from_u64(3);

        let picks = recommend(&queue, &RecentlyPlayed::default(), &library, &mut rng);
        assert_eq!(picks.len(), MAX_RECOMMENDATIONS);
        assert!(recommend(&queue, &RecentlyPlayed::default(), &[], &mut rng).is_empty());
    }
}
