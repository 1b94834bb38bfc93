use std::collections::VecDeque;

use crate::state::{Playlist, Song};

/// The songs queued for playback and the cursor into them.
///
/// Whenever the queue is non-empty, the cursor points at a song in it.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    songs: Vec<Song>,
    current_index: usize,
    playlist: Option<Playlist>,
}
impl PlayQueue {
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.songs.is_empty()).then_some(self.current_index)
    }

    pub fn current(&self) -> Option<&Song> {
        self.songs.get(self.current_index)
    }

    /// The playlist the queue was started from. `None` for ad-hoc queues.
    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    pub fn is_at_end(&self) -> bool {
        self.current_index + 1 >= self.songs.len()
    }

    /// Replace the queue. `start_at` is clamped to the last song. An empty
    /// list leaves the queue untouched and returns `None`.
    pub fn replace(
        &mut self,
        songs: Vec<Song>,
        start_at: usize,
        playlist: Option<Playlist>,
    ) -> Option<&Song> {
        if songs.is_empty() {
            return None;
        }
        self.current_index = start_at.min(songs.len() - 1);
        self.songs = songs;
        self.playlist = playlist;
        self.current()
    }

    /// Move to the next song, if there is one.
    pub fn advance(&mut self) -> Option<&Song> {
        if self.is_at_end() {
            return None;
        }
        self.current_index += 1;
        self.current()
    }

    /// Move to the previous song, if there is one.
    pub fn step_back(&mut self) -> Option<&Song> {
        if self.songs.is_empty() || self.current_index == 0 {
            return None;
        }
        self.current_index -= 1;
        self.current()
    }

    /// Remove the current song. The song after it becomes current, or the new
    /// last song if the removed one was last. Returns the new current song.
    pub fn remove_current(&mut self) -> Option<&Song> {
        if self.songs.is_empty() {
            return None;
        }
        self.songs.remove(self.current_index);
        if self.songs.is_empty() {
            self.clear();
            return None;
        }
        self.current_index = self.current_index.min(self.songs.len() - 1);
        self.current()
    }

    /// Append recommendations and move to the first of them. The queue no
    /// longer belongs to a playlist afterwards.
    pub fn append_recommendations(&mut self, songs: Vec<Song>) -> Option<&Song> {
        if songs.is_empty() {
            return None;
        }
        let first = self.songs.len();
        self.songs.extend(songs);
        self.current_index = first;
        self.playlist = None;
        self.current()
    }

    pub fn clear(&mut self) {
        self.songs.clear();
        self.current_index = 0;
        self.playlist = None;
    }
}

/// Recently played songs, most recent first, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct RecentlyPlayed(VecDeque<Song>);
impl RecentlyPlayed {
    pub const CAPACITY: usize = 25;

    pub fn record(&mut self, song: &Song) {
        self.0.retain(|s| s.id != song.id);
        self.0.push_front(song.clone());
        self.0.truncate(Self::CAPACITY);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::{
        state::SongId,
        test_support::{playlist, song},
    };

    fn songs(ids: impl IntoIterator<Item = u64>) -> Vec<Song> {
        ids.into_iter().map(|id| song(id, "A")).collect()
    }

    fn current_id(queue: &PlayQueue) -> Option<u64> {
        queue.current().map(|s| s.id.0)
    }

    #[test]
    fn test_replace_clamps_start() {
        let mut queue = PlayQueue::default();
        assert_eq!(queue.replace(songs([1, 2, 3]), 10, None).map(|s| s.id), Some(SongId(3)));
        assert_eq!(queue.current_index(), Some(2));

        assert!(queue.replace(vec![], 0, Some(playlist(1))).is_none());
        assert_eq!(queue.len(), 3);
        assert!(queue.playlist().is_none());
    }

    #[test]
    fn test_advance_and_step_back() {
        let mut queue = PlayQueue::default();
        queue.replace(songs([1, 2]), 0, Some(playlist(4)));

        assert_eq!(queue.step_back().map(|s| s.id), None);
        assert_eq!(queue.advance().map(|s| s.id), Some(SongId(2)));
        assert!(queue.is_at_end());
        assert_eq!(queue.advance().map(|s| s.id), None);
        assert_eq!(current_id(&queue), Some(2));
        assert_eq!(queue.step_back().map(|s| s.id), Some(SongId(1)));
    }

    #[test]
    fn test_remove_current() {
        let mut queue = PlayQueue::default();
        queue.replace(songs([1, 2, 3]), 1, Some(playlist(1)));

        assert_eq!(queue.remove_current().map(|s| s.id), Some(SongId(3)));
        assert_eq!(queue.remove_current().map(|s| s.id), Some(SongId(1)));
        assert!(queue.playlist().is_some());
        assert_eq!(queue.remove_current().map(|s| s.id), None);
        assert!(queue.is_empty());
        assert!(queue.playlist().is_none());
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_append_recommendations() {
        let mut queue = PlayQueue::default();
        queue.replace(songs([1, 2]), 1, Some(playlist(1)));

        assert!(queue.append_recommendations(vec![]).is_none());
        assert!(queue.playlist().is_some());

        assert_eq!(
            queue.append_recommendations(songs([8, 9])).map(|s| s.id),
            Some(SongId(8))
        );
        assert_eq!(queue.current_index(), Some(2));
        assert!(queue.playlist().is_none());
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = PlayQueue::default();
        let mut next_id = 0;

        for _ in 0..2000 {
            match rng.random_range(0..6) {
                0 => {
                    let len = rng.random_range(0..5);
                    let start = rng.random_range(0..8);
                    queue.replace(songs(next_id..next_id + len), start, None);
                    next_id += len;
                }
                1 => {
                    queue.advance();
                }
                2 => {
                    queue.step_back();
                }
                3 => {
                    queue.remove_current();
                }
                4 => {
                    let len = rng.random_range(0..3);
                    queue.append_recommendations(songs(next_id..next_id + len));
                    next_id += len;
                }
                _ => {
                    if rng.random_bool(0.1) {
                        queue.clear();
                    }
                }
            }

            match queue.current_index() {
                Some(index) => assert!(index < queue.len()),
                None => assert!(queue.is_empty()),
            }
            assert_eq!(queue.current().is_some(), !queue.is_empty());
        }
    }

    #[test]
    fn test_recently_played() {
        let mut recent = RecentlyPlayed::default();
        for id in 0..30 {
            recent.record(&song(id, "A"));
        }
        recent.record(&song(20, "A"));

        assert_eq!(recent.len(), RecentlyPlayed::CAPACITY);
        let ids: Vec<u64> = recent.iter().map(|s| s.id.0).collect();
        assert_eq!(ids[..3], [20, 29, 28]);
        assert_eq!(ids.iter().filter(|id| **id == 20).count(), 1);
        assert!(!ids.contains(&4));
    }
}
