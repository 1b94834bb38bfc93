//! Representations of Noxa's library state, as well as a way to retrieve it from the server.
//!
//! Separated out to allow for use in other utilities.
#![deny(missing_docs)]

pub use noxa_api as na;

mod song;
pub use song::{Song, SongId, album_art_url};

mod playlist;
pub use playlist::{Playlist, PlaylistId};

/// The number of songs requested per page by [`fetch_all_songs`].
pub const LIBRARY_PAGE_SIZE: u32 = 500;

/// Fetches every song in the library, a page at a time.
///
/// `on_songs_fetched` is called with the number of songs that were just fetched,
/// as well as the total number of songs fetched so far.
pub async fn fetch_all_songs(
    client: &na::Client,
    on_songs_fetched: impl Fn(u32, u32),
) -> na::ClientResult<Vec<Song>> {
    let mut offset = 0;
    let mut songs = vec![];
    loop {
        let page = client
            .fetch_songs(Some(LIBRARY_PAGE_SIZE), offset)
            .await?;
        if page.is_empty() {
            break;
        }

        let page_len = page.len() as u32;
        songs.extend(page.into_iter().map(Song::from));
        offset += page_len;
        on_songs_fetched(page_len, offset);

        // A short page is the last one; saves a round trip.
        if page_len < LIBRARY_PAGE_SIZE {
            break;
        }
    }
    Ok(songs)
}
