use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

use crate::{Client, ClientError, ClientResult, request::Auth};

/// What kind of results an online search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnlineSearchType {
    /// Individual tracks.
    #[default]
    Tracks,
    /// Artists.
    Artists,
    /// Albums.
    Albums,
}
impl OnlineSearchType {
    /// The value the server expects in the `type` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineSearchType::Tracks => "track",
            OnlineSearchType::Artists => "artist",
            OnlineSearchType::Albums => "album",
        }
    }
}

/// A track found by an online search, not (yet) part of the library.
///
/// The upstream providers disagree on field names, so decoding accepts
/// several aliases for most fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteTrack {
    /// The provider's identifier
    pub id: String,
    /// The track title
    pub title: String,
    /// The artist name; empty if unknown
    pub artist_name: String,
    /// The album title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_title: Option<String>,
    /// The duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// The artwork URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// A preview clip URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// The provider name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The kind of result
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
impl RemoteTrack {
    /// A secondary line for display: the artist, else the album, else the source.
    pub fn subtitle(&self) -> String {
        if !self.artist_name.is_empty() {
            return self.artist_name.clone();
        }
        if let Some(album) = self.album_title.as_ref().filter(|a| !a.is_empty()) {
            return album.clone();
        }
        self.source.clone().unwrap_or_default()
    }
}
impl<'de> Deserialize<'de> for RemoteTrack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = value else {
            return Err(D::Error::custom("remote track is not an object"));
        };

        let string = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let named = |key: &str, name_keys: &[&str]| match map.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(obj)) => name_keys
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        };

        let id = match map.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let title = string("title")
            .or_else(|| string("name"))
            .unwrap_or_else(|| "Unknown Title".to_string());
        let artist_name = named("artist", &["name"])
            .or_else(|| string("artist_name"))
            .unwrap_or_default();
        let album_title = named("album", &["title", "name"]).or_else(|| string("album_name"));
        let duration = map
            .get("duration")
            .and_then(Value::as_u64)
            .or_else(|| map.get("duration_ms").and_then(Value::as_u64).map(|ms| ms / 1000))
            .map(|d| d as u32);
        let image = string("image")
            .or_else(|| string("picture"))
            .or_else(|| string("cover"));

        Ok(RemoteTrack {
            id,
            title,
            artist_name,
            album_title,
            duration,
            image,
            preview: string("preview"),
            source: string("source"),
            kind: string("type"),
        })
    }
}

/// Extract the tracks from an online search body. The results may be a plain
/// array, or wrapped under any of `data`, `items`, `results` or `tracks`.
pub fn parse_online_search(bytes: &[u8]) -> ClientResult<Vec<RemoteTrack>> {
    let value: Value = crate::request::decode(bytes, "online search")?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => ["data", "items", "results", "tracks"]
            .into_iter()
            .find_map(|key| map.remove(key).filter(|v| !v.is_null()))
            .unwrap_or(Value::Array(vec![])),
        _ => {
            tracing::warn!(
                "Online search decode error: {}",
                String::from_utf8_lossy(bytes)
            );
            return Err(ClientError::DecodingFailed(serde_json::Error::custom(
                "online search response is neither an array nor an object",
            )));
        }
    };
    serde_json::from_value(list).map_err(ClientError::DecodingFailed)
}

/// Search-related functionality.
impl Client {
    /// Search the providers for tracks that aren't in the library.
    pub async fn search_online_tracks(
        &self,
        query: &str,
        kind: OnlineSearchType,
    ) -> ClientResult<Vec<RemoteTrack>> {
        let response = self
            .request_raw(
                Method::GET,
                "/api/music/search",
                &[
                    ("q", query.to_string()),
                    ("type", kind.as_str().to_string()),
                    ("limit", "30".to_string()),
                ],
                None,
                Auth::Session,
            )
            .await?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        parse_online_search(&response.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_track_aliases() {
        let track: RemoteTrack = serde_json::from_str(
            r#"{"id":42,"name":"Song","artist":{"id":"a1","name":"Band"},"album":{"name":"Record"},"duration_ms":185500,"picture":"http://img"}"#,
        )
        .unwrap();
        assert_eq!(track.id, "42");
        assert_eq!(track.title, "Song");
        assert_eq!(track.artist_name, "Band");
        assert_eq!(track.album_title.as_deref(), Some("Record"));
        assert_eq!(track.duration, Some(185));
        assert_eq!(track.image.as_deref(), Some("http://img"));
    }

    #[test]
    fn test_remote_track_fallbacks() {
        let track: RemoteTrack =
            serde_json::from_str(r#"{"artist_name":"Solo","album_name":"Alb","source":"deezer"}"#)
                .unwrap();
        assert!(!track.id.is_empty());
        assert_eq!(track.title, "Unknown Title");
        assert_eq!(track.artist_name, "Solo");
        assert_eq!(track.album_title.as_deref(), Some("Alb"));
        assert_eq!(track.subtitle(), "Solo");
    }

    #[test]
    fn test_parse_online_search_wrappers() {
        let plain = parse_online_search(br#"[{"id":"1","title":"A"}]"#).unwrap();
        assert_eq!(plain.len(), 1);

        for key in ["data", "items", "results", "tracks"] {
            let body = format!(r#"{{"success":true,"{key}":[{{"id":"1","title":"A"}},{{"id":"2","title":"B"}}]}}"#);
            let tracks = parse_online_search(body.as_bytes()).unwrap();
            assert_eq!(tracks.len(), 2, "wrapper key {key}");
        }

        let empty = parse_online_search(br#"{"success":true}"#).unwrap();
        assert!(empty.is_empty());

        assert!(parse_online_search(b"\"nope\"").is_err());
    }
}
