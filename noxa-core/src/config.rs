use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{OfflineError, OfflineResult, na};

/// Where the offline cache lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Offline {
    /// Overrides the platform data directory.
    pub cache_dir: Option<PathBuf>,
}
impl Offline {
    /// The configured cache directory, or `<data dir>/noxa/OfflineCache`.
    pub fn resolve_cache_dir(&self) -> OfflineResult<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        Ok(data_dir()?.join("OfflineCache"))
    }
}

/// Playback settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Playback {
    /// Used to build a stream URL when the configured server address is unusable.
    pub fallback_base_url: String,
    /// Where artwork fetched for the now-playing display is kept.
    pub now_playing_dir: Option<PathBuf>,
}
impl Default for Playback {
    fn default() -> Self {
        Self {
            fallback_base_url: na::DEFAULT_BASE_URL.to_string(),
            now_playing_dir: None,
        }
    }
}
impl Playback {
    /// The configured now-playing directory, or `<cache dir>/noxa/NowPlaying`.
    pub fn resolve_now_playing_dir(&self) -> OfflineResult<PathBuf> {
        if let Some(dir) = &self.now_playing_dir {
            return Ok(dir.clone());
        }
        use etcetera::BaseStrategy as _;
        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| OfflineError::NoCacheDir(e.to_string()))?;
        Ok(strategy.cache_dir().join("noxa").join("NowPlaying"))
    }
}

/// Connectivity probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Connectivity {
    /// Whether to ping the server periodically.
    pub probe_enabled: bool,
    /// Seconds between pings.
    pub probe_interval_secs: u64,
}
impl Default for Connectivity {
    fn default() -> Self {
        Self {
            probe_enabled: true,
            probe_interval_secs: 30,
        }
    }
}

/// `<data dir>/noxa`.
pub fn data_dir() -> OfflineResult<PathBuf> {
    use etcetera::BaseStrategy as _;
    let strategy =
        etcetera::choose_base_strategy().map_err(|e| OfflineError::NoCacheDir(e.to_string()))?;
    Ok(strategy.data_dir().join("noxa"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dirs_win() {
        let offline = Offline {
            cache_dir: Some(PathBuf::from("/tmp/noxa-cache")),
        };
        assert_eq!(
            offline.resolve_cache_dir().unwrap(),
            PathBuf::from("/tmp/noxa-cache")
        );

        let playback = Playback {
            now_playing_dir: Some(PathBuf::from("/tmp/np")),
            ..Default::default()
        };
        assert_eq!(
            playback.resolve_now_playing_dir().unwrap(),
            PathBuf::from("/tmp/np")
        );
        assert_eq!(playback.fallback_base_url, "https://stream.noxamusic.com");
    }
}
