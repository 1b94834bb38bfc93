/// Configuration shared by the Noxa clients, stored as TOML.
use std::path::{Path, PathBuf};

use noxa_core::{config as cc, na};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    NoConfigDir(String),
}
impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {e}"),
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {e}"),
            ConfigError::NoConfigDir(e) => write!(f, "No config directory available: {e}"),
        }
    }
}
impl std::error::Error for ConfigError {}
impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}
impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}
impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load a TOML config file, returning `T::default()` if the file doesn't exist.
pub fn load_config<T: Default + serde::de::DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no config file found at {}, using defaults", path.display());
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// The server to talk to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Server {
    pub base_url: String,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            base_url: na::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// The signed-in session, kept so that the user stays signed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<na::User>,
}
impl Session {
    pub fn to_session(&self) -> Option<na::Session> {
        Some(na::Session {
            token: self.token.clone().filter(|t| !t.is_empty())?,
            user: self.user.clone()?,
        })
    }

    pub fn set(&mut self, session: Option<&na::Session>) {
        self.token = session.map(|s| s.token.clone());
        self.user = session.map(|s| s.user.clone());
    }

    /// Forget the saved session if the client no longer holds one, as
    /// happens after the server rejects it. Returns whether anything changed.
    pub fn forget_if_cleared(&mut self, held: Option<&na::Session>) -> bool {
        if held.is_some() || self.to_session().is_none() {
            return false;
        }
        self.set(None);
        true
    }
}

/// Credentials for the admin endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Admin {
    pub username: String,
    pub password: String,
}
impl Admin {
    pub fn to_credentials(&self) -> Option<na::AdminCredentials> {
        (!self.username.is_empty()).then(|| na::AdminCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub admin: Admin,
    #[serde(default)]
    pub offline: cc::Offline,
    #[serde(default)]
    pub playback: cc::Playback,
    #[serde(default)]
    pub connectivity: cc::Connectivity,
}
impl Config {
    pub const FILENAME: &str = "noxa.toml";

    /// `<config dir>/noxa/noxa.toml`.
    pub fn default_path() -> ConfigResult<PathBuf> {
        use etcetera::BaseStrategy as _;
        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| ConfigError::NoConfigDir(e.to_string()))?;
        Ok(strategy.config_dir().join("noxa").join(Self::FILENAME))
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        load_config(path)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string(self)?)?;
        tracing::info!("saved config to {}", path.display());
        Ok(())
    }
}
