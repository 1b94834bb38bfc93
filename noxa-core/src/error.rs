use crate::na;

/// An error from the offline cache.
#[derive(Debug)]
pub enum OfflineError {
    /// Reading or writing the cache directory failed.
    Io(std::io::Error),
    /// The metadata snapshot could not be encoded or decoded.
    Json(serde_json::Error),
    /// Fetching a file from the server failed.
    Client(na::ClientError),
    /// No cache directory could be determined for this platform.
    NoCacheDir(String),
}
impl std::fmt::Display for OfflineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfflineError::Io(e) => write!(f, "I/O error: {e}"),
            OfflineError::Json(e) => write!(f, "Offline metadata error: {e}"),
            OfflineError::Client(e) => write!(f, "{e}"),
            OfflineError::NoCacheDir(e) => write!(f, "No cache directory available: {e}"),
        }
    }
}
impl std::error::Error for OfflineError {}
impl From<std::io::Error> for OfflineError {
    fn from(e: std::io::Error) -> Self {
        OfflineError::Io(e)
    }
}
impl From<serde_json::Error> for OfflineError {
    fn from(e: serde_json::Error) -> Self {
        OfflineError::Json(e)
    }
}
impl From<na::ClientError> for OfflineError {
    fn from(e: na::ClientError) -> Self {
        OfflineError::Client(e)
    }
}
pub type OfflineResult<T> = Result<T, OfflineError>;
