use std::sync::RwLock;

use crate::{AdminCredentials, User};

/// The server used when none has been configured.
pub const DEFAULT_BASE_URL: &str = "https://stream.noxamusic.com";

#[derive(Debug)]
/// An error that can occur when interacting with the client.
pub enum ClientError {
    /// The URL for the request could not be constructed.
    InvalidUrl(String),
    /// The server did not return a usable HTTP response.
    InvalidResponse,
    /// The server returned an empty body where data was expected.
    NoData,
    /// The server rejected the session (HTTP 401). The held session has been cleared.
    Unauthorized,
    /// The response body did not have the expected shape.
    DecodingFailed(serde_json::Error),
    /// The request payload could not be built.
    InvalidRequest,
    /// An error that occurred when making a request.
    ReqwestError(reqwest::Error),
    /// The server reported a failure with a message.
    ServerError {
        /// The HTTP status code.
        status: u16,
        /// The message the server attached to the failure.
        message: String,
    },
}
impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::InvalidUrl(url) => write!(f, "Invalid URL: {url}"),
            ClientError::InvalidResponse => write!(f, "Invalid response from server"),
            ClientError::NoData => write!(f, "No data received from server"),
            ClientError::Unauthorized => write!(f, "Session expired. Please sign in again."),
            ClientError::DecodingFailed(e) => write!(f, "Failed to decode server response: {e}"),
            ClientError::InvalidRequest => write!(f, "The provided data is invalid"),
            ClientError::ReqwestError(e) => write!(f, "Reqwest error: {e}"),
            ClientError::ServerError { status, message } => {
                write!(f, "Server error ({status}): {message}")
            }
        }
    }
}
impl std::error::Error for ClientError {}
impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::ReqwestError(e)
    }
}
impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::DecodingFailed(e)
    }
}
/// A result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// An authenticated session: the bearer token and the user it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// The bearer token sent with every request.
    pub token: String,
    /// The signed-in user.
    pub user: User,
}

/// A client for the Noxa Music API.
pub struct Client {
    pub(crate) base_url: RwLock<String>,
    pub(crate) session: RwLock<Option<Session>>,
    pub(crate) admin_credentials: RwLock<Option<AdminCredentials>>,
    pub(crate) client: reqwest::Client,
}
impl Client {
    /// Create a new client without a session.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: RwLock::new(normalize_base_url(base_url.into())),
            session: RwLock::new(None),
            admin_credentials: RwLock::new(None),
            client: reqwest::Client::new(),
        }
    }

    /// Create a new client that resumes a previously saved session.
    pub fn with_session(base_url: impl Into<String>, session: Option<Session>) -> Self {
        let client = Self::new(base_url);
        *client.session.write().unwrap() = session;
        client
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> String {
        self.base_url.read().unwrap().clone()
    }

    /// Point the client at a different server.
    pub fn set_base_url(&self, base_url: impl Into<String>) {
        *self.base_url.write().unwrap() = normalize_base_url(base_url.into());
    }

    /// The current session, if signed in.
    pub fn session(&self) -> Option<Session> {
        self.session.read().unwrap().clone()
    }

    /// The current bearer token, if signed in.
    pub fn auth_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Whether a session is held.
    pub fn is_authenticated(&self) -> bool {
        self.session.read().unwrap().is_some()
    }

    /// Replace the held session.
    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap() = session;
    }

    /// Drop the held session. Called for every 401 response.
    pub fn clear_session(&self) {
        if self.session.write().unwrap().take().is_some() {
            tracing::info!("Cleared session");
        }
    }

    /// Sign out locally. The server keeps no session state to revoke.
    pub fn logout(&self) {
        self.clear_session();
    }

    /// Set the credentials used for the admin endpoints.
    pub fn set_admin_credentials(&self, credentials: Option<AdminCredentials>) {
        *self.admin_credentials.write().unwrap() = credentials;
    }

    /// The credentials used for the admin endpoints, if set.
    pub fn admin_credentials(&self) -> Option<AdminCredentials> {
        self.admin_credentials.read().unwrap().clone()
    }
}

fn normalize_base_url(base_url: String) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = Client::new(" https://music.example.com/ ");
        assert_eq!(client.base_url(), "https://music.example.com");

        client.set_base_url("http://localhost:3000//");
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_clear_session() {
        let client = Client::with_session(
            DEFAULT_BASE_URL,
            Some(Session {
                token: "abc".to_string(),
                user: User {
                    id: 1,
                    username: "listener".to_string(),
                    email: None,
                    is_admin: None,
                    last_login: None,
                },
            }),
        );
        assert!(client.is_authenticated());
        assert_eq!(client.auth_token().as_deref(), Some("abc"));

        client.clear_session();
        assert!(!client.is_authenticated());
        assert_eq!(client.auth_token(), None);
    }
}
