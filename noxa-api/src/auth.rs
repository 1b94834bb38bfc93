use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::{Client, ClientResult, Session};

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The unique identifier
    pub id: u64,
    /// The login name
    pub username: String,
    /// The e-mail address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the user is an administrator. The server sends either a bool or 0/1.
    #[serde(
        default,
        deserialize_with = "bool_or_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_admin: Option<bool>,
    /// When the user last signed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
    user: User,
    token: String,
}

/// Authentication.
impl Client {
    /// Sign in, holding the resulting session.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        self.authenticate("/api/auth/login", username, password)
            .await
    }

    /// Create an account and sign in to it.
    pub async fn signup(&self, username: &str, password: &str) -> ClientResult<Session> {
        self.authenticate("/api/auth/signup", username, password)
            .await
    }

    async fn authenticate(
        &self,
        endpoint: &str,
        username: &str,
        password: &str,
    ) -> ClientResult<Session> {
        let response = self
            .request_json::<AuthResponse>(
                Method::POST,
                endpoint,
                &[],
                Some(json!({ "username": username, "password": password })),
                "auth response",
            )
            .await?;

        let session = Session {
            token: response.token,
            user: response.user,
        };
        tracing::info!("Signed in as {}", session.user.username);
        self.set_session(Some(session.clone()));
        Ok(session)
    }
}
