use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Client, ClientError, ClientResult};

/// Which credentials a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    /// The bearer token of the held session, if any.
    Session,
    /// HTTP Basic with the admin credentials.
    Admin,
}

/// A response body along with the bits of the response the callers care about.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// The `{ success, message, error }` envelope used by mutation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BasicResponse {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}
impl BasicResponse {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Turns the envelope into a result, preferring the server's own words for failures.
    pub fn into_result(self, status: StatusCode, default_message: &str) -> ClientResult<Option<String>> {
        if self.success {
            Ok(self.message)
        } else {
            Err(ClientError::ServerError {
                status: status.as_u16(),
                message: self
                    .error
                    .or(self.message)
                    .unwrap_or_else(|| default_message.to_string()),
            })
        }
    }
}

/// Making requests to the Noxa API.
impl Client {
    pub(crate) fn url(&self, path: &str) -> ClientResult<reqwest::Url> {
        let url = format!("{}{path}", self.base_url());
        reqwest::Url::parse(&url).map_err(|_| ClientError::InvalidUrl(url))
    }

    pub(crate) async fn request_raw(
        &self,
        method: Method,
        path: &str,
        parameters: &[(&str, String)],
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> ClientResult<RawResponse> {
        let url = self.url(path)?;
        let mut request = self.client.request(method, url).query(parameters);

        match auth {
            Auth::Session => {
                if let Some(token) = self.auth_token() {
                    request = request.bearer_auth(token);
                }
            }
            Auth::Admin => {
                let Some(header) = self.admin_auth_header() else {
                    return Err(ClientError::InvalidUrl(format!("{path} (no admin credentials)")));
                };
                request = request.header(AUTHORIZATION, header);
            }
        }

        if let Some(body) = body {
            let body = serde_json::to_vec(&body).map_err(|_| ClientError::InvalidRequest)?;
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Admin credentials are separate from the user's session.
            if auth == Auth::Session {
                self.clear_session();
            }
            return Err(ClientError::Unauthorized);
        }

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);

        Ok(RawResponse {
            status,
            bytes: response.bytes().await?.into(),
            content_type,
            content_disposition,
        })
    }

    /// Make a request and decode the JSON body as `T`.
    pub(crate) async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        parameters: &[(&str, String)],
        body: Option<serde_json::Value>,
        what: &str,
    ) -> ClientResult<T> {
        let response = self
            .request_raw(method, path, parameters, body, Auth::Session)
            .await?;
        if response.bytes.is_empty() {
            return Err(ClientError::NoData);
        }
        decode(&response.bytes, what)
    }

    /// Make a request against a mutation endpoint. A body that isn't the usual
    /// envelope counts as success, since some endpoints reply with nothing useful.
    pub(crate) async fn basic_operation(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        default_message: &str,
    ) -> ClientResult<Option<String>> {
        let response = self
            .request_raw(method, path, &[], body, Auth::Session)
            .await?;
        match BasicResponse::parse(&response.bytes) {
            Some(envelope) => envelope.into_result(response.status, default_message),
            None => Ok(None),
        }
    }

    fn admin_auth_header(&self) -> Option<String> {
        let credentials = self.admin_credentials()?;
        let login = format!("{}:{}", credentials.username, credentials.password);
        Some(format!(
            "Basic {}",
            data_encoding::BASE64.encode(login.as_bytes())
        ))
    }
}

/// Decode `bytes` as `T`, logging the raw payload when the shape is unexpected.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> ClientResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        tracing::warn!(
            "Failed to decode {what}: {e}; response: {}",
            String::from_utf8_lossy(bytes)
        );
        ClientError::DecodingFailed(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdminCredentials;

    #[test]
    fn test_basic_response_failure_prefers_error_text() {
        let envelope =
            BasicResponse::parse(br#"{"success":false,"message":"nope","error":"bad id"}"#)
                .unwrap();
        match envelope.into_result(StatusCode::BAD_REQUEST, "Request failed") {
            Err(ClientError::ServerError { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad id");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_basic_response_success_keeps_message() {
        let envelope = BasicResponse::parse(br#"{"success":true,"message":"done"}"#).unwrap();
        assert_eq!(
            envelope.into_result(StatusCode::OK, "x").unwrap().as_deref(),
            Some("done")
        );
        assert!(BasicResponse::parse(b"[]").is_none());
    }

    #[test]
    fn test_admin_auth_header() {
        let client = Client::new("http://localhost");
        assert_eq!(client.admin_auth_header(), None);

        client.set_admin_credentials(Some(AdminCredentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }));
        assert_eq!(
            client.admin_auth_header().as_deref(),
            Some("Basic YWRtaW46c2VjcmV0")
        );
    }

    #[test]
    fn test_invalid_url() {
        let client = Client::new("not a url");
        assert!(matches!(
            client.url("/api/playlists"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
