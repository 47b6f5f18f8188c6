//! Error taxonomy for the request pipeline.

use parley_auth::{AuthError, ReadyTimeout};
use reqwest::StatusCode;
use thiserror::Error;

/// Cap on how much of an error body we read back for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend rejected our authorization (401). Handled globally by
    /// the gateway (sign-out + `on_auth_lost`), then still propagated so
    /// callers can stop whatever they were doing — they must not assume
    /// the session outlives this error.
    #[error("authorization rejected; the session has been terminated")]
    AuthorizationLost,

    /// Any other non-success status, with the backend's `detail` message
    /// when one was present.
    #[error("API error {status}: {detail}")]
    Api { status: StatusCode, detail: String },

    /// Fetching a bearer token from the identity provider failed.
    #[error("could not obtain bearer token: {0}")]
    Auth(#[from] AuthError),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The configured bound on waiting for session restoration elapsed.
    /// The request was never sent.
    #[error(transparent)]
    ReadinessTimeout(#[from] ReadyTimeout),

    /// The configured base URL or a derived endpoint is invalid.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Pull the human-readable `detail` out of a backend error body.
///
/// The backend wraps failures as `{"detail": "..."}`; anything else is
/// returned as the (truncated) raw body so diagnostics never vanish.
pub(crate) async fn read_error_detail(resp: reqwest::Response) -> String {
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_BYTES {
        // Back off to a char boundary; truncate panics mid-character.
        let mut cut = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_lost_message_mentions_termination() {
        assert!(
            ClientError::AuthorizationLost
                .to_string()
                .contains("terminated")
        );
    }

    #[test]
    fn api_error_formats_status_and_detail() {
        let err = ClientError::Api {
            status: StatusCode::NOT_FOUND,
            detail: "Project not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Project not found"));
    }
}
