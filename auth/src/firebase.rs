//! Firebase Auth over its REST surface.
//!
//! The hosted SDKs speak two Google endpoints; we speak them directly:
//!
//! - Identity Toolkit (`accounts:signInWithPassword`, `accounts:signUp`,
//!   `accounts:update`, `accounts:lookup`) for credential operations,
//! - Secure Token (`/token`) for exchanging the long-lived refresh token
//!   for a short-lived ID token.
//!
//! Session restoration happens on a spawned task at construction: the
//! persisted refresh token (if any) is exchanged and the profile looked up,
//! then the watch channel leaves `Restoring` exactly once — to
//! `Authenticated` or `Anonymous` — which is what downstream readiness
//! gates key on.
//!
//! `id_token()` serves the cached ID token while it has comfortable
//! validity remaining and refreshes otherwise. Callers request a token per
//! outgoing request; the caching lives here, never in the gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use parley_types::{AuthUser, SessionState};

use crate::AuthError;
use crate::provider::IdentityProvider;
use crate::token_store::{self, StoredSession};

/// Canonical Identity Toolkit base URL.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
/// Canonical Secure Token base URL.
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh when the cached ID token has less than this much validity left.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Fallback when the provider omits or mangles `expiresIn`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

const MAX_ERROR_BODY_CHARS: usize = 2048;

#[derive(Debug, Clone)]
struct TokenSet {
    uid: String,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

/// Builder for [`FirebaseAuth`]; endpoint overrides exist for tests.
pub struct FirebaseAuthBuilder {
    api_key: String,
    identity_url: String,
    token_url: String,
    session_file: Option<PathBuf>,
}

impl FirebaseAuthBuilder {
    #[must_use]
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = url.into();
        self
    }

    #[must_use]
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Where the durable session record lives. Defaults to
    /// [`crate::default_session_file`]; pass `None` to disable persistence.
    #[must_use]
    pub fn session_file(mut self, path: Option<PathBuf>) -> Self {
        self.session_file = path;
        self
    }

    /// Construct the provider and start session restoration.
    ///
    /// Must be called from within a Tokio runtime: restoration runs on a
    /// spawned task so construction never blocks on the network.
    #[must_use]
    pub fn build(self) -> Arc<FirebaseAuth> {
        let provider = Arc::new(FirebaseAuth {
            http: build_http(),
            api_key: self.api_key,
            identity_url: self.identity_url,
            token_url: self.token_url,
            session_file: self.session_file,
            tokens: Mutex::new(None),
            state: watch::Sender::new(SessionState::Restoring),
        });
        let restoring = Arc::clone(&provider);
        tokio::spawn(async move { restoring.restore().await });
        provider
    }
}

/// Firebase-backed [`IdentityProvider`].
pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
    identity_url: String,
    token_url: String,
    session_file: Option<PathBuf>,
    tokens: Mutex<Option<TokenSet>>,
    state: watch::Sender<SessionState>,
}

impl FirebaseAuth {
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> FirebaseAuthBuilder {
        FirebaseAuthBuilder {
            api_key: api_key.into(),
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
            session_file: token_store::default_session_file(),
        }
    }

    /// Construct with the canonical endpoints and default session file.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Arc<Self> {
        Self::builder(api_key).build()
    }

    async fn restore(&self) {
        let saved = self
            .session_file
            .as_deref()
            .and_then(token_store::load);
        let Some(saved) = saved else {
            self.settle(SessionState::Anonymous);
            return;
        };

        match self.restore_from(&saved).await {
            Ok((user, tokens)) => {
                tracing::debug!(uid = %user.uid, "Session restored");
                // Hold the token slot across the state change: the instant
                // settle publishes Authenticated, a gated request may call
                // id_token(), and it must find these tokens rather than an
                // empty slot.
                let mut slot = self.tokens.lock().await;
                if self.settle(SessionState::Authenticated(user)) {
                    self.persist_record(&tokens);
                    *slot = Some(tokens);
                }
            }
            Err(e) => {
                tracing::warn!("Session restoration failed, starting anonymous: {e}");
                if self.settle(SessionState::Anonymous)
                    && let Some(path) = self.session_file.as_deref()
                {
                    token_store::clear(path);
                }
            }
        }
    }

    /// Publish restoration's outcome, unless an explicit sign-in already
    /// settled the state while restoration was in flight. Restoring is left
    /// exactly once either way.
    fn settle(&self, outcome: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_restoring() {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    async fn restore_from(
        &self,
        saved: &StoredSession,
    ) -> Result<(AuthUser, TokenSet), AuthError> {
        let refreshed = self.exchange_refresh_token(&saved.refresh_token).await?;
        let profile = self.lookup(&refreshed.id_token).await?;
        let user = AuthUser {
            uid: profile.local_id,
            email: profile.email.unwrap_or_default(),
            display_name: profile.display_name,
        };
        let tokens = TokenSet {
            uid: user.uid.clone(),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: expiry_from(&refreshed.expires_in),
        };
        Ok((user, tokens))
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshResponse, AuthError> {
        let url = format!("{}/token?key={}", self.token_url, self.api_key);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        decode_response(resp).await
    }

    async fn lookup(&self, id_token: &str) -> Result<LookupUser, AuthError> {
        let url = format!("{}/accounts:lookup?key={}", self.identity_url, self.api_key);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        let body: LookupResponse = decode_response(resp).await?;
        body.users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Provider("account lookup returned no users".into()))
    }

    /// Install a fresh token set, persist the refresh token, and publish
    /// the authenticated state.
    async fn install_session(&self, user: AuthUser, tokens: TokenSet) {
        self.store_tokens(tokens).await;
        self.state.send_replace(SessionState::Authenticated(user));
    }

    async fn store_tokens(&self, tokens: TokenSet) {
        self.persist_record(&tokens);
        *self.tokens.lock().await = Some(tokens);
    }

    fn persist_record(&self, tokens: &TokenSet) {
        if let Some(path) = self.session_file.as_deref() {
            let record = StoredSession {
                uid: tokens.uid.clone(),
                refresh_token: tokens.refresh_token.clone(),
            };
            if let Err(e) = token_store::save(path, &record) {
                tracing::warn!("Failed to persist session record: {e}");
            }
        }
    }

    async fn post_accounts<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<T, AuthError> {
        let url = format!(
            "{}/accounts:{operation}?key={}",
            self.identity_url, self.api_key
        );
        let resp = self.http.post(&url).json(body).send().await?;
        decode_response(resp).await
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let resp: SignInResponse = self
            .post_accounts(
                "signInWithPassword",
                &json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        let user = AuthUser {
            uid: resp.local_id.clone(),
            email: resp.email.unwrap_or_else(|| email.to_string()),
            display_name: resp.display_name,
        };
        self.install_session(
            user,
            TokenSet {
                uid: resp.local_id,
                id_token: resp.id_token,
                refresh_token: resp.refresh_token,
                expires_at: expiry_from(&resp.expires_in),
            },
        )
        .await;
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), AuthError> {
        let resp: SignInResponse = self
            .post_accounts(
                "signUp",
                &json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        if let Some(name) = display_name {
            let _: serde_json::Value = self
                .post_accounts(
                    "update",
                    &json!({
                        "idToken": resp.id_token,
                        "displayName": name,
                        "returnSecureToken": false,
                    }),
                )
                .await?;
        }

        let user = AuthUser {
            uid: resp.local_id.clone(),
            email: resp.email.unwrap_or_else(|| email.to_string()),
            display_name: display_name.map(ToString::to_string),
        };
        self.install_session(
            user,
            TokenSet {
                uid: resp.local_id,
                id_token: resp.id_token,
                refresh_token: resp.refresh_token,
                expires_at: expiry_from(&resp.expires_in),
            },
        )
        .await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.tokens.lock().await = None;
        if let Some(path) = self.session_file.as_deref() {
            token_store::clear(path);
        }
        self.state.send_replace(SessionState::Anonymous);
        Ok(())
    }

    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        let mut guard = self.tokens.lock().await;
        let Some(tokens) = guard.as_mut() else {
            return Ok(None);
        };

        if tokens.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
            return Ok(Some(tokens.id_token.clone()));
        }

        let refresh_token = tokens.refresh_token.clone();
        let refreshed = self.exchange_refresh_token(&refresh_token).await?;
        tokens.id_token = refreshed.id_token.clone();
        tokens.refresh_token = refreshed.refresh_token;
        tokens.expires_at = expiry_from(&refreshed.expires_in);

        // Refresh tokens rotate; keep the durable record current.
        self.persist_record(tokens);
        Ok(Some(refreshed.id_token))
    }
}

fn build_http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build identity HTTP client, using defaults: {e}");
            reqwest::Client::new()
        })
}

fn expiry_from(expires_in: &str) -> Instant {
    let secs = expires_in
        .parse::<u64>()
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    Instant::now() + Duration::from_secs(secs)
}

async fn decode_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(parse_error(status, &body))
}

fn parse_error(status: reqwest::StatusCode, body: &str) -> AuthError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => AuthError::from_firebase_code(&parsed.error.message),
        Err(_) => {
            let mut detail = body.trim().to_string();
            if detail.len() > MAX_ERROR_BODY_CHARS {
                // Back off to a char boundary; truncate panics mid-character.
                let mut cut = MAX_ERROR_BODY_CHARS;
                while !detail.is_char_boundary(cut) {
                    cut -= 1;
                }
                detail.truncate(cut);
            }
            AuthError::Provider(format!("HTTP {status}: {detail}"))
        }
    }
}

/// Shared shape of `signInWithPassword` and `signUp` responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}
