//! The authenticated request gateway.
//!
//! One HTTP client with two cross-cutting behaviors:
//!
//! 1. **Readiness gating.** Every request suspends on a one-shot
//!    [`ReadyGate`] until the identity provider has reported its first
//!    session state, then attaches a freshly minted bearer token when a
//!    session exists. The gate closes the startup race where a request
//!    fired before restoration completes would go out unauthenticated and
//!    be wrongly treated as anonymous. Tokens are requested from the
//!    provider per call and never cached here — a stale token between
//!    refresh cycles is the provider's problem to avoid, not ours to
//!    create.
//! 2. **Authorization-loss reaction.** A 401 signs the provider out and
//!    fires the `on_auth_lost` hook exactly once process-wide, however many
//!    concurrent requests observe it; every affected caller still receives
//!    [`ClientError::AuthorizationLost`].
//!
//! The gateway owns its gate independently of any session store: gating
//! works even when nothing else observes the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use parley_auth::{IdentityProvider, ReadyGate};

use crate::error::{ClientError, read_error_detail};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type AuthLostHook = Box<dyn Fn() + Send + Sync>;

pub struct GatewayBuilder {
    base_url: String,
    provider: Option<Arc<dyn IdentityProvider>>,
    request_timeout: Duration,
    ready_timeout: Option<Duration>,
    on_auth_lost: Option<AuthLostHook>,
}

impl GatewayBuilder {
    /// Identity provider supplying session state and bearer tokens. Without
    /// one the gateway is permanently anonymous and its gate resolves at
    /// construction.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound the wait for session restoration. Elapsing fails the request
    /// outright with [`ClientError::ReadinessTimeout`]; it does not fall
    /// back to an anonymous send. Default: unbounded.
    #[must_use]
    pub fn ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Reaction to authorization loss — the application's "go back to the
    /// login entry point". Invoked at most once per process.
    #[must_use]
    pub fn on_auth_lost(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_auth_lost = Some(Box::new(hook));
        self
    }

    /// Validate the base URL, start the gate watcher, and build.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Gateway, ClientError> {
        let url = Url::parse(&self.base_url)?;
        let base_url = url.as_str().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build gateway HTTP client, using defaults: {e}");
                reqwest::Client::new()
            });

        let inner = Arc::new(Inner {
            http,
            base_url,
            provider: self.provider,
            gate: ReadyGate::new(),
            ready_timeout: self.ready_timeout,
            auth_lost: AtomicBool::new(false),
            on_auth_lost: self.on_auth_lost,
        });

        match &inner.provider {
            Some(provider) => {
                let mut state = provider.subscribe();
                let watcher = Arc::clone(&inner);
                tokio::spawn(async move {
                    loop {
                        if !state.borrow_and_update().is_restoring() {
                            break;
                        }
                        // A closed channel means the provider is gone; a
                        // permanently unresolved gate would wedge every
                        // request, so resolve and let the backend reject
                        // the unauthenticated calls by status.
                        if state.changed().await.is_err() {
                            tracing::warn!(
                                "Identity provider dropped before first state; releasing gate"
                            );
                            break;
                        }
                    }
                    watcher.gate.resolve();
                });
            }
            None => inner.gate.resolve(),
        }

        Ok(Gateway { inner })
    }
}

struct Inner {
    http: reqwest::Client,
    /// Normalized without a trailing slash; paths below start with one.
    base_url: String,
    provider: Option<Arc<dyn IdentityProvider>>,
    gate: ReadyGate,
    ready_timeout: Option<Duration>,
    auth_lost: AtomicBool,
    on_auth_lost: Option<AuthLostHook>,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> GatewayBuilder {
        GatewayBuilder {
            base_url: base_url.into(),
            provider: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ready_timeout: None,
            on_auth_lost: None,
        }
    }

    /// Whether the readiness gate has resolved.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_resolved()
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        self.execute(self.inner.http.get(self.endpoint(path))).await
    }

    pub async fn delete(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        self.execute(self.inner.http.delete(self.endpoint(path)))
            .await
    }

    pub async fn post_json<B: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ClientError> {
        self.execute(self.inner.http.post(self.endpoint(path)).json(body))
            .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<reqwest::Response, ClientError> {
        self.execute(self.inner.http.post(self.endpoint(path)).multipart(form))
            .await
    }

    fn endpoint(&self, path: &str) -> String {
        debug_assert!(path.starts_with('/'), "API paths start with '/'");
        format!("{}{path}", self.inner.base_url)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.wait_ready().await?;

        let request = match self.fresh_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.react_to_authorization_loss().await;
            return Err(ClientError::AuthorizationLost);
        }
        if !status.is_success() {
            let detail = read_error_detail(resp).await;
            tracing::debug!(%status, %detail, "Request failed");
            return Err(ClientError::Api { status, detail });
        }
        Ok(resp)
    }

    async fn wait_ready(&self) -> Result<(), ClientError> {
        match self.inner.ready_timeout {
            Some(timeout) => Ok(self.inner.gate.wait_timeout(timeout).await?),
            None => {
                self.inner.gate.wait().await;
                Ok(())
            }
        }
    }

    /// A token minted for this request, or `None` when anonymous. Asked of
    /// the provider every time; no gateway-side caching.
    async fn fresh_token(&self) -> Result<Option<String>, ClientError> {
        match &self.inner.provider {
            Some(provider) => Ok(provider.id_token().await?),
            None => Ok(None),
        }
    }

    /// First 401 wins: sign out, fire the hook. Everyone else just gets the
    /// error.
    async fn react_to_authorization_loss(&self) {
        if self.inner.auth_lost.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!("Backend rejected authorization; terminating session");
        if let Some(provider) = &self.inner.provider
            && let Err(e) = provider.sign_out().await
        {
            tracing::warn!("Sign-out after authorization loss failed: {e}");
        }
        if let Some(hook) = &self.inner.on_auth_lost {
            hook();
        }
    }
}
