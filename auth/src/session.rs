//! The session store: single source of truth for "who is logged in".
//!
//! An explicit context object handed to whoever needs it (no ambient
//! singleton): it holds the provider handle and a receiver on the provider's
//! state channel. Login/register/logout delegate to the provider and mutate
//! no local state — the provider's change notification is canonical, which
//! avoids double-bookkeeping and races against it.
//!
//! An unconfigured store (no provider) is fully functional: reads report an
//! anonymous, non-loading session; `login`/`register` fail fast with
//! [`AuthError::NotConfigured`] before any network call; `logout` is a
//! no-op.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use parley_types::{AuthUser, NewAccount, SessionState};

use crate::AuthError;
use crate::provider::IdentityProvider;

/// Best-effort hook notifying the platform backend of a new account.
///
/// Injected by the application so the session layer stays independent of the
/// HTTP client crate. Failures are logged and swallowed: the identity
/// provider is the source of truth for "can this user log in", the backend
/// record is a denormalized convenience.
#[async_trait]
pub trait BackendRegistrar: Send + Sync {
    async fn register_account(
        &self,
        account: &NewAccount,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub struct SessionStore {
    provider: Option<Arc<dyn IdentityProvider>>,
    state: watch::Receiver<SessionState>,
    registrar: Option<Arc<dyn BackendRegistrar>>,
    // Keeps the channel alive in the unconfigured case, where we are our
    // own (silent) sender.
    _unconfigured_tx: Option<watch::Sender<SessionState>>,
}

impl SessionStore {
    /// Build a store over a configured provider.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let state = provider.subscribe();
        Self {
            provider: Some(provider),
            state,
            registrar: None,
            _unconfigured_tx: None,
        }
    }

    /// Build an unconfigured store: anonymous immediately, never loading.
    #[must_use]
    pub fn unconfigured() -> Self {
        let tx = watch::Sender::new(SessionState::Anonymous);
        let state = tx.subscribe();
        Self {
            provider: None,
            state,
            registrar: None,
            _unconfigured_tx: Some(tx),
        }
    }

    /// Build from an optional provider, the shape `parley-config` hands out.
    #[must_use]
    pub fn from_optional(provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        match provider {
            Some(provider) => Self::new(provider),
            None => Self::unconfigured(),
        }
    }

    /// Attach the best-effort backend registration hook.
    #[must_use]
    pub fn with_registrar(mut self, registrar: Arc<dyn BackendRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// The current identity, or `None` while restoring or when anonymous.
    /// Side-effect-free; the value may be stale by the time it is used.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().user().cloned()
    }

    /// True until the provider's first state callback. Consumers use this
    /// to avoid rendering a premature "logged out" view.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_restoring()
    }

    /// Observe session-state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Authenticate with the identity provider. On success no local state
    /// is touched; the provider's notification updates the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let provider = self.provider.as_ref().ok_or(AuthError::NotConfigured)?;
        provider.sign_in(email, password).await
    }

    /// Create an account with the identity provider, set its display name,
    /// then best-effort notify the backend. Only provider failures surface;
    /// registration is successful once the provider accepted the account.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), AuthError> {
        let provider = self.provider.as_ref().ok_or(AuthError::NotConfigured)?;
        provider.sign_up(email, password, display_name).await?;

        if let Some(registrar) = &self.registrar {
            let account = NewAccount {
                email: email.to_string(),
                password: password.to_string(),
                display_name: display_name.map(ToString::to_string),
            };
            if let Err(e) = registrar.register_account(&account).await {
                tracing::warn!("Backend registration failed (account still usable): {e}");
            }
        }
        Ok(())
    }

    /// Sign out. A no-op when unconfigured — there is nothing to tear down.
    pub async fn logout(&self) -> Result<(), AuthError> {
        match &self.provider {
            Some(provider) => provider.sign_out().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory provider driving the state channel by hand.
    struct FakeProvider {
        state: watch::Sender<SessionState>,
        sign_ins: AtomicUsize,
        sign_outs: AtomicUsize,
    }

    impl FakeProvider {
        fn new(initial: SessionState) -> Arc<Self> {
            Arc::new(Self {
                state: watch::Sender::new(initial),
                sign_ins: AtomicUsize::new(0),
                sign_outs: AtomicUsize::new(0),
            })
        }

        fn user() -> AuthUser {
            AuthUser {
                uid: "u1".into(),
                email: "a@b.com".into(),
                display_name: None,
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn subscribe(&self) -> watch::Receiver<SessionState> {
            self.state.subscribe()
        }

        async fn sign_in(&self, _email: &str, _password: &str) -> Result<(), AuthError> {
            self.sign_ins.fetch_add(1, Ordering::SeqCst);
            self.state
                .send_replace(SessionState::Authenticated(Self::user()));
            Ok(())
        }

        async fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            _display_name: Option<&str>,
        ) -> Result<(), AuthError> {
            self.state
                .send_replace(SessionState::Authenticated(Self::user()));
            Ok(())
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            self.state.send_replace(SessionState::Anonymous);
            Ok(())
        }

        async fn id_token(&self) -> Result<Option<String>, AuthError> {
            Ok(self.state.borrow().user().map(|_| "token".to_string()))
        }
    }

    struct FailingRegistrar {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendRegistrar for FailingRegistrar {
        async fn register_account(
            &self,
            _account: &NewAccount,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("backend unreachable".into())
        }
    }

    #[tokio::test]
    async fn unconfigured_store_is_anonymous_and_not_loading() {
        let store = SessionStore::unconfigured();
        assert!(!store.is_loading());
        assert_eq!(store.current_user(), None);
    }

    #[tokio::test]
    async fn unconfigured_login_fails_fast_with_firebase_message() {
        let store = SessionStore::unconfigured();
        let err = store.login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::NotConfigured));
        assert!(err.to_string().starts_with("Firebase is not configured"));
    }

    #[tokio::test]
    async fn unconfigured_logout_is_a_silent_no_op() {
        let store = SessionStore::unconfigured();
        store.logout().await.unwrap();
        assert_eq!(store.current_user(), None);
    }

    #[tokio::test]
    async fn loading_until_provider_reports_first_state() {
        let provider = FakeProvider::new(SessionState::Restoring);
        let store = SessionStore::new(provider.clone());
        assert!(store.is_loading());
        assert_eq!(store.current_user(), None);

        provider.state.send_replace(SessionState::Anonymous);
        assert!(!store.is_loading());
        assert_eq!(store.current_user(), None);
    }

    #[tokio::test]
    async fn login_updates_state_through_provider_notification() {
        let provider = FakeProvider::new(SessionState::Anonymous);
        let store = SessionStore::new(provider.clone());

        store.login("a@b.com", "pw").await.unwrap();
        assert_eq!(store.current_user().map(|u| u.uid), Some("u1".into()));
        assert_eq!(provider.sign_ins.load(Ordering::SeqCst), 1);

        store.logout().await.unwrap();
        assert_eq!(store.current_user(), None);
        assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn register_succeeds_although_backend_hook_fails() {
        let provider = FakeProvider::new(SessionState::Anonymous);
        let registrar = Arc::new(FailingRegistrar {
            calls: AtomicUsize::new(0),
        });
        let store = SessionStore::new(provider.clone()).with_registrar(registrar.clone());

        store
            .register("a@b.com", "pw", Some("Ada"))
            .await
            .expect("provider accepted the account; hook failure must not surface");
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);
        assert!(store.current_user().is_some());

        // The account is immediately usable: login with the same credentials.
        store.logout().await.unwrap();
        store.login("a@b.com", "pw").await.unwrap();
        assert!(store.current_user().is_some());
    }

    #[tokio::test]
    async fn externally_expired_session_is_observed() {
        let provider = FakeProvider::new(SessionState::Authenticated(FakeProvider::user()));
        let store = SessionStore::new(provider.clone());
        assert!(store.current_user().is_some());

        // Provider notices the token is no longer valid.
        provider.state.send_replace(SessionState::Anonymous);
        assert_eq!(store.current_user(), None);
    }
}
