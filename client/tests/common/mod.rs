//! Shared test support: an identity provider driven by hand.

#![allow(dead_code)] // Not every test binary uses every helper.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use parley_auth::{AuthError, IdentityProvider};
use parley_types::{AuthUser, SessionState};

/// Provider whose state channel the test drives directly. Counts token
/// fetches and sign-outs; tokens are `token-1`, `token-2`, … so tests can
/// assert per-request freshness.
pub struct FakeProvider {
    state: watch::Sender<SessionState>,
    token_fetches: AtomicUsize,
    sign_outs: AtomicUsize,
}

impl FakeProvider {
    pub fn new(initial: SessionState) -> Arc<Self> {
        Arc::new(Self {
            state: watch::Sender::new(initial),
            token_fetches: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        })
    }

    pub fn restoring() -> Arc<Self> {
        Self::new(SessionState::Restoring)
    }

    pub fn anonymous() -> Arc<Self> {
        Self::new(SessionState::Anonymous)
    }

    pub fn authenticated() -> Arc<Self> {
        Self::new(SessionState::Authenticated(test_user()))
    }

    /// Finish "restoration" with the given outcome.
    pub fn settle(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

pub fn test_user() -> AuthUser {
    AuthUser {
        uid: "u1".into(),
        email: "a@b.com".into(),
        display_name: None,
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<(), AuthError> {
        self.state
            .send_replace(SessionState::Authenticated(test_user()));
        Ok(())
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _display_name: Option<&str>,
    ) -> Result<(), AuthError> {
        self.state
            .send_replace(SessionState::Authenticated(test_user()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SessionState::Anonymous);
        Ok(())
    }

    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        if self.state.borrow().user().is_none() {
            return Ok(None);
        }
        let n = self.token_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("token-{n}")))
    }
}
