//! The identity-provider seam.

use async_trait::async_trait;
use tokio::sync::watch;

use parley_types::SessionState;

use crate::AuthError;

/// External identity service: issues credentials, restores sessions, and
/// mints the short-lived bearer tokens every API request carries.
///
/// The provider is authoritative for "is this identity valid now". Consumers
/// never mutate session state themselves; they call the operations below and
/// observe the outcome through [`IdentityProvider::subscribe`]. The channel
/// starts at [`SessionState::Restoring`] and must publish a first
/// non-restoring state exactly once per process, even when no session could
/// be restored.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Observe session-state changes. The receiver's current value is the
    /// latest known state; intermediate states may be skipped.
    fn subscribe(&self) -> watch::Receiver<SessionState>;

    /// Authenticate with email + password. Success is reported through the
    /// state channel, not a return value.
    async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// Create an account and, when given, set its display name.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Terminate the session and discard any durable session record.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// A currently valid bearer token, or `None` when anonymous.
    ///
    /// Called once per outgoing request; whether the token is minted anew or
    /// served from a not-yet-expired credential is this provider's business.
    async fn id_token(&self) -> Result<Option<String>, AuthError>;
}
