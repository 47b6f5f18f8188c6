//! Session-state types shared between the identity layer and its consumers.

use serde::{Deserialize, Serialize};

/// The identity record the provider reports for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Where the session currently stands.
///
/// `Restoring` is the initial state while the identity provider replays any
/// persisted session; it is left exactly once per process and never
/// re-entered. All later transitions move between `Anonymous` and
/// `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Restoring,
    Anonymous,
    Authenticated(AuthUser),
}

impl SessionState {
    #[must_use]
    pub fn is_restoring(&self) -> bool {
        matches!(self, Self::Restoring)
    }

    /// The current user, if any. `None` both while restoring and when
    /// anonymous; callers that need to distinguish check
    /// [`SessionState::is_restoring`] first.
    #[must_use]
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Restoring | Self::Anonymous => None,
        }
    }
}

/// Payload for creating a platform account.
///
/// Mirrors the backend's registration model; the password travels to the
/// backend's denormalized registration endpoint exactly as the original
/// client sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_is_absent_unless_authenticated() {
        assert!(SessionState::Restoring.user().is_none());
        assert!(SessionState::Anonymous.user().is_none());

        let state = SessionState::Authenticated(AuthUser {
            uid: "u1".into(),
            email: "a@b.com".into(),
            display_name: None,
        });
        assert_eq!(state.user().map(|u| u.uid.as_str()), Some("u1"));
    }

    #[test]
    fn default_state_is_restoring() {
        assert!(SessionState::default().is_restoring());
    }
}
