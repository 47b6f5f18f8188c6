//! Error taxonomy for the session layer.

use thiserror::Error;

/// Failures from the identity provider or the session store.
///
/// `NotConfigured` and `InvalidCredentials` are the user-visible,
/// form-adjacent cases; the rest surface as generic transient messages.
/// Nothing in this taxonomy is retried automatically.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity-provider configuration bundle is absent or incomplete.
    /// Raised before any network call is attempted.
    #[error("Firebase is not configured. Set PARLEY_FIREBASE_API_KEY or add a [firebase] section to the config file.")]
    NotConfigured,

    /// Unknown account, wrong password, or malformed credentials.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Sign-up with an email that already has an account.
    #[error("an account with this email already exists")]
    EmailAlreadyExists,

    /// The provider is throttling this client.
    #[error("too many attempts; try again later")]
    RateLimited,

    /// Any other provider-reported failure, carrying the provider's code.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Transport-level failure reaching the provider.
    #[error("network error reaching identity provider: {0}")]
    Network(#[from] reqwest::Error),
}

impl AuthError {
    /// Map a Firebase error code (the `error.message` field of an Identity
    /// Toolkit error body) onto the taxonomy.
    #[must_use]
    pub(crate) fn from_firebase_code(code: &str) -> Self {
        // Codes may carry a suffix, e.g. "TOO_MANY_ATTEMPTS_TRY_LATER :
        // access disabled". Match on the leading token.
        let token = code.split_whitespace().next().unwrap_or(code);
        match token {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL" | "USER_DISABLED" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::EmailAlreadyExists,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::RateLimited,
            _ => Self::Provider(code.to_string()),
        }
    }
}
