//! HTTP client layer for the Parley backend.
//!
//! # Architecture
//!
//! Two pieces, layered:
//!
//! - [`Gateway`] — the authentication-gated transport. Every outgoing
//!   request suspends on a one-shot readiness gate until session
//!   restoration has reported a first state, then carries a freshly minted
//!   bearer token when a session exists. A 401 response terminates the
//!   session and fires the configured `on_auth_lost` reaction exactly once,
//!   process-wide, before the failure propagates.
//! - [`ApiClient`] — typed operations over the gateway: account
//!   registration, current-user profile, project CRUD, chat, file
//!   management, and the backend health probe.
//!
//! # Error Handling
//!
//! Everything surfaces as [`ClientError`]. Only `AuthorizationLost` gets a
//! global reaction; all other variants propagate untouched to the caller.
//! Nothing is retried automatically.

mod api;
mod error;
mod gateway;

pub use api::ApiClient;
pub use error::ClientError;
pub use gateway::{Gateway, GatewayBuilder};
