//! Session layer for Parley: who is signed in, and how requests prove it.
//!
//! # Architecture
//!
//! ```text
//! FirebaseAuth (REST) ──watch channel──> SessionStore (login/register/logout)
//!        │                                      │
//!        └── id_token() per request             └── current_user() / is_loading()
//!
//! ReadyGate: one-shot signal, resolved the first time the provider reports
//! any state. Owned by the request gateway in `parley-client`; defined here
//! next to the state it gates on.
//! ```
//!
//! The identity provider is a trait seam ([`IdentityProvider`]) so the
//! session store and the gateway can be exercised against a fake provider.
//! Session-change notification is an explicit `tokio::sync::watch` channel
//! rather than an implicit subscription side effect; consumers drain it at
//! their own pace and the latest state always wins.

mod error;
mod firebase;
mod gate;
mod provider;
mod session;
mod token_store;

pub use error::AuthError;
pub use firebase::{FirebaseAuth, FirebaseAuthBuilder};
pub use gate::{ReadyGate, ReadyTimeout};
pub use provider::IdentityProvider;
pub use session::{BackendRegistrar, SessionStore};
pub use token_store::default_session_file;
