//! One-shot readiness gate.
//!
//! Closes the startup race between session restoration and the first API
//! request: any request issued before the identity provider has reported its
//! first state suspends here, and would otherwise go out unauthenticated and
//! be wrongly treated as anonymous.

use std::mem;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

/// The bounded wait elapsed before the gate resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session restoration did not complete within {0:?}")]
pub struct ReadyTimeout(pub Duration);

enum GateState {
    /// Waiters queued in registration order.
    Pending(Vec<oneshot::Sender<()>>),
    Resolved,
}

/// A signal that resolves exactly once and stays resolved.
///
/// Waiters registered before resolution are released in registration order;
/// waiters arriving after resolution proceed immediately. [`ReadyGate::resolve`]
/// is idempotent, so the resolver does not need to track whether it already
/// fired.
pub struct ReadyGate {
    state: Mutex<GateState>,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Pending(Vec::new())),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), GateState::Resolved)
    }

    /// Resolve the gate, releasing queued waiters in registration order.
    /// Subsequent calls are no-ops.
    pub fn resolve(&self) {
        let waiters = {
            let mut state = self.lock();
            match mem::replace(&mut *state, GateState::Resolved) {
                GateState::Pending(waiters) => waiters,
                GateState::Resolved => return,
            }
        };
        for waiter in waiters {
            // A waiter may have been dropped (cancelled request); that is
            // its problem, not ours.
            let _ = waiter.send(());
        }
    }

    /// Suspend until the gate resolves. Returns immediately once resolved.
    ///
    /// This wait is unbounded: a provider that never reports a first state
    /// stalls every caller. See [`ReadyGate::wait_timeout`] for the bounded
    /// variant.
    pub async fn wait(&self) {
        let receiver = {
            let mut state = self.lock();
            match &mut *state {
                GateState::Resolved => return,
                GateState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };
        // Err means the gate was dropped while we waited; nothing left to
        // gate on, so fall through either way.
        let _ = receiver.await;
    }

    /// Suspend until the gate resolves, or fail after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), ReadyTimeout> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ReadyTimeout(timeout))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // The lock is only held for push/replace; poisoning would mean a
        // panic inside those, which cannot happen.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
