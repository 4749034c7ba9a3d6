//! Cancellation tokens for in-flight session requests.
//!
//! Every completion or inspection request snapshots the token that
//! was current when it was issued. Rebinding an editor, swapping the session
//! or disposing the owner cancels that token, so a reply that arrives later
//! sees `is_cancelled()` and is dropped instead of applied.
//!
//! # State Machine
//!
//! ```text
//! Live ──→ Cancelled
//! ```
//!
//! Cancellation is one-way. An owner that needs a fresh token after
//! cancelling installs a new one rather than resetting the old.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Token state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    #[default]
    Live,
    Cancelled,
}

struct Inner {
    state: CancellationState,
}

/// Shared, cloneable cancellation flag.
///
/// # Example
///
/// ```rust
/// use console_panel::cancellation::CancellationToken;
///
/// let token = CancellationToken::new();
/// let request = token.clone();
/// assert!(token.cancel());
/// assert!(request.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Mutex<Inner>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CancellationState::Live,
            })),
        }
    }

    pub fn state(&self) -> CancellationState {
        self.inner.lock().unwrap().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CancellationState::Cancelled
    }

    /// Cancel this token and every clone of it.
    ///
    /// Returns `true` if the state changed, `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CancellationState::Cancelled {
            return false;
        }
        inner.state = CancellationState::Cancelled;
        true
    }

    /// Cancel this handle's token and point the handle at a fresh one.
    /// Other clones keep the cancelled token.
    pub fn renew(&mut self) {
        self.cancel();
        *self = CancellationToken::new();
    }

    /// Whether two handles share one token.
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_live() {
        let token = CancellationToken::new();
        assert_eq!(token.state(), CancellationState::Live);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_one_way_and_reports_change_once() {
        let token = CancellationToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let snapshot = token.clone();
        token.cancel();
        assert!(snapshot.is_cancelled());
    }

    #[test]
    fn fresh_token_is_independent() {
        let mut token = CancellationToken::new();
        let request = token.clone();
        assert!(token.same_token(&request));

        token.renew();
        assert!(request.is_cancelled());
        assert!(!token.is_cancelled());
        assert!(!token.same_token(&request));
    }
}
