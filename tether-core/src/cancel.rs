//! One-shot cancellation tokens.

use crate::observer::{EventKind, Observable, ObserverHub};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
struct TokenState {
    canceled: bool,
    valid: bool,
}

struct TokenInner {
    state: Mutex<TokenState>,
    observers: Mutex<ObserverHub<CancelToken>>,
    notify: Notify,
}

/// Represents one in-flight operation.
///
/// A token starts valid. It ends either canceled (the caller aborted) or
/// invalidated (the operation settled on its own). Whichever happens first
/// wins; later calls to [`cancel`](Self::cancel) or
/// [`invalidate`](Self::invalidate) do nothing and publish nothing.
///
/// Cloning the token shares it.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    canceled: false,
                    valid: true,
                }),
                observers: Mutex::new(ObserverHub::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.state.lock().canceled
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().valid
    }

    /// Cancels the operation and publishes `cancel` once.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.canceled || !state.valid {
                return;
            }
            state.canceled = true;
            state.valid = false;
        }
        self.inner.notify.notify_waiters();
        self.publish(EventKind::Cancel, None);
        self.inner.observers.lock().clear();
    }

    /// Marks the operation as settled and publishes `invalidate` once.
    pub fn invalidate(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return;
            }
            state.valid = false;
        }
        self.publish(EventKind::Invalidate, None);
        self.inner.observers.lock().clear();
    }

    /// Resolves once the token is canceled. Never resolves for a token that is
    /// invalidated without being canceled, so race it against the work it
    /// guards.
    pub async fn cancelled(&self) {
        let mut notified = std::pin::pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }

    /// True if both handles refer to the same token.
    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Observable for CancelToken {
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>> {
        &self.inner.observers
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.inner.state.lock();
        f.debug_struct("CancelToken")
            .field("canceled", &state.canceled)
            .field("valid", &state.valid)
            .finish()
    }
}
