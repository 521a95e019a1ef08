//! Cancelable delayed tasks, used for debounced validation.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Holds at most one pending delayed task. Scheduling a new task or calling
/// [`cancel`](Self::cancel) aborts the previous one.
#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Runs `task` after `delay` on the current tokio runtime.
    ///
    /// Returns `false` without scheduling anything when called outside a
    /// runtime.
    pub(crate) fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            return false;
        };
        let join = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        if let Some(previous) = self.pending.lock().replace(join) {
            previous.abort();
        }
        true
    }

    pub(crate) fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}
