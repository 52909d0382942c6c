// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::state::StopState;

/// The read side of a one-shot stop signal.
///
/// Tokens are cheap to clone and safe to hand into other threads. A token created via
/// [`StopToken::default`] has no associated source and therefore never observes a stop
/// request; this is the "wait without a cancellation surface" token used where an API
/// requires one but the caller has nothing to cancel with.
#[derive(Debug, Clone)]
pub struct StopToken {
    state: Arc<StopState>,
}

impl StopToken {
    pub(crate) fn with_state(state: Arc<StopState>) -> Self {
        Self { state }
    }

    /// Whether the associated source has tripped the stop signal.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Registers `callback` to fire exactly once when the stop signal trips.
    ///
    /// The callback runs on the thread calling `request_stop`. If the signal already
    /// tripped, `callback` runs synchronously on the calling thread before this returns.
    ///
    /// The returned [`StopCallback`] deregisters on drop. Dropping it while the callback
    /// executes on another thread blocks until the callback returned; afterwards the
    /// callback is guaranteed not to run. Callbacks must not register or deregister
    /// callbacks on the same token.
    #[must_use = "dropping the handle immediately deregisters the callback"]
    pub fn on_stop<F>(&self, callback: F) -> StopCallback
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.state.register(Box::new(callback));
        StopCallback {
            state: Arc::clone(&self.state),
            id,
        }
    }
}

impl Default for StopToken {
    /// A token that is not connected to any source and never reports a stop request.
    fn default() -> Self {
        Self {
            state: Arc::new(StopState::new()),
        }
    }
}

/// Registration handle returned by [`StopToken::on_stop`].
///
/// Keeps the callback registered for as long as it lives.
#[derive(Debug)]
pub struct StopCallback {
    state: Arc<StopState>,
    id: Option<u64>,
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.state.deregister(id);
        }
    }
}
