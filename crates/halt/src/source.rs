// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::state::StopState;
use crate::token::StopToken;

/// The write side of a one-shot stop signal.
///
/// A source and all of its clones share the same stop state, so any clone can trip the
/// signal for every [`StopToken`] handed out by any of them. Dropping sources does not
/// trip the signal; cancellation only ever happens through [`request_stop`][Self::request_stop].
///
/// # Examples
///
/// ```
/// use halt::StopSource;
///
/// let source = StopSource::new();
/// let sibling = source.clone();
///
/// assert!(sibling.request_stop());
/// assert!(source.stop_requested());
/// ```
#[derive(Debug, Clone)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Creates a source with a fresh, untripped stop state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(StopState::new()),
        }
    }

    /// Returns a token observing this source's stop state.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken::with_state(Arc::clone(&self.state))
    }

    /// Trips the stop signal.
    ///
    /// Returns `true` only for the call that actually tripped the signal; subsequent
    /// calls (from any clone) return `false`. All callbacks registered on associated
    /// tokens run on the calling thread before this returns.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    /// Whether the stop signal has been tripped.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}
