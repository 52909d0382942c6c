// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use halt::StopToken;
use pace::Clock;
use parking_lot::{MappedMutexGuard, MutexGuard};

use crate::error::{Error, Result};
use crate::future::state::SharedState;

/// The multi-consumer side of the one-shot rendezvous.
///
/// Obtained via [`Future::share`][crate::Future::share]. Clones observe the same shared
/// state; [`get`][Self::get] returns a borrowing view into the published value instead
/// of consuming it, so every clone can read the result any number of times.
pub struct SharedFuture<T> {
    state: Option<Arc<SharedState<T>>>,
}

/// Borrowing view into the published value of a [`SharedFuture`].
///
/// Holds the state's value lock; release it (drop the view) before performing further
/// blocking operations on the same future.
#[derive(Debug)]
pub struct ValueRef<'a, T>(MappedMutexGuard<'a, T>);

impl<T> Deref for ValueRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> SharedFuture<T> {
    /// Takes over the strong ref a [`Future`][crate::Future] gave up.
    pub(super) fn from_transferred_state(state: Option<Arc<SharedState<T>>>) -> Self {
        Self { state }
    }

    /// Whether this future has an associated shared state.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Blocks until the state becomes ready or the token trips.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::StopRequested`].
    pub fn wait(&self, token: &StopToken) -> Result<()> {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => state.wait(token),
        }
    }

    /// Blocks until the state becomes ready, `rel_time` elapses, or the token trips.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::StopRequested`], [`Error::Timeout`].
    pub fn wait_for(&self, token: &StopToken, rel_time: Duration) -> Result<()> {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => state.wait_for(token, rel_time),
        }
    }

    /// Blocks until the state becomes ready, `deadline` is reached on `clock`, or the
    /// token trips.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::StopRequested`], [`Error::Timeout`].
    pub fn wait_until<C: Clock>(&self, token: &StopToken, clock: &C, deadline: C::Instant) -> Result<()> {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => state.wait_until(token, clock, deadline),
        }
    }

    /// Waits for readiness, then returns a borrowing view into the published value.
    ///
    /// The state is not consumed; repeated calls and calls through different clones all
    /// observe the same value.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::StopRequested`], or whatever error the producer
    /// published (including [`Error::PromiseBroken`]).
    pub fn get(&self, token: &StopToken) -> Result<ValueRef<'_, T>> {
        let Some(state) = self.state.as_ref() else {
            return Err(Error::NoState);
        };
        state.wait(token)?;

        let guard = state.lock_value();
        if let Err(error) = guard.as_ref() {
            return Err(*error);
        }
        Ok(ValueRef(MutexGuard::map(guard, |result| {
            result.as_mut().ok().expect("value checked under the same lock")
        })))
    }

    /// Registers a continuation that fires exactly once when the state becomes ready.
    ///
    /// Same semantics as [`Future::then`][crate::Future::then].
    ///
    /// # Errors
    ///
    /// [`Error::NoState`] - in that case `callback` is still invoked, synchronously,
    /// with [`Error::NoState`] as the result.
    pub fn then<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        match &self.state {
            None => {
                let no_state = Err(Error::NoState);
                callback(&no_state);
                Err(Error::NoState)
            }
            Some(state) => {
                state.add_continuation(Box::new(callback));
                Ok(())
            }
        }
    }
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        if let Some(state) = &self.state {
            state.register_future();
        }
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for SharedFuture<T> {
    /// A shared future without shared state.
    fn default() -> Self {
        Self { state: None }
    }
}

impl<T> Drop for SharedFuture<T> {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.unregister_future();
        }
    }
}

impl<T> std::fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture").field("valid", &self.valid()).finish()
    }
}
