// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::future::future::Future;
use crate::future::state::SharedState;

/// The producer side of the one-shot rendezvous.
///
/// A promise owns a fresh shared state from construction. The matching [`Future`] can be
/// retrieved exactly once; a value or error can be published exactly once. Dropping a
/// promise that never published installs [`Error::PromiseBroken`], so consumers are
/// never left waiting for a producer that no longer exists.
///
/// # Examples
///
/// ```
/// use halt::StopToken;
/// use relay::{Error, Promise};
///
/// let mut promise = Promise::new();
/// let future = promise.get_future().unwrap();
///
/// promise.set_value(5).unwrap();
/// assert_eq!(promise.set_value(6), Err(Error::PromiseAlreadySatisfied));
/// assert_eq!(future.get(&StopToken::default()), Ok(5));
/// ```
pub struct Promise<T> {
    state: Option<Arc<SharedState<T>>>,
    future_retrieved: bool,
}

impl<T> Promise<T> {
    /// Creates a promise with a fresh, unpublished shared state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Some(Arc::new(SharedState::new())),
            future_retrieved: false,
        }
    }

    /// Returns the future observing this promise's state, exactly once.
    ///
    /// # Errors
    ///
    /// [`Error::FutureAlreadyRetrieved`] on the second call, [`Error::NoState`] if the
    /// promise has no shared state.
    pub fn get_future(&mut self) -> Result<Future<T>> {
        if self.future_retrieved {
            return Err(Error::FutureAlreadyRetrieved);
        }
        self.future_retrieved = true;

        match &self.state {
            None => Err(Error::NoState),
            Some(state) => Ok(Future::with_state(Arc::clone(state))),
        }
    }

    /// Publishes `value` and makes the state ready.
    ///
    /// Does not race with [`get_future`][Self::get_future] or a concurrent publish:
    /// exactly one publish claims the state.
    ///
    /// # Errors
    ///
    /// [`Error::PromiseAlreadySatisfied`] if a publish already claimed the state,
    /// [`Error::NoState`] if the promise has no shared state.
    pub fn set_value(&self, value: T) -> Result<()> {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => {
                if state.set_value(value) {
                    Ok(())
                } else {
                    Err(Error::PromiseAlreadySatisfied)
                }
            }
        }
    }

    /// Publishes `error` and makes the state ready.
    ///
    /// # Errors
    ///
    /// [`Error::PromiseAlreadySatisfied`] if a publish already claimed the state,
    /// [`Error::NoState`] if the promise has no shared state.
    pub fn set_error(&self, error: Error) -> Result<()> {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => {
                if state.set_error(error) {
                    Ok(())
                } else {
                    Err(Error::PromiseAlreadySatisfied)
                }
            }
        }
    }

    /// Stores a callback that fires when every future was destroyed while the state was
    /// still unready - the consumers gave up before a result was delivered.
    ///
    /// The callback fires at most once, on the thread dropping the last future. If the
    /// last future drops concurrently with a publish it is unspecified whether the
    /// callback fires; the producer already committed its work either way.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`] if the promise has no shared state.
    pub fn on_abort<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.state {
            None => Err(Error::NoState),
            Some(state) => {
                state.set_on_abort(Box::new(callback));
                Ok(())
            }
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    /// A promise that dies without publishing breaks itself: the state is published
    /// with [`Error::PromiseBroken`] iff no publish claimed it before.
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            let _ = state.set_error(Error::PromiseBroken);
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("future_retrieved", &self.future_retrieved)
            .finish_non_exhaustive()
    }
}
