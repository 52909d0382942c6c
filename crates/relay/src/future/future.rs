// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use halt::StopToken;
use pace::Clock;

use crate::error::{Error, Result};
use crate::future::shared::SharedFuture;
use crate::future::state::SharedState;

/// The single-consumer side of the one-shot rendezvous.
///
/// A future is move-only; [`share`][Self::share] converts it into the copyable
/// [`SharedFuture`]. Every wait observes a stop token, so no consumer is ever stuck
/// behind a producer it no longer cares about. A default-constructed future has no
/// shared state and fails every operation with [`Error::NoState`].
///
/// # Examples
///
/// ```
/// use halt::StopToken;
/// use relay::Promise;
///
/// let mut promise = Promise::new();
/// let future = promise.get_future().unwrap();
///
/// promise.set_value("done").unwrap();
/// assert_eq!(future.get(&StopToken::default()), Ok("done"));
/// ```
pub struct Future<T> {
    state: Option<Arc<SharedState<T>>>,
}

impl<T> Future<T> {
    pub(super) fn with_state(state: Arc<SharedState<T>>) -> Self {
        state.register_future();
        Self { state: Some(state) }
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

    /// Waits for readiness, then consumes the state and returns the published result.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::StopRequested`], or whatever error the producer
    /// published (including [`Error::PromiseBroken`]).
    pub fn get(self, token: &StopToken) -> Result<T> {
        let Some(state) = self.state.as_ref() else {
            return Err(Error::NoState);
        };
        state.wait(token)?;
        state.take_value()
    }

    /// Converts this future into a [`SharedFuture`] over the same state.
    #[must_use]
    pub fn share(mut self) -> SharedFuture<T> {
        // The strong ref transfers as-is; no register/unregister happens.
        SharedFuture::from_transferred_state(self.state.take())
    }

    /// Registers a continuation that fires exactly once when the state becomes ready,
    /// receiving the published result.
    ///
    /// Continuations registered before readiness fire on the publishing thread, in
    /// registration order; a continuation registered after readiness fires synchronously
    /// on the registering thread. The registration keeps the state alive until the
    /// continuation fired, even if this future is dropped first.
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

impl<T> Default for Future<T> {
    /// A future without shared state.
    fn default() -> Self {
        Self { state: None }
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.unregister_future();
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("valid", &self.valid()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use halt::{StopSource, StopToken};
    use pace::{ManualClock, ManualInstant, MonotonicClock};

    use super::*;
    use crate::future::promise::Promise;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Future<u32>: Send, Sync);
    }

    #[test]
    fn default_future_has_no_state() {
        let future = Future::<u32>::default();
        assert!(!future.valid());
        assert_eq!(future.wait(&StopToken::default()), Err(Error::NoState));
        assert_eq!(future.wait_for(&StopToken::default(), Duration::ZERO), Err(Error::NoState));
        assert_eq!(future.get(&StopToken::default()), Err(Error::NoState));
    }

    #[test]
    fn wait_returns_once_ready() {
        let mut promise = Promise::new();
        let future = promise.get_future().unwrap();
        promise.set_value(1).unwrap();

        assert_eq!(future.wait(&StopToken::default()), Ok(()));
        assert_eq!(future.get(&StopToken::default()), Ok(1));
    }

    #[test]
    fn wait_unblocks_on_stop_request() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let source = StopSource::new();
        let token = source.token();

        let waiter = thread::spawn(move || future.wait(&token));

        thread::sleep(Duration::from_millis(20));
        assert!(source.request_stop());

        assert_eq!(waiter.join().unwrap(), Err(Error::StopRequested));
    }

    #[test]
    fn wait_for_times_out() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();

        let started = Instant::now();
        assert_eq!(
            future.wait_for(&StopToken::default(), Duration::from_millis(30)),
            Err(Error::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_until_times_out_on_manual_clock() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let clock = ManualClock::new();
        let deadline = ManualClock::checked_add(clock.now(), Duration::from_secs(5)).unwrap();

        let advancer = {
            let clock = clock.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                clock.advance(Duration::from_secs(5));
            })
        };

        assert_eq!(
            future.wait_until(&StopToken::default(), &clock, deadline),
            Err(Error::Timeout)
        );
        advancer.join().unwrap();
    }

    #[test]
    fn unbounded_deadline_degenerates_into_plain_wait() {
        let mut promise = Promise::new();
        let future = promise.get_future().unwrap();
        let clock = ManualClock::new();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.set_value(5).unwrap();
        });

        assert_eq!(
            future.wait_until(&StopToken::default(), &clock, ManualInstant::FAR_FUTURE),
            Ok(())
        );
        producer.join().unwrap();
    }

    #[test]
    fn past_deadline_with_unready_state_times_out_immediately() {
        let mut promise = Promise::<u32>::new();
        let future = promise.get_future().unwrap();
        let clock = MonotonicClock;

        assert_eq!(
            future.wait_until(&StopToken::default(), &clock, clock.now()),
            Err(Error::Timeout)
        );
        drop(promise);
    }

    #[test]
    fn then_before_ready_fires_on_publishing_thread() {
        let mut promise = Promise::new();
        let future = promise.get_future().unwrap();

        let observed = Arc::new(parking_lot::Mutex::new(None));
        let observed_clone = Arc::clone(&observed);
        future
            .then(move |result: &Result<u32>| {
                *observed_clone.lock() = Some((*result, thread::current().id()));
            })
            .unwrap();

        let producer = thread::spawn(move || {
            promise.set_value(13).unwrap();
            thread::current().id()
        });
        let producer_id = producer.join().unwrap();

        let observed = observed.lock().expect("continuation fired");
        assert_eq!(observed.0, Ok(13));
        assert_eq!(observed.1, producer_id);
    }

    #[test]
    fn then_after_ready_fires_synchronously() {
        let mut promise = Promise::new();
        let future = promise.get_future().unwrap();
        promise.set_value(21).unwrap();

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = Arc::clone(&fired);
        future
            .then(move |result: &Result<u32>| {
                assert_eq!(*result, Ok(21));
                let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn then_on_stateless_future_reports_no_state() {
        let future = Future::<u32>::default();

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = Arc::clone(&fired);
        let outcome = future.then(move |result: &Result<u32>| {
            assert_eq!(*result, Err(Error::NoState));
            let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(outcome, Err(Error::NoState));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn continuation_outliving_the_future_still_fires() {
        let mut promise = Promise::new();
        let fired = Arc::new(AtomicU32::new(0));

        {
            let future = promise.get_future().unwrap();
            let fired_clone = Arc::clone(&fired);
            future
                .then(move |result: &Result<u32>| {
                    assert_eq!(*result, Ok(2));
                    let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            // The future dies here; the registration keeps the state alive.
        }

        promise.set_value(2).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
