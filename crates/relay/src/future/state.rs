// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use halt::StopToken;
use pace::{Clock, MonotonicClock};
use parking_lot::{Mutex, MutexGuard};

use crate::condvar::InterruptibleCondvar;
use crate::error::{Error, Result};

/// Continuation registered on a not-yet-ready state.
pub(super) type Continuation<T> = Box<dyn FnOnce(&Result<T>) + Send>;

/// The rendezvous object shared between one promise and its futures.
///
/// Three independent mutexes guard three independent concerns and are never nested in
/// conflicting order: `ready_mutex` serializes the ready flag against the ready condvar,
/// `abort_callback`'s mutex serializes the abort-check-versus-ready race, and the
/// continuation mutex serializes registration against triggering.
///
/// `value_set` is the single serialization point for "who writes the result": exactly
/// one of a value publish, an error publish, or the broken-promise publish on promise
/// drop claims it. `ready` flips at most once; once it is true the value is immutable.
pub(super) struct SharedState<T> {
    // Must be treated as non-atomic whenever the ready condvar is involved (wait,
    // notify): the atomic is for the predicate closure and fast paths alone.
    ready: AtomicBool,
    ready_mutex: Mutex<()>,
    ready_condvar: InterruptibleCondvar,

    value_set: AtomicBool,
    value: Mutex<Result<T>>,

    abort_callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    reference_count: AtomicI32,

    continuations: Mutex<Continuations<T>>,
}

struct Continuations<T> {
    triggered: bool,
    callbacks: Vec<Continuation<T>>,
}

impl<T> SharedState<T> {
    pub(super) fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            ready_mutex: Mutex::new(()),
            ready_condvar: InterruptibleCondvar::new(),
            value_set: AtomicBool::new(false),
            value: Mutex::new(Err(Error::Unset)),
            abort_callback: Mutex::new(None),
            reference_count: AtomicI32::new(0),
            continuations: Mutex::new(Continuations {
                triggered: false,
                callbacks: Vec::new(),
            }),
        }
    }

    /// Publishes a value. Returns `false` if a publish already claimed this state.
    pub(super) fn set_value(&self, value: T) -> bool {
        if self.value_set.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.value.lock() = Ok(value);
        self.make_ready();
        self.trigger_continuations();
        true
    }

    /// Publishes an error. Returns `false` if a publish already claimed this state.
    pub(super) fn set_error(&self, error: Error) -> bool {
        if self.value_set.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.value.lock() = Err(error);
        self.make_ready();
        self.trigger_continuations();
        true
    }

    fn make_ready(&self) {
        let _guard = self.ready_mutex.lock();
        self.ready.store(true, Ordering::Release);
        self.ready_condvar.notify_all();
    }

    fn trigger_continuations(&self) {
        let callbacks = {
            let mut continuations = self.continuations.lock();
            continuations.triggered = true;
            std::mem::take(&mut continuations.callbacks)
        };
        if callbacks.is_empty() {
            return;
        }

        let fired = callbacks.len();
        {
            let value = self.value.lock();
            for callback in callbacks {
                callback(&value);
            }
        }
        // Release the consumer refs the registrations took out.
        for _ in 0..fired {
            self.unregister_future();
        }
    }

    /// Registers a continuation, or fires it synchronously when the state is already
    /// ready. A registered continuation counts as a consumer until it fired.
    pub(super) fn add_continuation(&self, callback: Continuation<T>) {
        self.register_future();
        let mut continuations = self.continuations.lock();
        if continuations.triggered {
            drop(continuations);
            {
                let value = self.value.lock();
                callback(&value);
            }
            self.unregister_future();
        } else {
            continuations.callbacks.push(callback);
        }
    }

    /// On future construction the reference count is increased.
    pub(super) fn register_future(&self) {
        // The count only ever being positive in normal operation means a negative
        // post-increment value can only be produced by an overflow. Atomic overflow
        // wraps, so the post-check catches it.
        let new_count = self.reference_count.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        if new_count < 0 {
            std::process::abort();
        }
    }

    /// On future destruction the reference count is decreased; the abort callback fires
    /// when the last consumer leaves an unready state.
    ///
    /// If a publish and the destruction of the last future happen in parallel it is
    /// unspecified whether the callback fires: a producer that already committed its
    /// result cannot abort anything anymore.
    pub(super) fn unregister_future(&self) {
        let count_before = self.reference_count.fetch_sub(1, Ordering::SeqCst);
        if count_before == 0 {
            // Underflow: more unregistrations than registrations.
            std::process::abort();
        }

        if count_before - 1 == 0 && !self.ready.load(Ordering::Acquire) {
            let mut slot = self.abort_callback.lock();
            if let Some(callback) = slot.take() {
                callback();
            }
        }
    }

    pub(super) fn set_on_abort(&self, callback: Box<dyn FnOnce() + Send>) {
        *self.abort_callback.lock() = Some(callback);
    }

    pub(super) fn wait(&self, token: &StopToken) -> Result<()> {
        self.wait_impl::<MonotonicClock>(token, None)
    }

    pub(super) fn wait_for(&self, token: &StopToken, rel_time: Duration) -> Result<()> {
        let clock = MonotonicClock;
        match MonotonicClock::checked_add(clock.now(), rel_time) {
            Some(deadline) => self.wait_impl(token, Some((&clock, deadline))),
            None => self.wait_impl::<MonotonicClock>(token, None),
        }
    }

    pub(super) fn wait_until<C: Clock>(&self, token: &StopToken, clock: &C, deadline: C::Instant) -> Result<()> {
        self.wait_impl(token, Some((clock, deadline)))
    }

    fn wait_impl<C: Clock>(&self, token: &StopToken, deadline: Option<(&C, C::Instant)>) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let wait_succeeded = {
            let mut guard = self.ready_mutex.lock();
            if self.ready.load(Ordering::Acquire) {
                return Ok(());
            }
            let ready = || self.ready.load(Ordering::Acquire);
            match deadline {
                None => self.ready_condvar.wait(&mut guard, token, ready),
                Some((clock, at)) => self.ready_condvar.wait_until(&mut guard, token, clock, at, ready),
            }
        };

        if token.stop_requested() {
            return Err(Error::StopRequested);
        }
        if !wait_succeeded {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Takes the published result out, leaving the unset placeholder behind.
    pub(super) fn take_value(&self) -> Result<T> {
        std::mem::replace(&mut *self.value.lock(), Err(Error::Unset))
    }

    /// Locked access to the published result, for borrowing consumers.
    pub(super) fn lock_value(&self) -> MutexGuard<'_, Result<T>> {
        self.value.lock()
    }
}
