// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use halt::StopToken;
use pace::{Clock, MonotonicClock};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::destruction_guard::{DestructionGuard, await_all_exits};

/// Why a predicate-free timed wait returned.
///
/// Mirrors the classic `cv_status`: [`TimedOut`][Self::TimedOut] means the deadline is
/// the best explanation for the wake-up, [`NoTimeout`][Self::NoTimeout] means the wait
/// ended early (notification or stop request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The deadline passed.
    TimedOut,
    /// Woken before the deadline, by notification or stop request.
    NoTimeout,
}

/// A condition variable whose waits can additionally be unblocked by a stop token.
///
/// This is a facade over a plain condition variable with the synchronization necessary
/// to combine it with cooperative cancellation. It costs more memory and time than the
/// plain primitive; pay that cost only when a wait genuinely needs to be interruptible.
///
/// The central difficulty: the token's state changes asynchronously, so it must be
/// treated exactly like a predicate - evaluated only under a mutex that also serializes
/// the notification. The caller's mutex cannot be commandeered for that, so the condvar
/// owns an *internal* mutex; a stop request takes the internal mutex and broadcasts on
/// the underlying condvar, and every wait re-checks the token under that same mutex
/// before parking. The caller's lock is released only for the duration of the park,
/// while the internal lock is already held, which closes the window in which a stop
/// request could be evaluated-then-signalled between check and park.
///
/// # Caller's lock
///
/// All wait functions take `&mut MutexGuard<'_, T>`: the caller's mutex must be locked
/// on entry and is locked again on return.
///
/// # Destruction
///
/// Dropping the condvar blocks (yield-spinning on an entry counter) until every thread
/// has left the wait functions.
pub struct InterruptibleCondvar {
    inner: Arc<Inner>,
    entries: AtomicU32,
}

struct Inner {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Inner {
    /// Broadcast under the internal mutex so notification cannot race the
    /// check-then-park handshake in the wait functions.
    fn notify_all_locked(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn notify_one_locked(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_one();
    }
}

impl InterruptibleCondvar {
    /// Creates a condition variable with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
            entries: AtomicU32::new(0),
        }
    }

    /// Unblocks one thread currently waiting on this condvar.
    pub fn notify_one(&self) {
        self.inner.notify_one_locked();
    }

    /// Unblocks all threads currently waiting on this condvar.
    pub fn notify_all(&self) {
        self.inner.notify_all_locked();
    }

    /// Waits until `stop_waiting` returns `true` or the token trips.
    ///
    /// Returns the final value of `stop_waiting`: `true` when the wait ended because the
    /// predicate held, `false` when it was interrupted.
    #[cfg_attr(test, mutants::skip)] // Wake-critical primitive - tampering hangs the test suite.
    pub fn wait<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        token: &StopToken,
        mut stop_waiting: impl FnMut() -> bool,
    ) -> bool {
        let _entry = DestructionGuard::new(&self.entries);
        if token.stop_requested() {
            return stop_waiting();
        }

        let inner = Arc::clone(&self.inner);
        let _stop_callback = token.on_stop(move || inner.notify_all_locked());

        while !stop_waiting() {
            let mut internal = self.inner.mutex.lock();
            if token.stop_requested() {
                return false;
            }
            MutexGuard::unlocked(guard, || {
                self.inner.condvar.wait(&mut internal);
                drop(internal);
            });
        }
        true
    }

    /// Waits until `stop_waiting` returns `true`, the deadline passes, or the token trips.
    ///
    /// Returns `true` if the wait ended with the predicate holding; on timeout or
    /// interruption returns the predicate's value at that moment.
    ///
    /// An unbounded deadline degenerates into [`wait`][Self::wait]; a deadline already
    /// in the past evaluates the predicate without touching the underlying condvar.
    ///
    /// The deadline is re-evaluated against `clock.now()` after every wake. The
    /// underlying timed wait runs on the system monotonic clock regardless of `C` (on
    /// POSIX, `pthread_cond_timedwait` does not know about user clocks), so its own
    /// verdict on why it woke is not authoritative.
    #[cfg_attr(test, mutants::skip)] // Wake-critical primitive - tampering hangs the test suite.
    pub fn wait_until<T: ?Sized, C: Clock>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        token: &StopToken,
        clock: &C,
        deadline: C::Instant,
        mut stop_waiting: impl FnMut() -> bool,
    ) -> bool {
        if C::is_unbounded(deadline) {
            return self.wait(guard, token, stop_waiting);
        }
        if clock.now() >= deadline {
            return stop_waiting();
        }

        let _entry = DestructionGuard::new(&self.entries);
        if token.stop_requested() {
            return stop_waiting();
        }

        let inner = Arc::clone(&self.inner);
        let _stop_callback = token.on_stop(move || inner.notify_all_locked());

        while !stop_waiting() {
            let _ = self.park_until(guard, token, clock, deadline);
            if clock.now() >= deadline || token.stop_requested() {
                return stop_waiting();
            }
        }
        true
    }

    /// Waits until `stop_waiting` returns `true`, `rel_time` elapses, or the token trips.
    ///
    /// The relative time is measured on the monotonic clock.
    pub fn wait_for<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        token: &StopToken,
        rel_time: Duration,
        stop_waiting: impl FnMut() -> bool,
    ) -> bool {
        let clock = MonotonicClock;
        match MonotonicClock::checked_add(clock.now(), rel_time) {
            Some(deadline) => self.wait_until(guard, token, &clock, deadline, stop_waiting),
            // A relative time too large to represent is an unbounded wait.
            None => self.wait(guard, token, stop_waiting),
        }
    }

    /// Predicate-free timed wait: parks once until the deadline, a notification, or a
    /// stop request.
    ///
    /// Spurious wake-ups are not filtered; callers own the re-check. A deadline already
    /// in the past returns [`WaitStatus::TimedOut`] without waiting.
    pub fn wait_deadline<T: ?Sized, C: Clock>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        token: &StopToken,
        clock: &C,
        deadline: C::Instant,
    ) -> WaitStatus {
        if clock.now() >= deadline {
            return WaitStatus::TimedOut;
        }

        let _entry = DestructionGuard::new(&self.entries);
        if token.stop_requested() {
            return WaitStatus::NoTimeout;
        }

        let inner = Arc::clone(&self.inner);
        let _stop_callback = token.on_stop(move || inner.notify_all_locked());

        if self.park_until(guard, token, clock, deadline) {
            WaitStatus::TimedOut
        } else {
            WaitStatus::NoTimeout
        }
    }

    /// One park on the underlying condvar, bounded by the real-time budget to `deadline`.
    ///
    /// Returns `false` iff the token tripped (before or during the park).
    fn park_until<T: ?Sized, C: Clock>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        token: &StopToken,
        clock: &C,
        deadline: C::Instant,
    ) -> bool {
        let mut internal = self.inner.mutex.lock();
        if token.stop_requested() {
            return false;
        }
        MutexGuard::unlocked(guard, || {
            let budget = clock.remaining_until(deadline);
            let _ = self.inner.condvar.wait_for(&mut internal, budget);
            drop(internal);
        });
        !token.stop_requested()
    }
}

impl Default for InterruptibleCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptibleCondvar {
    /// All wait calls must have exited before the condvar's storage is released; the
    /// notification that unblocks them only needs to happen before destruction, not the
    /// full wait return. The entry counter covers the gap.
    fn drop(&mut self) {
        await_all_exits(&self.entries);
    }
}

impl std::fmt::Debug for InterruptibleCondvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptibleCondvar").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Instant;

    use halt::StopSource;
    use pace::ManualClock;

    use super::*;

    const GENEROUS: Duration = Duration::from_secs(10);

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(InterruptibleCondvar: Send, Sync);
    }

    #[test]
    fn wait_returns_immediately_when_predicate_holds() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let token = StopToken::default();
        assert!(condvar.wait(&mut guard, &token, || true));
    }

    #[test]
    fn wait_with_stopped_token_returns_predicate_value() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let source = StopSource::new();
        assert!(source.request_stop());

        assert!(!condvar.wait(&mut guard, &source.token(), || false));
        assert!(condvar.wait(&mut guard, &source.token(), || true));
    }

    #[test]
    fn notification_wakes_waiter() {
        let condvar = Arc::new(InterruptibleCondvar::new());
        let state = Arc::new((Mutex::new(()), AtomicBool::new(false)));

        let waiter = {
            let condvar = Arc::clone(&condvar);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let mut guard = state.0.lock();
                condvar.wait(&mut guard, &StopToken::default(), || state.1.load(Ordering::Acquire))
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let _guard = state.0.lock();
            state.1.store(true, Ordering::Release);
        }
        condvar.notify_all();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn stop_request_unblocks_waiter() {
        let condvar = Arc::new(InterruptibleCondvar::new());
        let mutex = Arc::new(Mutex::new(()));
        let source = StopSource::new();
        let token = source.token();

        let waiter = {
            let condvar = Arc::clone(&condvar);
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let mut guard = mutex.lock();
                condvar.wait(&mut guard, &token, || false)
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(source.request_stop());

        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn stop_request_concurrent_with_entry_is_not_lost() {
        // Trip the token from another thread while this thread enters the wait; the wait
        // must return rather than park forever.
        for _ in 0..50 {
            let condvar = Arc::new(InterruptibleCondvar::new());
            let mutex = Arc::new(Mutex::new(()));
            let source = StopSource::new();
            let token = source.token();

            let requester = thread::spawn(move || {
                assert!(source.request_stop());
            });

            let mut guard = mutex.lock();
            assert!(!condvar.wait(&mut guard, &token, || false));
            drop(guard);

            requester.join().unwrap();
        }
    }

    #[test]
    fn wait_until_times_out() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let clock = MonotonicClock;
        let deadline = MonotonicClock::checked_add(clock.now(), Duration::from_millis(30)).unwrap();

        let started = Instant::now();
        let satisfied = condvar.wait_until(&mut guard, &StopToken::default(), &clock, deadline, || false);

        assert!(!satisfied);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_until_with_past_deadline_skips_the_condvar() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let clock = MonotonicClock;
        let deadline = clock.now();

        let started = Instant::now();
        assert!(condvar.wait_until(&mut guard, &StopToken::default(), &clock, deadline, || true));
        assert!(!condvar.wait_until(&mut guard, &StopToken::default(), &clock, deadline, || false));
        assert!(started.elapsed() < GENEROUS);
    }

    #[test]
    fn wait_until_unbounded_deadline_waits_for_notification() {
        let condvar = Arc::new(InterruptibleCondvar::new());
        let state = Arc::new((Mutex::new(()), AtomicBool::new(false)));
        let clock = ManualClock::new();

        let waiter = {
            let condvar = Arc::clone(&condvar);
            let state = Arc::clone(&state);
            let clock = clock.clone();
            thread::spawn(move || {
                let mut guard = state.0.lock();
                condvar.wait_until(
                    &mut guard,
                    &StopToken::default(),
                    &clock,
                    pace::ManualInstant::FAR_FUTURE,
                    || state.1.load(Ordering::Acquire),
                )
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let _guard = state.0.lock();
            state.1.store(true, Ordering::Release);
        }
        condvar.notify_all();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_until_honors_a_manual_clock() {
        let condvar = Arc::new(InterruptibleCondvar::new());
        let mutex = Arc::new(Mutex::new(()));
        let clock = ManualClock::new();
        let deadline = ManualClock::checked_add(clock.now(), Duration::from_secs(3600)).unwrap();

        let waiter = {
            let condvar = Arc::clone(&condvar);
            let mutex = Arc::clone(&mutex);
            let clock = clock.clone();
            thread::spawn(move || {
                let mut guard = mutex.lock();
                condvar.wait_until(&mut guard, &StopToken::default(), &clock, deadline, || false)
            })
        };

        // An hour of virtual time passes in one step; the waiter must observe it.
        thread::sleep(Duration::from_millis(20));
        clock.advance(Duration::from_secs(3600));

        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn wait_for_times_out_on_real_time() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let started = Instant::now();
        assert!(!condvar.wait_for(&mut guard, &StopToken::default(), Duration::from_millis(30), || false));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_deadline_reports_past_deadline_without_waiting() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(());
        let mut guard = mutex.lock();

        let clock = MonotonicClock;
        let status = condvar.wait_deadline(&mut guard, &StopToken::default(), &clock, clock.now());
        assert_eq!(status, WaitStatus::TimedOut);
    }

    #[test]
    fn wait_deadline_unblocks_on_stop() {
        let condvar = Arc::new(InterruptibleCondvar::new());
        let mutex = Arc::new(Mutex::new(()));
        let source = StopSource::new();
        let token = source.token();
        let clock = MonotonicClock;
        let deadline = MonotonicClock::checked_add(clock.now(), GENEROUS).unwrap();

        let waiter = {
            let condvar = Arc::clone(&condvar);
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let mut guard = mutex.lock();
                condvar.wait_deadline(&mut guard, &token, &clock, deadline)
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(source.request_stop());

        assert_eq!(waiter.join().unwrap(), WaitStatus::NoTimeout);
    }

    #[test]
    fn caller_lock_is_held_again_on_return() {
        let condvar = InterruptibleCondvar::new();
        let mutex = Mutex::new(7);
        let mut guard = mutex.lock();

        let _ = condvar.wait(&mut guard, &StopToken::default(), || true);
        // Mutating through the guard proves the caller's lock is held.
        *guard += 1;
        assert_eq!(*guard, 8);
    }
}
