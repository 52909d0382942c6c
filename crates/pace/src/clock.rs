// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Contract for clocks driving timed waits and schedules.
///
/// A clock is a value, not a global: types that need time store a clock instance and
/// clones of a clock observe the same flow of time. The production implementation is
/// [`MonotonicClock`]; tests inject `ManualClock` (behind the `test-util` feature) to
/// control time explicitly.
///
/// # Waiting against a clock
///
/// Blocking waits cannot park directly on an arbitrary instant type, so a timed wait is
/// performed as a loop: park for at most [`remaining_until`][Self::remaining_until] of
/// real time, then re-evaluate `clock.now() >= deadline`. Implementations may return a
/// conservative (shorter) remaining budget; the re-evaluation keeps the loop correct.
/// This mirrors the discipline required on POSIX systems, where the underlying timed
/// wait runs on the system monotonic clock no matter which clock the caller reasons in.
pub trait Clock: Clone + Send + Sync + 'static {
    /// The clock's point-in-time type.
    type Instant: Copy + Ord + Send + Sync + Debug + 'static;

    /// The current point in time.
    fn now(&self) -> Self::Instant;

    /// Real time remaining until `deadline`, or [`Duration::ZERO`] once it passed.
    ///
    /// Used to bound a single OS-level wait; callers re-check the deadline against
    /// [`now`][Self::now] after every wake.
    fn remaining_until(&self, deadline: Self::Instant) -> Duration;

    /// Adds `duration` to `instant`, or `None` if the result is not representable.
    fn checked_add(instant: Self::Instant, duration: Duration) -> Option<Self::Instant>;

    /// Whether `instant` is the clock's far-future sentinel.
    ///
    /// A wait whose deadline is unbounded degenerates into an untimed wait. Clocks
    /// without a representable far-future point return `false` for every instant.
    fn is_unbounded(_instant: Self::Instant) -> bool {
        false
    }
}

/// The production clock: monotonic process time.
///
/// Zero-sized; every instance observes the same flow of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn remaining_until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Instant::now())
    }

    fn checked_add(instant: Instant, duration: Duration) -> Option<Instant> {
        instant.checked_add(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(MonotonicClock: Send, Sync, Clone, Copy);
    }

    #[test]
    fn now_is_monotonic() {
        let clock = MonotonicClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn remaining_until_past_deadline_is_zero() {
        let clock = MonotonicClock;
        let deadline = clock.now();
        std::thread::sleep(Duration::from_micros(10));
        assert_eq!(clock.remaining_until(deadline), Duration::ZERO);
    }

    #[test]
    fn remaining_until_future_deadline_is_bounded() {
        let clock = MonotonicClock;
        let deadline = MonotonicClock::checked_add(clock.now(), Duration::from_secs(5)).unwrap();
        let remaining = clock.remaining_until(deadline);
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= Duration::from_secs(5));
    }

    #[test]
    fn no_instant_is_unbounded() {
        let clock = MonotonicClock;
        assert!(!MonotonicClock::is_unbounded(clock.now()));
    }
}
