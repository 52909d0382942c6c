// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::Clock;

/// Real-time quantum a waiter parks for while a virtual deadline has not been reached.
///
/// Waits against a manual clock poll: the deadline re-check after every wake (mandated
/// by the [`Clock`] contract) is what terminates them once the test advanced time.
const POLL_QUANTUM: Duration = Duration::from_millis(1);

/// An instant on a [`ManualClock`]: virtual nanoseconds since the clock's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManualInstant(u64);

impl ManualInstant {
    /// The clock's origin.
    pub const ZERO: Self = Self(0);

    /// The far-future sentinel; a wait with this deadline never times out.
    pub const FAR_FUTURE: Self = Self(u64::MAX);

    /// Virtual nanoseconds since the clock's origin.
    #[must_use]
    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

/// A test clock whose time only moves when the test says so.
///
/// Clones share the same virtual counter, so a clock handed into an executor and the
/// clone kept by the test observe the same flow of time. Time never moves backwards.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use pace::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let observer = clock.clone();
///
/// let start = observer.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(
///     observer.now(),
///     ManualClock::checked_add(start, Duration::from_secs(5)).unwrap()
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at its origin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `duration`, saturating at the far-future sentinel.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(nanos))
            });
    }
}

impl Clock for ManualClock {
    type Instant = ManualInstant;

    fn now(&self) -> ManualInstant {
        ManualInstant(self.nanos.load(Ordering::SeqCst))
    }

    fn remaining_until(&self, deadline: ManualInstant) -> Duration {
        if self.now() >= deadline {
            Duration::ZERO
        } else {
            POLL_QUANTUM
        }
    }

    fn checked_add(instant: ManualInstant, duration: Duration) -> Option<ManualInstant> {
        let nanos = u64::try_from(duration.as_nanos()).ok()?;
        instant.0.checked_add(nanos).map(ManualInstant)
    }

    fn is_unbounded(instant: ManualInstant) -> bool {
        instant == ManualInstant::FAR_FUTURE
    }
}
