// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use halt::StopToken;
use parking_lot::Mutex;

use crate::condvar::InterruptibleCondvar;
use crate::destruction_guard::{DestructionGuard, await_all_exits};

/// A latched one-shot boolean condition.
///
/// One thread waits for the notification; another thread [`notify`][Self::notify]s all
/// current and future waiters. Once notified, waits return immediately until
/// [`reset`][Self::reset] re-arms the latch. This is the interruptible condvar with a
/// fixed predicate, not a new waiting algorithm.
///
/// No spurious wake-ups are observable: the wait functions only return `true` after the
/// latch was actually seen set.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use halt::StopToken;
/// use relay::Notification;
///
/// let notification = Arc::new(Notification::new());
///
/// let waiter = {
///     let notification = Arc::clone(&notification);
///     std::thread::spawn(move || notification.wait_with_abort(&StopToken::default()))
/// };
///
/// notification.notify();
/// assert!(waiter.join().unwrap());
/// ```
pub struct Notification {
    mutex: Mutex<()>,
    condvar: InterruptibleCondvar,
    // Must be treated as non-atomic whenever the condvar is involved: read and written
    // only with `mutex` held, the atomic is for the predicate closure alone.
    notified: AtomicBool,
    entries: AtomicU32,
}

impl Notification {
    /// Creates an un-notified latch; the first wait will block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: InterruptibleCondvar::new(),
            notified: AtomicBool::new(false),
            entries: AtomicU32::new(0),
        }
    }

    /// Sets the latch and unblocks every current waiter.
    pub fn notify(&self) {
        let _guard = self.mutex.lock();
        self.notified.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Re-arms the latch; subsequent waits block until the next [`notify`][Self::notify].
    pub fn reset(&self) {
        let _guard = self.mutex.lock();
        self.notified.store(false, Ordering::Release);
    }

    /// Blocks until the latch is set or the token trips.
    ///
    /// Returns `true` iff the latch was observed set.
    pub fn wait_with_abort(&self, token: &StopToken) -> bool {
        let _entry = DestructionGuard::new(&self.entries);
        let mut guard = self.mutex.lock();
        self.condvar
            .wait(&mut guard, token, || self.notified.load(Ordering::Acquire))
    }

    /// Blocks until the latch is set, `rel_time` elapses, or the token trips.
    ///
    /// Returns `true` iff the latch was observed set.
    pub fn wait_for_with_abort(&self, rel_time: Duration, token: &StopToken) -> bool {
        let _entry = DestructionGuard::new(&self.entries);
        let mut guard = self.mutex.lock();
        self.condvar
            .wait_for(&mut guard, token, rel_time, || self.notified.load(Ordering::Acquire))
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Notification {
    fn drop(&mut self) {
        await_all_exits(&self.entries);
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("notified", &self.notified.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
