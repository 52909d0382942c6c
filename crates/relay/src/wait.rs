// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::time::Duration;

use halt::StopToken;
use pace::Clock;
use parking_lot::Mutex;

use crate::condvar::InterruptibleCondvar;

/// Blocks until the token trips or `timeout` elapses.
///
/// Returns `true` iff the stop was requested.
#[must_use]
pub fn wait_for(token: &StopToken, timeout: Duration) -> bool {
    let mutex = Mutex::new(());
    let condvar = InterruptibleCondvar::new();
    let mut guard = mutex.lock();

    condvar.wait_for(&mut guard, token, timeout, || token.stop_requested())
}

/// Blocks until the token trips or `deadline` is reached on `clock`.
///
/// Returns `true` iff the stop was requested.
#[must_use]
pub fn wait_until<C: Clock>(token: &StopToken, clock: &C, deadline: C::Instant) -> bool {
    let mutex = Mutex::new(());
    let condvar = InterruptibleCondvar::new();
    let mut guard = mutex.lock();

    condvar.wait_until(&mut guard, token, clock, deadline, || token.stop_requested())
}

/// Blocks until the token trips.
///
/// Blocks forever if no associated source ever requests a stop.
pub fn wait_until_stop_requested(token: &StopToken) {
    let mutex = Mutex::new(());
    let condvar = InterruptibleCondvar::new();
    let mut guard = mutex.lock();

    let _ = condvar.wait(&mut guard, token, || token.stop_requested());
}
