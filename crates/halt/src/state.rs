// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const ERR_POISONED_LOCK: &str = "lock poisoned by a panicking thread";

/// Shared stop state behind every source/token pair.
///
/// `stopped` is the lock-free fast path for polling. The registry mutex is the
/// serialization point for everything else: the authoritative stop flag, callback
/// registration, and callback invocation. Invoking callbacks while holding the registry
/// lock is what gives [`StopCallback`][crate::StopCallback] its drop guarantee: a
/// deregistration cannot complete while the callback is mid-flight on another thread,
/// because it has to wait for the lock.
pub(crate) struct StopState {
    stopped: AtomicBool,
    registry: Mutex<CallbackRegistry>,
}

struct CallbackRegistry {
    stopped: bool,
    next_id: u64,
    callbacks: Vec<(u64, Box<dyn FnOnce() + Send>)>,
}

impl StopState {
    pub(crate) fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            registry: Mutex::new(CallbackRegistry {
                stopped: false,
                next_id: 0,
                callbacks: Vec::new(),
            }),
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Trips the signal. Returns `true` only for the call that actually tripped it.
    ///
    /// All callbacks registered so far run on the calling thread, in registration order,
    /// before this returns. Callbacks must not register or deregister callbacks on the
    /// same stop state; doing so deadlocks.
    pub(crate) fn request_stop(&self) -> bool {
        let mut registry = self.registry.lock().expect(ERR_POISONED_LOCK);
        if registry.stopped {
            return false;
        }
        registry.stopped = true;
        self.stopped.store(true, Ordering::Release);

        let callbacks = std::mem::take(&mut registry.callbacks);
        for (_, callback) in callbacks {
            callback();
        }
        true
    }

    /// Registers `callback`, or fires it synchronously when the signal already tripped.
    ///
    /// Returns the registration id to deregister with, or `None` if the callback was
    /// consumed synchronously.
    pub(crate) fn register(&self, callback: Box<dyn FnOnce() + Send>) -> Option<u64> {
        let mut registry = self.registry.lock().expect(ERR_POISONED_LOCK);
        if registry.stopped {
            drop(registry);
            callback();
            return None;
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, callback));
        Some(id)
    }

    /// Removes a registration. Blocks while `request_stop` is invoking callbacks.
    pub(crate) fn deregister(&self, id: u64) {
        let mut registry = self.registry.lock().expect(ERR_POISONED_LOCK);
        registry.callbacks.retain(|(slot, _)| *slot != id);
    }
}

impl std::fmt::Debug for StopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopState")
            .field("stopped", &self.stop_requested())
            .finish_non_exhaustive()
    }
}
