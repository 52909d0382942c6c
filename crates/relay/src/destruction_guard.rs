// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU32, Ordering};

/// RAII entry counter for primitives that must delay destruction past in-flight waiters.
///
/// A primitive increments its counter on entry into every wait path and decrements it on
/// every exit; its `Drop` implementation yield-spins until the counter reads zero. This
/// keeps a stop callback or notifier that is still touching the primitive's internals on
/// another thread from racing its destruction, without putting the primitive itself
/// behind a shared pointer.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use relay::DestructionGuard;
///
/// let entries = AtomicU32::new(0);
/// {
///     let _guard = DestructionGuard::new(&entries);
///     assert_eq!(entries.load(Ordering::SeqCst), 1);
/// }
/// assert_eq!(entries.load(Ordering::SeqCst), 0);
/// ```
#[derive(Debug)]
pub struct DestructionGuard<'a> {
    counter: &'a AtomicU32,
}

impl<'a> DestructionGuard<'a> {
    /// Registers an entry on `counter` for the guard's lifetime.
    #[must_use = "the guard keeps the entry registered only while it lives"]
    pub fn new(counter: &'a AtomicU32) -> Self {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for DestructionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Yield-spins until `counter` reads zero.
///
/// Called from the `Drop` of primitives guarded by [`DestructionGuard`].
pub(crate) fn await_all_exits(counter: &AtomicU32) {
    while counter.load(Ordering::SeqCst) != 0 {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn nested_guards_count_entries() {
        let entries = AtomicU32::new(0);

        let outer = DestructionGuard::new(&entries);
        {
            let _inner = DestructionGuard::new(&entries);
            assert_eq!(entries.load(Ordering::SeqCst), 2);
        }
        assert_eq!(entries.load(Ordering::SeqCst), 1);

        drop(outer);
        assert_eq!(entries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn await_all_exits_blocks_until_last_exit() {
        let entries = Arc::new(AtomicU32::new(0));
        let released = Arc::new(AtomicBool::new(false));

        let _ = entries.fetch_add(1, Ordering::SeqCst);

        let waiter = {
            let entries = Arc::clone(&entries);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                await_all_exits(&entries);
                assert!(released.load(Ordering::SeqCst));
            })
        };

        thread::sleep(Duration::from_millis(20));
        released.store(true, Ordering::SeqCst);
        let _ = entries.fetch_sub(1, Ordering::SeqCst);

        waiter.join().unwrap();
    }
}
