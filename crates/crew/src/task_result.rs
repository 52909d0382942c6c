// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::time::Duration;

use halt::StopSource;
use pace::Clock;
use relay::{Future, Result, SharedFuture, ValueRef};

/// Handle to a submitted task: the future over its return value plus its stop source.
///
/// Returned by [`ExecutorExt::submit`][crate::ExecutorExt::submit] and the timed-task
/// factories. [`abort`][Self::abort] requests the task to stop cooperatively; the wait
/// functions deliberately wait with a private token, so aborting the task never aborts
/// the caller's own wait - an aborted task still publishes a result (or breaks its
/// promise), which is what ends the wait.
pub struct TaskResult<T> {
    future: Future<T>,
    stop_source: StopSource,
    dummy_stop_source: StopSource,
}

impl<T> TaskResult<T> {
    /// Binds a future to the stop source of the task that will feed it.
    ///
    /// Public so that custom [`Task`][crate::Task] implementations can hand out task
    /// results of their own.
    #[must_use]
    pub fn new(future: Future<T>, stop_source: StopSource) -> Self {
        Self {
            future,
            stop_source,
            dummy_stop_source: StopSource::new(),
        }
    }

    /// Whether this result refers to a shared state.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.future.valid()
    }

    /// Requests the task to stop cooperatively.
    pub fn abort(&self) -> bool {
        self.stop_source.request_stop()
    }

    /// The stop source of the underlying task.
    #[must_use]
    pub fn stop_source(&self) -> &StopSource {
        &self.stop_source
    }

    /// Blocks until the task published its result.
    ///
    /// This wait is always finite for a scheduled task: the task either publishes or
    /// its promise breaks.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`].
    pub fn wait(&self) -> Result<()> {
        self.future.wait(&self.dummy_stop_source.token())
    }

    /// Blocks until the task published its result or `rel_time` elapsed.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::Timeout`].
    pub fn wait_for(&self, rel_time: Duration) -> Result<()> {
        self.future.wait_for(&self.dummy_stop_source.token(), rel_time)
    }

    /// Blocks until the task published its result or `deadline` was reached on `clock`.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::Timeout`].
    pub fn wait_until<C: Clock>(&self, clock: &C, deadline: C::Instant) -> Result<()> {
        self.future.wait_until(&self.dummy_stop_source.token(), clock, deadline)
    }

    /// Waits for the result and consumes it.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::PromiseBroken`], or whatever error the task published.
    pub fn get(self) -> Result<T> {
        self.future.get(&self.dummy_stop_source.token())
    }

    /// Registers a continuation on the task's result.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`]; the continuation is then invoked synchronously with that error.
    pub fn then<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        self.future.then(callback)
    }

    /// Converts this result into a [`SharedTaskResult`] over the same state.
    #[must_use]
    pub fn share(self) -> SharedTaskResult<T> {
        SharedTaskResult {
            future: self.future.share(),
            stop_source: self.stop_source,
            dummy_stop_source: self.dummy_stop_source,
        }
    }
}

impl<T> Default for TaskResult<T> {
    /// A task result without shared state; every wait reports [`Error::NoState`].
    fn default() -> Self {
        Self::new(Future::default(), StopSource::new())
    }
}

impl<T> std::fmt::Debug for TaskResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskResult").field("valid", &self.valid()).finish_non_exhaustive()
    }
}

/// The copyable counterpart of [`TaskResult`], produced by [`TaskResult::share`].
///
/// Clones observe the same task: the same result value and the same stop source.
pub struct SharedTaskResult<T> {
    future: SharedFuture<T>,
    stop_source: StopSource,
    dummy_stop_source: StopSource,
}

impl<T> SharedTaskResult<T> {
    /// Whether this result refers to a shared state.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.future.valid()
    }

    /// Requests the task to stop cooperatively.
    pub fn abort(&self) -> bool {
        self.stop_source.request_stop()
    }

    /// Blocks until the task published its result.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`].
    pub fn wait(&self) -> Result<()> {
        self.future.wait(&self.dummy_stop_source.token())
    }

    /// Blocks until the task published its result or `rel_time` elapsed.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::Timeout`].
    pub fn wait_for(&self, rel_time: Duration) -> Result<()> {
        self.future.wait_for(&self.dummy_stop_source.token(), rel_time)
    }

    /// Blocks until the task published its result or `deadline` was reached on `clock`.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::Timeout`].
    pub fn wait_until<C: Clock>(&self, clock: &C, deadline: C::Instant) -> Result<()> {
        self.future.wait_until(&self.dummy_stop_source.token(), clock, deadline)
    }

    /// Waits for the result and borrows it; repeatable on every clone.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`], [`Error::PromiseBroken`], or whatever error the task published.
    pub fn get(&self) -> Result<ValueRef<'_, T>> {
        self.future.get(&self.dummy_stop_source.token())
    }

    /// Registers a continuation on the task's result.
    ///
    /// # Errors
    ///
    /// [`Error::NoState`]; the continuation is then invoked synchronously with that error.
    pub fn then<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        self.future.then(callback)
    }
}

impl<T> Clone for SharedTaskResult<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            stop_source: self.stop_source.clone(),
            dummy_stop_source: self.dummy_stop_source.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SharedTaskResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTaskResult").field("valid", &self.valid()).finish_non_exhaustive()
    }
}
