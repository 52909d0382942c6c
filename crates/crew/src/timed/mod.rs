// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! Deadline-driven tasks and the earliest-deadline-first executor.
//!
//! A [`TimedTask`] is a [`Task`] that additionally knows when it wants to run next:
//! `None` means "do not reschedule me", `Some(t)` means "run me no earlier than `t`".
//! [`DelayedTask`] runs once at a deadline; [`PeriodicTask`] repeats at a fixed
//! interval until its callable declines or its stop source trips.
//! [`ConcurrentTimedExecutor`] dispatches timed tasks earliest-deadline-first over an
//! arbitrary inner [`Executor`][crate::Executor]. Deadlines are best-effort: a task
//! that became due runs as soon as a worker is free, and running tasks are never
//! preempted.

mod concurrent;
mod delayed_task;
mod periodic_task;

use std::time::Duration;

use halt::StopToken;
use pace::Clock;

pub use concurrent::ConcurrentTimedExecutor;
pub use delayed_task::{DelayedTask, delayed_task, delayed_task_with_result};
pub use periodic_task::{PeriodicOutcome, PeriodicTask, periodic_task, periodic_task_with_result};

use crate::task::Task;
use crate::task_result::TaskResult;

/// A task with a schedule: a [`Task`] that can tell the executor when to run it next.
pub trait TimedTask<C: Clock>: Task {
    /// The point in time this task wants to run next, or `None` to decline
    /// rescheduling (completed one-shot, stopped periodic, cancelled task).
    fn next_execution_point(&self) -> Option<C::Instant>;
}

/// The interface of executors that schedule [`TimedTask`]s by deadline.
///
/// The convenience methods for posting bare callables live on [`TimedExecutorExt`] so
/// that this trait stays object-safe.
pub trait TimedExecutor<C: Clock>: Send + Sync {
    /// Schedules a timed task.
    ///
    /// # Panics
    ///
    /// Panics if the task declines scheduling (no next execution point).
    fn enqueue(&self, task: Box<dyn TimedTask<C>>);

    /// The clock this executor schedules against.
    fn clock(&self) -> &C;

    /// The maximum number of tasks this executor can run in parallel.
    fn max_concurrency_level(&self) -> usize;

    /// Whether [`shutdown`][Self::shutdown] was called.
    fn shutdown_requested(&self) -> bool;

    /// Requests every worker and every in-flight task to stop, via their stop tokens.
    fn shutdown(&self);
}

/// Convenience surface over [`TimedExecutor`]: posting callables instead of prebuilt tasks.
pub trait TimedExecutorExt<C: Clock>: TimedExecutor<C> {
    /// Enqueues a prebuilt timed task, fire-and-forget.
    fn post_task(&self, task: Box<dyn TimedTask<C>>) {
        self.enqueue(task);
    }

    /// Runs `callable` once, no earlier than `execution_point`, fire-and-forget.
    fn post_at<F, R>(&self, execution_point: C::Instant, callable: F)
    where
        F: FnOnce(&StopToken, C::Instant) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue(delayed_task::<C, _, _>(execution_point, callable));
    }

    /// Runs `callable` once, no earlier than `execution_point`, and returns the
    /// [`TaskResult`] observing its return value.
    fn submit_at<F, R>(&self, execution_point: C::Instant, callable: F) -> TaskResult<R>
    where
        F: FnOnce(&StopToken, C::Instant) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result, task) = delayed_task_with_result::<C, _, _>(execution_point, callable);
        self.enqueue(task);
        result
    }

    /// Runs `callable` repeatedly, first at `first_execution` and then every
    /// `interval`, fire-and-forget.
    ///
    /// A `bool`-returning callable stops the repetition by returning `false`; any other
    /// return type repeats until the task's stop source trips.
    fn post_periodic<F, O>(&self, first_execution: C::Instant, interval: Duration, callable: F)
    where
        F: FnMut(&StopToken, C::Instant) -> O + Send + 'static,
        O: PeriodicOutcome + 'static,
    {
        self.enqueue(periodic_task::<C, _, _>(first_execution, interval, callable));
    }

    /// Like [`post_periodic`][Self::post_periodic], additionally returning the
    /// [`TaskResult`] that completes with `()` when the repetition ends.
    fn submit_periodic<F, O>(&self, first_execution: C::Instant, interval: Duration, callable: F) -> TaskResult<()>
    where
        F: FnMut(&StopToken, C::Instant) -> O + Send + 'static,
        O: PeriodicOutcome + 'static,
    {
        let (result, task) = periodic_task_with_result::<C, _, _>(first_execution, interval, callable);
        self.enqueue(task);
        result
    }

    /// Runs `callable` every `interval`, starting now.
    fn post_every<F, O>(&self, interval: Duration, callable: F)
    where
        F: FnMut(&StopToken, C::Instant) -> O + Send + 'static,
        O: PeriodicOutcome + 'static,
    {
        let first_execution = self.clock().now();
        self.post_periodic(first_execution, interval, callable);
    }
}

impl<C: Clock, E: TimedExecutor<C> + ?Sized> TimedExecutorExt<C> for E {}
