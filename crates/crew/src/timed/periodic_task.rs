// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::time::Duration;

use halt::{StopSource, StopToken};
use pace::Clock;
use relay::Promise;
use tracing::error;

use crate::task::Task;
use crate::task_result::TaskResult;
use crate::timed::TimedTask;

/// What a periodic callable's return value says about continuing the repetition.
///
/// `bool` speaks for itself; every other supported return type means "continue", so a
/// plain `()`-returning closure repeats until its stop token trips.
pub trait PeriodicOutcome {
    /// `true` to keep repeating, `false` to end the repetition.
    fn continue_running(self) -> bool;
}

impl PeriodicOutcome for bool {
    fn continue_running(self) -> bool {
        self
    }
}

impl PeriodicOutcome for () {
    fn continue_running(self) -> bool {
        true
    }
}

/// A task that repeats at a fixed interval.
///
/// Each invocation calls the callable with the scheduled instant, then advances the
/// next execution point by the interval. The repetition ends when the callable returns
/// `false` (for `bool`-returning callables) or when the task's stop source trips; on
/// the final exit the embedded unit promise is fulfilled. Built by [`periodic_task`] or
/// [`periodic_task_with_result`].
///
/// # Aborts
///
/// If advancing the next execution point overflows the clock's instant range the
/// process is aborted: the schedule is irrecoverably lost and continuing would silently
/// drop the task.
pub struct PeriodicTask<C: Clock, F> {
    execution_time_point: C::Instant,
    interval: Duration,
    stop_source: StopSource,
    promise: Promise<()>,
    callable: F,
}

impl<C, F, O> PeriodicTask<C, F>
where
    C: Clock,
    F: FnMut(&StopToken, C::Instant) -> O + Send,
    O: PeriodicOutcome,
{
    fn call_callable(&mut self, token: &StopToken) -> bool {
        match self.next_execution_point() {
            Some(execution_point) => (self.callable)(token, execution_point).continue_running(),
            None => false,
        }
    }
}

impl<C, F, O> Task for PeriodicTask<C, F>
where
    C: Clock,
    F: FnMut(&StopToken, C::Instant) -> O + Send,
    O: PeriodicOutcome,
{
    fn run(&mut self, token: &StopToken) {
        if !self.call_callable(token) {
            let _ = self.stop_source.request_stop();
            // The last execution fulfills the promise.
            let _ = self.promise.set_value(());
            return;
        }

        match C::checked_add(self.execution_time_point, self.interval) {
            Some(next) => self.execution_time_point = next,
            None => {
                error!("periodic task schedule overflowed its clock's instant range");
                std::process::abort();
            }
        }
    }

    fn stop_source(&self) -> &StopSource {
        &self.stop_source
    }
}

impl<C, F, O> TimedTask<C> for PeriodicTask<C, F>
where
    C: Clock,
    F: FnMut(&StopToken, C::Instant) -> O + Send,
    O: PeriodicOutcome,
{
    fn next_execution_point(&self) -> Option<C::Instant> {
        if self.stop_source.stop_requested() {
            return None;
        }
        Some(self.execution_time_point)
    }
}

impl<C: Clock, F> std::fmt::Debug for PeriodicTask<C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("execution_time_point", &self.execution_time_point)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Builds a fire-and-forget [`PeriodicTask`] first running at `first_execution` and then
/// every `interval`.
pub fn periodic_task<C, F, O>(first_execution: C::Instant, interval: Duration, callable: F) -> Box<dyn TimedTask<C>>
where
    C: Clock,
    F: FnMut(&StopToken, C::Instant) -> O + Send + 'static,
    O: PeriodicOutcome + 'static,
{
    Box::new(PeriodicTask::<C, F> {
        execution_time_point: first_execution,
        interval,
        stop_source: StopSource::new(),
        promise: Promise::new(),
        callable,
    })
}

/// Builds a [`PeriodicTask`] together with the [`TaskResult`] that completes with `()`
/// when the repetition ends.
pub fn periodic_task_with_result<C, F, O>(
    first_execution: C::Instant,
    interval: Duration,
    callable: F,
) -> (TaskResult<()>, Box<dyn TimedTask<C>>)
where
    C: Clock,
    F: FnMut(&StopToken, C::Instant) -> O + Send + 'static,
    O: PeriodicOutcome + 'static,
{
    let mut promise = Promise::new();
    let future = promise.get_future().expect("fresh promise yields its future");

    let task = PeriodicTask::<C, F> {
        execution_time_point: first_execution,
        interval,
        stop_source: StopSource::new(),
        promise,
        callable,
    };
    let result = TaskResult::new(future, task.stop_source.clone());

    (result, Box::new(task))
}
