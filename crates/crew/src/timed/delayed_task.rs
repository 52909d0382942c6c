// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use halt::{StopSource, StopToken};
use pace::Clock;
use relay::Promise;

use crate::task::Task;
use crate::task_result::TaskResult;
use crate::timed::TimedTask;

/// A task that runs exactly once, no earlier than its deadline.
///
/// On invocation the callable receives the scheduled instant, its return value is
/// published through the embedded promise, and the task requests its own stop - which
/// makes [`next_execution_point`][TimedTask::next_execution_point] report `None` so the
/// executor never reschedules it. Built by [`delayed_task`] or
/// [`delayed_task_with_result`].
pub struct DelayedTask<C: Clock, F, R> {
    execution_time_point: C::Instant,
    stop_source: StopSource,
    promise: Promise<R>,
    callable: Option<F>,
}

impl<C, F, R> Task for DelayedTask<C, F, R>
where
    C: Clock,
    F: FnOnce(&StopToken, C::Instant) -> R + Send,
    R: Send,
{
    fn run(&mut self, token: &StopToken) {
        if let Some(execution_point) = self.next_execution_point() {
            if let Some(callable) = self.callable.take() {
                let value = callable(token, execution_point);
                let _ = self.promise.set_value(value);
            }
        }
        // One-shot: decline any further scheduling.
        let _ = self.stop_source.request_stop();
    }

    fn stop_source(&self) -> &StopSource {
        &self.stop_source
    }
}

impl<C, F, R> TimedTask<C> for DelayedTask<C, F, R>
where
    C: Clock,
    F: FnOnce(&StopToken, C::Instant) -> R + Send,
    R: Send,
{
    fn next_execution_point(&self) -> Option<C::Instant> {
        if self.stop_source.stop_requested() {
            return None;
        }
        Some(self.execution_time_point)
    }
}

impl<C: Clock, F, R> std::fmt::Debug for DelayedTask<C, F, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedTask")
            .field("execution_time_point", &self.execution_time_point)
            .finish_non_exhaustive()
    }
}

/// Builds a fire-and-forget [`DelayedTask`] running `callable` at `execution_time_point`.
pub fn delayed_task<C, F, R>(execution_time_point: C::Instant, callable: F) -> Box<dyn TimedTask<C>>
where
    C: Clock,
    F: FnOnce(&StopToken, C::Instant) -> R + Send + 'static,
    R: Send + 'static,
{
    Box::new(DelayedTask::<C, F, R> {
        execution_time_point,
        stop_source: StopSource::new(),
        promise: Promise::new(),
        callable: Some(callable),
    })
}

/// Builds a [`DelayedTask`] together with the [`TaskResult`] observing its return value.
pub fn delayed_task_with_result<C, F, R>(
    execution_time_point: C::Instant,
    callable: F,
) -> (TaskResult<R>, Box<dyn TimedTask<C>>)
where
    C: Clock,
    F: FnOnce(&StopToken, C::Instant) -> R + Send + 'static,
    R: Send + 'static,
{
    let mut promise = Promise::new();
    let future = promise.get_future().expect("fresh promise yields its future");

    let task = DelayedTask::<C, F, R> {
        execution_time_point,
        stop_source: StopSource::new(),
        promise,
        callable: Some(callable),
    };
    let result = TaskResult::new(future, task.stop_source.clone());

    (result, Box::new(task))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pace::{ManualClock, ManualInstant};
    use relay::Error;

    use super::*;

    fn at(nanos_from_origin: Duration) -> ManualInstant {
        ManualClock::checked_add(ManualInstant::ZERO, nanos_from_origin).unwrap()
    }

    #[test]
    fn reports_its_deadline_until_it_ran() {
        let deadline = at(Duration::from_millis(5));
        let (result, mut task) = delayed_task_with_result::<ManualClock, _, _>(deadline, |_, _| 1);

        assert_eq!(task.next_execution_point(), Some(deadline));

        let token = task.stop_source().token();
        task.run(&token);

        assert_eq!(task.next_execution_point(), None);
        assert_eq!(result.get(), Ok(1));
    }

    #[test]
    fn callable_receives_the_scheduled_instant() {
        let deadline = at(Duration::from_millis(7));
        let (result, mut task) =
            delayed_task_with_result::<ManualClock, _, _>(deadline, |_, scheduled| scheduled);

        let token = task.stop_source().token();
        task.run(&token);

        assert_eq!(result.get(), Ok(deadline));
    }

    #[test]
    fn cancelled_task_declines_scheduling_and_breaks_its_promise() {
        let (result, mut task) = delayed_task_with_result::<ManualClock, _, _>(at(Duration::from_secs(1)), |_, _| 9);

        assert!(task.stop_source().request_stop());
        assert_eq!(task.next_execution_point(), None);

        // An executor that still invokes it must not run the callable.
        let token = task.stop_source().token();
        task.run(&token);
        drop(task);

        assert_eq!(result.get(), Err(Error::PromiseBroken));
    }

    #[test]
    fn unscheduled_task_breaks_its_promise_on_drop() {
        let (result, task) = delayed_task_with_result::<ManualClock, _, _>(at(Duration::from_secs(1)), |_, _| 9);
        drop(task);
        assert_eq!(result.get(), Err(Error::PromiseBroken));
    }
}
