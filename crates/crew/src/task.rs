// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use halt::{StopSource, StopToken};
use relay::Promise;

use crate::task_result::TaskResult;

/// A unit of work an [`Executor`][crate::Executor] can schedule.
///
/// Every task owns a [`StopSource`]; its token is both the task's cancellation surface
/// (reachable through [`TaskResult::abort`]) and the token the executor passes into the
/// callable. Stopping a task is cooperative: the callable decides what to do with the
/// signal, the executor never preempts.
pub trait Task: Send {
    /// Invokes the task's callable.
    ///
    /// Executors call this at most once per scheduling decision, with the task's own
    /// token.
    fn run(&mut self, token: &StopToken);

    /// The stop source that cancels this task.
    fn stop_source(&self) -> &StopSource;
}

/// The plain task: one callable, one stop source, no schedule.
///
/// Built by [`simple_task`] or [`simple_task_with_result`]; the callable runs at most
/// once.
pub struct SimpleTask<F> {
    stop_source: StopSource,
    callable: Option<F>,
}

impl<F> SimpleTask<F>
where
    F: FnOnce(&StopToken) + Send,
{
    fn new(callable: F) -> Self {
        Self {
            stop_source: StopSource::new(),
            callable: Some(callable),
        }
    }
}

impl<F> Task for SimpleTask<F>
where
    F: FnOnce(&StopToken) + Send,
{
    fn run(&mut self, token: &StopToken) {
        if let Some(callable) = self.callable.take() {
            callable(token);
        }
    }

    fn stop_source(&self) -> &StopSource {
        &self.stop_source
    }
}

impl<F> std::fmt::Debug for SimpleTask<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleTask")
            .field("executed", &self.callable.is_none())
            .finish_non_exhaustive()
    }
}

/// Wraps a callable into a fire-and-forget [`Task`].
pub fn simple_task<F>(callable: F) -> Box<dyn Task>
where
    F: FnOnce(&StopToken) + Send + 'static,
{
    Box::new(SimpleTask::new(callable))
}

/// Wraps a callable into a [`Task`] that publishes its return value through a promise.
///
/// Returns the [`TaskResult`] observing that promise together with the task. If the
/// task is dropped without ever running, the embedded promise breaks and the result
/// reports [`relay::Error::PromiseBroken`].
pub fn simple_task_with_result<F, R>(callable: F) -> (TaskResult<R>, Box<dyn Task>)
where
    F: FnOnce(&StopToken) -> R + Send + 'static,
    R: Send + 'static,
{
    let mut promise = Promise::new();
    let future = promise.get_future().expect("fresh promise yields its future");

    let task = SimpleTask::new(move |token: &StopToken| {
        let value = callable(token);
        let _ = promise.set_value(value);
    });
    let result = TaskResult::new(future, task.stop_source().clone());

    (result, Box::new(task))
}
