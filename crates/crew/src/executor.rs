// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use halt::StopToken;

use crate::task::{Task, simple_task, simple_task_with_result};
use crate::task_result::TaskResult;

/// The interface every execution policy implements.
///
/// An executor schedules [`Task`]s by some policy - a fixed worker pool
/// ([`ThreadPool`][crate::ThreadPool]), a thread per task
/// ([`LongRunningThreads`][crate::LongRunningThreads]), or anything user-defined. The
/// convenience methods for posting bare callables live on [`ExecutorExt`] so that this
/// trait stays object-safe.
///
/// Implementations guarantee that every enqueued task runs exactly once, even when it
/// arrives after [`shutdown`][Self::shutdown]; in that case it runs inline on the
/// enqueuing thread with its stop token already tripped.
pub trait Executor: Send + Sync {
    /// Schedules a task for execution.
    fn enqueue(&self, task: Box<dyn Task>);

    /// The maximum number of tasks this executor can run in parallel.
    fn max_concurrency_level(&self) -> usize;

    /// Whether [`shutdown`][Self::shutdown] was called.
    fn shutdown_requested(&self) -> bool;

    /// Requests every worker and every in-flight task to stop, via their stop tokens.
    ///
    /// There is no guarantee the task implementations listen to their tokens.
    fn shutdown(&self);
}

/// Convenience surface over [`Executor`]: posting callables instead of prebuilt tasks.
pub trait ExecutorExt: Executor {
    /// Enqueues a prebuilt task, fire-and-forget.
    fn post_task(&self, task: Box<dyn Task>) {
        self.enqueue(task);
    }

    /// Enqueues a callable, fire-and-forget.
    ///
    /// If the result matters, use [`submit`][Self::submit] instead.
    fn post<F>(&self, callable: F)
    where
        F: FnOnce(&StopToken) + Send + 'static,
    {
        self.enqueue(simple_task(callable));
    }

    /// Enqueues a callable and returns the [`TaskResult`] observing its return value.
    fn submit<F, R>(&self, callable: F) -> TaskResult<R>
    where
        F: FnOnce(&StopToken) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result, task) = simple_task_with_result(callable);
        self.enqueue(task);
        result
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    use super::*;

    /// Executes every task synchronously on the enqueuing thread.
    #[derive(Default)]
    struct InlineExecutor {
        shutdown: AtomicBool,
        executed: AtomicUsize,
    }

    impl Executor for InlineExecutor {
        fn enqueue(&self, mut task: Box<dyn Task>) {
            if self.shutdown_requested() {
                let _ = task.stop_source().request_stop();
            }
            let token = task.stop_source().token();
            task.run(&token);
            let _ = self.executed.fetch_add(1, Ordering::SeqCst);
        }

        fn max_concurrency_level(&self) -> usize {
            1
        }

        fn shutdown_requested(&self) -> bool {
            self.shutdown.load(Ordering::SeqCst)
        }

        fn shutdown(&self) {
            self.shutdown.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn post_wraps_the_callable_into_a_task() {
        let executor = InlineExecutor::default();
        let ran = Arc::new(AtomicU32::new(0));

        let ran_clone = Arc::clone(&ran);
        executor.post(move |_| {
            let _ = ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submit_returns_the_result() {
        let executor = InlineExecutor::default();
        let result = executor.submit(|_| "done");
        assert_eq!(result.get(), Ok("done"));
    }

    #[test]
    fn ext_methods_are_callable_through_dyn() {
        let executor: Box<dyn Executor> = Box::new(InlineExecutor::default());
        let result = executor.submit(|_| 3);
        assert_eq!(result.get(), Ok(3));
    }

    #[test]
    fn submitted_callable_sees_a_tripped_token_after_shutdown() {
        let executor = InlineExecutor::default();
        executor.shutdown();

        let result = executor.submit(|token: &StopToken| token.stop_requested());
        assert_eq!(result.get(), Ok(true));
    }
}
