// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use halt::{StopSource, StopToken};
use parking_lot::{Mutex, MutexGuard};
use relay::InterruptibleCondvar;
use tracing::warn;

use crate::executor::Executor;
use crate::task::Task;

/// Fixed-size worker set draining a FIFO queue.
///
/// Workers record the stop source of the task they are currently running, so
/// [`shutdown`][Executor::shutdown] can request a stop on every in-flight task as well
/// as on every idle worker. A task enqueued after shutdown is not dropped: it executes
/// inline on the enqueuing thread, with its own stop token already tripped, preserving
/// "every enqueued task runs exactly once". Reentrant posting from inside a task is
/// permitted and uses the same inline path when the pool is already shut down.
///
/// Dropping the pool shuts it down and joins all workers.
///
/// # Examples
///
/// ```
/// use crew::{Executor, ExecutorExt, ThreadPool};
///
/// let pool = ThreadPool::new(2);
/// assert_eq!(pool.max_concurrency_level(), 2);
///
/// let result = pool.submit(|_| 42);
/// assert_eq!(result.get(), Ok(42));
/// ```
pub struct ThreadPool {
    state: Arc<PoolState>,
    worker_stops: Vec<StopSource>,
    workers: Vec<JoinHandle<()>>,
}

struct PoolState {
    shutdown_requested: AtomicBool,
    // Queue length mirror for the wait predicate; authoritative data is behind `queue`.
    pending: AtomicUsize,
    queue: Mutex<PoolQueue>,
    condvar: InterruptibleCondvar,
}

struct PoolQueue {
    tasks: VecDeque<Box<dyn Task>>,
    // One slot per worker holding the stop source of the task it currently runs.
    active: Vec<StopSource>,
}

impl ThreadPool {
    /// Creates a pool of `number_of_threads` workers named `crew-worker-<n>`.
    #[must_use]
    pub fn new(number_of_threads: usize) -> Self {
        Self::with_name(number_of_threads, "crew-worker")
    }

    /// Creates a pool of `number_of_threads` workers named `<name>-<n>`.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn a worker thread.
    #[must_use]
    pub fn with_name(number_of_threads: usize, name: &str) -> Self {
        let state = Arc::new(PoolState {
            shutdown_requested: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            queue: Mutex::new(PoolQueue {
                tasks: VecDeque::new(),
                active: (0..number_of_threads).map(|_| StopSource::new()).collect(),
            }),
            condvar: InterruptibleCondvar::new(),
        });

        let worker_stops: Vec<_> = (0..number_of_threads).map(|_| StopSource::new()).collect();
        let workers = worker_stops
            .iter()
            .enumerate()
            .map(|(thread_number, stop)| {
                let state = Arc::clone(&state);
                let token = stop.token();
                std::thread::Builder::new()
                    .name(format!("{name}-{thread_number}"))
                    .spawn(move || state.work(thread_number, &token))
                    .expect("failed to spawn pool worker thread")
            })
            .collect();

        Self {
            state,
            worker_stops,
            workers,
        }
    }

    fn internal_shutdown(&self) {
        // Flag first so no new task enters the queue afterwards.
        self.state.shutdown_requested.store(true, Ordering::SeqCst);

        let queue = self.state.queue.lock();
        for task_stop in &queue.active {
            let _ = task_stop.request_stop();
        }
        for worker_stop in &self.worker_stops {
            let _ = worker_stop.request_stop();
        }
    }
}

impl Executor for ThreadPool {
    fn enqueue(&self, task: Box<dyn Task>) {
        // The lock must be taken before the flag check: otherwise a task could slip
        // into the queue while shutdown runs, after all workers already drained and
        // exited, and would never execute.
        let mut queue = self.state.queue.lock();
        if self.shutdown_requested() {
            drop(queue);
            warn!("task enqueued after shutdown; executing inline");
            self.state.execute(task);
        } else {
            queue.tasks.push_back(task);
            self.state.pending.store(queue.tasks.len(), Ordering::Release);
            self.state.condvar.notify_one();
        }
    }

    fn max_concurrency_level(&self) -> usize {
        self.worker_stops.len()
    }

    fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.internal_shutdown();
    }
}

impl PoolState {
    #[cfg_attr(test, mutants::skip)] // Wake-critical loop - tampering hangs the test suite.
    fn work(&self, thread_number: usize, token: &StopToken) {
        let mut queue = self.queue.lock();
        while !token.stop_requested() || !queue.tasks.is_empty() {
            let _ = self
                .condvar
                .wait(&mut queue, token, || self.pending.load(Ordering::Acquire) != 0);

            let task = queue.tasks.pop_front();
            self.pending.store(queue.tasks.len(), Ordering::Release);

            if let Some(task) = task {
                // Record the task's stop source so shutdown can reach it mid-flight.
                queue.active[thread_number] = task.stop_source().clone();
                MutexGuard::unlocked(&mut queue, || {
                    self.execute(task);
                });
                queue.active[thread_number] = StopSource::new();
            }
        }
    }

    fn execute(&self, mut task: Box<dyn Task>) {
        if self.shutdown_requested.load(Ordering::SeqCst) {
            let _ = task.stop_source().request_stop();
        }
        let token = task.stop_source().token();
        task.run(&token);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.internal_shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_stops.len())
            .field("shutdown_requested", &self.shutdown_requested())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    use relay::Notification;

    use super::*;
    use crate::executor::ExecutorExt;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(ThreadPool: Send, Sync);
    }

    #[test]
    fn submit_runs_on_a_worker_and_returns_the_value() {
        let pool = ThreadPool::new(2);
        assert_eq!(pool.max_concurrency_level(), 2);

        let submitter = thread::current().id();
        let result = pool.submit(move |_| {
            assert_ne!(thread::current().id(), submitter);
            42
        });

        assert_eq!(result.get(), Ok(42));
    }

    #[test]
    fn workers_carry_the_pool_name() {
        let pool = ThreadPool::with_name(1, "naming-test");
        let result = pool.submit(|_| thread::current().name().map(String::from));
        assert_eq!(result.get(), Ok(Some("naming-test-0".to_string())));
    }

    #[test]
    fn every_posted_task_runs_exactly_once_across_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let pool = ThreadPool::new(4);
            for _ in 0..64 {
                let counter = Arc::clone(&counter);
                pool.post(move |_| {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            pool.shutdown();

            // Tasks posted after shutdown execute inline, still exactly once.
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                pool.post(move |_| {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 72);
    }

    #[test]
    fn post_after_shutdown_executes_inline_with_tripped_token() {
        let pool = ThreadPool::new(0);
        pool.shutdown();

        let submitter = thread::current().id();
        let result = pool.submit(move |token: &StopToken| {
            assert_eq!(thread::current().id(), submitter);
            token.stop_requested()
        });

        assert_eq!(result.get(), Ok(true));
    }

    #[test]
    fn reentrant_submission_during_shutdown_runs_both_bodies_inline() {
        let pool = Arc::new(ThreadPool::new(0));
        pool.shutdown();

        let counter = Arc::new(AtomicU32::new(0));
        {
            let pool_clone = Arc::clone(&pool);
            let counter_outer = Arc::clone(&counter);
            pool.post(move |_| {
                let counter_inner = Arc::clone(&counter_outer);
                pool_clone.submit(move |_| {
                    let _ = counter_inner.fetch_add(1, Ordering::SeqCst);
                });
                let _ = counter_outer.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_requests_stop_on_running_tasks() {
        let pool = ThreadPool::new(1);
        let started = Arc::new(Notification::new());

        let started_clone = Arc::clone(&started);
        let result = pool.submit(move |token: &StopToken| {
            started_clone.notify();
            while !token.stop_requested() {
                thread::sleep(Duration::from_millis(1));
            }
            "stopped"
        });

        assert!(started.wait_with_abort(&StopToken::default()));
        pool.shutdown();

        assert_eq!(result.get(), Ok("stopped"));
    }

    #[test]
    fn queued_tasks_drain_on_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(Notification::new());
        {
            let pool = ThreadPool::new(1);

            // Block the single worker so the rest of the tasks pile up in the queue.
            let gate_clone = Arc::clone(&gate);
            pool.post(move |_| {
                let _ = gate_clone.wait_with_abort(&StopToken::default());
            });
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                pool.post(move |_| {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                });
            }

            gate.notify();
            // Dropping the pool shuts down and joins; the queue must be drained first.
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn tasks_observe_their_own_token_not_the_workers() {
        let pool = ThreadPool::new(1);
        let result = pool.submit(|token: &StopToken| token.stop_requested());
        assert_eq!(result.get(), Ok(false));
    }

    #[test]
    fn aborting_one_task_leaves_others_running() {
        let pool = ThreadPool::new(2);

        let blocked = pool.submit(|token: &StopToken| {
            while !token.stop_requested() {
                thread::sleep(Duration::from_millis(1));
            }
            "aborted"
        });
        let unaffected = pool.submit(|token: &StopToken| token.stop_requested());

        assert_eq!(unaffected.get(), Ok(false));
        assert!(blocked.abort());
        assert_eq!(blocked.get(), Ok("aborted"));
    }
}
