// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use halt::StopToken;
use pace::Clock;
use parking_lot::{Mutex, MutexGuard};
use relay::InterruptibleCondvar;

use crate::executor::{Executor, ExecutorExt};
use crate::timed::{TimedExecutor, TimedTask};

/// Earliest-deadline-first dispatch of [`TimedTask`]s over an arbitrary inner executor.
///
/// The executor posts one worker loop per unit of the inner executor's concurrency.
/// Idle workers are either *free* (waiting for the queue to become non-empty) or
/// *sleeping* (waiting until a specific deadline); the two sets are disjoint and
/// together cover all idle workers. When a task arrives, exactly one worker is woken:
/// a free one if any exists, otherwise the earliest sleeper whose wake-up point lies at
/// or after the new deadline - the one sleeper that would benefit from reconsidering.
/// A woken sleeper puts its own task back into the queue before picking the front
/// again, so an earlier-deadline arrival always wins; that re-insert may cascade one
/// more wake-up, and the cascade is bounded by the number of sleeping workers.
///
/// Deadlines are best-effort. Running tasks are never preempted: if the concurrency
/// level is below peak demand the executor misses deadlines rather than dropping tasks,
/// and a cancelled task that already started runs to completion (its next execution is
/// suppressed instead).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use crew::ThreadPool;
/// use crew::timed::{ConcurrentTimedExecutor, TimedExecutorExt};
/// use pace::{Clock, MonotonicClock};
///
/// let clock = MonotonicClock;
/// let executor = ConcurrentTimedExecutor::new(clock, Box::new(ThreadPool::new(2)));
///
/// let soon = MonotonicClock::checked_add(clock.now(), Duration::from_millis(5)).unwrap();
/// let result = executor.submit_at(soon, |_token, _scheduled| 42);
/// assert_eq!(result.get(), Ok(42));
/// ```
pub struct ConcurrentTimedExecutor<C: Clock> {
    // Declared first: dropping the inner executor joins the worker loops before the
    // scheduling state goes away.
    executor: Box<dyn Executor>,
    clock: C,
    state: Arc<TimedState<C>>,
}

struct TimedState<C: Clock> {
    // Queue length mirror for the free-worker predicate; authoritative data is behind
    // `sched`.
    pending: AtomicUsize,
    sched: Mutex<Sched<C>>,
}

struct Sched<C: Clock> {
    /// Pending tasks, sorted ascending by deadline; equal deadlines keep insertion order.
    queue: VecDeque<(C::Instant, Box<dyn TimedTask<C>>)>,
    /// Condvars of workers waiting for the queue to become non-empty.
    free: Vec<Arc<InterruptibleCondvar>>,
    /// `(wake_at, condvar)` of workers sleeping until a specific deadline, sorted ascending.
    waiting: Vec<(C::Instant, Arc<InterruptibleCondvar>)>,
}

impl<C: Clock> ConcurrentTimedExecutor<C> {
    /// Creates a timed executor running its workers on `executor`.
    ///
    /// One worker loop per unit of `executor.max_concurrency_level()` is posted
    /// immediately; the loops live until the inner executor shuts down.
    #[must_use]
    pub fn new(clock: C, executor: Box<dyn Executor>) -> Self {
        let state = Arc::new(TimedState {
            pending: AtomicUsize::new(0),
            sched: Mutex::new(Sched {
                queue: VecDeque::new(),
                free: Vec::new(),
                waiting: Vec::new(),
            }),
        });

        for _ in 0..executor.max_concurrency_level() {
            let state = Arc::clone(&state);
            let clock = clock.clone();
            let condvar = Arc::new(InterruptibleCondvar::new());
            executor.post(move |token: &StopToken| {
                while !token.stop_requested() {
                    state.work(&clock, token, &condvar);
                }
            });
        }

        Self { executor, clock, state }
    }
}

impl<C: Clock> TimedExecutor<C> for ConcurrentTimedExecutor<C> {
    fn enqueue(&self, task: Box<dyn TimedTask<C>>) {
        let next_execution_point = task
            .next_execution_point()
            .expect("contract violation: task declines scheduling");

        let sched = self.state.sched.lock();
        self.state.schedule_at(sched, next_execution_point, task);
    }

    fn clock(&self) -> &C {
        &self.clock
    }

    fn max_concurrency_level(&self) -> usize {
        self.executor.max_concurrency_level()
    }

    fn shutdown_requested(&self) -> bool {
        self.executor.shutdown_requested()
    }

    fn shutdown(&self) {
        self.executor.shutdown();
    }
}

impl<C: Clock> TimedState<C> {
    #[cfg_attr(test, mutants::skip)] // Wake-critical loop - tampering hangs the test suite.
    fn work(&self, clock: &C, token: &StopToken, condvar: &Arc<InterruptibleCondvar>) {
        let mut sched = self.sched.lock();
        sched.free.push(Arc::clone(condvar));
        if !condvar.wait(&mut sched, token, || self.pending.load(Ordering::Acquire) != 0) {
            return; // interrupted: the worker shuts down
        }
        sched.free.retain(|entry| !Arc::ptr_eq(entry, condvar));

        let (next_execution_point, mut task) = sched.queue.pop_front().expect("woken with an empty queue");
        self.pending.store(sched.queue.len(), Ordering::Release);

        if clock.now() < next_execution_point {
            // Not due yet: sleep until the deadline on our own condvar. Spurious
            // wake-ups are not filtered here; the unconditional re-insert below
            // normalizes them and guarantees that a task with an earlier deadline
            // that arrived while we slept is picked first on the next iteration.
            let position = sched
                .waiting
                .partition_point(|(wake_at, _)| *wake_at <= next_execution_point);
            sched.waiting.insert(position, (next_execution_point, Arc::clone(condvar)));

            let _ = condvar.wait_deadline(&mut sched, token, clock, next_execution_point);

            if let Some(position) = sched
                .waiting
                .iter()
                .position(|(wake_at, entry)| *wake_at == next_execution_point && Arc::ptr_eq(entry, condvar))
            {
                let _ = sched.waiting.remove(position);
            }

            self.schedule_at(sched, next_execution_point, task);
            return;
        }
        drop(sched);

        {
            // Bridge the worker's cancellation to the running task, so shutdown
            // reaches a task that is already mid-flight.
            let task_stop = task.stop_source().clone();
            let _stop_callback = token.on_stop(move || {
                let _ = task_stop.request_stop();
            });
            let run_token = task.stop_source().token();
            task.run(&run_token);
        }

        if let Some(next) = task.next_execution_point() {
            let sched = self.sched.lock();
            self.schedule_at(sched, next, task);
        }
    }

    /// Inserts `(time_point, task)` sorted into the queue and wakes the one worker that
    /// should reconsider.
    fn schedule_at(&self, mut sched: MutexGuard<'_, Sched<C>>, time_point: C::Instant, task: Box<dyn TimedTask<C>>) {
        // partition_point on `<=` keeps equal deadlines in insertion order.
        let position = sched.queue.partition_point(|(at, _)| *at <= time_point);
        sched.queue.insert(position, (time_point, task));
        self.pending.store(sched.queue.len(), Ordering::Release);

        // Waking everything would stampede the mutex; waking an arbitrary single
        // worker could pick one sleeping far past the new deadline while a better
        // candidate sleeps on. So: a free worker if any, else the first sleeper whose
        // wake-up point lies at or after the new deadline.
        if let Some(free_worker) = sched.free.first() {
            free_worker.notify_one();
        } else {
            let position = sched.waiting.partition_point(|(wake_at, _)| *wake_at < time_point);
            if let Some((_, sleeper)) = sched.waiting.get(position) {
                sleeper.notify_one();
            }
        }
    }
}

impl<C: Clock> std::fmt::Debug for ConcurrentTimedExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentTimedExecutor")
            .field("max_concurrency_level", &self.max_concurrency_level())
            .finish_non_exhaustive()
    }
}
