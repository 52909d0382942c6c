// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::thread::JoinHandle;

use halt::StopSource;
use parking_lot::Mutex;
use tracing::warn;

use crate::executor::Executor;
use crate::task::Task;

/// An executor that dedicates a fresh thread to every enqueued task.
///
/// In contrast to [`ThreadPool`][crate::ThreadPool], threads are never reused. The
/// intended cargo are *blocking* tasks: tasks that spend most of their life waiting on
/// some condition and run for the executor's whole lifetime. Shutdown requests a stop on
/// every tracked task and gates further submissions; a task enqueued after shutdown runs
/// inline on the enqueuing thread with the executor's already-tripped token.
///
/// Dropping the container shuts it down and joins every spawned thread.
pub struct LongRunningThreads {
    inner: Mutex<Inner>,
    stop_source: StopSource,
}

struct Inner {
    active: Vec<StopSource>,
    // Joined on drop, after everything else signalled stop.
    threads: Vec<JoinHandle<()>>,
}

impl LongRunningThreads {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                active: Vec::new(),
                threads: Vec::new(),
            }),
            stop_source: StopSource::new(),
        }
    }

    fn internal_shutdown(&self) {
        let inner = self.inner.lock();
        for task_stop in &inner.active {
            let _ = task_stop.request_stop();
        }
        let _ = self.stop_source.request_stop();
    }
}

impl Executor for LongRunningThreads {
    fn enqueue(&self, mut task: Box<dyn Task>) {
        let mut inner = self.inner.lock();
        if self.stop_source.stop_requested() {
            drop(inner);
            warn!("task enqueued after shutdown; executing inline");
            // The container's token is tripped; the task decides what that means.
            task.run(&self.stop_source.token());
        } else {
            inner.active.push(task.stop_source().clone());
            let token = task.stop_source().token();
            inner.threads.push(std::thread::spawn(move || {
                let mut task = task;
                task.run(&token);
            }));
        }
    }

    fn max_concurrency_level(&self) -> usize {
        // One thread per task; the limit is whatever the system can bear.
        usize::MAX
    }

    fn shutdown_requested(&self) -> bool {
        self.stop_source.stop_requested()
    }

    fn shutdown(&self) {
        self.internal_shutdown();
    }
}

impl Default for LongRunningThreads {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LongRunningThreads {
    fn drop(&mut self) {
        self.internal_shutdown();
        let threads = std::mem::take(&mut self.inner.lock().threads);
        for thread in threads {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for LongRunningThreads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongRunningThreads")
            .field("shutdown_requested", &self.shutdown_requested())
            .finish_non_exhaustive()
    }
}
