// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! Task executors over cooperative cancellation.
//!
//! A [`Task`] is a callable bundled with its own [`halt::StopSource`]; executors
//! schedule tasks and never preempt them - cancellation is always cooperative through
//! the token passed into every callable. Results flow back through the promise embedded
//! by [`ExecutorExt::submit`], reachable through the returned [`TaskResult`].
//!
//! # Overview
//!
//! - [`Executor`] / [`ExecutorExt`] - The execution contract: post fire-and-forget
//!   callables or submit callables whose results matter.
//! - [`ThreadPool`] - Fixed-size worker set draining a FIFO queue. Tasks submitted
//!   after shutdown still run exactly once, inline on the submitting thread.
//! - [`LongRunningThreads`] - One dedicated thread per task, for tasks that mostly
//!   block and run for the executor's whole lifetime.
//! - [`timed`] - Delayed and periodic tasks plus [`timed::ConcurrentTimedExecutor`],
//!   an earliest-deadline-first scheduler over any [`Executor`].
//!
//! # Example
//!
//! ```
//! use crew::{ExecutorExt, ThreadPool};
//!
//! let pool = ThreadPool::new(2);
//! let result = pool.submit(|_token| 40 + 2);
//!
//! assert_eq!(result.get(), Ok(42));
//! ```

mod executor;
mod long_running;
mod task;
mod task_result;
mod thread_pool;
pub mod timed;

pub use executor::{Executor, ExecutorExt};
pub use long_running::LongRunningThreads;
pub use task::{SimpleTask, Task, simple_task, simple_task_with_result};
pub use task_result::{SharedTaskResult, TaskResult};
pub use thread_pool::ThreadPool;
