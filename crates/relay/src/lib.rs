// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! Interruption-aware waiting and a cancellation-propagating promise/future rendezvous.
//!
//! Every blocking operation in this crate observes a [`halt::StopToken`]: a wait can end
//! because it was notified, because its deadline passed, or because the caller's token
//! tripped - without ever losing a wake-up. On top of that waiting layer sits a one-shot
//! rendezvous between a [`Promise`] and its futures, with continuations, broken-promise
//! detection, shared futures, and an abort callback that fires when every consumer gave
//! up before a result was delivered.
//!
//! # Overview
//!
//! - [`InterruptibleCondvar`] - A condition variable whose waits additionally unblock on
//!   stop requests. The building block for everything else here.
//! - [`Notification`] - A latched one-shot boolean condition with reset.
//! - [`SynchronizedQueue`] - A bounded single-consumer queue built on [`Notification`].
//! - [`Promise`] / [`Future`] / [`SharedFuture`] - The rendezvous. All waits take a
//!   token; results are delivered exactly once.
//! - [`Error`] / [`Result`] - The error taxonomy shared by the whole workspace.
//! - [`wait_for`] / [`wait_until`] / [`wait_until_stop_requested`] - Free helpers for
//!   waiting on nothing but a token.
//!
//! # Example
//!
//! ```
//! use halt::StopToken;
//! use relay::Promise;
//!
//! let mut promise = Promise::new();
//! let future = promise.get_future().unwrap();
//!
//! let worker = std::thread::spawn(move || {
//!     promise.set_value(42).unwrap();
//! });
//!
//! assert_eq!(future.get(&StopToken::default()), Ok(42));
//! worker.join().unwrap();
//! ```

mod condvar;
mod destruction_guard;
mod error;
mod future;
mod notification;
mod sync_queue;
mod wait;

pub use condvar::{InterruptibleCondvar, WaitStatus};
pub use destruction_guard::DestructionGuard;
pub use error::{Error, Result};
pub use future::{Future, Promise, SharedFuture, ValueRef};
pub use notification::Notification;
pub use sync_queue::{QueueSender, SynchronizedQueue};
pub use wait::{wait_for, wait_until, wait_until_stop_requested};
