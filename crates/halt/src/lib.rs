// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! Cooperative cancellation primitives.
//!
//! Cancellation in this workspace is always cooperative: a [`StopSource`] owns the write
//! side of a one-shot stop signal, every interested party holds a [`StopToken`] and either
//! polls [`StopToken::stop_requested`] at convenient points or registers a callback via
//! [`StopToken::on_stop`] that fires exactly once when the signal trips. Nothing is ever
//! preempted.
//!
//! # Overview
//!
//! - [`StopSource`] - Write side. Cloning shares the same underlying stop state;
//!   [`StopSource::request_stop`] trips the signal exactly once.
//! - [`StopToken`] - Read side. Cheap to clone, pollable, and callback-registerable.
//! - [`StopCallback`] - Registration handle. Dropping it deregisters the callback; if the
//!   callback is currently executing on another thread, the drop blocks until it finished.
//!
//! # Example
//!
//! ```
//! use halt::StopSource;
//!
//! let source = StopSource::new();
//! let token = source.token();
//!
//! assert!(!token.stop_requested());
//! assert!(source.request_stop());
//! assert!(token.stop_requested());
//!
//! // Only the first request trips the signal.
//! assert!(!source.request_stop());
//! ```

mod source;
mod state;
mod token;

pub use source::StopSource;
pub use token::{StopCallback, StopToken};
