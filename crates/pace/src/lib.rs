// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! Injectable clock abstraction for time-bearing blocking APIs.
//!
//! Working with time is notoriously difficult to test. Every time-bearing API in this
//! workspace therefore takes a [`Clock`] instance instead of reading process time
//! directly, keeping the flow of time an injectable dependency rather than process-wide
//! mutable state.
//!
//! # Overview
//!
//! - [`Clock`] - The clock contract: an ordered instant type, `now()`, the real-time
//!   budget remaining until a deadline, and checked instant arithmetic.
//! - [`MonotonicClock`] - The production clock, backed by [`std::time::Instant`].
//! - `ManualClock` - A test clock whose clones share a virtual nanosecond counter that
//!   only moves when the test advances it. Exposed when the `test-util` feature is
//!   enabled.
//!
//! **Important:** Never enable the `test-util` feature for production code. Only use it
//! in your `dev-dependencies`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use pace::{Clock, MonotonicClock};
//!
//! let clock = MonotonicClock;
//! let start = clock.now();
//! let deadline = MonotonicClock::checked_add(start, Duration::from_millis(10)).unwrap();
//!
//! // The remaining budget shrinks as real time passes and bottoms out at zero.
//! assert!(clock.remaining_until(deadline) <= Duration::from_millis(10));
//! ```

mod clock;
#[cfg(any(feature = "test-util", test))]
mod manual;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(feature = "test-util", test))]
pub use manual::{ManualClock, ManualInstant};
