// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

//! One-shot rendezvous between a promise and its futures.
//!
//! A [`Promise`] and the futures retrieved from it share a reference-counted state that
//! holds the published value or error, the continuation list, and an optional abort
//! callback that fires when the last consumer gives up before a producer delivered.

mod promise;
mod shared;
mod state;

#[expect(clippy::module_inception, reason = "the module groups the whole future family")]
mod future;

pub use future::Future;
pub use promise::Promise;
pub use shared::{SharedFuture, ValueRef};
