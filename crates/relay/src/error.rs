// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for operations that fail with the rendezvous [`Error`] taxonomy.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the promise/future rendezvous and its waits.
///
/// Mirrors the classic future error taxonomy, extended with the two ways an
/// interruption-aware wait can end without a result: the caller's stop token tripped, or
/// the deadline passed.
///
/// Invariant violations (reference-count underflow, scheduler time-point overflow) are
/// not represented here; those are preconditions and terminate the process.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Reserved default; never produced by this crate.
    #[error("unknown error")]
    Unknown,

    /// The promise was destroyed without publishing a value.
    #[error("promise broken")]
    PromiseBroken,

    /// The future was already retrieved from this promise.
    #[error("future already retrieved")]
    FutureAlreadyRetrieved,

    /// A value or error was already published to this shared state.
    #[error("promise already satisfied")]
    PromiseAlreadySatisfied,

    /// The operation was invoked on an object without an associated shared state.
    #[error("no shared state associated")]
    NoState,

    /// The wait was unblocked because the caller's stop token tripped.
    #[error("stop requested")]
    StopRequested,

    /// The timed wait reached its deadline before the state became ready.
    #[error("timeout")]
    Timeout,

    /// Placeholder stored in a fresh shared state before any publish.
    #[error("value was not set")]
    Unset,
}
