//! # Valence Retriever
//!
//! The request layer between the synchronizer and the peer-facing
//! resolvers:
//!
//! - [`RequestedItems`] - a time cache that suppresses duplicate requests
//!   inside a sweep window
//! - [`RequestCoordinator`] - topic-routed, de-duplicated, chunked request
//!   dispatch for transactions, miniblocks and headers
//!
//! Dispatch is fire-and-forget: failures are logged and the next sync
//! iteration retries; nothing here blocks the caller.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod coordinator;
pub mod requested;

pub use coordinator::{RequestConfig, RequestCoordinator};
pub use requested::RequestedItems;

use thiserror::Error;

/// Errors returned by coordinator construction.
#[derive(Debug, Error)]
pub enum RetrieverError {
    /// A request topic was empty.
    #[error("empty {0} request topic")]
    EmptyTopic(&'static str),

    /// The hash-array chunk size was zero.
    #[error("max transactions to request must be at least 1")]
    InvalidMaxTxsToRequest,
}

/// Result type for retriever operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;
