//! Error types for the HTTP client.
//!
//! # Design
//! Failures where the operation itself could not complete are errors.
//! Failures where the response simply does not match the requested shape are
//! not: those degrade to an absent body in `SimpleResponse`. Transport detail
//! is logged and then dropped, so callers only ever see `CallFailed`.

use std::io;

use thiserror::Error;

/// Errors returned by request execution and response accessors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The transport could not complete the call (connect, timeout, DNS...).
    #[error("HTTP call failed")]
    CallFailed,

    /// The caller asked for something the request or response cannot give.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// `await_data` found no decodable body.
    #[error("no data in response (HTTP {status})")]
    NoData { status: u16 },

    /// The background worker running the call panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Errors raised by a `Transport` implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Terminal cause carried by `DownloadState::Failed`.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `save_async` was called outside a tokio runtime.
    #[error("no async runtime: {0}")]
    Runtime(String),
}
