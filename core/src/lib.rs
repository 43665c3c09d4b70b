//! Fluent, typed HTTP client.
//!
//! # Overview
//! `HttpClient` hands out `RequestBuilder`s that accumulate parameters,
//! headers, a payload and per-status response types, then execute once and
//! decode the body into a `SimpleResponse<T>`. On top of that sit an interval
//! poller (`RequestBuilder::to_flow`) and a file download helper reporting
//! `DownloadState` progress.
//!
//! # Design
//! - Network I/O goes through the `Transport` trait; `UreqTransport` is the
//!   default, tests plug in stubs.
//! - JSON goes through `serde_json`; a body that does not decode is absent,
//!   not an error. Only calls that could not complete are errors.
//! - Blocking execution runs on the caller's thread; every `await_*`,
//!   polling step and async download runs on tokio's blocking pool.

pub mod builder;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod http;
pub mod poll;
pub mod transport;

pub use builder::RequestBuilder;
pub use client::{HttpClient, RequestId};
pub use config::{ClientConfig, Timeouts};
pub use dispatch::{MediaType, ResponseBody, ResponseType, SimpleResponse};
pub use download::{save, save_async, Download, DownloadState, DownloadStream};
pub use error::{DownloadError, HttpError, TransportError};
pub use http::{HttpMethod, HttpRequest, Payload, RawResponse};
pub use poll::{PollItem, PollStream, Poller};
pub use transport::{Transport, UreqTransport};
