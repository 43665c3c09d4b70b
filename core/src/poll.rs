//! Interval polling as a `Stream`.
//!
//! # Design
//! A `Poller` is a cold template: every call to `stream` spawns a fresh
//! driver task that executes the request on the blocking pool, pushes the
//! decoded body into an unbounded channel and sleeps for the interval.
//! Dropping the `PollStream` aborts the driver, so no new call starts after
//! the consumer goes away. A call already in flight finishes on its worker
//! and its result is dropped.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::builder::RequestSpec;
use crate::client::ClientInner;
use crate::dispatch::SimpleResponse;
use crate::error::HttpError;

/// Items produced by a `PollStream`: the decoded body of each step (absent
/// when it did not decode), or the error that ended the stream.
pub type PollItem<T> = Result<Option<T>, HttpError>;

/// Re-issues one request at a fixed interval.
pub struct Poller<T> {
    client: Arc<ClientInner>,
    spec: RequestSpec,
    interval: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Poller<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(client: Arc<ClientInner>, spec: RequestSpec, interval: Duration) -> Self {
        Self {
            client,
            spec,
            interval,
            _marker: PhantomData,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling on the current tokio runtime.
    ///
    /// Each call starts an independent sequence from the first request.
    /// Outside a runtime the stream yields a single `Worker` error.
    pub fn stream(&self) -> PollStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = tx.send(Err(HttpError::Worker(e.to_string())));
                return PollStream { rx, task: None };
            }
        };
        let client = Arc::clone(&self.client);
        let spec = self.spec.clone();
        let interval = self.interval;

        let task = runtime.spawn(async move {
            let mut steps = 0u64;
            while !tx.is_closed() {
                let step_client = Arc::clone(&client);
                let step_spec = spec.clone();
                let item = tokio::task::spawn_blocking(move || step_client.execute::<T>(&step_spec))
                    .await
                    .unwrap_or_else(|e| Err(HttpError::Worker(e.to_string())))
                    .map(SimpleResponse::into_data);
                steps += 1;

                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
            tracing::debug!(id = %spec.id, steps, "polling stopped");
        });

        PollStream {
            rx,
            task: Some(task),
        }
    }
}

/// Live polling sequence. Never ends on its own unless a call fails.
pub struct PollStream<T> {
    rx: UnboundedReceiver<PollItem<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Stream for PollStream<T> {
    type Item = PollItem<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for PollStream<T> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
