//! Client handle shared by every request builder.
//!
//! # Design
//! `HttpClient` is a cheap `Clone` around `Arc<ClientInner>`. The inner state
//! holds the only mutable data shared between concurrent requests: the
//! default headers and the registry of builders that have been created but
//! not yet executed or dropped. Both sit behind plain locks because they are
//! touched from arbitrary caller threads.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::builder::{RequestBuilder, RequestSpec};
use crate::config::{ClientConfig, Timeouts};
use crate::dispatch::{dispatch, SimpleResponse};
use crate::error::HttpError;
use crate::http::{HttpMethod, HttpRequest, Payload, RawResponse};
use crate::transport::{Transport, UreqTransport};

/// Identifies one logical request in logs and in the pending registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fluent HTTP client.
///
/// ```no_run
/// use simplehttp_core::HttpClient;
///
/// let client = HttpClient::with_base_url("https://example.com/api");
/// let response = client
///     .get("/news")
///     .add_param("page", 2)
///     .get_response::<String>()?;
/// println!("{} {:?}", response.status(), response.data());
/// # Ok::<(), simplehttp_core::HttpError>(())
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: Option<String>,
    timeouts: Timeouts,
    default_headers: RwLock<BTreeMap<String, String>>,
    pending: Mutex<HashSet<RequestId>>,
    transport: Arc<dyn Transport>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new().base_url(base_url))
    }

    /// Build a client with a `ureq` transport configured from `config.timeouts`.
    pub fn with_config(config: ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(&config.timeouts));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let ClientConfig {
            base_url,
            timeouts,
            default_headers,
        } = config;
        Self {
            inner: Arc::new(ClientInner {
                base_url,
                timeouts,
                default_headers: RwLock::new(default_headers),
                pending: Mutex::new(HashSet::new()),
                transport,
            }),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.inner.base_url.as_deref()
    }

    pub fn timeouts(&self) -> Timeouts {
        self.inner.timeouts
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(HttpMethod::Get, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(HttpMethod::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(HttpMethod::Put, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(HttpMethod::Head, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(HttpMethod::Delete, url)
    }

    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> RequestBuilder {
        let id = RequestId::new();
        self.inner.register(id);
        RequestBuilder::new(Arc::clone(&self.inner), RequestSpec::new(id, method, url.into()))
    }

    /// Replace the headers sent with every request.
    ///
    /// Request-level headers with the same name still win.
    pub fn set_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        *self
            .inner
            .default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = headers;
    }

    pub fn default_headers(&self) -> BTreeMap<String, String> {
        self.inner.default_headers_snapshot()
    }

    /// Number of builders created by this client that have not been executed
    /// or dropped yet.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url)
            .field("timeouts", &self.inner.timeouts)
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    pub(crate) fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn register(&self, id: RequestId) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub(crate) fn release(&self, id: RequestId) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn default_headers_snapshot(&self) -> BTreeMap<String, String> {
        self.default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn build_request(&self, spec: &RequestSpec) -> Result<HttpRequest, HttpError> {
        let mut headers = self.default_headers_snapshot();
        headers.extend(spec.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let payload = spec.payload()?;
        let body = match spec.method {
            m if m.requires_body() => Some(payload.unwrap_or_else(|| Payload::text(""))),
            HttpMethod::Delete => payload,
            _ => None,
        };

        Ok(HttpRequest {
            method: spec.method,
            url: spec.url(self.base_url.as_deref()),
            headers: headers.into_iter().collect(),
            body,
        })
    }

    pub(crate) fn execute_raw(&self, spec: &RequestSpec) -> Result<RawResponse, HttpError> {
        let request = self.build_request(spec)?;
        tracing::debug!(id = %spec.id, method = %request.method, url = %request.url, "executing request");

        let response = self.transport.execute(&request).map_err(|e| {
            tracing::warn!(id = %spec.id, url = %request.url, error = %e, "HTTP call failed");
            HttpError::CallFailed
        })?;

        tracing::debug!(id = %spec.id, status = response.status, "response received");
        Ok(response)
    }

    pub(crate) fn execute<T>(&self, spec: &RequestSpec) -> Result<SimpleResponse<T>, HttpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        spec.check_ok_binding::<T>()?;
        let response = self.execute_raw(spec)?;
        Ok(dispatch(response, &spec.bindings))
    }
}
