//! Fluent per-request builder.
//!
//! # Design
//! A `RequestBuilder` accumulates one logical call and is consumed by
//! execution, so it cannot run twice. The plain-data part lives in
//! `RequestSpec`, which the poller clones as a template for every step.
//! Blocking execution runs on the caller's thread; the `await_*` variants move
//! the same call onto tokio's blocking pool.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{ClientInner, RequestId};
use crate::dispatch::{ResponseType, SimpleResponse};
use crate::error::HttpError;
use crate::http::{HttpMethod, HttpRequest, Payload, RawResponse};
use crate::poll::Poller;

/// Everything needed to issue one request, independent of the client.
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub(crate) id: RequestId,
    pub(crate) method: HttpMethod,
    target: String,
    params: BTreeMap<String, String>,
    pub(crate) headers: BTreeMap<String, String>,
    payload: Option<Result<Payload, String>>,
    pub(crate) bindings: HashMap<u16, ResponseType>,
}

impl RequestSpec {
    pub(crate) fn new(id: RequestId, method: HttpMethod, target: String) -> Self {
        Self {
            id,
            method,
            target,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            payload: None,
            bindings: HashMap::new(),
        }
    }

    pub(crate) fn url(&self, base_url: Option<&str>) -> String {
        assemble_url(base_url, &self.target, &self.params)
    }

    /// The encoded payload, or the encoding error deferred from `body`.
    pub(crate) fn payload(&self) -> Result<Option<Payload>, HttpError> {
        match &self.payload {
            None => Ok(None),
            Some(Ok(payload)) => Ok(Some(payload.clone())),
            Some(Err(e)) => Err(HttpError::Serialization(e.clone())),
        }
    }

    /// A binding for 200 may only restate the requested type.
    pub(crate) fn check_ok_binding<T: 'static>(&self) -> Result<(), HttpError> {
        match self.bindings.get(&200) {
            Some(rt) if !rt.is::<T>() => Err(HttpError::InvalidArgument(format!(
                "status 200 is bound to {} but {} was requested",
                rt.type_name(),
                type_name::<T>()
            ))),
            _ => Ok(()),
        }
    }
}

/// Builder for a single HTTP call. Created by `HttpClient::get` and friends.
pub struct RequestBuilder {
    client: Arc<ClientInner>,
    spec: RequestSpec,
}

impl RequestBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, spec: RequestSpec) -> Self {
        Self { client, spec }
    }

    pub fn id(&self) -> RequestId {
        self.spec.id
    }

    pub fn method(&self) -> HttpMethod {
        self.spec.method
    }

    /// Add a query parameter. A second value for the same name replaces the
    /// first.
    pub fn add_param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.spec.params.insert(name.into(), value.to_string());
        self
    }

    /// Set a request header, overriding any client default of the same name.
    pub fn add_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.spec
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Decode bodies received with `status` as `E`.
    ///
    /// Registering 200 is only meaningful for the type later passed to
    /// `get_response`; any other type makes execution fail with
    /// `InvalidArgument`.
    pub fn add_response_type<E>(mut self, status: u16) -> Self
    where
        E: DeserializeOwned + Send + 'static,
    {
        self.spec.bindings.insert(status, ResponseType::of::<E>());
        self
    }

    pub fn response_type(&self, status: u16) -> Option<&ResponseType> {
        self.spec.bindings.get(&status)
    }

    /// Attach a payload. See `Payload::encode` for the wire format.
    pub fn body<B: Serialize + ?Sized>(mut self, data: &B) -> Self {
        self.spec.payload = Some(Payload::encode(data).map_err(|e| e.to_string()));
        self
    }

    /// The URL this request will hit, parameters included.
    pub fn url(&self) -> String {
        self.spec.url(self.client.base_url())
    }

    /// Resolve the transport-level request without sending it.
    pub fn build(&self) -> Result<HttpRequest, HttpError> {
        self.client.build_request(&self.spec)
    }

    pub fn get_raw_response(self) -> Result<RawResponse, HttpError> {
        self.client.execute_raw(&self.spec)
    }

    pub fn get_response<T>(self) -> Result<SimpleResponse<T>, HttpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.client.execute::<T>(&self.spec)
    }

    pub async fn await_raw_response(self) -> Result<RawResponse, HttpError> {
        tokio::task::spawn_blocking(move || self.get_raw_response())
            .await
            .map_err(|e| HttpError::Worker(e.to_string()))?
    }

    pub async fn await_response<T>(self) -> Result<SimpleResponse<T>, HttpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        tokio::task::spawn_blocking(move || self.get_response::<T>())
            .await
            .map_err(|e| HttpError::Worker(e.to_string()))?
    }

    /// Like `await_response`, but an absent body is an error.
    pub async fn await_data<T>(self) -> Result<T, HttpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.await_response::<T>().await?;
        let status = response.status();
        response.into_data().ok_or(HttpError::NoData { status })
    }

    /// Turn this request into a template that is re-issued every `interval`.
    pub fn to_flow<T>(self, interval: Duration) -> Poller<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Poller::new(Arc::clone(&self.client), self.spec.clone(), interval)
    }
}

impl Drop for RequestBuilder {
    fn drop(&mut self) {
        self.client.release(self.spec.id);
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("id", &self.spec.id)
            .field("method", &self.spec.method)
            .field("target", &self.spec.target)
            .finish_non_exhaustive()
    }
}

fn is_absolute(target: &str) -> bool {
    let lower = target.get(..8).unwrap_or(target).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join base URL and target, then append `?k=v&k=v`. Values are not
/// percent-encoded.
pub(crate) fn assemble_url(base_url: Option<&str>, target: &str, params: &BTreeMap<String, String>) -> String {
    let mut url = match base_url {
        Some(base) if !is_absolute(target) => {
            if base.ends_with('/') && target.starts_with('/') {
                format!("{}{target}", base.trim_end_matches('/'))
            } else {
                format!("{base}{target}")
            }
        }
        _ => target.to_string(),
    };
    let kept = url.trim_end_matches(['?', '&']).len();
    url.truncate(kept);

    if params.is_empty() {
        return url;
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&query);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn base_url_and_path_are_joined() {
        let url = assemble_url(Some("https://a/api"), "/news", &params(&[("page", "2")]));
        assert_eq!(url, "https://a/api/news?page=2");
    }

    #[test]
    fn absolute_target_ignores_base_url() {
        let url = assemble_url(Some("https://a/api"), "https://b/feed", &BTreeMap::new());
        assert_eq!(url, "https://b/feed");
        let url = assemble_url(Some("https://a/api"), "HTTP://b/feed", &BTreeMap::new());
        assert_eq!(url, "HTTP://b/feed");
    }

    #[test]
    fn no_params_means_no_question_mark() {
        let url = assemble_url(Some("https://a/api"), "/news", &BTreeMap::new());
        assert_eq!(url, "https://a/api/news");
        assert!(!url.contains('?'));
    }

    #[test]
    fn multiple_params_have_no_trailing_separator() {
        let url = assemble_url(None, "https://a/news", &params(&[("page", "2"), ("limit", "10")]));
        assert_eq!(url, "https://a/news?limit=10&page=2");
    }

    #[test]
    fn existing_query_is_extended() {
        let url = assemble_url(None, "https://a/news?sort=asc", &params(&[("page", "1")]));
        assert_eq!(url, "https://a/news?sort=asc&page=1");
    }

    #[test]
    fn dangling_separators_on_the_target_are_trimmed() {
        let url = assemble_url(Some("https://a/api"), "/news?", &BTreeMap::new());
        assert_eq!(url, "https://a/api/news");
        let url = assemble_url(Some("https://a/api"), "/news?a=1&", &BTreeMap::new());
        assert_eq!(url, "https://a/api/news?a=1");
        let url = assemble_url(Some("https://a/api"), "/news?", &params(&[("page", "1")]));
        assert_eq!(url, "https://a/api/news?page=1");
        let url = assemble_url(Some("https://a/api"), "/news?a=1&", &params(&[("page", "1")]));
        assert_eq!(url, "https://a/api/news?a=1&page=1");
    }

    #[test]
    fn duplicate_slash_at_join_is_collapsed() {
        let url = assemble_url(Some("https://a/api/"), "/news", &BTreeMap::new());
        assert_eq!(url, "https://a/api/news");
    }

    #[test]
    fn values_are_not_percent_encoded() {
        let url = assemble_url(None, "https://a/s", &params(&[("q", "a b")]));
        assert_eq!(url, "https://a/s?q=a b");
    }
}
