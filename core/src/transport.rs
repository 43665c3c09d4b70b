//! The network seam.
//!
//! # Design
//! `HttpClient` never talks to sockets itself. It hands a resolved
//! `HttpRequest` to a `Transport` and gets a `RawResponse` back. The default
//! transport is a `ureq` agent configured once from `Timeouts`; tests swap in
//! stubs that answer from memory.

use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};

use crate::config::Timeouts;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, Payload, RawResponse};

/// Executes one resolved request.
///
/// Implementations must return non-2xx responses as data, not as errors.
/// Errors are reserved for calls that produced no response at all.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

/// Blocking transport backed by a shared `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeouts: &Timeouts) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(timeouts.connect))
            .timeout_send_request(Some(timeouts.write))
            .timeout_send_body(Some(timeouts.write))
            .timeout_recv_response(Some(timeouts.read))
            .timeout_recv_body(Some(timeouts.read))
            .timeout_global(timeouts.total)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&Timeouts::default())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.as_str();
        let headers = request.headers.as_slice();
        let empty = Payload::text("");

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), headers).call(),
            HttpMethod::Head => with_headers(self.agent.head(url), headers).call(),
            HttpMethod::Delete => match &request.body {
                Some(payload) => send(
                    with_headers(self.agent.delete(url).force_send_body(), headers),
                    request,
                    payload,
                ),
                None => with_headers(self.agent.delete(url), headers).call(),
            },
            HttpMethod::Post => send(
                with_headers(self.agent.post(url), headers),
                request,
                request.body.as_ref().unwrap_or(&empty),
            ),
            HttpMethod::Put => send(
                with_headers(self.agent.put(url), headers),
                request,
                request.body.as_ref().unwrap_or(&empty),
            ),
        };

        let response = result.map_err(|e| match e {
            ureq::Error::Timeout(_) => TransportError::Timeout,
            ureq::Error::Io(io) => TransportError::Io(io),
            other => TransportError::Other(other.to_string()),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.into_body().into_reader();

        Ok(RawResponse::new(status, headers, Box::new(body)))
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send(
    builder: RequestBuilder<WithBody>,
    request: &HttpRequest,
    payload: &Payload,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    // A caller-supplied content-type header wins over the payload's own.
    let builder = if request.header("content-type").is_some() {
        builder
    } else {
        builder.content_type(payload.content_type)
    };
    builder.send(payload.content.as_bytes())
}
