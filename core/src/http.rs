//! HTTP data types exchanged with the transport.
//!
//! # Design
//! The builder resolves everything (URL, merged headers, encoded payload)
//! into an `HttpRequest` before handing it to a `Transport`. The transport
//! answers with a `RawResponse` whose body is still an unread byte stream, so
//! the dispatcher can decide whether to read it at all and the downloader can
//! consume it chunk by chunk.

use std::fmt;
use std::io::{self, Read};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Head,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST and PUT always carry a body, even an empty one.
    pub fn requires_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

/// An encoded request body together with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content: String,
    pub content_type: &'static str,
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: TEXT_PLAIN,
        }
    }

    pub fn json(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: APPLICATION_JSON,
        }
    }

    /// Encode a value for the wire.
    ///
    /// Strings, numbers and booleans go out as plain text (strings without
    /// JSON quotes), `null` becomes an empty text body and everything else is
    /// JSON.
    pub fn encode<B: serde::Serialize + ?Sized>(data: &B) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(data)?;
        Ok(match value {
            serde_json::Value::Null => Payload::text(""),
            serde_json::Value::String(s) => Payload::text(s),
            serde_json::Value::Number(n) => Payload::text(n.to_string()),
            serde_json::Value::Bool(b) => Payload::text(b.to_string()),
            other => Payload::json(serde_json::to_string(&other)?),
        })
    }
}

/// A fully resolved request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Payload>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response whose body has not been read yet.
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: Box<dyn Read + Send>,
}

impl RawResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response from an in-memory body. Mostly useful for stub
    /// transports.
    pub fn from_bytes(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, headers, Box::new(io::Cursor::new(body.into())))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// Read the whole body as UTF-8 text, consuming the stream.
    pub fn into_string(mut self) -> io::Result<String> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.body
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Article {
        title: String,
        likes: u32,
    }

    #[test]
    fn strings_are_sent_as_plain_text() {
        let payload = Payload::encode("hello").unwrap();
        assert_eq!(payload, Payload::text("hello"));
    }

    #[test]
    fn scalars_are_sent_as_plain_text() {
        assert_eq!(Payload::encode(&42).unwrap(), Payload::text("42"));
        assert_eq!(Payload::encode(&true).unwrap(), Payload::text("true"));
        assert_eq!(Payload::encode(&1.5).unwrap(), Payload::text("1.5"));
    }

    #[test]
    fn null_becomes_empty_text() {
        let payload = Payload::encode(&Option::<String>::None).unwrap();
        assert_eq!(payload, Payload::text(""));
    }

    #[test]
    fn structs_are_sent_as_json() {
        let article = Article {
            title: "Rust".to_string(),
            likes: 3,
        };
        let payload = Payload::encode(&article).unwrap();
        assert_eq!(payload.content_type, APPLICATION_JSON);
        let body: serde_json::Value = serde_json::from_str(&payload.content).unwrap();
        assert_eq!(body["title"], "Rust");
        assert_eq!(body["likes"], 3);
    }

    #[test]
    fn raw_response_header_lookup_ignores_case() {
        let response = RawResponse::from_bytes(
            200,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), " 12 ".to_string()),
            ],
            "hello",
        );
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.content_length(), Some(12));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn raw_response_reads_body_once() {
        let response = RawResponse::from_bytes(200, Vec::new(), "body text");
        assert_eq!(response.into_string().unwrap(), "body text");
    }

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Head.to_string(), "HEAD");
        assert!(HttpMethod::Put.requires_body());
        assert!(!HttpMethod::Delete.requires_body());
    }
}
