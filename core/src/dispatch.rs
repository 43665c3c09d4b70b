//! Status-code driven response decoding.
//!
//! # Design
//! Every request decodes its 200 body into the type the caller asks for at
//! execution time. Other status codes only get a body when the caller
//! registered a `ResponseType` for them; the registered decoder produces a
//! boxed value which `SimpleResponse::body` downcasts on demand. Anything
//! that fails to decode becomes an absent body, never an error.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::HttpError;
use crate::http::{find_header, RawResponse};

/// `type/subtype` pair parsed from a `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub kind: String,
    pub subtype: String,
}

impl MediaType {
    /// Parse `text/plain; charset=utf-8` style values. Parameters are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
        })
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// `*/json` and structured-suffix types such as `application/problem+json`.
    pub fn is_json(&self) -> bool {
        self.subtype == "json" || self.subtype.ends_with("+json")
    }
}

/// Decode a response body for `T` according to its declared content type.
///
/// JSON bodies go through `serde_json`. Text and unknown bodies only decode
/// into types that deserialize from a bare string (`String`, `Box<str>`...).
pub fn decode_as<T: DeserializeOwned>(text: &str, content_type: Option<&str>) -> Option<T> {
    match content_type.and_then(MediaType::parse) {
        Some(media) if media.is_json() => serde_json::from_str(text).ok(),
        // text/*, other subtypes and a missing header
        _ => decode_string(text),
    }
}

fn decode_string<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(text.to_owned())).ok()
}

type DecodeFn = dyn Fn(&str, Option<&str>) -> Option<Box<dyn Any + Send>> + Send + Sync;

/// Decoder bound to a status code with `RequestBuilder::add_response_type`.
#[derive(Clone)]
pub struct ResponseType {
    type_id: TypeId,
    type_name: &'static str,
    decode: Arc<DecodeFn>,
}

impl ResponseType {
    pub fn of<E: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            decode: Arc::new(|text: &str, content_type: Option<&str>| {
                decode_as::<E>(text, content_type).map(|v| Box::new(v) as Box<dyn Any + Send>)
            }),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<E: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    fn decode(&self, text: &str, content_type: Option<&str>) -> Option<Box<dyn Any + Send>> {
        (self.decode)(text, content_type)
    }
}

impl fmt::Debug for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseType").field(&self.type_name).finish()
    }
}

/// Decoded body of a `SimpleResponse`.
pub enum ResponseBody<T> {
    /// Decoded as the type requested at execution.
    Expected(T),
    /// Decoded by a decoder registered for the received status code.
    Registered {
        value: Box<dyn Any + Send>,
        type_name: &'static str,
    },
}

impl<T: fmt::Debug> fmt::Debug for ResponseBody<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Expected(value) => f.debug_tuple("Expected").field(value).finish(),
            ResponseBody::Registered { type_name, .. } => {
                f.debug_tuple("Registered").field(type_name).finish()
            }
        }
    }
}

/// Typed result of one request execution.
#[derive(Debug)]
pub struct SimpleResponse<T> {
    body: Option<ResponseBody<T>>,
    status: u16,
    headers: Vec<(String, String)>,
}

impl<T: 'static> SimpleResponse<T> {
    pub fn new(body: Option<ResponseBody<T>>, status: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            body,
            status,
            headers,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// The body, if it was decoded as the requested type.
    pub fn data(&self) -> Option<&T> {
        match &self.body {
            Some(ResponseBody::Expected(value)) => Some(value),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self.body {
            Some(ResponseBody::Expected(value)) => Some(value),
            _ => None,
        }
    }

    /// The body viewed as `E`.
    ///
    /// Returns `Ok(None)` when there is no body and `InvalidArgument` when the
    /// body holds a different type.
    pub fn body<E: 'static>(&self) -> Result<Option<&E>, HttpError> {
        match &self.body {
            None => Ok(None),
            Some(ResponseBody::Expected(value)) => (value as &dyn Any)
                .downcast_ref::<E>()
                .map(Some)
                .ok_or_else(|| mismatch::<E>(type_name::<T>())),
            Some(ResponseBody::Registered { value, type_name }) => value
                .downcast_ref::<E>()
                .map(Some)
                .ok_or_else(|| mismatch::<E>(type_name)),
        }
    }

    pub fn into_body<E: 'static>(self) -> Result<Option<E>, HttpError> {
        match self.body {
            None => Ok(None),
            Some(ResponseBody::Expected(value)) => (Box::new(value) as Box<dyn Any>)
                .downcast::<E>()
                .map(|v| Some(*v))
                .map_err(|_| mismatch::<E>(type_name::<T>())),
            Some(ResponseBody::Registered { value, type_name }) => value
                .downcast::<E>()
                .map(|v| Some(*v))
                .map_err(|_| mismatch::<E>(type_name)),
        }
    }
}

fn mismatch<E>(held: &str) -> HttpError {
    HttpError::InvalidArgument(format!(
        "response body holds {held}, not {}",
        type_name::<E>()
    ))
}

/// Pick the decoder for the received status and decode the body.
///
/// The body stream is read at most once and left unread when no decoder
/// applies.
pub(crate) fn dispatch<T>(mut response: RawResponse, bindings: &HashMap<u16, ResponseType>) -> SimpleResponse<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let status = response.status;
    let headers = std::mem::take(&mut response.headers);
    let binding = bindings.get(&status);

    if binding.is_none() && status != 200 {
        return SimpleResponse::new(None, status, headers);
    }

    let content_type = find_header(&headers, "content-type").map(str::to_owned);
    let text = match response.into_string() {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(status, error = %e, "response body could not be read");
            return SimpleResponse::new(None, status, headers);
        }
    };

    let body = match binding {
        Some(rt) if !rt.is::<T>() => rt
            .decode(&text, content_type.as_deref())
            .map(|value| ResponseBody::Registered {
                value,
                type_name: rt.type_name(),
            }),
        _ => decode_as::<T>(&text, content_type.as_deref()).map(ResponseBody::Expected),
    };

    if body.is_none() {
        tracing::debug!(status, content_type = ?content_type, "response body did not decode");
    }
    SimpleResponse::new(body, status, headers)
}
