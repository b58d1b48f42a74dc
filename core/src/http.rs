//! Wire-level request and response descriptions.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The core
//! builds `RequestDescriptor` values and hands them to a `Transport`; the
//! transport performs the I/O and reports back a `TransportResponse`. Keeping
//! both sides as owned data keeps request construction and classification
//! deterministic and easy to test without a network.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConnectivityPolicy;

/// Header map. Keys are case-sensitive; inserting an existing key replaces it.
pub type Headers = BTreeMap<String, String>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Patch,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters for this method travel in the URL query.
    pub fn uses_query(self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request, ready for a transport.
///
/// Built once per call by the request builder and owned by that call. The
/// transport receives it by value.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub connectivity: ConnectivityPolicy,
}

/// What a transport reports once a call produced an HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse<P> {
    pub status: u16,
    pub headers: Headers,
    pub payload: P,
}

impl<P> TransportResponse<P> {
    pub fn new(status: u16, payload: P) -> Self {
        Self {
            status,
            headers: Headers::new(),
            payload,
        }
    }
}

/// Payload kinds a transport can hand back.
///
/// `error_body` exposes in-memory bytes so a failed response can carry its
/// JSON payload; `discard` releases anything the payload owns once the call
/// failed.
pub trait ResponsePayload: Send + 'static {
    fn error_body(&self) -> Option<&[u8]>;

    fn discard(self)
    where
        Self: Sized,
    {
    }
}

impl ResponsePayload for Vec<u8> {
    fn error_body(&self) -> Option<&[u8]> {
        Some(self)
    }
}

impl ResponsePayload for PathBuf {
    fn error_body(&self) -> Option<&[u8]> {
        None
    }

    fn discard(self) {
        if let Err(err) = std::fs::remove_file(&self) {
            tracing::debug!(path = %self.display(), error = %err, "could not remove discarded download");
        }
    }
}

/// Merge client-level and call-level headers. Call-level keys win.
pub fn merge_headers(client: &Headers, call: &Headers) -> Headers {
    let mut merged = client.clone();
    merged.extend(call.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
