//! Request construction.
//!
//! # Design
//! Pure functions from call inputs to a `RequestDescriptor`; nothing here
//! touches the network. GET and download requests carry their parameters in
//! the URL query. Mutating verbs carry them in the body, encoded per
//! `Encoding`. Uploads carry them as multipart fields.
//!
//! Two escape sets are in play. Query strings use a lenient set that only
//! encodes what would break the query structure. Form bodies use a strict
//! set that also encodes the RFC 3986 general and sub delimiters.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use url::Url;

use crate::config::ConnectivityPolicy;
use crate::error::RestError;
use crate::http::{merge_headers, Headers, HttpMethod, RequestDescriptor};
use crate::multipart::{encode_multipart, Boundary, MultipartPart};
use crate::params::{ParamValue, Params};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const APPLICATION_JSON: &str = "application/json";

/// Escape set for query keys and values appended to a URL.
const QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Escape set for form bodies: only unreserved characters plus `/` and `?`
/// pass through.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b'?');

/// How parameters of mutating verbs are placed in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    UrlEncoded,
    Json,
}

/// Everything needed to build one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    pub base_url: &'a str,
    pub route: &'a str,
    pub method: HttpMethod,
    pub params: &'a Params,
    pub client_headers: &'a Headers,
    pub call_headers: &'a Headers,
    pub encoding: Encoding,
    pub timeout: Option<Duration>,
    pub connectivity: ConnectivityPolicy,
}

impl RequestParts<'_> {
    fn descriptor(&self, method: HttpMethod, url: Url) -> RequestDescriptor {
        RequestDescriptor {
            method,
            url: url.into(),
            headers: merge_headers(self.client_headers, self.call_headers),
            body: None,
            timeout: self.timeout,
            connectivity: self.connectivity,
        }
    }
}

/// Build a data request. GET puts parameters in the query; every other verb
/// puts them in the body.
pub fn build_request(parts: &RequestParts<'_>) -> Result<RequestDescriptor, RestError> {
    let mut url = parse_url(parts.base_url, parts.route)?;

    if parts.method.uses_query() {
        append_query(&mut url, parts.params);
        return Ok(parts.descriptor(parts.method, url));
    }

    let mut request = parts.descriptor(parts.method, url);
    match parts.encoding {
        Encoding::UrlEncoded => {
            request
                .headers
                .insert(CONTENT_TYPE.to_string(), FORM_URLENCODED.to_string());
            request.body = Some(form_urlencode(parts.params).into_bytes());
        }
        Encoding::Json => {
            request
                .headers
                .insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
            request.body = json_body(parts.params);
        }
    }
    Ok(request)
}

/// Build a download request: always GET, parameters always in the query.
pub fn build_download_request(parts: &RequestParts<'_>) -> Result<RequestDescriptor, RestError> {
    let mut url = parse_url(parts.base_url, parts.route)?;
    append_query(&mut url, parts.params);
    Ok(parts.descriptor(HttpMethod::Get, url))
}

/// Build a multipart upload. Parameters become form fields ahead of the
/// binary parts; the URL carries no query.
pub fn build_multipart_request(
    parts: &RequestParts<'_>,
    multipart: &[MultipartPart],
    boundary: &Boundary,
) -> Result<RequestDescriptor, RestError> {
    let url = parse_url(parts.base_url, parts.route)?;
    let mut request = parts.descriptor(parts.method, url);
    request
        .headers
        .insert(CONTENT_TYPE.to_string(), boundary.content_type());
    request.body = Some(encode_multipart(parts.params, multipart, boundary));
    Ok(request)
}

/// Concatenate base URL and route and parse the result.
pub fn parse_url(base_url: &str, route: &str) -> Result<Url, RestError> {
    let raw = format!("{base_url}{route}");
    Url::parse(&raw).map_err(|err| RestError::MalformedUrl {
        url: raw,
        reason: err.to_string(),
    })
}

/// Append parameters to the URL query, keeping any existing query items.
///
/// List parameters produce one `key[]=item` entry per element followed by a
/// `key=<list text>` entry.
pub fn append_query(url: &mut Url, params: &Params) {
    if params.is_empty() {
        return;
    }

    let mut pairs: Vec<String> = url
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| vec![q.to_string()])
        .unwrap_or_default();

    for (key, value) in params.iter() {
        if let ParamValue::List(items) = value {
            let list_key = format!("{key}[]");
            for item in items {
                pairs.push(query_pair(&list_key, &item.to_string()));
            }
        }
        pairs.push(query_pair(key, &value.to_string()));
    }

    url.set_query(Some(&pairs.join("&")));
}

fn query_pair(key: &str, value: &str) -> String {
    format!(
        "{}={}",
        utf8_percent_encode(key, QUERY),
        utf8_percent_encode(value, QUERY)
    )
}

/// `application/x-www-form-urlencoded` body. List parameters render only as
/// `key[]=item` pairs, with the key escaped the same way as a scalar key.
pub fn form_urlencode(params: &Params) -> String {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params.iter() {
        let key = utf8_percent_encode(key, FORM);
        match value {
            ParamValue::Scalar(scalar) => {
                pairs.push(format!("{key}={}", utf8_percent_encode(&scalar.to_string(), FORM)));
            }
            ParamValue::List(items) => {
                for item in items {
                    pairs.push(format!("{key}[]={}", utf8_percent_encode(&item.to_string(), FORM)));
                }
            }
        }
    }
    pairs.join("&")
}

/// JSON object body. A serialization failure leaves the body absent.
pub fn json_body(params: &Params) -> Option<Vec<u8>> {
    match serde_json::to_vec(params) {
        Ok(body) => Some(body),
        Err(err) => {
            tracing::warn!(error = %err, "could not serialize parameters, sending without body");
            None
        }
    }
}
