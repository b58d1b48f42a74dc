//! Reactive REST client core.
//!
//! # Overview
//! Builds HTTP requests from a base URL, a route and typed parameters, runs
//! them through a pluggable `Transport`, and exposes each call as a cold,
//! cancellable `Stream` of progress updates followed by exactly one decoded
//! value or one classified `RestError`.
//!
//! # Design
//! - Request construction, multipart encoding, outcome classification and
//!   response decoding are pure functions; only the transport does I/O.
//! - `TaskStream` is the bridge between a transport's event sink and a
//!   consumer. It starts work on first poll and cancels the transport task
//!   when cancelled or dropped mid-flight.
//! - A `RestClient` shares one `WorkerPool` across its calls to cap how many
//!   run at once.
//! - The default transport (`ureq` feature) runs blocking calls on worker
//!   threads; any other HTTP stack can be plugged in behind `Transport`.

pub mod classify;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod multipart;
pub mod params;
pub mod pool;
pub mod request;
pub mod response;
pub mod storage;
pub mod task;
pub mod transport;
#[cfg(feature = "ureq")]
pub mod ureq_transport;

#[cfg(test)]
mod testing;

pub use client::{Call, Download, RestClient, Upload};
pub use config::{ClientConfig, ConnectivityPolicy};
pub use decode::JsonDecodable;
pub use error::{DecodeError, ErrorKind, RestError, TransportError};
pub use http::{Headers, HttpMethod, RequestDescriptor, TransportResponse};
pub use multipart::MultipartPart;
pub use params::{ParamValue, Params, Scalar};
pub use pool::WorkerPool;
pub use request::Encoding;
pub use response::{ResponseStream, Transfer};
pub use storage::{CacheDirStorage, Storage};
pub use task::{TaskEvent, TaskKind, TaskState, TaskStream};
pub use transport::{EventSink, Transport, TransportTask};
#[cfg(feature = "ureq")]
pub use ureq_transport::UreqTransport;
