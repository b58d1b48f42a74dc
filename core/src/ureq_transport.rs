//! Blocking `ureq` transport.
//!
//! # Design
//! Each call gets its own agent and its own named thread. The thread owns the
//! `EventSink` and reports progress while it moves the body, so the core sees
//! the same event shape from every primitive. Cancellation is cooperative: a
//! shared flag is checked before the request starts and between body chunks.
//! A blocked connect is not interrupted, but its result is ignored once the
//! consumer has gone. The thread keeps the sink, and with it the caller's
//! worker slot, until it exits.
//!
//! Timeouts follow the request:
//! - `RequestDescriptor::timeout` bounds the wait for the response head.
//! - With `wait_for_connectivity`, connecting may take up to the resource
//!   timeout, which also caps the whole call.
//! - Without it, connecting fails fast after `FAIL_FAST_CONNECT_TIMEOUT`.

use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ureq::http::Response;
use ureq::{Agent, Body, SendBody};

use crate::classify::TransportResult;
use crate::error::TransportError;
use crate::http::{Headers, HttpMethod, RequestDescriptor, ResponsePayload, TransportResponse};
use crate::transport::{EventSink, Transport, TransportTask};

/// Connect timeout used when the call should not wait for connectivity.
pub const FAIL_FAST_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const CHUNK_SIZE: usize = 16 * 1024;

/// `Transport` backed by blocking `ureq` calls on worker threads.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport {
    _private: (),
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<P, F>(&self, request: RequestDescriptor, sink: EventSink<P>, work: F) -> Box<dyn TransportTask>
    where
        P: ResponsePayload,
        F: FnOnce(&Agent, RequestDescriptor, &EventSink<P>, &AtomicBool) -> TransportResult<P> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let spawned = thread::Builder::new()
            .name("restline-ureq".to_string())
            .spawn(move || {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let agent = agent_for(&request);
                let outcome = work(&agent, request, &sink, flag.as_ref());
                if flag.load(Ordering::SeqCst) {
                    tracing::trace!("call finished after cancellation, dropping outcome");
                    if let Ok(response) = outcome {
                        response.payload.discard();
                    }
                    return;
                }
                sink.finish(outcome);
            });
        if let Err(err) = spawned {
            // The sink went down with the closure; the consumer sees an abort.
            tracing::warn!(error = %err, "could not spawn transport thread");
        }
        Box::new(UreqTask { cancelled })
    }
}

impl Transport for UreqTransport {
    fn fetch(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask> {
        self.spawn(request, sink, |agent, mut request, _sink, cancelled| {
            let mut response = match request.body.take() {
                Some(body) => {
                    set_content_length(&mut request.headers, body.len());
                    send(agent, &request, Some(SendBody::from_reader(&mut body.as_slice())))?
                }
                None => send(agent, &request, None)?,
            };
            let mut buf = Vec::new();
            copy_body(&mut response, &mut buf, cancelled, |_| {})?;
            Ok(into_transport_response(&response, buf))
        })
    }

    fn upload(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask> {
        self.spawn(request, sink, |agent, mut request, sink, cancelled| {
            let body = request.body.take().unwrap_or_default();
            set_content_length(&mut request.headers, body.len());
            let mut reader = ProgressReader::new(body, sink, cancelled);
            let mut response = send(agent, &request, Some(SendBody::from_reader(&mut reader)))?;
            let mut buf = Vec::new();
            copy_body(&mut response, &mut buf, cancelled, |_| {})?;
            Ok(into_transport_response(&response, buf))
        })
    }

    fn download(&self, request: RequestDescriptor, sink: EventSink<PathBuf>) -> Box<dyn TransportTask> {
        self.spawn(request, sink, |agent, request, sink, cancelled| {
            let mut response = send(agent, &request, None)?;
            let total = content_length(&response);
            let mut file = tempfile::Builder::new().prefix("restline-").tempfile()?;
            copy_body(&mut response, file.as_file_mut(), cancelled, |received| {
                if let Some(total) = total.filter(|t| *t > 0) {
                    sink.progress(received as f64 / total as f64);
                }
            })?;
            file.as_file_mut().flush()?;
            let path = file.into_temp_path().keep().map_err(|err| TransportError::Io(err.error))?;
            Ok(into_transport_response(&response, path))
        })
    }
}

struct UreqTask {
    cancelled: Arc<AtomicBool>,
}

impl TransportTask for UreqTask {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn set_content_length(headers: &mut Headers, len: usize) {
    headers.insert("Content-Length".to_string(), len.to_string());
}

fn agent_for(request: &RequestDescriptor) -> Agent {
    let policy = request.connectivity;
    let (connect, global) = if policy.wait_for_connectivity {
        (policy.resource_timeout, Some(policy.resource_timeout))
    } else {
        (FAIL_FAST_CONNECT_TIMEOUT, None)
    };
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_connect(Some(connect))
        .timeout_global(global)
        .timeout_recv_response(request.timeout)
        .build()
        .new_agent()
}

fn send(agent: &Agent, request: &RequestDescriptor, body: Option<SendBody<'_>>) -> Result<Response<Body>, TransportError> {
    tracing::debug!(method = %request.method, url = %request.url, "sending request");
    let url = request.url.as_str();
    let result = match (request.method, body) {
        (HttpMethod::Get, _) => with_headers(agent.get(url), &request.headers).call(),
        (HttpMethod::Delete, None) => with_headers(agent.delete(url), &request.headers).call(),
        (HttpMethod::Delete, Some(body)) => with_headers(agent.delete(url), &request.headers)
            .force_send_body()
            .send(body),
        (HttpMethod::Post, body) => send_with(with_headers(agent.post(url), &request.headers), body),
        (HttpMethod::Put, body) => send_with(with_headers(agent.put(url), &request.headers), body),
        (HttpMethod::Patch, body) => send_with(with_headers(agent.patch(url), &request.headers), body),
    };
    result.map_err(map_error)
}

fn send_with(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<SendBody<'_>>,
) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body),
        None => builder.send_empty(),
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &Headers) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(err) => TransportError::Io(err),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => TransportError::Connect(err.to_string()),
        other => TransportError::Other(Box::new(other)),
    }
}

fn content_length(response: &Response<Body>) -> Option<u64> {
    response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Read the response body into `out`, checking for cancellation between
/// chunks. `on_chunk` receives the running byte count.
fn copy_body(
    response: &mut Response<Body>,
    out: &mut impl Write,
    cancelled: &AtomicBool,
    mut on_chunk: impl FnMut(u64),
) -> Result<(), TransportError> {
    let mut reader = response.body_mut().as_reader();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Err(TransportError::Aborted);
        }
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => return Err(TransportError::Timeout),
            Err(err) => return Err(TransportError::Io(err)),
        };
        out.write_all(&chunk[..n])?;
        received += n as u64;
        on_chunk(received);
    }
}

fn into_transport_response<P>(response: &Response<Body>, payload: P) -> TransportResponse<P> {
    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    TransportResponse {
        status: response.status().as_u16(),
        headers,
        payload,
    }
}

/// Request body reader that reports upload progress and stops on cancel.
struct ProgressReader<'a, P> {
    inner: Cursor<Vec<u8>>,
    total: u64,
    sink: &'a EventSink<P>,
    cancelled: &'a AtomicBool,
}

impl<'a, P> ProgressReader<'a, P> {
    fn new(body: Vec<u8>, sink: &'a EventSink<P>, cancelled: &'a AtomicBool) -> Self {
        Self {
            total: body.len() as u64,
            inner: Cursor::new(body),
            sink,
            cancelled,
        }
    }
}

impl<P> Read for ProgressReader<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(io::Error::other("upload cancelled"));
        }
        let len = buf.len().min(CHUNK_SIZE);
        let n = self.inner.read(&mut buf[..len])?;
        if n > 0 && self.total > 0 {
            self.sink.progress(self.inner.position() as f64 / self.total as f64);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::ConnectivityPolicy;
    use crate::transport::TransportEvent;

    #[test]
    fn upload_reader_reports_fractions_up_to_one() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent<Vec<u8>>>();
        let sink = EventSink::new(tx);
        let cancelled = AtomicBool::new(false);
        let body = vec![7u8; CHUNK_SIZE * 2];
        let mut reader = ProgressReader::new(body, &sink, &cancelled);

        let mut buf = vec![0u8; CHUNK_SIZE * 2];
        let mut read = 0;
        loop {
            match reader.read(&mut buf).unwrap() {
                0 => break,
                n => read += n,
            }
        }
        assert_eq!(read, CHUNK_SIZE * 2);

        let mut fractions = Vec::new();
        while let Ok(TransportEvent::Progress(p)) = rx.try_recv() {
            fractions.push(p);
        }
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn upload_reader_stops_when_cancelled() {
        let (tx, _rx) = mpsc::unbounded_channel::<TransportEvent<Vec<u8>>>();
        let sink = EventSink::new(tx);
        let cancelled = AtomicBool::new(true);
        let mut reader = ProgressReader::new(b"body".to_vec(), &sink, &cancelled);
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.to_string(), "upload cancelled");
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = RequestDescriptor {
            method: HttpMethod::Get,
            // Port 9 on localhost is closed in any sane test environment.
            url: "http://127.0.0.1:9/".to_string(),
            headers: Headers::new(),
            body: None,
            timeout: Some(Duration::from_secs(2)),
            connectivity: ConnectivityPolicy {
                wait_for_connectivity: false,
                resource_timeout: Duration::from_secs(2),
            },
        };
        let _task = UreqTransport::new().fetch(request, EventSink::new(tx));
        match rx.blocking_recv() {
            Some(TransportEvent::Finished(Err(_))) => {}
            other => panic!("expected a transport failure, got {other:?}"),
        }
    }
}
