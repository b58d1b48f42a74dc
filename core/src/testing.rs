//! Scriptable in-memory transport for unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::TransportError;
use crate::http::{RequestDescriptor, TransportResponse};
use crate::transport::{EventSink, Transport, TransportTask};

pub(crate) enum Script {
    /// Report the progress values, then answer with status and body. Downloads
    /// get the body written to a scratch file.
    Respond {
        status: u16,
        body: Vec<u8>,
        progress: Vec<f64>,
    },
    /// Fail with a timeout.
    Fail,
    /// Keep the sink so the test can drive it by hand.
    Hold,
}

pub(crate) struct FakeTransport {
    script: Script,
    calls: AtomicUsize,
    cancels: Arc<AtomicUsize>,
    requests: Mutex<Vec<RequestDescriptor>>,
    held_bytes: Mutex<Vec<EventSink<Vec<u8>>>>,
    held_files: Mutex<Vec<EventSink<PathBuf>>>,
    scratch: tempfile::TempDir,
}

impl FakeTransport {
    pub(crate) fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            cancels: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
            held_bytes: Mutex::new(Vec::new()),
            held_files: Mutex::new(Vec::new()),
            scratch: tempfile::tempdir().unwrap(),
        })
    }

    pub(crate) fn responding(status: u16, body: &[u8]) -> Arc<Self> {
        Self::new(Script::Respond {
            status,
            body: body.to_vec(),
            progress: Vec::new(),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<RequestDescriptor> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Oldest held sink of a fetch or upload call.
    pub(crate) fn take_bytes_sink(&self) -> Option<EventSink<Vec<u8>>> {
        let mut held = self.held_bytes.lock().unwrap();
        (!held.is_empty()).then(|| held.remove(0))
    }

    pub(crate) fn take_file_sink(&self) -> Option<EventSink<PathBuf>> {
        let mut held = self.held_files.lock().unwrap();
        (!held.is_empty()).then(|| held.remove(0))
    }

    fn record(&self, request: RequestDescriptor) -> Box<dyn TransportTask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        Box::new(FakeTask {
            cancels: Arc::clone(&self.cancels),
        })
    }

    fn run_bytes(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask> {
        let task = self.record(request);
        match &self.script {
            Script::Respond { status, body, progress } => {
                for fraction in progress {
                    sink.progress(*fraction);
                }
                sink.finish(Ok(TransportResponse::new(*status, body.clone())));
            }
            Script::Fail => sink.finish(Err(TransportError::Timeout)),
            Script::Hold => self.held_bytes.lock().unwrap().push(sink),
        }
        task
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask> {
        self.run_bytes(request, sink)
    }

    fn upload(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask> {
        self.run_bytes(request, sink)
    }

    fn download(&self, request: RequestDescriptor, sink: EventSink<PathBuf>) -> Box<dyn TransportTask> {
        let task = self.record(request);
        match &self.script {
            Script::Respond { status, body, progress } => {
                let path = self.scratch.path().join(format!("download-{}", self.calls()));
                std::fs::write(&path, body).unwrap();
                for fraction in progress {
                    sink.progress(*fraction);
                }
                sink.finish(Ok(TransportResponse::new(*status, path)));
            }
            Script::Fail => sink.finish(Err(TransportError::Timeout)),
            Script::Hold => self.held_files.lock().unwrap().push(sink),
        }
        task
    }
}

struct FakeTask {
    cancels: Arc<AtomicUsize>,
}

impl TransportTask for FakeTask {
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
