//! The transport capability.
//!
//! # Design
//! A transport performs exactly one network call per primitive and reports
//! back through an `EventSink`: zero or more progress fractions, then one
//! outcome. The sink is the only handoff between the thread doing I/O and
//! the stream consuming the events, so implementations may call it from any
//! thread. `EventSink::finish` consumes the sink, which makes a second
//! outcome unrepresentable.
//!
//! A sink may carry the caller's worker slot. The slot is released when the
//! transport reports its outcome or drops the sink, so a cancelled call
//! keeps counting against the pool until its I/O has actually stopped.
//!
//! Primitives must not block: they start the work and return a handle
//! through which the call can be cancelled.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::OwnedSemaphorePermit;

use crate::classify::TransportResult;
use crate::http::RequestDescriptor;

/// One event reported by a running transport call.
#[derive(Debug)]
pub enum TransportEvent<P> {
    Progress(f64),
    Finished(TransportResult<P>),
}

/// Reporting end handed to a transport primitive.
#[derive(Debug)]
pub struct EventSink<P> {
    tx: UnboundedSender<TransportEvent<P>>,
    slot: Option<OwnedSemaphorePermit>,
}

impl<P> EventSink<P> {
    pub(crate) fn new(tx: UnboundedSender<TransportEvent<P>>) -> Self {
        Self { tx, slot: None }
    }

    /// Tie a worker slot to this sink. It is given back when the sink is
    /// finished or dropped, whichever the transport does first.
    pub(crate) fn holding(mut self, slot: OwnedSemaphorePermit) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Report a transferred fraction. Returns `false` once the consumer is
    /// gone, in which case the transport may stop early.
    pub fn progress(&self, fraction: f64) -> bool {
        self.tx.send(TransportEvent::Progress(fraction)).is_ok()
    }

    /// Report the outcome. Dropping a sink without calling this is reported
    /// to the consumer as an aborted call.
    pub fn finish(self, outcome: TransportResult<P>) {
        if self.tx.send(TransportEvent::Finished(outcome)).is_err() {
            tracing::trace!("outcome reported after the consumer detached");
        }
    }

    /// Whether the consumer cancelled or went away.
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to an in-flight transport call.
pub trait TransportTask: Send {
    /// Abort the call. Invoked at most once per task.
    fn cancel(&self);
}

/// Network capability consumed by the client.
pub trait Transport: Send + Sync {
    /// Plain request, whole body in memory. No progress is expected.
    fn fetch(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask>;

    /// Request whose (multipart) body is streamed with upload progress.
    fn upload(&self, request: RequestDescriptor, sink: EventSink<Vec<u8>>) -> Box<dyn TransportTask>;

    /// Request whose response body is written to a temporary file with
    /// download progress. The file may be removed by the transport layer
    /// later, so the core relocates it before handing it out.
    fn download(&self, request: RequestDescriptor, sink: EventSink<PathBuf>) -> Box<dyn TransportTask>;
}
