//! The task stream: one transport call as a cancellable stream.
//!
//! # Design
//! A `TaskStream` is cold. Building one records the request and nothing
//! else; the first `poll_next` is the demand signal. From there the stream
//! walks an explicit state machine:
//!
//! ```text
//! Idle -> Requested -> Running -> Completed | Failed | Cancelled
//! ```
//!
//! `Requested` waits for a slot in the client's `WorkerPool`. The slot then
//! moves into the transport's `EventSink`, so it stays taken until the
//! transport has reported or let go of the sink, even after a cancel.
//! `Running` owns the transport task handle and the receiving end of the
//! event channel; the transport reports from whatever thread it runs on and
//! this stream is the single consumer that turns those events into items.
//! The consumer loop, not callback timing, enforces the ordering: progress
//! items first, then exactly one terminal item, then `None`.
//!
//! Terminal outcomes go through `classify` and, for downloads, through
//! `Storage` before they are yielded, so a caller never sees a raw transport
//! error or a transport-owned temporary path.

use std::fmt;
use std::future::Future;
use std::mem;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::stream::{FusedStream, Stream};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::classify::classify;
use crate::error::{RestError, TransportError};
use crate::http::{RequestDescriptor, ResponsePayload};
use crate::pool::{PermitFuture, WorkerPool};
use crate::storage::Storage;
use crate::transport::{EventSink, Transport, TransportEvent, TransportTask};

/// Which transport primitive a stream drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Fetch,
    Upload,
    Download,
}

/// Observable lifecycle of a `TaskStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Requested,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

/// Item yielded by a `TaskStream`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent<P> {
    Progress(f64),
    Finished(P),
}

type Launch<P> = fn(&dyn Transport, RequestDescriptor, EventSink<P>) -> Box<dyn TransportTask>;
type Settle<P> = Box<dyn FnOnce(P) -> Result<P, RestError> + Send>;

fn keep<P>(payload: P) -> Result<P, RestError> {
    Ok(payload)
}

struct Job<P> {
    transport: Arc<dyn Transport>,
    pool: WorkerPool,
    launch: Launch<P>,
    settle: Settle<P>,
}

enum State<P> {
    Idle {
        request: RequestDescriptor,
        job: Job<P>,
    },
    Requested {
        request: RequestDescriptor,
        job: Job<P>,
        slot: PermitFuture,
    },
    Running {
        task: Box<dyn TransportTask>,
        events: UnboundedReceiver<TransportEvent<P>>,
        settle: Settle<P>,
    },
    /// Construction failed; the error is the single terminal item.
    Rejected(RestError),
    Completed,
    Failed,
    Cancelled,
}

pub struct TaskStream<P> {
    kind: TaskKind,
    state: State<P>,
}

impl TaskStream<Vec<u8>> {
    pub fn fetch(transport: Arc<dyn Transport>, pool: WorkerPool, request: RequestDescriptor) -> Self {
        Self::new(
            TaskKind::Fetch,
            request,
            Job {
                transport,
                pool,
                launch: |transport, request, sink| transport.fetch(request, sink),
                settle: Box::new(keep),
            },
        )
    }

    pub fn upload(transport: Arc<dyn Transport>, pool: WorkerPool, request: RequestDescriptor) -> Self {
        Self::new(
            TaskKind::Upload,
            request,
            Job {
                transport,
                pool,
                launch: |transport, request, sink| transport.upload(request, sink),
                settle: Box::new(keep),
            },
        )
    }
}

impl TaskStream<PathBuf> {
    /// A download whose finished file is relocated through `storage` before
    /// it is yielded.
    pub fn download(
        transport: Arc<dyn Transport>,
        pool: WorkerPool,
        request: RequestDescriptor,
        storage: Arc<dyn Storage>,
    ) -> Self {
        // Runs on the polling thread. A rename inside one filesystem is cheap;
        // a cache dir on another device means a blocking copy.
        let settle = move |artifact: PathBuf| match storage.persist(&artifact) {
            Ok(path) => Ok(path),
            Err(err) => {
                tracing::warn!(path = %artifact.display(), error = %err, "could not relocate download");
                artifact.discard();
                Err(RestError::StorageFailure(err))
            }
        };
        Self::downloading(transport, pool, request, Box::new(settle))
    }

    /// A download run for its outcome only. The transport's file is removed
    /// on success instead of being relocated; the yielded path no longer
    /// exists.
    pub fn download_discarding(transport: Arc<dyn Transport>, pool: WorkerPool, request: RequestDescriptor) -> Self {
        let settle = |artifact: PathBuf| {
            artifact.clone().discard();
            Ok(artifact)
        };
        Self::downloading(transport, pool, request, Box::new(settle))
    }

    fn downloading(
        transport: Arc<dyn Transport>,
        pool: WorkerPool,
        request: RequestDescriptor,
        settle: Settle<PathBuf>,
    ) -> Self {
        Self::new(
            TaskKind::Download,
            request,
            Job {
                transport,
                pool,
                launch: |transport, request, sink| transport.download(request, sink),
                settle,
            },
        )
    }
}

impl<P> TaskStream<P> {
    fn new(kind: TaskKind, request: RequestDescriptor, job: Job<P>) -> Self {
        Self {
            kind,
            state: State::Idle { request, job },
        }
    }

    /// A stream that yields `error` on first demand without touching the
    /// transport.
    pub fn rejected(kind: TaskKind, error: RestError) -> Self {
        Self {
            kind,
            state: State::Rejected(error),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn state(&self) -> TaskState {
        match self.state {
            State::Idle { .. } | State::Rejected(_) => TaskState::Idle,
            State::Requested { .. } => TaskState::Requested,
            State::Running { .. } => TaskState::Running,
            State::Completed => TaskState::Completed,
            State::Failed => TaskState::Failed,
            State::Cancelled => TaskState::Cancelled,
        }
    }

    /// Stop the call. A running transport task is cancelled and its event
    /// channel closed; nothing further is yielded. No-op once terminal.
    pub fn cancel(&mut self) {
        match mem::replace(&mut self.state, State::Cancelled) {
            State::Running { task, mut events, .. } => {
                events.close();
                task.cancel();
                tracing::debug!(kind = ?self.kind, "transport task cancelled");
            }
            State::Idle { .. } | State::Requested { .. } | State::Rejected(_) => {
                tracing::trace!(kind = ?self.kind, "cancelled before the transport started");
            }
            State::Completed => self.state = State::Completed,
            State::Failed => self.state = State::Failed,
            State::Cancelled => {}
        }
    }
}

impl<P: ResponsePayload> TaskStream<P> {
    fn finish(
        &mut self,
        outcome: crate::classify::TransportResult<P>,
        settle: Settle<P>,
    ) -> Result<TaskEvent<P>, RestError> {
        let result = classify(outcome).and_then(|response| settle(response.payload));
        match &result {
            Ok(_) => {
                self.state = State::Completed;
                tracing::debug!(kind = ?self.kind, "task completed");
            }
            Err(err) => {
                self.state = State::Failed;
                tracing::debug!(kind = ?self.kind, error = %err, "task failed");
            }
        }
        result.map(TaskEvent::Finished)
    }
}

impl<P: ResponsePayload> Stream for TaskStream<P> {
    type Item = Result<TaskEvent<P>, RestError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match mem::replace(&mut this.state, State::Cancelled) {
                State::Idle { request, job } => {
                    tracing::debug!(kind = ?this.kind, method = %request.method, url = %request.url, "demand received");
                    let slot = job.pool.acquire();
                    this.state = State::Requested { request, job, slot };
                }
                State::Requested { request, job, mut slot } => match slot.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = State::Requested { request, job, slot };
                        return Poll::Pending;
                    }
                    Poll::Ready(Err(_)) => {
                        this.state = State::Failed;
                        return Poll::Ready(Some(Err(TransportError::PoolClosed.into())));
                    }
                    Poll::Ready(Ok(permit)) => {
                        tracing::debug!(kind = ?this.kind, url = %request.url, "starting transport task");
                        let (tx, events) = mpsc::unbounded_channel();
                        let sink = EventSink::new(tx).holding(permit);
                        let task = (job.launch)(job.transport.as_ref(), request, sink);
                        this.state = State::Running {
                            task,
                            events,
                            settle: job.settle,
                        };
                    }
                },
                State::Running { task, mut events, settle } => match events.poll_recv(cx) {
                    Poll::Pending => {
                        this.state = State::Running { task, events, settle };
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(TransportEvent::Progress(fraction))) => {
                        this.state = State::Running { task, events, settle };
                        if this.kind == TaskKind::Fetch {
                            tracing::trace!(fraction, "ignoring progress on a plain fetch");
                            continue;
                        }
                        return Poll::Ready(Some(Ok(TaskEvent::Progress(fraction))));
                    }
                    Poll::Ready(Some(TransportEvent::Finished(outcome))) => {
                        return Poll::Ready(Some(this.finish(outcome, settle)));
                    }
                    Poll::Ready(None) => {
                        this.state = State::Failed;
                        tracing::warn!(kind = ?this.kind, "transport dropped its sink without an outcome");
                        return Poll::Ready(Some(Err(TransportError::Aborted.into())));
                    }
                },
                State::Rejected(err) => {
                    this.state = State::Failed;
                    tracing::debug!(kind = ?this.kind, error = %err, "request rejected before start");
                    return Poll::Ready(Some(Err(err)));
                }
                terminal @ (State::Completed | State::Failed | State::Cancelled) => {
                    this.state = terminal;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<P: ResponsePayload> FusedStream for TaskStream<P> {
    fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }
}

// Nothing inside is structurally pinned.
impl<P> Unpin for TaskStream<P> {}

impl<P> Drop for TaskStream<P> {
    fn drop(&mut self) {
        if matches!(self.state, State::Running { .. }) {
            self.cancel();
        }
    }
}

impl<P> fmt::Debug for TaskStream<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStream")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
