//! Decoded response streams.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::stream::{FusedStream, Stream};
use futures_util::StreamExt;

use crate::decode::Decode;
use crate::error::{RestError, TransportError};
use crate::http::ResponsePayload;
use crate::task::{TaskEvent, TaskState, TaskStream};

/// One item of a `ResponseStream`.
///
/// Progress pushes carry no payload. The terminal push carries the decoded
/// value and a progress of `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer<T> {
    pub payload: Option<T>,
    pub progress: f64,
}

impl<T> Transfer<T> {
    fn progress(progress: f64) -> Self {
        Self {
            payload: None,
            progress,
        }
    }

    fn finished(payload: T) -> Self {
        Self {
            payload: Some(payload),
            progress: 1.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.payload.is_some()
    }
}

/// A `TaskStream` whose terminal payload is run through a decode destination.
pub struct ResponseStream<P, D> {
    task: TaskStream<P>,
    decoder: D,
    undecodable: bool,
}

impl<P, D> ResponseStream<P, D>
where
    P: ResponsePayload,
    D: Decode<P>,
{
    pub(crate) fn new(task: TaskStream<P>, decoder: D) -> Self {
        Self {
            task,
            decoder,
            undecodable: false,
        }
    }

    /// Lifecycle of the call. A payload the decoder rejected counts as
    /// `Failed` even though the transport completed.
    pub fn state(&self) -> TaskState {
        match self.task.state() {
            TaskState::Completed if self.undecodable => TaskState::Failed,
            state => state,
        }
    }

    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    /// Drive the call to completion and return the terminal value, skipping
    /// progress.
    pub async fn single(mut self) -> Result<D::Output, RestError> {
        while let Some(item) = self.next().await {
            if let Some(payload) = item?.payload {
                return Ok(payload);
            }
        }
        // Only reachable when the stream was cancelled before it finished.
        Err(TransportError::Aborted.into())
    }
}

impl<P, D> Stream for ResponseStream<P, D>
where
    P: ResponsePayload,
    D: Decode<P>,
{
    type Item = Result<Transfer<D::Output>, RestError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let event = match this.task.poll_next_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Ready(Some(event)) => event,
        };
        let item = match event {
            Ok(TaskEvent::Progress(fraction)) => Ok(Transfer::progress(fraction)),
            Ok(TaskEvent::Finished(payload)) => {
                let decoded = this.decoder.decode(payload);
                this.undecodable = decoded.is_err();
                decoded.map(Transfer::finished)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = &item {
            tracing::debug!(error = %err, "call finished with an error");
        }
        Poll::Ready(Some(item))
    }
}

impl<P, D> FusedStream for ResponseStream<P, D>
where
    P: ResponsePayload,
    D: Decode<P>,
{
    fn is_terminated(&self) -> bool {
        self.task.is_terminated()
    }
}

impl<P, D> Unpin for ResponseStream<P, D> {}

impl<P, D> fmt::Debug for ResponseStream<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").field("task", &self.task).finish()
    }
}
