// ABOUTME: Implements SendHandle - the immediately-returned handle for a spawned dispatch.
// ABOUTME: Resolves to the response text or a GatewayError; supports cancellation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::GatewayError;

/// Handle to a dispatch running on the tokio runtime.
///
/// Await it for the result. Dropping the handle detaches the task; call
/// [`SendHandle::cancel`] to abandon it. Cancelling before admission leaves
/// the ledger untouched; cancelling mid-flight gives back the held tokens,
/// though the provider may still bill the outstanding call.
#[derive(Debug)]
pub struct SendHandle {
    task: JoinHandle<Result<String, GatewayError>>,
    start_time: Instant,
}

impl SendHandle {
    pub(crate) fn new(task: JoinHandle<Result<String, GatewayError>>) -> Self {
        Self {
            task,
            start_time: Instant::now(),
        }
    }

    /// Abort the dispatch. Awaiting the handle afterwards yields `Cancelled`.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Returns true once the dispatch has produced a result or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Time since the dispatch was started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Wait for the result, cancelling the dispatch if `timeout` elapses first.
    pub async fn wait_with_timeout(mut self, timeout: Duration) -> Result<String, GatewayError> {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel();
                Err(GatewayError::Cancelled)
            }
        }
    }
}

impl Future for SendHandle {
    type Output = Result<String, GatewayError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => Poll::Ready(Err(GatewayError::Cancelled)),
            Poll::Ready(Err(err)) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}
