//! Dispatch worker handle for async and blocking callers.

use crate::command::Command;
use crate::dispatch::request::{DispatchRequest, Dispatched};
use crate::error::SessionError;
use crate::handler::SessionStats;
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Maximum time to retry enqueuing a shutdown request when the queue is full.
const SHUTDOWN_SEND_TIMEOUT_SECS: u64 = 5;
/// Backoff between enqueue retries (milliseconds).
const SEND_BACKOFF_MS: u64 = 25;

/// Handle for sending commands to the dispatch worker.
///
/// Cheap to clone; the transport and the watchdog each hold one.
#[derive(Clone)]
pub struct DispatchWorker {
    tx: mpsc::SyncSender<DispatchRequest>,
}

impl DispatchWorker {
    pub fn new(tx: mpsc::SyncSender<DispatchRequest>) -> Self {
        Self { tx }
    }

    fn try_send(&self, req: DispatchRequest) -> Result<(), SessionError> {
        match self.tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::TrySendError::Full(_)) => Err(SessionError::Busy),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(SessionError::WorkerClosed),
        }
    }

    async fn send_with_retry(
        &self,
        req: DispatchRequest,
        max_wait: Option<Duration>,
    ) -> Result<(), SessionError> {
        let start = Instant::now();
        let mut pending = req;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(req)) => {
                    if let Some(max_wait) = max_wait {
                        if Instant::now().duration_since(start) >= max_wait {
                            return Err(SessionError::Busy);
                        }
                    }
                    pending = req;
                    tokio::time::sleep(Duration::from_millis(SEND_BACKOFF_MS)).await;
                }
                Err(mpsc::TrySendError::Disconnected(_)) => {
                    return Err(SessionError::WorkerClosed)
                }
            }
        }
    }

    /// Submit a command and wait for the evaluated result.
    ///
    /// Waits for queue space instead of failing with `Busy`, so a burst of
    /// client traffic is serialized rather than dropped.
    pub async fn dispatch(&self, command: Command) -> Result<Dispatched, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send_with_retry(DispatchRequest::Eval { command, resp: tx }, None)
            .await?;
        Ok(rx.await?)
    }

    /// Like [`dispatch`](Self::dispatch), but fails with `Busy` instead of
    /// waiting when the queue is full.
    pub async fn try_dispatch(&self, command: Command) -> Result<Dispatched, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(DispatchRequest::Eval { command, resp: tx })?;
        Ok(rx.await?)
    }

    /// Blocking variant for plain threads (the watchdog). Must not be called
    /// from inside an async runtime.
    pub fn dispatch_blocking(&self, command: Command) -> Result<Dispatched, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(DispatchRequest::Eval { command, resp: tx })?;
        Ok(rx.blocking_recv()?)
    }

    /// Snapshot of the handler's counters.
    pub async fn stats(&self) -> Result<SessionStats, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send_with_retry(DispatchRequest::Stats { resp: tx }, None)
            .await?;
        Ok(rx.await?)
    }

    /// Stop the dispatch loop. Commands queued before this are still handled.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send_with_retry(
            DispatchRequest::Shutdown,
            Some(Duration::from_secs(SHUTDOWN_SEND_TIMEOUT_SECS)),
        )
        .await
    }

    /// Blocking variant of [`shutdown`](Self::shutdown).
    pub fn shutdown_blocking(&self) -> Result<(), SessionError> {
        self.tx.send(DispatchRequest::Shutdown)?;
        Ok(())
    }
}
