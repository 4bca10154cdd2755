//! Periodic cleanup trigger.
//!
//! The watchdog never touches sessions itself. Each tick posts a
//! `Cleanup` command through the dispatch queue, so expiry and idle shutdown
//! run on the worker thread like any client command.

use crate::command::Command;
use crate::config::WATCH_DOG_INTERVAL_RANGE;
use crate::dispatch::DispatchWorker;
use crate::error::SessionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct SessionWatchdog {
    interval: Duration,
    worker: DispatchWorker,
    running: Arc<AtomicBool>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SessionWatchdog {
    /// Interval is clamped to the accepted range of whole seconds.
    pub fn new(interval_secs: u64, worker: DispatchWorker) -> Self {
        let (min, max) = WATCH_DOG_INTERVAL_RANGE;
        let secs = interval_secs.clamp(min as u64, max as u64);
        Self::with_interval(Duration::from_secs(secs), worker)
    }

    /// Unclamped constructor, for sub-second ticks in tests.
    pub fn with_interval(interval: Duration, worker: DispatchWorker) -> Self {
        Self {
            interval,
            worker,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flag that reads true while the tick thread is alive. Hand it to
    /// `SessionHandler::track_watchdog`.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Spawn the tick thread. A no-op if it is already running.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.handle.is_some() && self.is_running() {
            return Ok(());
        }
        // Reap a thread that exited on its own.
        self.stop();

        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = self.interval;
        let worker = self.worker.clone();
        let running = self.running.clone();

        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("session-watchdog".to_string())
            .spawn(move || {
                run_ticks(interval, &worker, &stop_rx);
                running.store(false, Ordering::SeqCst);
            });
        match spawned {
            Ok(handle) => {
                info!(interval_ms = interval.as_millis() as u64, "Watchdog started");
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stop the tick thread and wait for it, including a tick in flight.
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Watchdog thread panicked");
            } else {
                debug!("Watchdog stopped");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for SessionWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_ticks(interval: Duration, worker: &DispatchWorker, stop_rx: &mpsc::Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        match worker.dispatch_blocking(Command::cleanup()) {
            Ok(dispatched) if !dispatched.available => {
                // Nothing else will stop the loop if no client is talking.
                info!("Server is unavailable, stopping dispatch loop and watchdog");
                if let Err(e) = worker.shutdown_blocking() {
                    debug!(error = %e, "Dispatch loop already stopped");
                }
                return;
            }
            Ok(dispatched) => {
                debug!(failed = dispatched.command.failed(), "Cleanup tick");
            }
            Err(SessionError::WorkerClosed) => {
                info!("Dispatch channel closed, watchdog exiting");
                return;
            }
            Err(e) => warn!(error = %e, "Cleanup tick could not be dispatched"),
        }
    }
}
