//! Serialized command dispatch.
//!
//! The [`SessionHandler`] is not thread-safe, so it lives on one worker
//! thread that drains a bounded request queue. Clients and the watchdog send
//! requests through cloned [`DispatchWorker`] handles and receive the result
//! on a one-shot channel.

mod loop_impl;
pub mod request;
pub mod worker;

pub use loop_impl::run_dispatch_loop;
pub use request::{DispatchRequest, Dispatched};
pub use worker::DispatchWorker;

use crate::handler::SessionHandler;
use std::sync::mpsc;
use std::thread;

/// Default depth of the dispatch queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Create the request channel and a handle for it.
pub fn channel(capacity: usize) -> (DispatchWorker, mpsc::Receiver<DispatchRequest>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (DispatchWorker::new(tx), rx)
}

/// Run the dispatch loop on a dedicated thread.
pub fn spawn_dispatch_worker(
    handler: SessionHandler,
    capacity: usize,
) -> std::io::Result<(DispatchWorker, thread::JoinHandle<()>)> {
    let (worker, rx) = channel(capacity);
    let join = thread::Builder::new()
        .name("session-dispatch".to_string())
        .spawn(move || run_dispatch_loop(rx, handler))?;
    Ok((worker, join))
}
