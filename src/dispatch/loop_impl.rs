//! Main dispatch worker loop.

use crate::dispatch::request::{DispatchRequest, Dispatched};
use crate::handler::SessionHandler;
use std::sync::mpsc;
use tracing::{debug, info, warn};

/// Run the dispatch loop on the current thread.
///
/// The loop is the only owner of `handler`, so commands are evaluated one at
/// a time in arrival order. It keeps answering after the server became
/// unavailable (every command then fails) and returns on
/// `DispatchRequest::Shutdown` or once every sender is gone.
pub fn run_dispatch_loop(rx: mpsc::Receiver<DispatchRequest>, mut handler: SessionHandler) {
    while let Ok(req) = rx.recv() {
        match req {
            DispatchRequest::Eval { mut command, resp } => {
                let kind = command.kind();
                let was_available = handler.is_available();
                let available = handler.eval_command(&mut command);
                if was_available && !available {
                    info!(kind = %kind, "Server is no longer available");
                }
                debug!(
                    kind = %kind,
                    failed = command.failed(),
                    elapsed_us = command.output.elapsed_time_us,
                    "Dispatched command"
                );
                if resp.send(Dispatched { command, available }).is_err() {
                    warn!(kind = %kind, "Caller went away before the reply was sent");
                }
            }
            DispatchRequest::Stats { resp } => {
                let _ = resp.send(handler.stats());
            }
            DispatchRequest::Shutdown => {
                info!("Dispatch worker shutting down");
                break;
            }
        }
    }
    info!(
        sessions = handler.sessions().len(),
        "Dispatch loop finished, dropping remaining sessions"
    );
}
