//! Request types for the dispatch worker.

use crate::command::Command;
use crate::handler::SessionStats;
use tokio::sync::oneshot;

/// A command after it went through the handler.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub command: Command,
    /// Whether the server still accepts commands.
    pub available: bool,
}

/// Request types for the dispatch worker
pub enum DispatchRequest {
    Eval {
        command: Command,
        resp: oneshot::Sender<Dispatched>,
    },
    Stats {
        resp: oneshot::Sender<SessionStats>,
    },
    Shutdown,
}
