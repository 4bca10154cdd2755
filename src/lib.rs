//! Session lifecycle core for a local input-method conversion server
//!
//! This library owns the part of the server between the transport and the
//! conversion engine: creating and deleting client sessions, routing commands
//! to them, expiring idle ones and deciding when the whole server shuts down.
//!
//! # Architecture
//!
//! - **Dispatch thread**: Runs the dispatch loop (`dispatch::run_dispatch_loop`).
//!   It is the only owner of the [`SessionHandler`], so every command is
//!   evaluated one at a time.
//!
//! - **Transport**: Async code (the binary reads JSON lines from stdin) that
//!   submits commands through a [`DispatchWorker`] and awaits the reply.
//!
//! - **Watchdog**: A plain thread that periodically posts a `Cleanup` command
//!   through the same queue ([`SessionWatchdog`]).
//!
//! - **Engine**: The collaborators the handler drives (converter, config
//!   store, input table, keymap, session factory). `Engine::local` builds an
//!   in-process set used by the binary and the tests.
//!
//! # Commands
//!
//! ## Lifecycle
//! - `CREATE_SESSION`: Allocate an id and a session, evicting the oldest one
//!   when the table is full
//! - `DELETE_SESSION`: Remove a session and sync user data
//! - `CLEANUP`: Expire idle sessions, shut down an idle server
//! - `SHUTDOWN`: Flush and stop accepting commands
//!
//! ## Session
//! - `SEND_KEY` / `TEST_SEND_KEY` / `SEND_COMMAND`: Forward to a live session
//!
//! ## User data and configuration
//! - `SYNC_DATA`, `CLEAR_USER_HISTORY`, `CLEAR_USER_PREDICTION`,
//!   `CLEAR_UNUSED_USER_PREDICTION`
//! - `GET_CONFIG` / `SET_CONFIG` / `RELOAD`
//! - `NO_OPERATION`

use std::path::PathBuf;

pub mod clock;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handler;
pub mod observer;
pub mod session;
pub mod watchdog;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Capability, Command, CommandKind, ConfigBlob, ErrorCode, Input, Output};
pub use config::{EffectiveConfig, ServerConfig};
pub use dispatch::{run_dispatch_loop, DispatchRequest, DispatchWorker, Dispatched};
pub use engine::Engine;
pub use error::SessionError;
pub use handler::{SessionHandler, SessionStats};
pub use observer::SessionObserver;
pub use session::{Session, SessionId, SessionTable};
pub use watchdog::SessionWatchdog;

/// Expand `~/` prefix to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    path.strip_prefix("~/")
        .and_then(|stripped| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(stripped)))
        .unwrap_or_else(|| PathBuf::from(path))
}
