//! Session identifier, the session collaborator and table entries.

use crate::command::{Capability, Command};
use serde::{Deserialize, Serialize};

/// Identifier of a live session. `0` is reserved as "invalid".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub const INVALID: SessionId = SessionId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Server-side state of one client conversation.
///
/// Implementations are only ever touched from the dispatch worker thread,
/// so they must be `Send` but need not be `Sync`. Timestamps are whole
/// seconds from the server's clock.
pub trait Session: Send {
    /// Process a key event carried in `command.input.payload`.
    fn deliver_input(&mut self, command: &mut Command);

    /// Like `deliver_input`, but only reports whether the key would be consumed.
    fn test_input(&mut self, command: &mut Command);

    /// Process a session-level command (submit, revert, select candidate, ...).
    fn deliver_admin_command(&mut self, command: &mut Command);

    fn reload_config(&mut self);

    fn set_client_capability(&mut self, capability: Capability);

    fn creation_time(&self) -> u64;

    /// Time of the last processed command, or 0 if none was processed yet.
    fn last_activity_time(&self) -> u64;
}

/// A live session owned by the table.
pub struct SessionEntry {
    pub id: SessionId,
    pub session: Box<dyn Session>,
    pub created_at: u64,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_activity", &self.session.last_activity_time())
            .finish()
    }
}
