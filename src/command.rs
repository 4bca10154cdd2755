//! Decoded command objects consumed and produced by the dispatcher.
//!
//! The transport decodes a request into an [`Input`], wraps it in a
//! [`Command`] and hands it to the dispatcher, which fills in the [`Output`].

use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a command, as declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    CreateSession,
    DeleteSession,
    SendKey,
    TestSendKey,
    SendCommand,
    SyncData,
    ClearUserHistory,
    ClearUserPrediction,
    ClearUnusedUserPrediction,
    GetConfig,
    SetConfig,
    Shutdown,
    Reload,
    Cleanup,
    NoOperation,
    /// Any kind this server does not know about. Always fails.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::CreateSession => "create_session",
            CommandKind::DeleteSession => "delete_session",
            CommandKind::SendKey => "send_key",
            CommandKind::TestSendKey => "test_send_key",
            CommandKind::SendCommand => "send_command",
            CommandKind::SyncData => "sync_data",
            CommandKind::ClearUserHistory => "clear_user_history",
            CommandKind::ClearUserPrediction => "clear_user_prediction",
            CommandKind::ClearUnusedUserPrediction => "clear_unused_user_prediction",
            CommandKind::GetConfig => "get_config",
            CommandKind::SetConfig => "set_config",
            CommandKind::Shutdown => "shutdown",
            CommandKind::Reload => "reload",
            CommandKind::Cleanup => "cleanup",
            CommandKind::NoOperation => "no_operation",
            CommandKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Client capability bits attached to a session at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(pub u32);

impl Capability {
    pub const NONE: Capability = Capability(0);
    pub const DELETE_PRECEDING_TEXT: Capability = Capability(1 << 0);
    pub const SURROUNDING_TEXT: Capability = Capability(1 << 1);

    pub fn contains(self, other: Capability) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Capability {
    type Output = Capability;

    fn bitor(self, rhs: Capability) -> Capability {
        Capability(self.0 | rhs.0)
    }
}

/// Opaque user configuration, owned by the config store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigBlob(pub Value);

/// Error marker attached to a failed command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    None,
    SessionFailure,
}

/// Request half of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigBlob>,
    /// Key event or session command, interpreted only by the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Input {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            id: SessionId::INVALID,
            capability: None,
            config: None,
            payload: None,
        }
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_config(mut self, config: ConfigBlob) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Response half of a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub elapsed_time_us: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigBlob>,
    /// Whatever the session produced for an input event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// A command travelling through the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub input: Input,
    #[serde(default)]
    pub output: Output,
}

impl Command {
    pub fn new(input: Input) -> Self {
        Self {
            input,
            output: Output::default(),
        }
    }

    /// The synthetic command the watchdog injects on every tick.
    pub fn cleanup() -> Self {
        Self::new(Input::new(CommandKind::Cleanup))
    }

    pub fn kind(&self) -> CommandKind {
        self.input.kind
    }

    pub fn failed(&self) -> bool {
        self.output.error_code == Some(ErrorCode::SessionFailure)
    }

    /// Copy the input id into the output.
    pub(crate) fn echo_id(&mut self) {
        self.output.id = self.input.id;
    }
}

impl From<Input> for Command {
    fn from(input: Input) -> Self {
        Command::new(input)
    }
}
