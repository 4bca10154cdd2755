//! In-process collaborators with no conversion logic.

use super::{ConfigStore, Converter, Engine, InputTable, Keymap, SessionFactory};
use crate::clock::Clock;
use crate::command::{Capability, Command, ConfigBlob};
use crate::error::SessionError;
use crate::session::Session;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

impl Engine {
    /// Engine made of the local collaborators below.
    pub fn local(clock: Arc<dyn Clock>) -> Self {
        Self {
            converter: Some(Box::new(NullConverter)),
            config_store: Box::new(MemoryConfigStore::default()),
            input_table: Box::new(StaticInputTable),
            keymap: Box::new(StaticKeymap),
            sessions: Box::new(PassthroughFactory::new(clock)),
        }
    }
}

/// Converter without user data; every call is a logged no-op.
#[derive(Debug, Default)]
pub struct NullConverter;

impl Converter for NullConverter {
    fn sync(&mut self) {
        debug!("Syncing user data (nothing to flush)");
    }

    fn clear_user_history(&mut self) {
        debug!("Clearing user history (nothing stored)");
    }

    fn clear_user_prediction(&mut self) {
        debug!("Clearing user prediction (nothing stored)");
    }

    fn clear_unused_user_prediction(&mut self) {
        debug!("Clearing unused user prediction (nothing stored)");
    }
}

/// Config store that keeps the config in memory only.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: ConfigBlob,
}

impl MemoryConfigStore {
    pub fn new(config: ConfigBlob) -> Self {
        Self { config }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_config(&self) -> Result<ConfigBlob, SessionError> {
        Ok(self.config.clone())
    }

    fn set_config(&mut self, config: &ConfigBlob) -> Result<(), SessionError> {
        self.config = config.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StaticInputTable;

impl InputTable for StaticInputTable {
    fn initialize(&mut self) -> bool {
        true
    }

    fn reload(&mut self) {}
}

#[derive(Debug, Default)]
pub struct StaticKeymap;

impl Keymap for StaticKeymap {
    fn reload(&mut self) {}
}

/// Session that echoes whatever it is sent and tracks its own activity time.
pub struct PassthroughSession {
    clock: Arc<dyn Clock>,
    created_at: u64,
    last_command_at: u64,
    capability: Capability,
    reloads: u32,
}

impl PassthroughSession {
    pub fn new(clock: Arc<dyn Clock>, created_at: u64) -> Self {
        Self {
            clock,
            created_at,
            last_command_at: 0,
            capability: Capability::NONE,
            reloads: 0,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn reloads(&self) -> u32 {
        self.reloads
    }

    fn touch(&mut self) {
        self.last_command_at = self.clock.now_secs();
    }
}

impl Session for PassthroughSession {
    fn deliver_input(&mut self, command: &mut Command) {
        self.touch();
        command.output.result = Some(json!({
            "consumed": command.input.payload.is_some(),
            "echo": command.input.payload,
        }));
    }

    fn test_input(&mut self, command: &mut Command) {
        self.touch();
        command.output.result = Some(json!({
            "consumed": command.input.payload.is_some(),
        }));
    }

    fn deliver_admin_command(&mut self, command: &mut Command) {
        self.touch();
        command.output.result = Some(json!({
            "command": command.input.payload,
        }));
    }

    fn reload_config(&mut self) {
        self.reloads += 1;
    }

    fn set_client_capability(&mut self, capability: Capability) {
        self.capability = capability;
    }

    fn creation_time(&self) -> u64 {
        self.created_at
    }

    fn last_activity_time(&self) -> u64 {
        self.last_command_at
    }
}

pub struct PassthroughFactory {
    clock: Arc<dyn Clock>,
}

impl PassthroughFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl SessionFactory for PassthroughFactory {
    fn new_session(&mut self, now: u64) -> Option<Box<dyn Session>> {
        Some(Box::new(PassthroughSession::new(self.clock.clone(), now)))
    }
}
