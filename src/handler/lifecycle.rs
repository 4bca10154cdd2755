//! Per-kind command handlers.

use super::cleanup::{idle_shutdown_due, suspend_gap, ExpiryPolicy};
use super::SessionHandler;
use crate::command::Command;
use crate::error::SessionError;
use crate::session::SessionId;
use tracing::{debug, info, warn};

impl SessionHandler {
    pub(super) fn create_session(&mut self, command: &mut Command) -> Result<(), SessionError> {
        // Refuse bursts of CreateSession. The timestamp moves on every
        // attempt, rejected or not.
        let now = self.clock.now_secs();
        let min_interval = self.config.create_session_min_interval;
        let last = self.state.last_create_session_at;
        self.state.last_create_session_at = now;
        if last != 0 {
            let elapsed = now.saturating_sub(last);
            if elapsed < min_interval {
                return Err(SessionError::Throttled {
                    elapsed,
                    min_interval,
                });
            }
        }

        if self.table.is_full() {
            let oldest = self
                .table
                .oldest_id()
                .ok_or(SessionError::CapacityInvariant)?;
            let evicted = self
                .table
                .erase(oldest)
                .ok_or(SessionError::CapacityInvariant)?;
            drop(evicted);
            info!(session_id = %oldest, "Session table is full, oldest session removed");
        }

        let session = self
            .engine
            .sessions
            .new_session(now)
            .ok_or(SessionError::AllocationFailed)?;
        let id = self.ids.allocate(&self.table);
        let entry = self.table.insert(id, session, now)?;
        entry
            .session
            .set_client_capability(command.input.capability.unwrap_or_default());

        command.output.id = id;
        self.state.last_session_empty_at = 0;
        info!(session_id = %id, sessions = self.table.len(), "Session created");
        Ok(())
    }

    pub(super) fn delete_session(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        self.delete_session_id(command.input.id)?;
        self.converter()?.sync();
        Ok(())
    }

    /// Drop a session and note when the table becomes empty.
    fn delete_session_id(&mut self, id: SessionId) -> Result<(), SessionError> {
        let entry = self.table.erase(id).ok_or(SessionError::NotFound(id))?;
        drop(entry);

        if self.state.last_session_empty_at == 0 && self.table.is_empty() {
            self.state.last_session_empty_at = self.clock.now_secs();
        }
        info!(session_id = %id, sessions = self.table.len(), "Session deleted");
        Ok(())
    }

    pub(super) fn send_key(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        let id = command.input.id;
        let entry = self.table.get_mut(id).ok_or(SessionError::NotFound(id))?;
        entry.session.deliver_input(command);
        Ok(())
    }

    pub(super) fn test_send_key(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        let id = command.input.id;
        let entry = self.table.get_mut(id).ok_or(SessionError::NotFound(id))?;
        entry.session.test_input(command);
        Ok(())
    }

    pub(super) fn send_command(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        let id = command.input.id;
        let entry = self.table.get_mut(id).ok_or(SessionError::NotFound(id))?;
        entry.session.deliver_admin_command(command);
        Ok(())
    }

    pub(super) fn sync_data(&mut self, command: &mut Command) -> Result<(), SessionError> {
        debug!("Syncing user data");
        self.converter()?.sync();
        command.echo_id();
        Ok(())
    }

    pub(super) fn clear_user_history(&mut self, command: &mut Command) -> Result<(), SessionError> {
        info!("Clearing user history");
        self.converter()?.clear_user_history();
        command.echo_id();
        Ok(())
    }

    pub(super) fn clear_user_prediction(
        &mut self,
        command: &mut Command,
    ) -> Result<(), SessionError> {
        info!("Clearing user prediction");
        self.converter()?.clear_user_prediction();
        command.echo_id();
        Ok(())
    }

    pub(super) fn clear_unused_user_prediction(
        &mut self,
        command: &mut Command,
    ) -> Result<(), SessionError> {
        info!("Clearing unused user prediction");
        self.converter()?.clear_unused_user_prediction();
        command.echo_id();
        Ok(())
    }

    pub(super) fn get_config(&mut self, command: &mut Command) -> Result<(), SessionError> {
        debug!("Getting user config");
        let config = self.engine.config_store.get_config()?;
        command.output.config = Some(config);
        command.echo_id();
        Ok(())
    }

    pub(super) fn set_config(&mut self, command: &mut Command) -> Result<(), SessionError> {
        debug!("Setting user config");
        let config = command
            .input
            .config
            .clone()
            .ok_or(SessionError::MissingConfig)?;
        self.engine.config_store.set_config(&config)?;

        command.output.config = Some(config);
        command.echo_id();
        self.reload(command)
    }

    pub(super) fn shutdown(&mut self, command: &mut Command) -> Result<(), SessionError> {
        info!(sessions = self.table.len(), "Shutting down server");
        self.sync_data(command)?;
        // Lets observers and sessions flush their command logs.
        self.reload_sessions();
        self.state.available = false;
        Ok(())
    }

    pub(super) fn reload(&mut self, command: &mut Command) -> Result<(), SessionError> {
        info!(sessions = self.table.len(), reloaders = self.reloaders.len(), "Reloading server");
        self.reload_sessions();
        self.engine.keymap.reload();
        self.engine.input_table.reload();
        for reloader in &mut self.reloaders {
            reloader();
        }
        command.echo_id();
        Ok(())
    }

    fn reload_sessions(&mut self) {
        self.observers.reload();
        for entry in self.table.entries_mut() {
            entry.session.reload_config();
        }
    }

    /// Remove sessions that were never used within the creation timeout or
    /// have been idle past the command timeout, then shut the server down if
    /// it has been empty for too long.
    pub(super) fn cleanup(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        let now = self.clock.now_secs();

        let suspend = suspend_gap(
            now,
            self.state.last_cleanup_at,
            self.config.watchdog_interval,
            self.watchdog_running(),
        );
        if suspend > 0 {
            warn!(suspend_secs = suspend, "Server went to suspend mode");
        }

        let policy = ExpiryPolicy::new(&self.config, suspend);
        let expired: Vec<SessionId> = self
            .table
            .iter()
            .filter(|entry| {
                policy.is_expired(
                    now,
                    entry.session.creation_time(),
                    entry.session.last_activity_time(),
                )
            })
            .map(|entry| entry.id)
            .collect();

        for id in expired {
            self.delete_session_id(id)?;
            info!(session_id = %id, "Session removed by cleanup");
        }

        self.converter()?.sync();

        if idle_shutdown_due(
            now,
            self.state.last_session_empty_at,
            self.config.idle_shutdown_timeout,
            suspend,
        ) {
            info!(
                empty_since = self.state.last_session_empty_at,
                timeout = self.config.idle_shutdown_timeout,
                "No sessions for too long"
            );
            self.shutdown(command)?;
        }

        self.state.last_cleanup_at = now;
        Ok(())
    }

    pub(super) fn no_operation(&mut self, command: &mut Command) -> Result<(), SessionError> {
        command.echo_id();
        Ok(())
    }
}
