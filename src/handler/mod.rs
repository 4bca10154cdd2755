//! Command dispatcher and session lifecycle.
//!
//! [`SessionHandler`] is the single entry point for every command, whether it
//! comes from a client or from the watchdog. It is not synchronized: exactly
//! one thread (the dispatch worker) owns it and calls
//! [`eval_command`](SessionHandler::eval_command) one command at a time.

pub mod cleanup;
mod lifecycle;

use crate::clock::Clock;
use crate::command::{Command, CommandKind, ErrorCode};
use crate::config::EffectiveConfig;
use crate::engine::{Converter, Engine};
use crate::error::SessionError;
use crate::observer::{SessionObserver, SessionObserverHandler};
use crate::session::{SessionId, SessionIdAllocator, SessionTable};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback run on every reload.
pub type Reloader = Box<dyn FnMut() + Send>;

/// Mutable server bookkeeping. Timestamps are seconds, 0 means unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub available: bool,
    pub max_session_size: usize,
    /// 0 while the table is non-empty.
    pub last_session_empty_at: u64,
    pub last_cleanup_at: u64,
    pub last_create_session_at: u64,
}

/// Point-in-time view of the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub sessions: usize,
    pub capacity: usize,
    pub available: bool,
    pub last_session_empty_at: u64,
    pub last_cleanup_at: u64,
    pub degraded_id_draws: u64,
}

pub struct SessionHandler {
    config: EffectiveConfig,
    clock: Arc<dyn Clock>,
    table: SessionTable,
    ids: SessionIdAllocator,
    engine: Engine,
    observers: SessionObserverHandler,
    reloaders: Vec<Reloader>,
    state: ServerState,
    watchdog_running: Arc<AtomicBool>,
}

impl SessionHandler {
    /// Build the handler and initialize the engine.
    ///
    /// If the input table cannot be loaded or the converter is missing the
    /// handler stays unavailable for its whole lifetime.
    pub fn new(config: EffectiveConfig, mut engine: Engine, clock: Arc<dyn Clock>) -> Self {
        if config.restricted {
            info!("Server starts with restricted mode");
        }

        let now = clock.now_secs();
        let available = if !engine.input_table.initialize() {
            error!("Input table failed to initialize, server is unavailable");
            false
        } else if engine.converter.is_none() {
            error!("Conversion engine is missing, server is unavailable");
            false
        } else {
            true
        };

        Self {
            config,
            clock,
            table: SessionTable::new(config.max_session_size),
            ids: SessionIdAllocator::new(),
            engine,
            observers: SessionObserverHandler::new(),
            reloaders: Vec::new(),
            state: ServerState {
                available,
                max_session_size: config.max_session_size,
                last_session_empty_at: now,
                last_cleanup_at: 0,
                last_create_session_at: 0,
            },
            watchdog_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the id allocator (e.g. to inject an entropy source).
    pub fn with_id_allocator(mut self, ids: SessionIdAllocator) -> Self {
        self.ids = ids;
        self
    }

    /// Share the watchdog's running flag; suspend detection only applies
    /// while it is set.
    pub fn track_watchdog(&mut self, running: Arc<AtomicBool>) {
        self.watchdog_running = running;
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.add_observer(observer);
    }

    pub fn register_reloader(&mut self, reloader: Reloader) {
        self.reloaders.push(reloader);
    }

    pub fn is_available(&self) -> bool {
        self.state.available
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.table
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sessions: self.table.len(),
            capacity: self.table.capacity(),
            available: self.state.available,
            last_session_empty_at: self.state.last_session_empty_at,
            last_cleanup_at: self.state.last_cleanup_at,
            degraded_id_draws: self.ids.degraded_draws(),
        }
    }

    /// Evaluate one command and fill in its output.
    ///
    /// Returns whether the server is still available afterwards; once it
    /// returns false every later call fails without touching anything.
    pub fn eval_command(&mut self, command: &mut Command) -> bool {
        if !self.state.available {
            debug!(kind = %command.kind(), "Rejecting command, server is unavailable");
            return false;
        }

        let started = Instant::now();
        let kind = command.kind();
        let result = match kind {
            CommandKind::CreateSession => self.create_session(command),
            CommandKind::DeleteSession => self.delete_session(command),
            CommandKind::SendKey => self.send_key(command),
            CommandKind::TestSendKey => self.test_send_key(command),
            CommandKind::SendCommand => self.send_command(command),
            CommandKind::SyncData => self.sync_data(command),
            CommandKind::ClearUserHistory => self.clear_user_history(command),
            CommandKind::ClearUserPrediction => self.clear_user_prediction(command),
            CommandKind::ClearUnusedUserPrediction => self.clear_unused_user_prediction(command),
            CommandKind::GetConfig => self.get_config(command),
            CommandKind::SetConfig => self.set_config(command),
            CommandKind::Shutdown => self.shutdown(command),
            CommandKind::Reload => self.reload(command),
            CommandKind::Cleanup => self.cleanup(command),
            CommandKind::NoOperation => self.no_operation(command),
            CommandKind::Unknown => Err(SessionError::UnknownCommand),
        };

        if let Err(e) = &result {
            match e {
                SessionError::CapacityInvariant => {
                    error!(kind = %kind, error = %e, "Session table is inconsistent")
                }
                _ => warn!(kind = %kind, id = %command.input.id, error = %e, "Command failed"),
            }
            command.output.id = SessionId::INVALID;
            command.output.error_code = Some(ErrorCode::SessionFailure);
        }

        let elapsed_us = started.elapsed().as_micros();
        command.output.elapsed_time_us = i32::try_from(elapsed_us).unwrap_or(i32::MAX);

        if result.is_ok() {
            debug!(kind = %kind, id = %command.output.id, elapsed_us = command.output.elapsed_time_us, "Command processed");
            self.observers.on_command_processed(command);
        }

        self.state.available
    }

    fn converter(&mut self) -> Result<&mut (dyn Converter + 'static), SessionError> {
        self.engine
            .converter
            .as_deref_mut()
            .ok_or(SessionError::EngineUnavailable)
    }

    fn watchdog_running(&self) -> bool {
        self.watchdog_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::{Capability, ConfigBlob, Input, Output};
    use crate::config::ServerConfig;
    use crate::engine::local::{MemoryConfigStore, StaticInputTable, StaticKeymap};
    use crate::engine::{ConfigStore, InputTable, Keymap, SessionFactory};
    use crate::session::{EntropySource, Session};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    const START: u64 = 1_000_000;

    /// Everything the fakes record, shared with the test body.
    #[derive(Default)]
    struct Calls {
        syncs: usize,
        clear_history: usize,
        clear_prediction: usize,
        clear_unused_prediction: usize,
        keymap_reloads: usize,
        session_reloads: usize,
        capabilities: Vec<Capability>,
        processed: Vec<CommandKind>,
        observer_reloads: usize,
        sessions_dropped: usize,
    }

    type Shared = Arc<Mutex<Calls>>;

    fn calls(shared: &Shared) -> std::sync::MutexGuard<'_, Calls> {
        shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    struct RecordingConverter(Shared);

    impl Converter for RecordingConverter {
        fn sync(&mut self) {
            calls(&self.0).syncs += 1;
        }
        fn clear_user_history(&mut self) {
            calls(&self.0).clear_history += 1;
        }
        fn clear_user_prediction(&mut self) {
            calls(&self.0).clear_prediction += 1;
        }
        fn clear_unused_user_prediction(&mut self) {
            calls(&self.0).clear_unused_prediction += 1;
        }
    }

    struct RecordingKeymap(Shared);

    impl Keymap for RecordingKeymap {
        fn reload(&mut self) {
            calls(&self.0).keymap_reloads += 1;
        }
    }

    struct BrokenInputTable;

    impl InputTable for BrokenInputTable {
        fn initialize(&mut self) -> bool {
            false
        }
        fn reload(&mut self) {}
    }

    struct FailingConfigStore;

    impl ConfigStore for FailingConfigStore {
        fn get_config(&self) -> Result<ConfigBlob, SessionError> {
            Err(SessionError::ConfigStore("unreadable".to_string()))
        }
        fn set_config(&mut self, _config: &ConfigBlob) -> Result<(), SessionError> {
            Err(SessionError::ConfigStore("read-only".to_string()))
        }
    }

    struct ProbeSession {
        clock: ManualClock,
        created_at: u64,
        last_command_at: u64,
        calls: Shared,
    }

    impl Session for ProbeSession {
        fn deliver_input(&mut self, command: &mut Command) {
            self.last_command_at = self.clock.now_secs();
            command.output.result = Some(json!({"consumed": true}));
        }
        fn test_input(&mut self, command: &mut Command) {
            self.last_command_at = self.clock.now_secs();
            command.output.result = Some(json!({"consumed": false}));
        }
        fn deliver_admin_command(&mut self, command: &mut Command) {
            self.last_command_at = self.clock.now_secs();
            command.output.result = Some(json!({"admin": true}));
        }
        fn reload_config(&mut self) {
            calls(&self.calls).session_reloads += 1;
        }
        fn set_client_capability(&mut self, capability: Capability) {
            calls(&self.calls).capabilities.push(capability);
        }
        fn creation_time(&self) -> u64 {
            self.created_at
        }
        fn last_activity_time(&self) -> u64 {
            self.last_command_at
        }
    }

    impl Drop for ProbeSession {
        fn drop(&mut self) {
            calls(&self.calls).sessions_dropped += 1;
        }
    }

    struct ProbeFactory {
        clock: ManualClock,
        calls: Shared,
        fail: bool,
    }

    impl SessionFactory for ProbeFactory {
        fn new_session(&mut self, now: u64) -> Option<Box<dyn Session>> {
            if self.fail {
                return None;
            }
            Some(Box::new(ProbeSession {
                clock: self.clock.clone(),
                created_at: now,
                last_command_at: 0,
                calls: self.calls.clone(),
            }))
        }
    }

    /// Takes a measurable amount of time for every key.
    struct SlowSession {
        delay: Duration,
        created_at: u64,
    }

    impl Session for SlowSession {
        fn deliver_input(&mut self, _command: &mut Command) {
            thread::sleep(self.delay);
        }
        fn test_input(&mut self, _command: &mut Command) {}
        fn deliver_admin_command(&mut self, _command: &mut Command) {}
        fn reload_config(&mut self) {}
        fn set_client_capability(&mut self, _capability: Capability) {}
        fn creation_time(&self) -> u64 {
            self.created_at
        }
        fn last_activity_time(&self) -> u64 {
            0
        }
    }

    /// Sleeps before deciding whether allocation succeeds.
    struct SlowFactory {
        delay: Duration,
        fail: bool,
    }

    impl SessionFactory for SlowFactory {
        fn new_session(&mut self, now: u64) -> Option<Box<dyn Session>> {
            thread::sleep(self.delay);
            if self.fail {
                return None;
            }
            Some(Box::new(SlowSession {
                delay: self.delay,
                created_at: now,
            }))
        }
    }

    struct DeadEntropy;

    impl EntropySource for DeadEntropy {
        fn try_fill(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no entropy",
            )))
        }
    }

    struct RecordingObserver(Shared);

    impl SessionObserver for RecordingObserver {
        fn on_command_processed(&mut self, command: &Command) {
            calls(&self.0).processed.push(command.kind());
        }
        fn on_reload(&mut self) {
            calls(&self.0).observer_reloads += 1;
        }
    }

    struct Harness {
        handler: SessionHandler,
        clock: ManualClock,
        calls: Shared,
    }

    impl Harness {
        fn new(config: ServerConfig) -> Self {
            Self::with_engine(config, |_| {})
        }

        fn with_engine(config: ServerConfig, tweak: impl FnOnce(&mut Engine)) -> Self {
            let clock = ManualClock::new(START);
            let shared = Shared::default();
            let mut engine = Engine {
                converter: Some(Box::new(RecordingConverter(shared.clone()))),
                config_store: Box::new(MemoryConfigStore::default()),
                input_table: Box::new(StaticInputTable),
                keymap: Box::new(RecordingKeymap(shared.clone())),
                sessions: Box::new(ProbeFactory {
                    clock: clock.clone(),
                    calls: shared.clone(),
                    fail: false,
                }),
            };
            tweak(&mut engine);
            let mut handler = SessionHandler::new(config.effective(), engine, Arc::new(clock.clone()));
            handler.add_observer(Box::new(RecordingObserver(shared.clone())));
            Self {
                handler,
                clock,
                calls: shared,
            }
        }

        fn run(&mut self, input: Input) -> Command {
            let mut command = Command::new(input);
            self.handler.eval_command(&mut command);
            command
        }

        fn create(&mut self) -> SessionId {
            let command = self.run(Input::new(CommandKind::CreateSession));
            assert!(!command.failed(), "create should succeed");
            command.output.id
        }

        fn delete(&mut self, id: SessionId) -> Command {
            self.run(Input::new(CommandKind::DeleteSession).with_id(id))
        }

        fn send_key(&mut self, id: SessionId) -> Command {
            self.run(
                Input::new(CommandKind::SendKey)
                    .with_id(id)
                    .with_payload(json!({"key": "a"})),
            )
        }

        fn cleanup(&mut self) -> Command {
            self.run(Input::new(CommandKind::Cleanup))
        }

        fn live(&self) -> Vec<SessionId> {
            self.handler.sessions().ids()
        }
    }

    fn small(capacity: i64) -> ServerConfig {
        ServerConfig {
            max_session_size: capacity,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn eviction_and_empty_timestamp_scenario() {
        let mut h = Harness::new(small(2));
        let a = h.create();
        let b = h.create();
        assert_eq!(h.live(), vec![a, b]);

        let c = h.create();
        assert_eq!(h.live(), vec![b, c]);
        assert_eq!(calls(&h.calls).sessions_dropped, 1);

        assert!(!h.delete(b).failed());
        assert_eq!(h.live(), vec![c]);
        assert_eq!(h.handler.state().last_session_empty_at, 0);

        h.clock.advance(7);
        assert!(!h.delete(c).failed());
        assert!(h.live().is_empty());
        assert_eq!(h.handler.state().last_session_empty_at, START + 7);
        assert_eq!(calls(&h.calls).syncs, 2);
    }

    #[test]
    fn table_never_exceeds_capacity() {
        let mut h = Harness::new(small(3));
        let mut created = Vec::new();
        for _ in 0..10 {
            let before = h.live();
            let id = h.create();
            created.push(id);
            assert!(h.handler.sessions().len() <= 3);
            if before.len() == 3 {
                // Exactly the oldest one went away.
                let mut expected = before[1..].to_vec();
                expected.push(id);
                assert_eq!(h.live(), expected);
            }
        }
        assert_eq!(h.live(), created[7..].to_vec());
    }

    #[test]
    fn access_does_not_protect_from_eviction() {
        let mut h = Harness::new(small(2));
        let a = h.create();
        let b = h.create();
        assert!(!h.send_key(a).failed());
        let c = h.create();
        assert_eq!(h.live(), vec![b, c]);
    }

    #[test]
    fn ids_are_unique_and_nonzero() {
        let mut h = Harness::new(small(128));
        let mut seen = HashSet::new();
        for _ in 0..128 {
            let id = h.create();
            assert!(id.is_valid());
            assert!(seen.insert(id));
        }
        assert_eq!(h.handler.sessions().len(), 128);
    }

    #[test]
    fn create_session_is_throttled() {
        let mut h = Harness::new(ServerConfig {
            create_session_min_interval: 5,
            ..ServerConfig::default()
        });
        h.create();

        h.clock.advance(2);
        let rejected = h.run(Input::new(CommandKind::CreateSession));
        assert!(rejected.failed());
        assert_eq!(rejected.output.id, SessionId::INVALID);
        assert_eq!(h.handler.sessions().len(), 1);

        // The rejected attempt restarted the interval.
        h.clock.advance(4);
        assert!(h.run(Input::new(CommandKind::CreateSession)).failed());

        h.clock.advance(5);
        h.create();
        h.clock.advance(5);
        h.create();
        assert_eq!(h.handler.sessions().len(), 3);
    }

    #[test]
    fn capability_is_applied_to_new_session() {
        let mut h = Harness::new(ServerConfig::default());
        let caps = Capability::DELETE_PRECEDING_TEXT | Capability::SURROUNDING_TEXT;
        let command = h.run(Input::new(CommandKind::CreateSession).with_capability(caps));
        assert!(!command.failed());
        h.create();
        assert_eq!(calls(&h.calls).capabilities, vec![caps, Capability::NONE]);
    }

    #[test]
    fn allocation_failure_creates_nothing() {
        let clock_calls = Shared::default();
        let mut h = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.sessions = Box::new(ProbeFactory {
                clock: ManualClock::new(START),
                calls: clock_calls.clone(),
                fail: true,
            });
        });
        let command = h.run(Input::new(CommandKind::CreateSession));
        assert!(command.failed());
        assert!(h.handler.sessions().is_empty());
        assert_ne!(h.handler.state().last_session_empty_at, 0);
    }

    #[test]
    fn unused_session_expires_after_creation_timeout() {
        let mut h = Harness::new(ServerConfig::default());
        let id = h.create();

        h.clock.set(START + 299);
        assert!(!h.cleanup().failed());
        assert_eq!(h.live(), vec![id]);

        h.clock.set(START + 301);
        assert!(!h.cleanup().failed());
        assert!(h.live().is_empty());
        assert_eq!(h.handler.state().last_session_empty_at, START + 301);
    }

    #[test]
    fn used_session_expires_after_idle_timeout() {
        let mut h = Harness::new(ServerConfig::default());
        let idle = h.create();
        let busy = h.create();
        assert!(!h.send_key(idle).failed());

        h.clock.advance(3000);
        assert!(!h.send_key(busy).failed());

        h.clock.set(START + 3599);
        h.cleanup();
        assert_eq!(h.live(), vec![idle, busy]);

        h.clock.set(START + 3600);
        h.cleanup();
        assert_eq!(h.live(), vec![busy]);
    }

    #[test]
    fn suspend_gap_extends_timeouts() {
        let mut h = Harness::new(ServerConfig::default());
        h.handler
            .track_watchdog(Arc::new(AtomicBool::new(true)));
        let id = h.create();
        assert!(!h.send_key(id).failed());

        h.clock.advance(100);
        h.cleanup();

        // The host slept: 4000s pass between two ticks of a 180s watchdog.
        h.clock.advance(4000);
        h.cleanup();
        assert_eq!(h.live(), vec![id], "idle time is explained by the suspend");

        // Ticks resume at the normal interval; the gap no longer applies.
        h.clock.advance(180);
        h.cleanup();
        assert!(h.live().is_empty());
    }

    #[test]
    fn suspend_gap_ignored_without_watchdog() {
        let mut h = Harness::new(ServerConfig::default());
        let id = h.create();
        assert!(!h.send_key(id).failed());

        h.clock.advance(100);
        h.cleanup();
        h.clock.advance(4000);
        h.cleanup();
        assert!(h.live().is_empty());
    }

    #[test]
    fn deleting_unknown_session_changes_nothing() {
        let mut h = Harness::new(ServerConfig::default());
        let a = h.create();
        let b = h.create();
        let syncs = calls(&h.calls).syncs;

        let command = h.delete(SessionId(0xdead_beef));
        assert!(command.failed());
        assert_eq!(command.output.id, SessionId::INVALID);
        assert_eq!(h.live(), vec![a, b]);
        assert_eq!(calls(&h.calls).syncs, syncs);
        assert_eq!(h.handler.state().last_session_empty_at, 0);
    }

    #[test]
    fn failures_are_normalized_and_not_observed() {
        let mut h = Harness::new(ServerConfig::default());
        let command = h.send_key(SessionId(42));
        assert_eq!(command.output.id, SessionId::INVALID);
        assert_eq!(command.output.error_code, Some(ErrorCode::SessionFailure));
        assert!(command.output.elapsed_time_us >= 0);
        assert!(command.output.result.is_none());

        let unknown = h.run(Input::new(CommandKind::Unknown).with_id(SessionId(1)));
        assert!(unknown.failed());
        assert_eq!(unknown.output.id, SessionId::INVALID);

        assert!(calls(&h.calls).processed.is_empty());
    }

    #[test]
    fn session_commands_reach_the_session() {
        let mut h = Harness::new(ServerConfig::default());
        let id = h.create();

        let key = h.send_key(id);
        assert_eq!(key.output.id, id);
        assert_eq!(key.output.error_code, None);
        assert_eq!(key.output.result, Some(json!({"consumed": true})));

        let test = h.run(Input::new(CommandKind::TestSendKey).with_id(id));
        assert_eq!(test.output.result, Some(json!({"consumed": false})));

        let admin = h.run(Input::new(CommandKind::SendCommand).with_id(id));
        assert_eq!(admin.output.result, Some(json!({"admin": true})));

        assert_eq!(
            calls(&h.calls).processed,
            vec![
                CommandKind::CreateSession,
                CommandKind::SendKey,
                CommandKind::TestSendKey,
                CommandKind::SendCommand,
            ]
        );
    }

    #[test]
    fn user_data_commands_call_the_converter() {
        let mut h = Harness::new(ServerConfig::default());
        for kind in [
            CommandKind::SyncData,
            CommandKind::ClearUserHistory,
            CommandKind::ClearUserPrediction,
            CommandKind::ClearUnusedUserPrediction,
            CommandKind::NoOperation,
        ] {
            let command = h.run(Input::new(kind).with_id(SessionId(9)));
            assert!(!command.failed());
            assert_eq!(command.output.id, SessionId(9));
        }
        let calls = calls(&h.calls);
        assert_eq!(calls.syncs, 1);
        assert_eq!(calls.clear_history, 1);
        assert_eq!(calls.clear_prediction, 1);
        assert_eq!(calls.clear_unused_prediction, 1);
    }

    #[test]
    fn set_config_stores_and_reloads() {
        let mut h = Harness::new(ServerConfig::default());
        let reloaded = Arc::new(AtomicBool::new(false));
        let flag = reloaded.clone();
        h.handler
            .register_reloader(Box::new(move || flag.store(true, Ordering::SeqCst)));
        h.create();

        let config = ConfigBlob(json!({"space_character_form": "HALF_WIDTH"}));
        let set = h.run(Input::new(CommandKind::SetConfig).with_config(config.clone()));
        assert!(!set.failed());
        assert_eq!(set.output.config, Some(config.clone()));
        assert!(reloaded.load(Ordering::SeqCst));
        {
            let calls = calls(&h.calls);
            assert_eq!(calls.keymap_reloads, 1);
            assert_eq!(calls.session_reloads, 1);
            assert_eq!(calls.observer_reloads, 1);
        }

        let get = h.run(Input::new(CommandKind::GetConfig));
        assert_eq!(get.output.config, Some(config));
    }

    #[test]
    fn set_config_without_config_fails() {
        let mut h = Harness::new(ServerConfig::default());
        let command = h.run(Input::new(CommandKind::SetConfig));
        assert!(command.failed());
        assert_eq!(calls(&h.calls).keymap_reloads, 0);
    }

    #[test]
    fn config_store_failures_are_session_failures() {
        let mut h = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.config_store = Box::new(FailingConfigStore);
        });
        assert!(h.run(Input::new(CommandKind::GetConfig)).failed());
        let set = h.run(Input::new(CommandKind::SetConfig).with_config(ConfigBlob(json!({}))));
        assert!(set.failed());
        assert!(set.output.config.is_none());
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut h = Harness::new(ServerConfig::default());
        let id = h.create();

        let mut shutdown = Command::new(Input::new(CommandKind::Shutdown));
        assert!(!h.handler.eval_command(&mut shutdown));
        assert!(!shutdown.failed());
        assert!(!h.handler.is_available());
        assert_eq!(calls(&h.calls).session_reloads, 1);

        for kind in [
            CommandKind::CreateSession,
            CommandKind::DeleteSession,
            CommandKind::NoOperation,
            CommandKind::Cleanup,
        ] {
            let mut command = Command::new(Input::new(kind).with_id(id));
            assert!(!h.handler.eval_command(&mut command));
            assert_eq!(command.output, Output::default());
        }
        assert_eq!(h.live(), vec![id]);
    }

    #[test]
    fn empty_server_shuts_down_after_idle_timeout() {
        let mut h = Harness::new(ServerConfig {
            timeout: Some(60),
            ..ServerConfig::default()
        });

        h.clock.advance(59);
        let mut command = Command::cleanup();
        assert!(h.handler.eval_command(&mut command));

        h.clock.advance(1);
        let mut command = Command::cleanup();
        assert!(!h.handler.eval_command(&mut command));
        assert!(!command.failed());
    }

    #[test]
    fn live_sessions_block_idle_shutdown() {
        let mut h = Harness::new(ServerConfig {
            timeout: Some(60),
            ..ServerConfig::default()
        });
        let id = h.create();
        assert!(!h.send_key(id).failed());
        h.clock.advance(120);
        h.cleanup();
        assert!(h.handler.is_available());
    }

    #[test]
    fn initialization_failures_leave_server_unavailable() {
        let no_table = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.input_table = Box::new(BrokenInputTable);
        });
        assert!(!no_table.handler.is_available());

        let mut no_converter = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.converter = None;
        });
        assert!(!no_converter.handler.is_available());
        let mut command = Command::new(Input::new(CommandKind::CreateSession));
        assert!(!no_converter.handler.eval_command(&mut command));
        assert!(no_converter.handler.sessions().is_empty());
        assert_eq!(no_converter.calls.lock().expect("lock").capabilities.len(), 0);
    }

    #[test]
    fn stats_reflect_state() {
        let mut h = Harness::new(small(4));
        h.create();
        h.create();
        let stats = h.handler.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.capacity, 4);
        assert!(stats.available);
        assert_eq!(stats.last_session_empty_at, 0);
        assert_eq!(stats.degraded_id_draws, 0);
    }

    #[test]
    fn dropping_handler_drops_sessions() {
        let mut h = Harness::new(ServerConfig::default());
        h.create();
        h.create();
        let Harness { handler, calls: shared, .. } = h;
        drop(handler);
        assert_eq!(calls(&shared).sessions_dropped, 2);
    }

    #[test]
    fn restricted_profile_limits_capacity() {
        let mut h = Harness::new(ServerConfig {
            restricted: true,
            ..ServerConfig::default()
        });
        for _ in 0..12 {
            h.create();
        }
        assert_eq!(h.handler.sessions().len(), 8);
        assert_eq!(h.handler.config().watchdog_interval, 15);
    }

    #[test]
    fn keymap_reload_command() {
        let mut h = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.keymap = Box::new(StaticKeymap);
        });
        let command = h.run(Input::new(CommandKind::Reload).with_id(SessionId(3)));
        assert!(!command.failed());
        assert_eq!(command.output.id, SessionId(3));
        assert_eq!(calls(&h.calls).observer_reloads, 1);
    }

    #[test]
    fn elapsed_time_is_reported_on_success_and_failure() {
        let delay = Duration::from_millis(2);

        let mut h = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.sessions = Box::new(SlowFactory { delay, fail: false });
        });
        let id = h.create();
        let key = h.send_key(id);
        assert!(!key.failed());
        assert!(key.output.elapsed_time_us >= 1000, "{}", key.output.elapsed_time_us);

        let mut failing = Harness::with_engine(ServerConfig::default(), |engine| {
            engine.sessions = Box::new(SlowFactory { delay, fail: true });
        });
        let create = failing.run(Input::new(CommandKind::CreateSession));
        assert!(create.failed());
        assert!(create.output.elapsed_time_us >= 1000, "{}", create.output.elapsed_time_us);
    }

    #[test]
    fn weak_id_draws_are_counted_in_stats() {
        let mut h = Harness::new(ServerConfig::default());
        h.handler = h
            .handler
            .with_id_allocator(SessionIdAllocator::with_source(Box::new(DeadEntropy)));

        let a = h.create();
        let b = h.create();
        assert!(a.is_valid());
        assert_ne!(a, b);
        assert!(h.handler.stats().degraded_id_draws >= 2);
    }
}
