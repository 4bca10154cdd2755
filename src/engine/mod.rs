//! Interfaces to the collaborators the session handler drives.
//!
//! The conversion engine, the config store, the keymap and the input table
//! live outside this crate; the handler only needs the narrow surface below.
//! [`local`] provides in-process implementations used by the binary and tests.

pub mod local;

use crate::command::ConfigBlob;
use crate::error::SessionError;
use crate::session::Session;

/// User-data side of the conversion engine.
pub trait Converter: Send {
    /// Flush user dictionaries and history to persistent storage.
    fn sync(&mut self);
    fn clear_user_history(&mut self);
    fn clear_user_prediction(&mut self);
    fn clear_unused_user_prediction(&mut self);
}

/// Persisted user configuration.
pub trait ConfigStore: Send {
    fn get_config(&self) -> Result<ConfigBlob, SessionError>;
    fn set_config(&mut self, config: &ConfigBlob) -> Result<(), SessionError>;
}

/// Romaji/kana composition table.
pub trait InputTable: Send {
    /// Load the table. Returns false if the server cannot run without it.
    fn initialize(&mut self) -> bool;
    fn reload(&mut self);
}

/// Key binding definitions.
pub trait Keymap: Send {
    fn reload(&mut self);
}

/// Builds a new session at creation time `now`. `None` means allocation failed.
pub trait SessionFactory: Send {
    fn new_session(&mut self, now: u64) -> Option<Box<dyn Session>>;
}

/// Everything the handler needs from the outside world.
pub struct Engine {
    /// `None` if the conversion engine failed to load.
    pub converter: Option<Box<dyn Converter>>,
    pub config_store: Box<dyn ConfigStore>,
    pub input_table: Box<dyn InputTable>,
    pub keymap: Box<dyn Keymap>,
    pub sessions: Box<dyn SessionFactory>,
}
