//! Fan-out of processed commands to registered observers (usage stats,
//! command logging, ...).

use crate::command::Command;

pub trait SessionObserver: Send {
    /// Called after every successfully dispatched command.
    fn on_command_processed(&mut self, command: &Command);

    /// Called whenever the server reloads its configuration, and once more
    /// right before shutdown so observers can flush.
    fn on_reload(&mut self) {}
}

#[derive(Default)]
pub struct SessionObserverHandler {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl SessionObserverHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn on_command_processed(&mut self, command: &Command) {
        for observer in &mut self.observers {
            observer.on_command_processed(command);
        }
    }

    pub fn reload(&mut self) {
        for observer in &mut self.observers {
            observer.on_reload();
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
