//! Capacity-bounded session store ordered by creation time.
//!
//! Entries live in a slot vector; an id → slot index gives O(1) lookup and a
//! creation-ordered queue of ids gives O(1) access to the oldest entry.
//! Lookups never reorder entries: eviction is strictly oldest-created first.

use super::types::{Session, SessionEntry, SessionId};
use crate::error::SessionError;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

pub struct SessionTable {
    capacity: usize,
    slots: Vec<Option<SessionEntry>>,
    free_slots: Vec<usize>,
    index: HashMap<SessionId, usize>,
    /// Live ids, oldest first.
    order: VecDeque<SessionId>,
}

impl SessionTable {
    /// Create an empty table holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            index: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert a session as the newest entry.
    ///
    /// Fails if `id` is 0, already present, or the table is full; the caller
    /// is expected to evict before inserting into a full table.
    pub fn insert(
        &mut self,
        id: SessionId,
        session: Box<dyn Session>,
        created_at: u64,
    ) -> Result<&mut SessionEntry, SessionError> {
        if !id.is_valid() {
            return Err(SessionError::InvalidId);
        }
        if self.index.contains_key(&id) {
            return Err(SessionError::DuplicateId(id));
        }
        if self.is_full() {
            return Err(SessionError::TableFull(self.len()));
        }

        let entry = SessionEntry {
            id,
            session,
            created_at,
        };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        self.order.push_back(id);

        self.slots[slot]
            .as_mut()
            .ok_or(SessionError::CapacityInvariant)
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionEntry> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionEntry> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    /// Remove an entry and hand it back; dropping it destroys the session.
    pub fn erase(&mut self, id: SessionId) -> Option<SessionEntry> {
        let Some(slot) = self.index.remove(&id) else {
            debug!(session_id = %id, "Erase of unknown session id");
            return None;
        };
        if let Some(pos) = self.order.iter().position(|live| *live == id) {
            self.order.remove(pos);
        }
        self.free_slots.push(slot);
        self.slots[slot].take()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.index.contains_key(&id)
    }

    /// The oldest entry by creation.
    pub fn oldest(&self) -> Option<&SessionEntry> {
        self.order.front().and_then(|id| self.get(*id))
    }

    pub fn oldest_id(&self) -> Option<SessionId> {
        self.order.front().copied()
    }

    /// Live ids, oldest first.
    pub fn ids(&self) -> Vec<SessionId> {
        self.order.iter().copied().collect()
    }

    /// Live entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SessionEntry> + '_ {
        self.order.iter().filter_map(move |id| self.get(*id))
    }

    /// Live entries in slot order.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut SessionEntry> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}
