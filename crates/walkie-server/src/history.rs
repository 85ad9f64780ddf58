//! Bounded chat log.
//!
//! Stores the most recent messages in arrival order with FIFO eviction so
//! memory stays predictable. Message ids are unique across the log: appending
//! an id that is already present changes nothing.

use std::collections::{HashSet, VecDeque};

use walkie_common::ChatMessage;

pub struct MessageLog {
    limit: usize,
    entries: VecDeque<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: VecDeque::with_capacity(limit),
            ids: HashSet::with_capacity(limit),
        }
    }

    /// Append at the tail, evicting the oldest entry once full.
    /// Returns `false` if the id was already logged.
    pub fn append(&mut self, msg: ChatMessage) -> bool {
        if self.ids.contains(&msg.id) {
            return false;
        }
        if self.entries.len() >= self.limit {
            if let Some(evicted) = self.entries.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }
        self.ids.insert(msg.id.clone());
        self.entries.push_back(msg);
        true
    }

    /// All logged messages, oldest first.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        if !self.ids.contains(id) {
            return None;
        }
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
