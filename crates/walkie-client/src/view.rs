//! What the user sees: the message list, who is online, who is typing.

use std::collections::BTreeSet;

use walkie_common::{ChatMessage, PresenceStatus, ServerEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    pub message: ChatMessage,
    /// Composed locally and not yet confirmed by the server.
    pub pending: bool,
}

#[derive(Debug, Default)]
pub struct ChatView {
    entries: Vec<ViewEntry>,
    online_count: usize,
    roster: Vec<String>,
    typing: BTreeSet<String>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server event. Returns the message if one was added or
    /// confirmed.
    pub fn apply(&mut self, event: &ServerEvent) -> Option<&ChatMessage> {
        match event {
            ServerEvent::MessageHistory(history) => {
                self.replace_history(history);
                None
            }
            ServerEvent::ReceiveMessage(msg) => Some(self.confirm(msg.clone())),
            ServerEvent::UserTyping(payload) => {
                if payload.is_typing {
                    self.typing.insert(payload.user.clone());
                } else {
                    self.typing.remove(&payload.user);
                }
                None
            }
            ServerEvent::UserStatus(status) => {
                if status.status == PresenceStatus::Offline {
                    self.typing.remove(&status.user);
                }
                self.online_count = status.online_count;
                None
            }
            ServerEvent::OnlineCount(count) => {
                self.online_count = *count;
                None
            }
            ServerEvent::UpdateUsers(names) => {
                self.roster = names.clone();
                None
            }
            ServerEvent::VoiceTransmissionStarted(_)
            | ServerEvent::VoiceChannelBusy(_)
            | ServerEvent::VoiceTransmissionEnded(_) => None,
        }
    }

    /// Show a locally composed message until the server echoes it.
    pub fn add_pending(&mut self, message: ChatMessage) {
        if self.position(&message.id).is_some() {
            return;
        }
        self.entries.push(ViewEntry {
            message,
            pending: true,
        });
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.pending).count()
    }

    pub fn online_count(&self) -> usize {
        self.online_count
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn typing(&self) -> impl Iterator<Item = &str> {
        self.typing.iter().map(String::as_str)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == id)
    }

    fn replace_history(&mut self, history: &[ChatMessage]) {
        let pending: Vec<ViewEntry> = self
            .entries
            .drain(..)
            .filter(|e| e.pending && !history.iter().any(|m| m.id == e.message.id))
            .collect();

        self.entries = history
            .iter()
            .cloned()
            .map(|message| ViewEntry {
                message,
                pending: false,
            })
            .collect();
        self.entries.extend(pending);
    }

    fn confirm(&mut self, message: ChatMessage) -> &ChatMessage {
        let idx = match self.position(&message.id) {
            Some(idx) => {
                self.entries[idx] = ViewEntry {
                    message,
                    pending: false,
                };
                idx
            }
            None => {
                self.entries.push(ViewEntry {
                    message,
                    pending: false,
                });
                self.entries.len() - 1
            }
        };
        &self.entries[idx].message
    }
}
