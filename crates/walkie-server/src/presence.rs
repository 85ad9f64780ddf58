//! Session → display name registry.
//!
//! Names are trusted as given and need not be unique. The roster keeps the
//! order in which sessions first joined; a re-join only renames.

use std::collections::HashMap;

use walkie_common::SessionId;

struct Member {
    name: String,
    joined_seq: u64,
}

#[derive(Default)]
pub struct PresenceRegistry {
    members: HashMap<SessionId, Member>,
    next_seq: u64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or overwrite the name for `session`.
    pub fn join(&mut self, session: &SessionId, name: &str) {
        if let Some(member) = self.members.get_mut(session) {
            member.name = name.to_string();
            return;
        }
        self.members.insert(
            session.clone(),
            Member {
                name: name.to_string(),
                joined_seq: self.next_seq,
            },
        );
        self.next_seq += 1;
    }

    /// Forget `session`. Returns its name if it had joined.
    pub fn leave(&mut self, session: &SessionId) -> Option<String> {
        self.members.remove(session).map(|m| m.name)
    }

    pub fn name_of(&self, session: &SessionId) -> Option<&str> {
        self.members.get(session).map(|m| m.name.as_str())
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Display names in first-join order.
    pub fn roster(&self) -> Vec<String> {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by_key(|m| m.joined_seq);
        members.into_iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave() {
        let mut reg = PresenceRegistry::new();
        let a = SessionId::from("a");
        reg.join(&a, "alice");
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.name_of(&a), Some("alice"));

        assert_eq!(reg.leave(&a), Some("alice".into()));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn leave_without_join_is_noop() {
        let mut reg = PresenceRegistry::new();
        assert_eq!(reg.leave(&SessionId::from("ghost")), None);
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn rejoin_overwrites_and_keeps_position() {
        let mut reg = PresenceRegistry::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        reg.join(&a, "alice");
        reg.join(&b, "bob");
        reg.join(&a, "alicia");

        assert_eq!(reg.count(), 2);
        assert_eq!(reg.roster(), vec!["alicia", "bob"]);
    }

    #[test]
    fn duplicate_names_allowed() {
        let mut reg = PresenceRegistry::new();
        reg.join(&SessionId::from("a"), "sam");
        reg.join(&SessionId::from("b"), "sam");
        assert_eq!(reg.count(), 2);
        assert_eq!(reg.roster(), vec!["sam", "sam"]);
    }

    #[test]
    fn roster_follows_join_order() {
        let mut reg = PresenceRegistry::new();
        for name in ["c", "a", "b"] {
            reg.join(&SessionId::from(name), name);
        }
        reg.leave(&SessionId::from("a"));
        assert_eq!(reg.roster(), vec!["c", "b"]);
    }
}
