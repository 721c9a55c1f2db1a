//! Typing roster
//!
//! Consumer-side snapshot of who is typing in the channel on view.
//! Updated from dispatched `typing` and `user_left` events. Not eventually
//! consistent: a lost "typing stopped" leaves the entry in place until the
//! peer leaves or types again.

use std::collections::BTreeMap;

use crate::message::{PresenceEvent, TypingEvent};

/// userId → username for every peer currently typing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypingRoster {
    typing: BTreeMap<String, String>,
}

impl TypingRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `typing` frame
    ///
    /// Returns true if the roster changed.
    pub fn apply(&mut self, event: &TypingEvent) -> bool {
        if event.is_typing {
            self.typing
                .insert(event.user_id.clone(), event.username.clone())
                .as_deref()
                != Some(event.username.as_str())
        } else {
            self.typing.remove(&event.user_id).is_some()
        }
    }

    /// Drop a peer that left the channel
    pub fn user_left(&mut self, event: &PresenceEvent) -> bool {
        self.typing.remove(&event.user_id).is_some()
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing.contains_key(user_id)
    }

    /// Usernames currently typing, ordered by user id
    pub fn usernames(&self) -> Vec<&str> {
        self.typing.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.typing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typing.is_empty()
    }

    pub fn clear(&mut self) {
        self.typing.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: &str, username: &str, is_typing: bool) -> TypingEvent {
        TypingEvent {
            user_id: user_id.to_string(),
            username: username.to_string(),
            is_typing,
        }
    }

    #[test]
    fn test_start_and_stop() {
        let mut roster = TypingRoster::new();

        assert!(roster.apply(&typing("u1", "Alice", true)));
        assert!(roster.is_typing("u1"));
        assert_eq!(roster.usernames(), vec!["Alice"]);

        // Repeated start is not a change
        assert!(!roster.apply(&typing("u1", "Alice", true)));

        assert!(roster.apply(&typing("u1", "Alice", false)));
        assert!(roster.is_empty());

        // Stop for someone not typing
        assert!(!roster.apply(&typing("u1", "Alice", false)));
    }

    #[test]
    fn test_leave_removes_typing_peer() {
        let mut roster = TypingRoster::new();
        roster.apply(&typing("u1", "Alice", true));
        roster.apply(&typing("u2", "Bob", true));

        let left = PresenceEvent {
            user_id: "u1".to_string(),
            username: "Alice".to_string(),
        };
        assert!(roster.user_left(&left));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.usernames(), vec!["Bob"]);
    }
}
