use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(6);

/// Receiver-owned typing state.
///
/// The server relays typing events without timing them out, so an indicator
/// whose `isTyping=false` never arrives would stick forever. Here each
/// indicator expires `ttl` after its last refresh.
#[derive(Debug, Clone)]
pub struct TypingIndicators {
    ttl: Duration,
    // (conversation_id, user_id) -> (display name, last refresh)
    entries: HashMap<(Uuid, Uuid), (String, Instant)>,
}

impl Default for TypingIndicators {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingIndicators {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn apply(
        &mut self,
        conversation_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        is_typing: bool,
        now: Instant,
    ) {
        let key = (conversation_id, user_id);
        if is_typing {
            self.entries.insert(key, (user_name.to_string(), now));
        } else {
            self.entries.remove(&key);
        }
    }

    /// A message from a user ends their typing indicator
    pub fn clear_user(&mut self, conversation_id: Uuid, user_id: Uuid) {
        self.entries.remove(&(conversation_id, user_id));
    }

    /// Names currently typing in a conversation, sorted
    pub fn typing_in(&self, conversation_id: Uuid, now: Instant) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|((conv, _), (_, at))| *conv == conversation_id && !self.expired(*at, now))
            .map(|(_, (name, _))| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop expired indicators
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < ttl);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_expires_without_refresh() {
        let mut typing = TypingIndicators::new(Duration::from_secs(6));
        let conv = Uuid::new_v4();
        let start = Instant::now();
        typing.apply(conv, Uuid::new_v4(), "Ana", true, start);

        assert_eq!(typing.typing_in(conv, start + Duration::from_secs(5)), vec!["Ana"]);
        assert!(typing.typing_in(conv, start + Duration::from_secs(6)).is_empty());

        typing.prune(start + Duration::from_secs(7));
        assert!(typing.is_empty());
    }

    #[test]
    fn test_refresh_extends_indicator() {
        let mut typing = TypingIndicators::new(Duration::from_secs(6));
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();
        let start = Instant::now();
        typing.apply(conv, user, "Ana", true, start);
        typing.apply(conv, user, "Ana", true, start + Duration::from_secs(4));

        assert_eq!(typing.typing_in(conv, start + Duration::from_secs(8)), vec!["Ana"]);
    }

    #[test]
    fn test_explicit_stop_and_other_conversations() {
        let mut typing = TypingIndicators::default();
        let conv = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Instant::now();
        typing.apply(conv, user, "Ana", true, now);
        typing.apply(other, Uuid::new_v4(), "Bruno", true, now);

        assert_eq!(typing.typing_in(conv, now), vec!["Ana"]);
        typing.apply(conv, user, "Ana", false, now);
        assert!(typing.typing_in(conv, now).is_empty());
        assert_eq!(typing.typing_in(other, now), vec!["Bruno"]);
    }
}
