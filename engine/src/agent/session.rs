//! Session & Conversation State
//!
//! One session per run. It owns the ordered transcript, the query budget and
//! the set of queries already issued. Turns are only ever appended; nothing is
//! reordered or removed. A session is never shared between runs.

use super::guard::{Budget, QueryKey};
use crate::llm::{Message, MessageRole};
use std::collections::HashSet;
use uuid::Uuid;

/// Average characters per token (rough estimate: 1 token ≈ 4 characters)
const CHARS_PER_TOKEN: usize = 4;

/// Per-message overhead for role and structure
const MESSAGE_OVERHEAD_TOKENS: usize = 10;

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    messages: Vec<Message>,
    budget: Budget,
    issued: HashSet<QueryKey>,
}

impl Session {
    /// Start a session seeded with the system instruction and the initial observation
    pub fn new(
        system_instruction: impl Into<String>,
        initial_observation: impl Into<String>,
        budget: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: vec![
                Message::system(system_instruction),
                Message::user(initial_observation),
            ],
            budget: Budget::new(budget),
            issued: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Append a turn to the end of the transcript
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Full ordered transcript
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Transcript trimmed to an estimated token limit
    ///
    /// Keeps the system instruction plus the most recent turns that fit. The
    /// latest turn is always included, even if it alone exceeds the limit.
    /// The first turn after the system instruction is always a user turn:
    /// leading model turns are dropped, and if only a model turn is left the
    /// initial observation is put back in front of it.
    pub fn snapshot_within(&self, token_limit: usize) -> Vec<Message> {
        let (system, rest) = match self.messages.split_first() {
            Some((first, rest)) if first.role == MessageRole::System => (Some(first), rest),
            _ => (None, self.messages.as_slice()),
        };

        let mut used = system.map(Self::estimate_tokens).unwrap_or(0);
        let mut keep = 0;
        for message in rest.iter().rev() {
            let tokens = Self::estimate_tokens(message);
            if keep > 0 && used + tokens > token_limit {
                break;
            }
            used += tokens;
            keep += 1;
        }

        let mut start = rest.len() - keep;
        while start + 1 < rest.len() && rest[start].role != MessageRole::User {
            start += 1;
        }
        let window = &rest[start..];

        let lead = match (window.first(), rest.first()) {
            (Some(first), Some(initial))
                if start > 0
                    && first.role != MessageRole::User
                    && initial.role == MessageRole::User =>
            {
                Some(initial)
            }
            _ => None,
        };

        system
            .into_iter()
            .chain(lead)
            .chain(window)
            .cloned()
            .collect()
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub(crate) fn budget_mut(&mut self) -> &mut Budget {
        &mut self.budget
    }

    pub fn has_issued(&self, key: &QueryKey) -> bool {
        self.issued.contains(key)
    }

    /// Remember a dispatched query. Returns false if it was already known.
    pub fn record_issued(&mut self, key: QueryKey) -> bool {
        self.issued.insert(key)
    }

    /// Consume the session, keeping only its transcript
    pub fn into_transcript(self) -> Vec<Message> {
        self.messages
    }

    /// Rough token estimate for one message
    pub fn estimate_tokens(message: &Message) -> usize {
        message.content.len().div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ActionKind;

    #[test]
    fn test_new_session_is_seeded() {
        let session = Session::new("You are a detective", "Find Barbara", 3);
        let turns = session.snapshot();

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, MessageRole::System);
        assert_eq!(turns[1].role, MessageRole::User);
        assert_eq!(session.budget().remaining(), 3);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut session = Session::new("sys", "obs", 3);
        session.append(Message::assistant("ACTION: query-places\nQUERY: KRAKOW"));
        session.append(Message::user("BARBARA ADAM"));

        let contents: Vec<&str> = session
            .snapshot()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec!["sys", "obs", "ACTION: query-places\nQUERY: KRAKOW", "BARBARA ADAM"]
        );
    }

    #[test]
    fn test_snapshot_within_keeps_system_and_recent_turns() {
        let mut session = Session::new("system instruction", "initial observation", 10);
        for i in 0..20 {
            session.append(Message::assistant(format!("ACTION: query-people\nQUERY: P{}", i)));
            session.append(Message::user("x".repeat(200)));
        }

        let trimmed = session.snapshot_within(300);
        assert_eq!(trimmed[0].content, "system instruction");
        assert!(trimmed.len() < session.snapshot().len());

        let last = session.snapshot().last().unwrap();
        assert_eq!(trimmed.last().unwrap(), last);

        let total: usize = trimmed.iter().map(Session::estimate_tokens).sum();
        assert!(total <= 300);
    }

    #[test]
    fn test_snapshot_within_starts_with_user_turn() {
        let mut session = Session::new("sys", "Barbara was seen in KRAKOW", 10);
        for i in 0..4 {
            session.append(Message::assistant(format!(
                "ACTION: query-places\nQUERY: CITY{}\nREASONING: {}",
                i,
                "r".repeat(100)
            )));
            session.append(Message::user(format!("people in CITY{}: {}", i, "n".repeat(100))));
        }

        let trimmed = session.snapshot_within(200);

        assert_eq!(trimmed[0].role, MessageRole::System);
        assert_eq!(trimmed[1].role, MessageRole::User);
        assert_eq!(trimmed.last(), session.snapshot().last());
        assert!(trimmed.len() < session.snapshot().len());
    }

    #[test]
    fn test_snapshot_within_restores_initial_observation_before_lone_action() {
        let mut session = Session::new("sys", "obs", 3);
        session.append(Message::user("z".repeat(4_000)));
        session.append(Message::assistant("ACTION: query-people\nQUERY: BARBARA"));

        let trimmed = session.snapshot_within(60);

        let roles: Vec<MessageRole> = trimmed.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(trimmed[1].content, "obs");
    }

    #[test]
    fn test_snapshot_within_always_keeps_latest_turn() {
        let mut session = Session::new("sys", "obs", 1);
        session.append(Message::user("y".repeat(10_000)));

        let trimmed = session.snapshot_within(50);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[1].content.len(), 10_000);
    }

    #[test]
    fn test_snapshot_within_large_limit_is_full_transcript() {
        let mut session = Session::new("sys", "obs", 1);
        session.append(Message::assistant("QUERY: x"));
        assert_eq!(session.snapshot_within(100_000), session.snapshot().to_vec());
    }

    #[test]
    fn test_record_issued() {
        let mut session = Session::new("sys", "obs", 1);
        let key = QueryKey::new(&ActionKind::QueryDb, "show tables");
        assert!(session.record_issued(key.clone()));
        assert!(!session.record_issued(key.clone()));
        assert!(session.has_issued(&key));
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        assert_ne!(Session::new("a", "b", 1).id(), Session::new("a", "b", 1).id());
    }
}
