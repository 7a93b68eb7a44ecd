//! Budget & Loop Guard
//!
//! Two checks run on every iteration, in this order:
//! 1. budget: no units left means the run ends without a solution
//! 2. repetition: the (kind, target) pair about to be dispatched was already
//!    issued in this session
//!
//! The guard only signals. What happens on a repeat is the investigation's
//! [`RepeatPolicy`], applied by the loop driver.

use super::action::ActionKind;
use super::session::Session;
use crate::tools::normalize_target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query counter for one session
///
/// Starts at the configured budget, only ever goes down, never below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    initial: u32,
    remaining: u32,
}

impl Budget {
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            remaining: initial,
        }
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn consumed(&self) -> u32 {
        self.initial - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one unit. Returns false (and changes nothing) if already exhausted.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// What to do when the model asks for a query it already issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatPolicy {
    /// Skip the dispatch and tell the model the query was already issued
    #[default]
    RefuseAndReprompt,

    /// Dispatch anyway; the repeat only shows up in the counters
    CountAndContinue,
}

impl fmt::Display for RepeatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefuseAndReprompt => write!(f, "refuse-and-reprompt"),
            Self::CountAndContinue => write!(f, "count-and-continue"),
        }
    }
}

/// Identity of an issued query: kind plus normalized target
///
/// Targets are normalized the way the lookup tools normalize them before
/// sending (trimmed, upper-cased, Polish diacritics folded), so `Kraków` and
/// `KRAKOW` count as the same query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    kind: ActionKind,
    target: String,
}

impl QueryKey {
    pub fn new(kind: &ActionKind, target: &str) -> Self {
        Self {
            kind: kind.clone(),
            target: normalize_target(target),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)
    }
}

/// Signals raised by the guard
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardSignal {
    #[error("query budget exhausted")]
    BudgetExhausted,

    #[error("query already issued: {0}")]
    RepeatedQuery(QueryKey),
}

/// Per-session guard configured with a repeat policy
#[derive(Debug, Clone, Copy)]
pub struct LoopGuard {
    policy: RepeatPolicy,
}

impl LoopGuard {
    pub fn new(policy: RepeatPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    /// Is another iteration permitted?
    pub fn check_budget(&self, session: &Session) -> Result<(), GuardSignal> {
        if session.budget().is_exhausted() {
            return Err(GuardSignal::BudgetExhausted);
        }
        Ok(())
    }

    /// Was this query already issued in the session?
    pub fn check_repeat(&self, session: &Session, key: &QueryKey) -> Result<(), GuardSignal> {
        if session.has_issued(key) {
            return Err(GuardSignal::RepeatedQuery(key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_counts_down_and_stops_at_zero() {
        let mut budget = Budget::new(2);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(budget.is_exhausted());
        assert!(!budget.consume());
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.consumed(), 2);
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        let session = Session::new("sys", "obs", 0);
        let guard = LoopGuard::new(RepeatPolicy::default());
        assert_eq!(
            guard.check_budget(&session),
            Err(GuardSignal::BudgetExhausted)
        );
    }

    #[test]
    fn test_repeat_detected_on_second_occurrence() {
        let mut session = Session::new("sys", "obs", 5);
        let guard = LoopGuard::new(RepeatPolicy::RefuseAndReprompt);
        let key = QueryKey::new(&ActionKind::QueryPlaces, "KRAKOW");

        assert!(guard.check_repeat(&session, &key).is_ok());
        session.record_issued(key.clone());

        assert_eq!(
            guard.check_repeat(&session, &QueryKey::new(&ActionKind::QueryPlaces, " krakow ")),
            Err(GuardSignal::RepeatedQuery(key))
        );
    }

    #[test]
    fn test_repeat_detected_across_diacritics() {
        let mut session = Session::new("sys", "obs", 5);
        let guard = LoopGuard::new(RepeatPolicy::RefuseAndReprompt);
        session.record_issued(QueryKey::new(&ActionKind::QueryPlaces, "Kraków"));

        assert!(matches!(
            guard.check_repeat(&session, &QueryKey::new(&ActionKind::QueryPlaces, "KRAKOW")),
            Err(GuardSignal::RepeatedQuery(_))
        ));
    }

    #[test]
    fn test_same_target_different_kind_is_not_a_repeat() {
        let mut session = Session::new("sys", "obs", 5);
        let guard = LoopGuard::new(RepeatPolicy::RefuseAndReprompt);
        session.record_issued(QueryKey::new(&ActionKind::QueryPlaces, "BARBARA"));

        assert!(guard
            .check_repeat(&session, &QueryKey::new(&ActionKind::QueryPeople, "BARBARA"))
            .is_ok());
    }

    #[test]
    fn test_policy_serialization() {
        assert_eq!(
            serde_json::to_string(&RepeatPolicy::CountAndContinue).unwrap(),
            r#""count-and-continue""#
        );
        let policy: RepeatPolicy = serde_json::from_str(r#""refuse-and-reprompt""#).unwrap();
        assert_eq!(policy, RepeatPolicy::RefuseAndReprompt);
        assert_eq!(RepeatPolicy::default().to_string(), "refuse-and-reprompt");
    }
}
