//! Investigation loop
//!
//! The model-directed control loop and the pieces it is built from: the
//! per-run session, the action parser, the budget and repeat guard, and
//! terminal classification with answer submission.

pub mod action;
pub mod core;
pub mod guard;
pub mod session;
pub mod termination;

pub use action::{parse_action, Action, ActionKind, MalformedAction};
pub use self::core::{Investigation, InvestigationLoop, InvestigationResult, LoopError};
pub use guard::{Budget, GuardSignal, LoopGuard, QueryKey, RepeatPolicy};
pub use session::Session;
pub use termination::{answer_payload, LoopState, Outcome, SubmissionStatus};
