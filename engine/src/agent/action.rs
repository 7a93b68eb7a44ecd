//! Action Parser
//!
//! Turns one block of model output into an [`Action`]. The model is asked to
//! reply with labeled fields, each starting on its own line:
//!
//! ```text
//! ACTION: query-places
//! QUERY: KRAKOW
//! REASONING: Barbara was last seen there
//! IS_FINAL: false
//! ```
//!
//! Fields may appear in any order and are located independently. A value runs
//! until the next recognized label or the end of the text, so multi-line SQL
//! survives intact. Prose before the first label is ignored. Aliases
//! (`TARGET`, `REASON`, `FINAL`) and markdown-bold labels (`**QUERY:**`) are
//! accepted because models produce them unprompted.
//!
//! Parsing is pure: it never retries and never calls the model.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Which tool an action addresses, or that it is the final answer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActionKind {
    QueryPeople,
    QueryPlaces,
    QueryDb,
    QueryGps,
    FinalAnswer,

    /// A selector the model made up; kept verbatim for the error report
    Unrecognized(String),
}

impl ActionKind {
    /// Parse a selector value. Case, surrounding whitespace, `_` and spaces
    /// are ignored; short forms like `people` or `db` are accepted.
    pub fn parse(value: &str) -> Self {
        let normalized = value
            .trim()
            .trim_matches(|c: char| c == '`' || c == '*' || c == '"' || c == '\'')
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");

        match normalized.as_str() {
            "query-people" | "people" => Self::QueryPeople,
            "query-places" | "places" => Self::QueryPlaces,
            "query-db" | "query-database" | "db" | "database" | "sql" => Self::QueryDb,
            "query-gps" | "gps" => Self::QueryGps,
            "final-answer" | "final" | "answer" | "done" => Self::FinalAnswer,
            _ => Self::Unrecognized(value.trim().to_string()),
        }
    }

    /// Canonical selector string
    pub fn as_str(&self) -> &str {
        match self {
            Self::QueryPeople => "query-people",
            Self::QueryPlaces => "query-places",
            Self::QueryDb => "query-db",
            Self::QueryGps => "query-gps",
            Self::FinalAnswer => "final-answer",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// True for the four tool-backed kinds
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::QueryPeople | Self::QueryPlaces | Self::QueryDb | Self::QueryGps
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// One decision taken by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,

    /// Tool payload, or the answer when `is_final`
    pub target: String,

    /// Advisory only; logged, never interpreted
    pub reasoning: Option<String>,

    pub is_final: bool,
}

/// The model output could not be turned into an action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedAction {
    #[error("no recognized labels in model output")]
    NoLabels,

    #[error("model output is missing the {0} field")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Action,
    Query,
    Reasoning,
    IsFinal,
}

impl Label {
    fn from_match(raw: &str) -> Option<Self> {
        match raw {
            "ACTION" => Some(Self::Action),
            "QUERY" | "TARGET" => Some(Self::Query),
            "REASONING" | "REASON" => Some(Self::Reasoning),
            "IS_FINAL" | "FINAL" => Some(Self::IsFinal),
            _ => None,
        }
    }
}

static LABEL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn label_pattern() -> &'static Regex {
    LABEL_PATTERN.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?:[-*>][ \t]+)?\**(ACTION|QUERY|TARGET|REASONING|REASON|IS_FINAL|FINAL)\**[ \t]*:\**[ \t]*",
        )
        .expect("Invalid label pattern")
    })
}

/// Labeled fields found in the text; the first occurrence of each label wins
#[derive(Debug, Default)]
struct Fields {
    action: Option<String>,
    query: Option<String>,
    reasoning: Option<String>,
    is_final: Option<String>,
    found_any: bool,
}

impl Fields {
    fn slot(&mut self, label: Label) -> &mut Option<String> {
        match label {
            Label::Action => &mut self.action,
            Label::Query => &mut self.query,
            Label::Reasoning => &mut self.reasoning,
            Label::IsFinal => &mut self.is_final,
        }
    }
}

fn extract_fields(text: &str) -> Fields {
    let mut fields = Fields::default();

    let matches: Vec<_> = label_pattern().captures_iter(text).collect();
    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(label) = Label::from_match(name.as_str()) else {
            continue;
        };
        fields.found_any = true;

        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let value = text[whole.end()..end].trim();

        let slot = fields.slot(label);
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }

    fields
}

/// Strip a surrounding markdown code fence (with optional language tag)
fn unwrap_code_fence(value: &str) -> &str {
    let trimmed = value.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any
    match body.split_once('\n') {
        Some((first, remainder)) if !first.trim().contains(' ') => remainder.trim(),
        _ => body.trim(),
    }
}

fn parse_flag(value: &str) -> bool {
    let word = value
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    matches!(word.as_str(), "true" | "yes")
}

/// Parse one block of model output into an action.
///
/// # Errors
///
/// - [`MalformedAction::NoLabels`] when nothing in the text looks like a field
/// - [`MalformedAction::MissingField`] when a non-final action lacks `ACTION`
///   or `QUERY`, or a final action carries no answer
pub fn parse_action(text: &str) -> Result<Action, MalformedAction> {
    let fields = extract_fields(text);
    if !fields.found_any {
        return Err(MalformedAction::NoLabels);
    }

    let kind = fields.action.as_deref().map(ActionKind::parse);
    let is_final = fields.is_final.as_deref().map(parse_flag).unwrap_or(false)
        || kind == Some(ActionKind::FinalAnswer);

    let target = fields
        .query
        .as_deref()
        .map(unwrap_code_fence)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    if is_final {
        let target = target.ok_or(MalformedAction::MissingField("QUERY"))?;
        return Ok(Action {
            kind: ActionKind::FinalAnswer,
            target,
            reasoning: fields.reasoning,
            is_final: true,
        });
    }

    let kind = kind.ok_or(MalformedAction::MissingField("ACTION"))?;
    let target = target.ok_or(MalformedAction::MissingField("QUERY"))?;

    Ok(Action {
        kind,
        target,
        reasoning: fields.reasoning,
        is_final: false,
    })
}
