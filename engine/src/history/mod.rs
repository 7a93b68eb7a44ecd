//! Run history
//!
//! Finished runs are stored in a SQLite database under the data directory,
//! one row per run. Transcripts and errors are scrubbed before they are
//! written; the transcript and submission status are kept as JSON text.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;

use crate::agent::{InvestigationResult, LoopState, SubmissionStatus};
use crate::llm::Message;
use crate::secrets::scrub;

/// Length of a hyphenated uuid, the longest valid run id
const RUN_ID_MAX_LEN: usize = 36;

const RUN_COLUMNS: &str = "run_id, investigation, task, state, answer, error, iterations, \
     dispatches, repeats_flagged, budget_initial, budget_consumed, provider_used, submission, \
     transcript, started_at, finished_at, duration_ms";

/// Persisted summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub investigation: String,
    pub task: String,
    pub state: LoopState,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub iterations: u32,
    pub dispatches: u32,
    pub repeats_flagged: u32,
    pub budget_initial: u32,
    pub budget_consumed: u32,
    pub provider_used: Option<String>,
    pub submission: SubmissionStatus,
    pub transcript: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunRecord {
    pub fn from_result(result: &InvestigationResult, finished_at: DateTime<Utc>) -> Self {
        let started_at = finished_at - Duration::milliseconds(result.duration_ms as i64);

        Self {
            run_id: result.run_id.clone(),
            investigation: result.investigation.clone(),
            task: result.task.clone(),
            state: result.state(),
            answer: result.outcome.answer().map(str::to_string),
            error: result.outcome.error().map(|e| scrub(&e.to_string())),
            iterations: result.iterations,
            dispatches: result.dispatches,
            repeats_flagged: result.repeats_flagged,
            budget_initial: result.budget_initial,
            budget_consumed: result.budget_consumed,
            provider_used: result.provider_used.clone(),
            submission: result.submission.clone(),
            transcript: result
                .transcript
                .iter()
                .map(|m| Message {
                    role: m.role,
                    content: scrub(&m.content),
                })
                .collect(),
            started_at,
            finished_at,
            duration_ms: result.duration_ms,
        }
    }
}

/// SQLite-backed store of run records
#[derive(Debug, Clone)]
pub struct RunHistory {
    pool: SqlitePool,
}

impl RunHistory {
    /// Open (or create) the history database at `db_path` and apply the schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        tracing::debug!("Opening run history at {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create history directory")?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .context("Failed to open history database")?;

        sqlx::raw_sql(include_str!("../../migrations/001_runs.sql"))
            .execute(&pool)
            .await
            .context("Failed to execute migration 001_runs.sql")?;

        Ok(Self { pool })
    }

    /// Insert a record, replacing any earlier row with the same run id
    pub async fn save(&self, record: &RunRecord) -> Result<()> {
        let submission = serde_json::to_string(&record.submission)
            .context("Failed to serialize submission status")?;
        let transcript = serde_json::to_string(&record.transcript)
            .context("Failed to serialize transcript")?;

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO runs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            RUN_COLUMNS
        ))
        .bind(&record.run_id)
        .bind(&record.investigation)
        .bind(&record.task)
        .bind(state_as_str(record.state))
        .bind(&record.answer)
        .bind(&record.error)
        .bind(record.iterations)
        .bind(record.dispatches)
        .bind(record.repeats_flagged)
        .bind(record.budget_initial)
        .bind(record.budget_consumed)
        .bind(&record.provider_used)
        .bind(submission)
        .bind(transcript)
        .bind(record.started_at.timestamp_millis())
        .bind(record.finished_at.timestamp_millis())
        .bind(i64::try_from(record.duration_ms).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .context("Failed to save run record")?;

        tracing::debug!("Saved run {}", record.run_id);
        Ok(())
    }

    /// Most recent records first, at most `limit`
    pub async fn list(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs ORDER BY finished_at DESC LIMIT ?",
            RUN_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent runs")?;

        rows.iter().map(record_from_row).collect()
    }

    /// Load one record by full run id or a unique prefix of it
    ///
    /// Ids are hexadecimal with dashes, at most 36 characters; anything else
    /// is rejected before it reaches the database.
    pub async fn load(&self, run_id: &str) -> Result<RunRecord> {
        let run_id = validate_run_id(run_id)?;

        let exact = sqlx::query(&format!("SELECT {} FROM runs WHERE run_id = ?", RUN_COLUMNS))
            .bind(&run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch run")?;
        if let Some(row) = exact {
            return record_from_row(&row);
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE run_id LIKE ? ORDER BY finished_at DESC LIMIT 2",
            RUN_COLUMNS
        ))
        .bind(format!("{}%", run_id))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch run by prefix")?;

        match rows.as_slice() {
            [row] => record_from_row(row),
            _ => Err(EngineError::RunNotFound(run_id).into()),
        }
    }

    /// Delete runs that finished more than `older_than_days` days ago
    pub async fn delete_older_than(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).timestamp_millis();

        let result = sqlx::query("DELETE FROM runs WHERE finished_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete old runs")?;

        Ok(result.rows_affected())
    }

    /// Checkpoint the WAL and close the pool
    pub async fn close(self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush history WAL")?;
        self.pool.close().await;
        Ok(())
    }
}

/// Lower-case `run_id` and reject anything that cannot be a run id or prefix
fn validate_run_id(run_id: &str) -> Result<String, EngineError> {
    let trimmed = run_id.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= RUN_ID_MAX_LEN
        && trimmed.chars().all(|c| c.is_ascii_hexdigit() || c == '-');

    if valid {
        Ok(trimmed.to_ascii_lowercase())
    } else {
        Err(EngineError::InvalidRunId(run_id.to_string()))
    }
}

fn state_as_str(state: LoopState) -> &'static str {
    match state {
        LoopState::AwaitingAction => "AWAITING_ACTION",
        LoopState::Dispatching => "DISPATCHING",
        LoopState::DoneSuccess => "DONE_SUCCESS",
        LoopState::DoneNoSolution => "DONE_NO_SOLUTION",
        LoopState::DoneError => "DONE_ERROR",
    }
}

fn state_from_str(state: &str) -> Result<LoopState> {
    Ok(match state {
        "AWAITING_ACTION" => LoopState::AwaitingAction,
        "DISPATCHING" => LoopState::Dispatching,
        "DONE_SUCCESS" => LoopState::DoneSuccess,
        "DONE_NO_SOLUTION" => LoopState::DoneNoSolution,
        "DONE_ERROR" => LoopState::DoneError,
        other => anyhow::bail!("Unknown run state '{}'", other),
    })
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("Timestamp out of range: {}", millis))
}

fn record_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let submission: String = row.try_get("submission")?;
    let transcript: String = row.try_get("transcript")?;
    let duration_ms: i64 = row.try_get("duration_ms")?;

    Ok(RunRecord {
        run_id: row.try_get("run_id")?,
        investigation: row.try_get("investigation")?,
        task: row.try_get("task")?,
        state: state_from_str(row.try_get("state")?)?,
        answer: row.try_get("answer")?,
        error: row.try_get("error")?,
        iterations: row.try_get("iterations")?,
        dispatches: row.try_get("dispatches")?,
        repeats_flagged: row.try_get("repeats_flagged")?,
        budget_initial: row.try_get("budget_initial")?,
        budget_consumed: row.try_get("budget_consumed")?,
        provider_used: row.try_get("provider_used")?,
        submission: serde_json::from_str(&submission)
            .context("Failed to parse stored submission status")?,
        transcript: serde_json::from_str(&transcript).context("Failed to parse stored transcript")?,
        started_at: timestamp(row.try_get("started_at")?)?,
        finished_at: timestamp(row.try_get("finished_at")?)?,
        duration_ms: u64::try_from(duration_ms).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Outcome;

    fn result(answer: &str) -> InvestigationResult {
        InvestigationResult {
            run_id: uuid::Uuid::new_v4().to_string(),
            investigation: "barbara".to_string(),
            task: "loop".to_string(),
            outcome: Outcome::Success {
                answer: answer.to_string(),
            },
            iterations: 2,
            dispatches: 1,
            repeats_flagged: 0,
            budget_initial: 5,
            budget_consumed: 2,
            provider_used: Some("anthropic".to_string()),
            transcript: vec![
                Message::system("sys"),
                Message::user("apikey=super-secret-value"),
            ],
            submission: SubmissionStatus::Skipped,
            duration_ms: 1500,
        }
    }

    #[test]
    fn test_record_from_result_scrubs_transcript() {
        let now = Utc::now();
        let record = RunRecord::from_result(&result("LODZ"), now);

        assert_eq!(record.state, LoopState::DoneSuccess);
        assert_eq!(record.answer.as_deref(), Some("LODZ"));
        assert_eq!(record.transcript[1].content, "apikey=[REDACTED]");
        assert_eq!(record.finished_at - record.started_at, Duration::milliseconds(1500));
    }

    fn expect_engine_error(err: anyhow::Error) -> EngineError {
        match err.downcast::<EngineError>() {
            Ok(e) => e,
            Err(other) => panic!("expected an EngineError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_list_load() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();

        let older = RunRecord::from_result(&result("A"), Utc::now() - Duration::minutes(5));
        let newer = RunRecord::from_result(&result("B"), Utc::now());
        history.save(&older).await.unwrap();
        history.save(&newer).await.unwrap();

        let listed = history.list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].answer.as_deref(), Some("B"));
        assert_eq!(listed[0].transcript, newer.transcript);
        assert_eq!(listed[0].submission, SubmissionStatus::Skipped);

        assert_eq!(history.list(1).await.unwrap().len(), 1);
        let loaded = history.load(&older.run_id).await.unwrap();
        assert_eq!(loaded.run_id, older.run_id);
        assert_eq!(loaded.state, LoopState::DoneSuccess);
        assert_eq!(
            loaded.finished_at.timestamp_millis(),
            older.finished_at.timestamp_millis()
        );
        assert_eq!(
            history.load(&newer.run_id[..8]).await.unwrap().run_id,
            newer.run_id
        );
    }

    #[tokio::test]
    async fn test_save_replaces_same_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();

        let mut record = RunRecord::from_result(&result("A"), Utc::now());
        history.save(&record).await.unwrap();
        record.answer = Some("B".to_string());
        history.save(&record).await.unwrap();

        let listed = history.list(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].answer.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_missing_run() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();

        let err = history.load("abc123").await.unwrap_err();
        assert!(matches!(expect_engine_error(err), EngineError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_prefix_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();

        for (id, answer) in [("aaaa1111", "A"), ("aaaa2222", "B")] {
            let mut record = RunRecord::from_result(&result(answer), Utc::now());
            record.run_id = id.to_string();
            history.save(&record).await.unwrap();
        }

        let err = history.load("aaaa").await.unwrap_err();
        assert!(matches!(expect_engine_error(err), EngineError::RunNotFound(_)));
        assert_eq!(
            history.load("AAAA2").await.unwrap().answer.as_deref(),
            Some("B")
        );
    }

    #[tokio::test]
    async fn test_load_rejects_path_like_and_wildcard_ids() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();
        history
            .save(&RunRecord::from_result(&result("A"), Utc::now()))
            .await
            .unwrap();

        for bad in ["../../etc/passwd", "", "%", "a_b", "a".repeat(37).as_str()] {
            let err = history.load(bad).await.unwrap_err();
            assert!(
                matches!(expect_engine_error(err), EngineError::InvalidRunId(_)),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(&dir.path().join("history.db")).await.unwrap();

        let stale = RunRecord::from_result(&result("A"), Utc::now() - Duration::days(40));
        let fresh = RunRecord::from_result(&result("B"), Utc::now() - Duration::days(1));
        history.save(&stale).await.unwrap();
        history.save(&fresh).await.unwrap();

        assert_eq!(history.delete_older_than(30).await.unwrap(), 1);
        let remaining = history.list(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].run_id, fresh.run_id);
    }

    #[tokio::test]
    async fn test_reopen_keeps_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let record = RunRecord::from_result(&result("A"), Utc::now());

        let history = RunHistory::open(&path).await.unwrap();
        history.save(&record).await.unwrap();
        history.close().await.unwrap();

        let reopened = RunHistory::open(&path).await.unwrap();
        assert_eq!(reopened.load(&record.run_id).await.unwrap().answer.as_deref(), Some("A"));
    }
}
