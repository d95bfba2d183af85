//! Job record and lifecycle states.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::SpawnMode;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The agent process is working.
    Running,
    /// The agent asked a question and waits for `send`.
    AwaitingInput,
    /// Exited cleanly or was killed.
    Completed,
    /// Exited with a nonzero code or a signal.
    Error,
    /// Restored from a snapshot; its process did not survive the restart.
    Stale,
}

impl JobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

/// One tracked agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: String,
    /// Adapter name the job runs on.
    pub agent: String,
    #[serde(default)]
    pub mode: SpawnMode,
    /// Task text given at spawn.
    pub task: String,
    #[serde(default)]
    pub cwd: PathBuf,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Resumable session token reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Job {
    /// Create a running job with a fresh ID.
    pub fn new(
        agent: impl Into<String>,
        mode: SpawnMode,
        task: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            mode,
            task: task.into(),
            cwd: cwd.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            session_id: None,
        }
    }

    /// Enter a terminal status and record the completion time.
    pub fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Bring a finished job back to `running` for a resumed run.
    pub fn reopen(&mut self) {
        self.status = JobStatus::Running;
        self.completed_at = None;
    }

    /// Record a session token. Returns `true` if it differs from the current one.
    pub fn observe_session(&mut self, session_id: &str) -> bool {
        if session_id.is_empty() || self.session_id.as_deref() == Some(session_id) {
            return false;
        }
        self.session_id = Some(session_id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::AwaitingInput.is_terminal());
        assert!(!JobStatus::Stale.is_terminal());
    }

    #[test]
    fn job_ids_are_unique() {
        let a = Job::new("codex", SpawnMode::Headless, "t", "/tmp");
        let b = Job::new("codex", SpawnMode::Headless, "t", "/tmp");
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Running);
    }

    #[test]
    fn finish_and_reopen() {
        let mut job = Job::new("codex", SpawnMode::Headless, "t", "/tmp");
        job.finish(JobStatus::Error);
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.completed_at.is_some());

        job.reopen();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn session_is_replaced_never_cleared() {
        let mut job = Job::new("codex", SpawnMode::Headless, "t", "/tmp");
        assert!(job.observe_session("s-1"));
        assert!(!job.observe_session("s-1"));
        assert!(!job.observe_session(""));
        assert_eq!(job.session_id.as_deref(), Some("s-1"));
        assert!(job.observe_session("s-2"));
        assert_eq!(job.session_id.as_deref(), Some("s-2"));
    }

    #[test]
    fn job_status_serde_roundtrip() {
        let json = serde_json::to_string(&JobStatus::AwaitingInput).unwrap();
        assert_eq!(json, "\"awaiting_input\"");
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobStatus::AwaitingInput);
        assert_eq!(JobStatus::Stale.to_string(), "stale");
    }

    #[test]
    fn job_tolerates_unknown_and_missing_optional_fields() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "agent": "claude",
            "task": "x",
            "status": "running",
            "started_at": "2026-01-01T00:00:00Z",
            "priority": "high"
        }))
        .unwrap();
        assert_eq!(job.mode, SpawnMode::Headless);
        assert!(job.session_id.is_none());
        assert!(job.completed_at.is_none());
    }
}
