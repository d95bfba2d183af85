//! Service facade — the boundary operations with serializable results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::adapters::{AdapterRegistry, SpawnMode};
use crate::agent::{Job, JobManager, JobStatus, SendOutcome};
use crate::error::Result;
use crate::events::Event;

/// Process-wide facts captured once at startup.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub version: &'static str,
    pub adapters: Vec<String>,
    pub started_at: Instant,
}

impl ProcessInfo {
    pub fn new(adapters: &AdapterRegistry) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            adapters: adapters.list(),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Spawned {
    pub job_id: String,
    pub status: JobStatus,
}

/// One job (or `null` when unknown), or every job.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusReport {
    One(Option<Job>),
    All(Vec<Job>),
}

#[derive(Debug, Clone, Serialize)]
pub struct SendAck {
    pub outcome: SendOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillAck {
    pub killed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub version: String,
    pub adapters: Vec<String>,
    pub uptime_ms: u64,
}

/// Entry point for callers; wraps the job manager.
#[derive(Clone)]
pub struct Service {
    manager: JobManager,
    info: Arc<ProcessInfo>,
}

impl Service {
    pub fn new(manager: JobManager, info: ProcessInfo) -> Self {
        Self {
            manager,
            info: Arc::new(info),
        }
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    /// Start a job. `cwd` defaults to `.` and `mode` to headless.
    pub async fn spawn(
        &self,
        agent: &str,
        task: &str,
        cwd: Option<PathBuf>,
        mode: Option<SpawnMode>,
    ) -> Result<Spawned> {
        let cwd = cwd.unwrap_or_else(|| PathBuf::from("."));
        let job = self
            .manager
            .spawn(agent, mode.unwrap_or_default(), task, cwd)
            .await?;
        Ok(Spawned {
            job_id: job.id,
            status: job.status,
        })
    }

    pub async fn status(&self, job_id: Option<&str>) -> StatusReport {
        match job_id {
            Some(id) => StatusReport::One(self.manager.get_job(id).await),
            None => StatusReport::All(self.manager.list_jobs().await),
        }
    }

    pub async fn send(&self, job_id: &str, message: &str) -> Result<SendAck> {
        let outcome = self.manager.send(job_id, message).await?;
        Ok(SendAck { outcome })
    }

    pub async fn output(&self, job_id: &str, since: Option<&str>) -> Vec<Event> {
        self.manager.events(job_id, since).await
    }

    pub async fn kill(&self, job_id: &str) -> KillAck {
        KillAck {
            killed: self.manager.kill(job_id).await,
        }
    }

    pub fn info(&self) -> Info {
        let uptime = self.info.started_at.elapsed().as_millis();
        Info {
            version: self.info.version.to_string(),
            adapters: self.info.adapters.clone(),
            uptime_ms: u64::try_from(uptime).unwrap_or(u64::MAX),
        }
    }
}
