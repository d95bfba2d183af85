//! Adapter abstraction over external agent back-ends.
//!
//! Every back-end can spawn a process, parse its output and forward follow-up
//! input. Resuming a previous session is optional and advertised through
//! [`Adapter::can_resume`].

pub mod claude;
pub mod codex;
pub mod jsonl;
pub mod opencode;
pub mod process;
pub mod registry;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::mux::ByteStream;
use crate::error::AdapterError;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use jsonl::EventStream;
pub use opencode::OpenCodeAdapter;
pub use process::{ProcessInput, RunningProcess};
pub use registry::AdapterRegistry;

/// How the agent is expected to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    #[default]
    Headless,
    Headful,
}

impl std::fmt::Display for SpawnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Headless => f.write_str("headless"),
            Self::Headful => f.write_str("headful"),
        }
    }
}

/// Parameters for a fresh agent run.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub task: String,
    pub cwd: PathBuf,
    pub mode: SpawnMode,
}

/// Parameters for continuing an existing session.
#[derive(Debug, Clone)]
pub struct ResumeOptions {
    pub session_id: String,
    pub task: String,
    pub cwd: PathBuf,
    pub mode: SpawnMode,
}

/// One external agent back-end.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry key, e.g. `"codex"`.
    fn name(&self) -> &str;

    /// Start a new agent process for `options.task`.
    fn spawn(&self, options: &SpawnOptions) -> Result<RunningProcess, AdapterError>;

    /// Turn the process's merged output into events. Must end exactly when
    /// `output` ends and must survive malformed lines.
    fn parse_output(&self, output: ByteStream) -> EventStream;

    /// Deliver a follow-up message to a live process.
    async fn send_input(&self, input: &ProcessInput, message: &str) -> Result<(), AdapterError>;

    /// Whether [`Adapter::resume`] is supported.
    fn can_resume(&self) -> bool {
        false
    }

    /// Start a process that continues a previously observed session.
    fn resume(&self, _options: &ResumeOptions) -> Result<RunningProcess, AdapterError> {
        Err(AdapterError::ResumeUnsupported {
            agent: self.name().to_string(),
        })
    }
}
