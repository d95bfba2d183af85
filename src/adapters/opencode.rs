//! OpenCode adapter (`opencode run --format json`).
//!
//! OpenCode runs one-shot with stdin closed, so follow-ups always go through
//! `--session` resumes rather than stdin.

use async_trait::async_trait;

use crate::adapters::jsonl::{EventStream, parse_json_lines};
use crate::adapters::process::launch;
use crate::adapters::{Adapter, ProcessInput, ResumeOptions, RunningProcess, SpawnOptions};
use crate::agent::mux::ByteStream;
use crate::error::AdapterError;

#[derive(Debug, Clone)]
pub struct OpenCodeAdapter {
    program: String,
}

impl OpenCodeAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_args(task: &str) -> Vec<String> {
        ["run", "--format", "json", task]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn resume_args(session_id: &str, task: &str) -> Vec<String> {
        ["run", "--format", "json", "--session", session_id, task]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for OpenCodeAdapter {
    fn default() -> Self {
        Self::new("opencode")
    }
}

#[async_trait]
impl Adapter for OpenCodeAdapter {
    fn name(&self) -> &str {
        "opencode"
    }

    fn spawn(&self, options: &SpawnOptions) -> Result<RunningProcess, AdapterError> {
        launch(&self.program, &Self::spawn_args(&options.task), &options.cwd, false)
    }

    fn parse_output(&self, output: ByteStream) -> EventStream {
        parse_json_lines(output)
    }

    async fn send_input(&self, _input: &ProcessInput, _message: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    fn can_resume(&self) -> bool {
        true
    }

    fn resume(&self, options: &ResumeOptions) -> Result<RunningProcess, AdapterError> {
        launch(
            &self.program,
            &Self::resume_args(&options.session_id, &options.task),
            &options.cwd,
            false,
        )
    }
}
