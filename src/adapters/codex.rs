//! Codex CLI adapter (`codex exec --json`).
//!
//! Codex reports its conversation id as `thread_id` on the `thread.started`
//! event; `codex exec resume <thread_id>` continues that conversation.

use async_trait::async_trait;

use crate::adapters::jsonl::{EventStream, parse_json_lines};
use crate::adapters::process::launch;
use crate::adapters::{Adapter, ProcessInput, ResumeOptions, RunningProcess, SpawnOptions};
use crate::agent::mux::ByteStream;
use crate::error::AdapterError;

#[derive(Debug, Clone)]
pub struct CodexAdapter {
    program: String,
}

impl CodexAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_args(task: &str) -> Vec<String> {
        ["exec", "--json", "--full-auto", task]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn resume_args(session_id: &str, task: &str) -> Vec<String> {
        ["exec", "resume", session_id, "--json", "--full-auto", task]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new("codex")
    }
}

#[async_trait]
impl Adapter for CodexAdapter {
    fn name(&self) -> &str {
        "codex"
    }

    fn spawn(&self, options: &SpawnOptions) -> Result<RunningProcess, AdapterError> {
        launch(&self.program, &Self::spawn_args(&options.task), &options.cwd, true)
    }

    fn parse_output(&self, output: ByteStream) -> EventStream {
        parse_json_lines(output)
    }

    async fn send_input(&self, input: &ProcessInput, message: &str) -> Result<(), AdapterError> {
        input.write_line(message).await.map_err(AdapterError::Input)
    }

    fn can_resume(&self) -> bool {
        true
    }

    fn resume(&self, options: &ResumeOptions) -> Result<RunningProcess, AdapterError> {
        launch(
            &self.program,
            &Self::resume_args(&options.session_id, &options.task),
            &options.cwd,
            true,
        )
    }
}
