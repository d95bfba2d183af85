//! Claude Code adapter (`claude -p … --output-format stream-json`).

use async_trait::async_trait;

use crate::adapters::jsonl::{EventStream, parse_json_lines};
use crate::adapters::process::launch;
use crate::adapters::{Adapter, ProcessInput, RunningProcess, SpawnOptions};
use crate::agent::mux::ByteStream;
use crate::error::AdapterError;

/// Runs Claude Code headless and talks to it over stdin.
#[derive(Debug, Clone)]
pub struct ClaudeAdapter {
    program: String,
}

impl ClaudeAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_args(task: &str) -> Vec<String> {
        ["-p", task, "-y", "--output-format", "stream-json"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl Adapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_args_stream_json() {
        assert_eq!(
            ClaudeAdapter::spawn_args("fix the build"),
            ["-p", "fix the build", "-y", "--output-format", "stream-json"]
        );
    }

    #[test]
    fn cannot_resume() {
        let adapter = ClaudeAdapter::default();
        assert!(!adapter.can_resume());
        let err = adapter
            .resume(&crate::adapters::ResumeOptions {
                session_id: "s".into(),
                task: "t".into(),
                cwd: ".".into(),
                mode: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, AdapterError::ResumeUnsupported { .. }));
    }
}
