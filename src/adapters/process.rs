//! Launching agent processes and holding on to their handles.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::agent::mux::{ByteStream, reader_stream};
use crate::error::AdapterError;

/// How an agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Writable side of a running agent process. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProcessInput {
    stdin: Option<Arc<Mutex<ChildStdin>>>,
}

impl ProcessInput {
    /// Write `message` followed by a newline and flush.
    pub async fn write_line(&self, message: &str) -> std::io::Result<()> {
        let Some(stdin) = &self.stdin else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "process stdin is not piped",
            ));
        };
        let mut stdin = stdin.lock().await;
        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }
}

/// Control half kept by the job manager while a process is live.
#[derive(Debug)]
pub struct ProcessControl {
    pub pid: Option<u32>,
    pub input: ProcessInput,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessControl {
    /// Ask the process to terminate. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Resolves once the process has exited.
#[derive(Debug)]
pub struct ExitWaiter(JoinHandle<ProcessExit>);

impl ExitWaiter {
    pub async fn wait(self) -> ProcessExit {
        match self.0.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!(error = %e, "Exit watcher task failed");
                ProcessExit { code: None }
            }
        }
    }
}

/// A freshly started agent process, split into the parts the manager wires up.
pub struct RunningProcess {
    pub control: ProcessControl,
    pub exit: ExitWaiter,
    outputs: Vec<ByteStream>,
}

impl std::fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningProcess")
            .field("control", &self.control)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl RunningProcess {
    /// Take ownership of a spawned child. Its stdout and stderr (when piped)
    /// become the output streams; a background task waits for exit and
    /// delivers kill requests.
    pub fn from_child(mut child: Child) -> Self {
        let pid = child.id();
        let input = ProcessInput {
            stdin: child.stdin.take().map(|s| Arc::new(Mutex::new(s))),
        };

        let mut outputs = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            outputs.push(reader_stream(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            outputs.push(reader_stream(stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let exit = ExitWaiter(tokio::spawn(wait_for_exit(child, kill_rx)));

        Self {
            control: ProcessControl {
                pid,
                input,
                kill_tx: Some(kill_tx),
            },
            exit,
            outputs,
        }
    }

    /// Output channels in stdout, stderr order.
    pub fn take_outputs(&mut self) -> Vec<ByteStream> {
        std::mem::take(&mut self.outputs)
    }
}

async fn wait_for_exit(mut child: Child, kill_rx: oneshot::Receiver<()>) -> ProcessExit {
    let status = tokio::select! {
        status = child.wait() => status,
        signal = kill_rx => {
            // A dropped sender means the manager let go of the process; only an
            // explicit request terminates it.
            if signal.is_ok() {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(pid = ?child.id(), error = %e, "Failed to signal agent process");
                }
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => ProcessExit {
            code: status.code(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed waiting for agent process");
            ProcessExit { code: None }
        }
    }
}

/// Start `program` with `args` in `cwd`, capturing stdout and stderr.
///
/// The child is killed if its handle is dropped.
pub fn launch(
    program: &str,
    args: &[String],
    cwd: &Path,
    pipe_stdin: bool,
) -> Result<RunningProcess, AdapterError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| AdapterError::SpawnFailed {
        program: program.to_string(),
        source,
    })?;

    tracing::debug!(program, pid = ?child.id(), cwd = %cwd.display(), "Spawned agent process");
    Ok(RunningProcess::from_child(child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sh(script: &str, pipe_stdin: bool) -> RunningProcess {
        launch(
            "sh",
            &["-c".to_string(), script.to_string()],
            Path::new("."),
            pipe_stdin,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let mut process = sh("printf out; printf err >&2; exit 3", false);
        let outputs = process.take_outputs();
        assert_eq!(outputs.len(), 2);

        let mut collected = Vec::new();
        for output in outputs {
            let chunks: Vec<_> = output.collect().await;
            for chunk in chunks {
                collected.extend_from_slice(&chunk.unwrap());
            }
        }
        assert_eq!(String::from_utf8(collected).unwrap(), "outerr");
        assert_eq!(process.exit.wait().await, ProcessExit { code: Some(3) });
    }

    #[tokio::test]
    async fn kill_terminates_process() {
        let mut process = sh("sleep 30", false);
        assert!(process.control.pid.is_some());
        process.control.kill();
        process.control.kill();

        let exit = tokio::time::timeout(std::time::Duration::from_secs(5), process.exit.wait())
            .await
            .expect("killed process should exit promptly");
        assert!(!exit.success());
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn writes_lines_to_stdin() {
        let mut process = sh("read line; printf \"got:%s\" \"$line\"", true);
        process.control.input.write_line("hello").await.unwrap();

        let mut outputs = process.take_outputs();
        let stdout = outputs.remove(0);
        let chunks: Vec<_> = stdout.collect().await;
        let text: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
        assert_eq!(String::from_utf8(text).unwrap(), "got:hello");
        assert!(process.exit.wait().await.success());
    }

    #[tokio::test]
    async fn unpiped_stdin_rejects_writes() {
        let process = sh("true", false);
        let err = process.control.input.write_line("x").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = launch("reef-definitely-not-a-binary", &[], Path::new("."), false).unwrap_err();
        assert!(matches!(err, AdapterError::SpawnFailed { .. }));
    }
}
