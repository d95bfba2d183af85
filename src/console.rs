//! Console — JSON request per line in, JSON response per line out.
//!
//! ```text
//! {"op": "spawn", "agent": "codex", "task": "fix the tests", "cwd": "/repo"}
//! {"ok": true, "result": {"job_id": "…", "status": "running"}}
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::adapters::SpawnMode;
use crate::error::{RequestError, Result};
use crate::service::Service;

/// One console request, selected by its `op` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Spawn {
        agent: String,
        task: String,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        mode: Option<SpawnMode>,
    },
    Status {
        #[serde(default)]
        job_id: Option<String>,
    },
    Send {
        job_id: String,
        message: String,
    },
    Output {
        job_id: String,
        #[serde(default)]
        since: Option<String>,
    },
    Kill {
        job_id: String,
    },
    Info,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line).map_err(RequestError::Malformed)?)
    }
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(RequestError::Encode)?)
}

/// Run one request against the service.
pub async fn dispatch(service: &Service, request: Request) -> Result<Value> {
    match request {
        Request::Spawn {
            agent,
            task,
            cwd,
            mode,
        } => encode(service.spawn(&agent, &task, cwd, mode).await?),
        Request::Status { job_id } => encode(service.status(job_id.as_deref()).await),
        Request::Send { job_id, message } => encode(service.send(&job_id, &message).await?),
        Request::Output { job_id, since } => {
            encode(service.output(&job_id, since.as_deref()).await)
        }
        Request::Kill { job_id } => encode(service.kill(&job_id).await),
        Request::Info => encode(service.info()),
    }
}

/// Parse, dispatch and wrap a single request line.
pub async fn handle_line(service: &Service, line: &str) -> Value {
    let outcome = match Request::parse(line) {
        Ok(request) => {
            tracing::debug!(?request, "Console request");
            dispatch(service, request).await
        }
        Err(e) => Err(e),
    };
    match outcome {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(e) => {
            tracing::debug!(error = %e, "Console request failed");
            json!({ "ok": false, "error": e.to_string() })
        }
    }
}

/// Serve requests from `reader` until EOF, answering each on `writer`.
pub async fn run<R, W>(service: &Service, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(service, line).await;
        let mut out = response.to_string();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    tracing::debug!("Console input closed");
    Ok(())
}
