//! Job manager — owns job records and live processes, drives the lifecycle.
//!
//! All job and event state sits behind one async mutex. Every process run
//! gets a driver task that applies the run's parsed events as they arrive and
//! finishes the job when the process exits; each step re-enters through the
//! mutex. Output that outlives the process is appended without touching the
//! job's status.
//!
//! Runs are numbered. Only the run currently registered for a job may change
//! its status, so a late exit from a killed run can never finish a job that
//! was resumed in the meantime.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::adapters::process::{ExitWaiter, ProcessControl, ProcessExit};
use crate::adapters::{
    Adapter, AdapterRegistry, ResumeOptions, RunningProcess, SpawnMode, SpawnOptions,
};
use crate::agent::event_store::EventStore;
use crate::agent::job::{Job, JobStatus};
use crate::agent::mux::{ByteStream, merge_streams};
use crate::config::Config;
use crate::error::{AdapterError, Result};
use crate::events::{Event, EventKind, Payload, now_timestamp, payload};
use crate::persistence::{Snapshot, SnapshotSource, SnapshotWriter, StateStore};

/// How long output is still drained after exit before the job is finished.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// What `send` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Written to the live process.
    Delivered,
    /// Started a new process continuing the job's session.
    Resumed,
    /// No live process and no resumable session; nothing changed.
    Dropped,
}

struct LiveProcess {
    run: u64,
    control: ProcessControl,
}

struct State {
    active: Vec<Job>,
    /// Newest first.
    completed: VecDeque<Job>,
    events: EventStore,
    live: HashMap<String, LiveProcess>,
    next_run: u64,
}

impl State {
    fn new(event_tail: usize) -> Self {
        Self {
            active: Vec::new(),
            completed: VecDeque::new(),
            events: EventStore::new(event_tail),
            live: HashMap::new(),
            next_run: 0,
        }
    }

    fn job(&self, id: &str) -> Option<&Job> {
        self.active
            .iter()
            .find(|j| j.id == id)
            .or_else(|| self.completed.iter().find(|j| j.id == id))
    }

    fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        if let Some(pos) = self.active.iter().position(|j| j.id == id) {
            return self.active.get_mut(pos);
        }
        self.completed.iter_mut().find(|j| j.id == id)
    }

    fn active_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.active.iter_mut().find(|j| j.id == id)
    }

    fn is_current_run(&self, id: &str, run: u64) -> bool {
        self.live.get(id).is_some_and(|live| live.run == run)
    }

    fn next_run(&mut self) -> u64 {
        self.next_run += 1;
        self.next_run
    }

    /// Stamp and append an event to a job's tail.
    fn commit(&mut self, job_id: &str, mut event: Event) {
        event.job_id = job_id.to_string();
        event.timestamp = now_timestamp();
        self.events.append(job_id, event);
    }

    fn insert_job(&mut self, job: Job) {
        let started = payload(json!({ "task": job.task, "agent": job.agent }));
        let id = job.id.clone();
        self.active.push(job);
        self.commit(&id, Event::new(EventKind::Started, &id, started));
    }

    fn await_input(&mut self, id: &str, question: Value, options: Option<Value>) -> bool {
        let Some(job) = self.active_mut(id) else {
            return false;
        };
        job.status = JobStatus::AwaitingInput;

        let mut body = Payload::new();
        body.insert("question".to_string(), question);
        if let Some(options) = options {
            body.insert("options".to_string(), options);
        }
        self.commit(id, Event::new(EventKind::NeedsInput, id, body));
        true
    }

    fn input_sent(&mut self, id: &str, message: &str) -> bool {
        let Some(job) = self.active_mut(id) else {
            return false;
        };
        job.status = JobStatus::Running;
        self.commit(
            id,
            Event::new(EventKind::InputSent, id, payload(json!({ "message": message }))),
        );
        true
    }

    /// Move an active job to the front of the completed list.
    fn complete(
        &mut self,
        id: &str,
        status: JobStatus,
        details: Payload,
        max_completed: usize,
    ) -> bool {
        let Some(pos) = self.active.iter().position(|j| j.id == id) else {
            return false;
        };
        let mut job = self.active.remove(pos);
        job.finish(status);

        let kind = match status {
            JobStatus::Error => EventKind::Error,
            _ => EventKind::Completed,
        };
        self.commit(id, Event::new(kind, id, details));
        self.live.remove(id);
        self.completed.push_front(job);

        while self.completed.len() > max_completed {
            if let Some(evicted) = self.completed.pop_back() {
                self.events.remove(&evicted.id);
                tracing::debug!(job_id = %evicted.id, "Evicted completed job");
            }
        }
        true
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            jobs: self.active.clone(),
            completed: self.completed.iter().cloned().collect(),
            event_tails: self.events.snapshot(),
        }
    }
}

struct Inner {
    adapters: Arc<AdapterRegistry>,
    store: Arc<dyn StateStore>,
    writer: SnapshotWriter,
    max_completed: usize,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl SnapshotSource for Mutex<State> {
    async fn snapshot(&self) -> Snapshot {
        self.lock().await.snapshot()
    }
}

/// Tracks agent jobs from spawn to completion. Cheap to clone.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    /// Create a manager. Must be called inside a Tokio runtime.
    pub fn new(adapters: Arc<AdapterRegistry>, store: Arc<dyn StateStore>, config: &Config) -> Self {
        let state = Arc::new(Mutex::new(State::new(config.max_event_tail)));
        Self {
            inner: Arc::new(Inner {
                writer: SnapshotWriter::spawn(store.clone(), state.clone()),
                adapters,
                store,
                max_completed: config.max_completed.max(1),
                state,
            }),
        }
    }

    fn adapter(&self, name: &str) -> std::result::Result<Arc<dyn Adapter>, AdapterError> {
        self.inner
            .adapters
            .get(name)
            .ok_or_else(|| AdapterError::NotFound {
                name: name.to_string(),
            })
    }

    fn persist(&self) {
        self.inner.writer.mark_dirty();
    }

    /// Restore jobs and event tails from the state store.
    ///
    /// Restored active jobs become `stale`: their processes did not survive.
    pub async fn load(&self) {
        let snapshot = self.inner.store.load().await;
        let mut state = self.inner.state.lock().await;

        for mut job in snapshot.jobs {
            if state.job(&job.id).is_some() {
                continue;
            }
            job.status = JobStatus::Stale;
            state.active.push(job);
        }
        for job in snapshot.completed {
            if state.completed.len() >= self.inner.max_completed {
                break;
            }
            if state.job(&job.id).is_none() {
                state.completed.push_back(job);
            }
        }

        let tails: BTreeMap<String, Vec<Event>> = snapshot
            .event_tails
            .into_iter()
            .filter(|(id, _)| state.job(id).is_some())
            .collect();
        state.events.restore(tails);

        tracing::info!(
            stale = state.active.len(),
            completed = state.completed.len(),
            "Restored job state"
        );
    }

    /// Wait until pending snapshot writes have finished.
    pub async fn flush(&self) {
        self.inner.writer.flush().await;
    }

    /// Start a job on `agent`.
    ///
    /// The process is launched before the job is recorded, so a failed launch
    /// leaves no trace.
    pub async fn spawn(
        &self,
        agent: &str,
        mode: SpawnMode,
        task: &str,
        cwd: impl Into<PathBuf>,
    ) -> Result<Job> {
        let adapter = self.adapter(agent)?;
        let cwd = cwd.into();
        let mut process = adapter.spawn(&SpawnOptions {
            task: task.to_string(),
            cwd: cwd.clone(),
            mode,
        })?;

        let job = Job::new(agent, mode, task, cwd);
        let outputs = process.take_outputs();
        let RunningProcess { control, exit, .. } = process;
        let pid = control.pid;

        let run = {
            let mut state = self.inner.state.lock().await;
            let run = state.next_run();
            state.insert_job(job.clone());
            state.live.insert(job.id.clone(), LiveProcess { run, control });
            self.persist();
            run
        };

        tracing::info!(job_id = %job.id, agent, pid = ?pid, "Spawned job");
        self.drive(job.id.clone(), run, adapter, outputs, exit);
        Ok(job)
    }

    /// Record a running job without a process.
    pub async fn create_job(
        &self,
        agent: &str,
        mode: SpawnMode,
        task: &str,
        cwd: impl Into<PathBuf>,
    ) -> Job {
        let job = Job::new(agent, mode, task, cwd);
        let mut state = self.inner.state.lock().await;
        state.insert_job(job.clone());
        self.persist();
        job
    }

    /// Put an active job into `awaiting_input` with a `needs_input` event.
    pub async fn mark_awaiting_input(
        &self,
        job_id: &str,
        question: &str,
        options: Option<Vec<String>>,
    ) {
        let mut state = self.inner.state.lock().await;
        let options = options.map(|o| json!(o));
        if state.await_input(job_id, Value::String(question.to_string()), options) {
            self.persist();
        }
    }

    /// Return an active job to `running` with an `input_sent` event.
    pub async fn clear_awaiting_input(&self, job_id: &str, message: &str) {
        let mut state = self.inner.state.lock().await;
        if state.input_sent(job_id, message) {
            self.persist();
        }
    }

    /// Finish an active job with a terminal status and event payload.
    /// Returns `false` if the job is not active.
    pub async fn complete_job(&self, job_id: &str, status: JobStatus, details: Payload) -> bool {
        if !status.is_terminal() {
            tracing::warn!(job_id, %status, "Refusing to complete job with non-terminal status");
            return false;
        }
        let mut state = self.inner.state.lock().await;
        let done = state.complete(job_id, status, details, self.inner.max_completed);
        if done {
            self.persist();
        }
        done
    }

    /// Terminate a job's process (if any) and mark it completed right away.
    /// Returns `false` if the job is not active.
    pub async fn kill(&self, job_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        if let Some(mut live) = state.live.remove(job_id) {
            live.control.kill();
        }
        let killed = state.complete(
            job_id,
            JobStatus::Completed,
            payload(json!({ "reason": "killed" })),
            self.inner.max_completed,
        );
        if killed {
            self.persist();
            tracing::info!(job_id, "Killed job");
        }
        killed
    }

    /// Deliver a follow-up message.
    ///
    /// A live process gets the message through its adapter. A completed job
    /// with a recorded session on a resumable adapter is continued in a new
    /// process. Anything else is dropped without changing state.
    pub async fn send(&self, job_id: &str, message: &str) -> Result<SendOutcome> {
        let live = {
            let state = self.inner.state.lock().await;
            state.live.get(job_id).and_then(|live| {
                state
                    .job(job_id)
                    .map(|job| (live.control.input.clone(), job.agent.clone()))
            })
        };

        if let Some((input, agent)) = live {
            let adapter = self.adapter(&agent)?;
            adapter.send_input(&input, message).await?;

            let mut state = self.inner.state.lock().await;
            if state.input_sent(job_id, message) {
                self.persist();
            }
            tracing::debug!(job_id, "Delivered message to live process");
            return Ok(SendOutcome::Delivered);
        }

        let mut state = self.inner.state.lock().await;
        let Some(pos) = state.completed.iter().position(|j| j.id == job_id) else {
            return Ok(dropped(job_id, "no live process"));
        };
        let job = &state.completed[pos];
        let Some(adapter) = self.inner.adapters.get(&job.agent) else {
            return Ok(dropped(job_id, "adapter not registered"));
        };
        if !adapter.can_resume() {
            return Ok(dropped(job_id, "adapter cannot resume"));
        }
        let Some(session_id) = job.session_id.clone() else {
            return Ok(dropped(job_id, "no session recorded"));
        };

        let mut process = adapter.resume(&ResumeOptions {
            session_id,
            task: message.to_string(),
            cwd: job.cwd.clone(),
            mode: job.mode,
        })?;

        let Some(mut job) = state.completed.remove(pos) else {
            return Ok(dropped(job_id, "job vanished"));
        };
        job.reopen();
        state.active.push(job);

        let run = state.next_run();
        let outputs = process.take_outputs();
        let RunningProcess { control, exit, .. } = process;
        state.live.insert(job_id.to_string(), LiveProcess { run, control });
        state.input_sent(job_id, message);
        self.persist();
        drop(state);

        tracing::info!(job_id, "Resumed job session");
        self.drive(job_id.to_string(), run, adapter, outputs, exit);
        Ok(SendOutcome::Resumed)
    }

    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        self.inner.state.lock().await.job(job_id).cloned()
    }

    /// Active jobs followed by completed jobs (newest first).
    pub async fn list_jobs(&self) -> Vec<Job> {
        let state = self.inner.state.lock().await;
        state
            .active
            .iter()
            .chain(state.completed.iter())
            .cloned()
            .collect()
    }

    /// Events after the `since` cursor, or the whole retained tail.
    pub async fn events(&self, job_id: &str, since: Option<&str>) -> Vec<Event> {
        self.inner.state.lock().await.events.get_since(job_id, since)
    }

    fn drive(
        &self,
        job_id: String,
        run: u64,
        adapter: Arc<dyn Adapter>,
        outputs: Vec<ByteStream>,
        exit: ExitWaiter,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut events = adapter.parse_output(merge_streams(outputs));
            let exited = exit.wait();
            tokio::pin!(exited);

            let mut output_open = true;
            let exit = loop {
                tokio::select! {
                    event = events.next(), if output_open => match event {
                        Some(event) => manager.apply_event(&job_id, run, event).await,
                        None => output_open = false,
                    },
                    exit = &mut exited => break exit,
                }
            };

            // Output already in the pipes lands before the terminal event.
            // Children the agent left behind may keep the pipes open, so the
            // wait is bounded.
            if output_open {
                let grace = tokio::time::sleep(EXIT_DRAIN_GRACE);
                tokio::pin!(grace);
                while output_open {
                    tokio::select! {
                        event = events.next() => match event {
                            Some(event) => manager.apply_event(&job_id, run, event).await,
                            None => output_open = false,
                        },
                        _ = &mut grace => break,
                    }
                }
            }
            manager.finish_run(&job_id, run, exit).await;

            if output_open {
                while let Some(event) = events.next().await {
                    manager.apply_event(&job_id, run, event).await;
                }
            }
        });
    }

    async fn apply_event(&self, job_id: &str, run: u64, event: Event) {
        let mut state = self.inner.state.lock().await;
        let Some(job) = state.job_mut(job_id) else {
            tracing::debug!(job_id, kind = %event.kind, "Dropping event for evicted job");
            return;
        };
        if let Some(session_id) = event.session_id() {
            if job.observe_session(session_id) {
                tracing::debug!(job_id, session_id, "Captured agent session");
            }
        }

        let applies_status = state.is_current_run(job_id, run);
        if event.kind == EventKind::NeedsInput && applies_status {
            let question = event.payload.get("question").cloned().unwrap_or(Value::Null);
            let options = event.payload.get("options").cloned();
            if !state.await_input(job_id, question, options) {
                state.commit(job_id, event);
            }
        } else {
            state.commit(job_id, event);
        }
        self.persist();
    }

    async fn finish_run(&self, job_id: &str, run: u64, exit: ProcessExit) {
        let mut state = self.inner.state.lock().await;
        if !state.is_current_run(job_id, run) {
            tracing::debug!(job_id, run, "Ignoring exit of superseded run");
            return;
        }
        let status = if exit.success() {
            JobStatus::Completed
        } else {
            JobStatus::Error
        };
        if state.complete(
            job_id,
            status,
            payload(json!({ "exit_code": exit.code })),
            self.inner.max_completed,
        ) {
            self.persist();
            tracing::info!(job_id, %status, exit_code = ?exit.code, "Job finished");
        }
    }
}

fn dropped(job_id: &str, reason: &str) -> SendOutcome {
    tracing::warn!(job_id, reason, "Dropping message for job");
    SendOutcome::Dropped
}
