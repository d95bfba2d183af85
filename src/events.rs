//! Normalized job events and the timestamp clock that orders them.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open key-value payload carried by every event.
pub type Payload = serde_json::Map<String, Value>;

/// Payload keys that may carry a resumable session token, in priority order.
pub const SESSION_ID_KEYS: &[&str] = &["session_id", "thread_id", "sessionID", "sessionId"];

static LAST_STAMP_NANOS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current time as a fixed-width RFC 3339 string.
///
/// Successive calls within one process return strictly increasing values, so
/// string comparison of two stamps always agrees with the order they were taken.
pub fn now_timestamp() -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let previous = LAST_STAMP_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or_else(|last| last);
    let stamped = now.max(previous.saturating_add(1));
    DateTime::<Utc>::from_timestamp_nanos(stamped).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Kind of an event.
///
/// Known kinds map to variants; anything else an agent reports is kept verbatim
/// in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Started,
    Progress,
    ToolCall,
    FileEdit,
    NeedsInput,
    InputSent,
    Error,
    Completed,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::ToolCall => "tool_call",
            Self::FileEdit => "file_edit",
            Self::NeedsInput => "needs_input",
            Self::InputSent => "input_sent",
            Self::Error => "error",
            Self::Completed => "completed",
            Self::Other(other) => other,
        }
    }

    /// Select a kind from an untyped JSON object: its `type` string, or
    /// `progress` when the field is absent or not a string.
    pub fn from_payload(payload: &Payload) -> Self {
        payload
            .get("type")
            .and_then(Value::as_str)
            .map(Self::from)
            .unwrap_or(Self::Progress)
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "started" => Self::Started,
            "progress" => Self::Progress,
            "tool_call" => Self::ToolCall,
            "file_edit" => Self::FileEdit,
            "needs_input" => Self::NeedsInput,
            "input_sent" => Self::InputSent,
            "error" => Self::Error,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized unit of progress, output or status for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub payload: Payload,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(kind: EventKind, job_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            timestamp: now_timestamp(),
            kind,
            job_id: job_id.into(),
            payload,
        }
    }

    /// Default schema-on-read mapping: the object's `type` selects the kind and
    /// the whole object becomes the payload. The job id is filled in later.
    pub fn from_object(payload: Payload) -> Self {
        Self::new(EventKind::from_payload(&payload), "", payload)
    }

    /// Session token carried by this event under any accepted alias.
    pub fn session_id(&self) -> Option<&str> {
        SESSION_ID_KEYS
            .iter()
            .filter_map(|key| self.payload.get(*key).and_then(Value::as_str))
            .find(|id| !id.is_empty())
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Turn a `json!` object literal into a payload map. Non-objects are wrapped
/// under `value`.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_strictly_increase() {
        let stamps: Vec<String> = (0..1000).map(|_| now_timestamp()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(stamps[0].contains('T'));
        assert!(stamps[0].ends_with('Z'));
    }

    #[test]
    fn kind_from_payload_defaults_to_progress() {
        assert_eq!(EventKind::from_payload(&payload(json!({"message": "hi"}))), EventKind::Progress);
        assert_eq!(EventKind::from_payload(&payload(json!({"type": 7}))), EventKind::Progress);
        assert_eq!(
            EventKind::from_payload(&payload(json!({"type": "tool_call"}))),
            EventKind::ToolCall
        );
        assert_eq!(
            EventKind::from_payload(&payload(json!({"type": "thread.started"}))),
            EventKind::Other("thread.started".into())
        );
    }

    #[test]
    fn event_serializes_kind_as_type() {
        let event = Event::new(EventKind::NeedsInput, "job-1", payload(json!({"question": "Q"})));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "needs_input");
        assert_eq!(value["job_id"], "job-1");

        let custom: Event = serde_json::from_value(json!({
            "timestamp": "2026-01-01T00:00:00.000000000Z",
            "type": "turn.completed",
            "extra": true
        }))
        .unwrap();
        assert_eq!(custom.kind, EventKind::Other("turn.completed".into()));
        assert!(custom.payload.is_empty());
    }

    #[test]
    fn session_id_aliases() {
        let event = Event::from_object(payload(json!({"type": "thread.started", "thread_id": "t-1"})));
        assert_eq!(event.session_id(), Some("t-1"));

        let event = Event::from_object(payload(json!({"session_id": "", "sessionID": "s-2"})));
        assert_eq!(event.session_id(), Some("s-2"));

        let event = Event::from_object(payload(json!({"sessionId": 42})));
        assert_eq!(event.session_id(), None);
    }
}
