//! Line-oriented JSON event parser.
//!
//! Agents print one JSON object per line. Chunks arriving from the process
//! are buffered until a newline completes a line; each line is decoded and
//! handed to a mapping function. Lines that fail to decode become `error`
//! events and parsing carries on with the next line.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::agent::mux::ByteStream;
use crate::events::{Event, EventKind, Payload, payload};

/// A boxed stream of parsed events.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Parse with the default mapping (`type` field selects the kind).
pub fn parse_json_lines(input: ByteStream) -> EventStream {
    parse_json_lines_with(input, Event::from_object)
}

/// Parse `input` into events, converting each decoded object with `map`.
///
/// The returned stream ends when `input` ends. A trailing line without a
/// newline is still parsed. A read error yields one `error` event and parsing
/// continues, since other merged sources may still be producing output.
pub fn parse_json_lines_with<F>(input: ByteStream, map: F) -> EventStream
where
    F: Fn(Payload) -> Event + Send + 'static,
{
    let state = LineParser {
        input,
        map,
        buffer: Vec::new(),
        scanned: 0,
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }
            match state.input.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Agent output stream failed");
                    state.ready.push_back(Event::new(
                        EventKind::Error,
                        "",
                        payload(json!({ "message": format!("output stream failed: {e}") })),
                    ));
                }
                None => {
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    state.push_line(&rest);
                }
            }
        }
    }))
}

struct LineParser<F> {
    input: ByteStream,
    map: F,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known not to contain a newline.
    scanned: usize,
    ready: VecDeque<Event>,
    finished: bool,
}

impl<F> LineParser<F>
where
    F: Fn(Payload) -> Event,
{
    fn drain_lines(&mut self) {
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scanned = 0;
            self.push_line(&line[..end]);
        }
        self.scanned = self.buffer.len();
    }

    fn push_line(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        let event = match serde_json::from_str::<Payload>(line) {
            Ok(object) => (self.map)(object),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed agent output line");
                Event::new(
                    EventKind::Error,
                    "",
                    payload(json!({ "message": e.to_string(), "line": line })),
                )
            }
        };
        self.ready.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;

    fn chunks(parts: &[&str]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn parse(parts: &[&str]) -> Vec<Event> {
        parse_json_lines(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn parses_partial_lines() {
        let events = parse(&[
            "{\"type\":\"progress\",\"message\":\"a\"}\n{\"type\":\"progress\"",
            ",\"message\":\"b\"}\n",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].str_field("message"), Some("a"));
        assert_eq!(events[1].str_field("message"), Some("b"));
    }

    #[tokio::test]
    async fn one_event_per_line_for_every_split() {
        let text = "{\"type\":\"started\"}\n{\"type\":\"tool_call\",\"name\":\"grep\"}\n{\"message\":\"héllo\"}\n";
        let bytes = text.as_bytes();
        for split_a in 0..bytes.len() {
            for split_b in split_a..bytes.len() {
                let items: Vec<io::Result<Bytes>> = vec![
                    Ok(Bytes::copy_from_slice(&bytes[..split_a])),
                    Ok(Bytes::copy_from_slice(&bytes[split_a..split_b])),
                    Ok(Bytes::copy_from_slice(&bytes[split_b..])),
                ];
                let events: Vec<Event> =
                    parse_json_lines(Box::pin(stream::iter(items))).collect().await;
                let kinds: Vec<EventKind> = events.iter().map(|e| e.kind.clone()).collect();
                assert_eq!(
                    kinds,
                    [EventKind::Started, EventKind::ToolCall, EventKind::Progress],
                    "splits at {split_a}/{split_b}"
                );
                assert_eq!(events[2].str_field("message"), Some("héllo"));
            }
        }
    }

    #[tokio::test]
    async fn byte_at_a_time() {
        let text = "{\"type\":\"file_edit\",\"path\":\"src/lib.rs\"}\n";
        let parts: Vec<String> = text.chars().map(String::from).collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let events = parse(&parts).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FileEdit);
    }

    #[tokio::test]
    async fn malformed_lines_become_error_events_in_order() {
        let events = parse(&[
            "{\"type\":\"progress\",\"message\":\"a\"}\n",
            "{bad json}\n",
            "plain text from stderr\n",
            "{\"type\":\"progress\",\"message\":\"b\"}\n",
            "[1, 2]\n",
        ])
        .await;

        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["progress", "error", "error", "progress", "error"]);
        assert_eq!(events[1].str_field("line"), Some("{bad json}"));
        assert!(events[1].str_field("message").is_some());
        assert_eq!(events[2].str_field("line"), Some("plain text from stderr"));
        assert_eq!(events[3].str_field("message"), Some("b"));
    }

    #[tokio::test]
    async fn skips_blank_lines_and_trims() {
        let events = parse(&["\n   \n\t{\"type\":\"completed\"}  \r\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Completed);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_parsed() {
        let events = parse(&["{\"type\":\"progress\"}\n{\"type\":\"com", "pleted\"}"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Completed);
    }

    #[tokio::test]
    async fn read_error_becomes_event_and_parsing_continues() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"type\":\"progress\"}\n")),
            Err(io::Error::other("pipe closed")),
            Ok(Bytes::from_static(b"{\"type\":\"completed\"}\n")),
        ];
        let events: Vec<Event> = parse_json_lines(Box::pin(stream::iter(items))).collect().await;
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["progress", "error", "completed"]);
        assert!(events[1].str_field("message").unwrap().contains("pipe closed"));
    }

    #[tokio::test]
    async fn failed_source_does_not_stall_merged_output() {
        use crate::agent::mux::merge_streams;

        let failing: ByteStream = Box::pin(stream::iter(vec![Err(io::Error::other("boom"))]));
        let lines: String = (0..500)
            .map(|n| format!("{{\"type\":\"progress\",\"n\":{n}}}\n"))
            .collect();
        let busy = chunks(&[lines.as_str()]);

        let events: Vec<Event> = parse_json_lines(merge_streams(vec![failing, busy]))
            .collect()
            .await;
        let progress = events.iter().filter(|e| e.kind == EventKind::Progress).count();
        assert_eq!(progress, 500);
        assert_eq!(events.iter().filter(|e| e.kind == EventKind::Error).count(), 1);
    }

    #[tokio::test]
    async fn custom_mapping_is_applied() {
        let events: Vec<Event> = parse_json_lines_with(chunks(&["{\"kind\":\"x\"}\n"]), |object| {
            Event::new(EventKind::ToolCall, "job-9", object)
        })
        .collect()
        .await;
        assert_eq!(events[0].kind, EventKind::ToolCall);
        assert_eq!(events[0].job_id, "job-9");
        assert_eq!(events[0].str_field("kind"), Some("x"));
    }
}
