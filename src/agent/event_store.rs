//! Event store — bounded per-job event tails with cursor reads.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::events::Event;

/// Per-job ring buffers of events. Oldest events are evicted first once a
/// tail reaches capacity.
#[derive(Debug)]
pub struct EventStore {
    capacity: usize,
    tails: HashMap<String, VecDeque<Event>>,
}

impl EventStore {
    /// Create a store holding at most `capacity` events per job.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tails: HashMap::new(),
        }
    }

    /// Append an event to a job's tail, evicting the oldest past capacity.
    pub fn append(&mut self, job_id: &str, event: Event) {
        let tail = self.tails.entry(job_id.to_string()).or_default();
        tail.push_back(event);
        while tail.len() > self.capacity {
            tail.pop_front();
        }
    }

    /// Events with a timestamp strictly greater than `since`, oldest first.
    /// Without a cursor the whole retained tail is returned.
    pub fn get_since(&self, job_id: &str, since: Option<&str>) -> Vec<Event> {
        let Some(tail) = self.tails.get(job_id) else {
            return Vec::new();
        };
        match since {
            Some(cursor) => tail
                .iter()
                .filter(|e| e.timestamp.as_str() > cursor)
                .cloned()
                .collect(),
            None => tail.iter().cloned().collect(),
        }
    }

    pub fn len(&self, job_id: &str) -> usize {
        self.tails.get(job_id).map_or(0, VecDeque::len)
    }

    /// Drop a job's tail entirely.
    pub fn remove(&mut self, job_id: &str) {
        self.tails.remove(job_id);
    }

    /// Copy of every tail, keyed by job ID.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Event>> {
        self.tails
            .iter()
            .map(|(id, tail)| (id.clone(), tail.iter().cloned().collect()))
            .collect()
    }

    /// Load tails from a snapshot, respecting capacity.
    pub fn restore(&mut self, tails: BTreeMap<String, Vec<Event>>) {
        for (job_id, events) in tails {
            for event in events {
                self.append(&job_id, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, payload};
    use serde_json::json;

    fn event(job: &str, n: usize) -> Event {
        Event::new(EventKind::Progress, job, payload(json!({ "n": n })))
    }

    fn numbers(events: &[Event]) -> Vec<u64> {
        events.iter().map(|e| e.payload["n"].as_u64().unwrap()).collect()
    }

    #[test]
    fn get_since_is_exclusive() {
        let mut store = EventStore::new(10);
        for n in 0..5 {
            store.append("job", event("job", n));
        }
        let all = store.get_since("job", None);
        assert_eq!(all.len(), 5);

        let after = store.get_since("job", Some(all[1].timestamp.as_str()));
        assert_eq!(numbers(&after), [2, 3, 4]);

        let newest = all.last().unwrap().timestamp.as_str();
        assert!(store.get_since("job", Some(newest)).is_empty());
    }

    #[test]
    fn cursor_before_everything_returns_all() {
        let mut store = EventStore::new(10);
        store.append("job", event("job", 0));
        assert_eq!(store.get_since("job", Some("")).len(), 1);
        assert_eq!(store.get_since("job", Some("0000")).len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut store = EventStore::new(3);
        for n in 0..3 {
            store.append("job", event("job", n));
        }
        for n in 3..5 {
            store.append("job", event("job", n));
        }
        assert_eq!(store.len("job"), 3);
        assert_eq!(numbers(&store.get_since("job", None)), [2, 3, 4]);
    }

    #[test]
    fn tails_are_per_job() {
        let mut store = EventStore::new(2);
        store.append("a", event("a", 1));
        store.append("b", event("b", 2));
        store.append("b", event("b", 3));
        store.append("b", event("b", 4));

        assert_eq!(numbers(&store.get_since("a", None)), [1]);
        assert_eq!(numbers(&store.get_since("b", None)), [3, 4]);
        assert!(store.get_since("missing", None).is_empty());

        store.remove("b");
        assert_eq!(store.len("b"), 0);
    }

    #[test]
    fn snapshot_and_restore() {
        let mut store = EventStore::new(5);
        store.append("a", event("a", 1));
        store.append("a", event("a", 2));
        let snapshot = store.snapshot();

        let mut restored = EventStore::new(1);
        restored.restore(snapshot.clone());
        assert_eq!(numbers(&restored.get_since("a", None)), [2]);

        let mut roomy = EventStore::new(5);
        roomy.restore(snapshot.clone());
        assert_eq!(roomy.snapshot(), snapshot);
    }
}
