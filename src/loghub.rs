use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of each live-subscriber channel. Slow subscribers skip ahead.
const SUBSCRIBER_CHANNEL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Epoch milliseconds.
    pub ts: i64,
    pub line: String,
}

struct Channel {
    buffer: VecDeque<LogEntry>,
    tx: broadcast::Sender<String>,
}

impl Channel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CHANNEL);
        Self {
            buffer: VecDeque::new(),
            tx,
        }
    }
}

/// Per-user progress log: a bounded ring buffer for catch-up polling plus a
/// broadcast channel for live streaming. Process-local, never persisted.
#[derive(Clone)]
pub struct LogHub {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    capacity: usize,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&self, user_id: &str, line: impl Into<String>) {
        let entry = LogEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            line: line.into(),
        };
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let channel = channels
            .entry(user_id.to_string())
            .or_insert_with(Channel::new);

        // No receivers is fine; the buffer still records the line.
        let _ = channel.tx.send(entry.line.clone());
        channel.buffer.push_back(entry);
        while channel.buffer.len() > self.capacity {
            channel.buffer.pop_front();
        }
    }

    /// Entries newer than `since_ms`; `0` returns the whole buffer.
    pub fn since(&self, user_id: &str, since_ms: i64) -> Vec<LogEntry> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(user_id)
            .map(|c| {
                c.buffer
                    .iter()
                    .filter(|e| since_ms == 0 || e.ts > since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live lines for one user. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(user_id.to_string())
            .or_insert_with(Channel::new)
            .tx
            .subscribe()
    }

    pub fn sink(&self, user_id: &str) -> LogSink {
        LogSink {
            target: Some((self.clone(), user_id.to_string())),
        }
    }
}

/// Where a scrape run writes its operator-visible lines. Every line also goes
/// to tracing.
#[derive(Clone, Default)]
pub struct LogSink {
    target: Option<(LogHub, String)>,
}

impl LogSink {
    /// A sink that only emits tracing events.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn line(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "jobscrape::scrape", "{line}");
        if let Some((hub, user_id)) = &self.target {
            hub.append(user_id, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_drops_oldest_beyond_capacity() {
        let hub = LogHub::new(3);
        for i in 0..5 {
            hub.append("u1", format!("line {i}"));
        }
        let lines: Vec<_> = hub.since("u1", 0).into_iter().map(|e| e.line).collect();
        assert_eq!(lines, ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn users_do_not_share_buffers() {
        let hub = LogHub::new(10);
        hub.append("alice", "a");
        hub.append("bob", "b");
        assert_eq!(hub.since("alice", 0).len(), 1);
        assert_eq!(hub.since("bob", 0)[0].line, "b");
        assert!(hub.since("carol", 0).is_empty());
    }

    #[test]
    fn since_filters_by_timestamp() {
        let hub = LogHub::new(10);
        hub.append("u1", "old");
        let cutoff = hub.since("u1", 0)[0].ts;
        std::thread::sleep(std::time::Duration::from_millis(5));
        hub.append("u1", "new");

        let newer = hub.since("u1", cutoff);
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].line, "new");
    }

    #[tokio::test]
    async fn subscribers_receive_appended_lines() {
        let hub = LogHub::new(10);
        let mut first = hub.subscribe("u1");
        let mut second = hub.subscribe("u1");
        let mut other = hub.subscribe("u2");

        hub.sink("u1").line("[request] page=1");

        assert_eq!(first.recv().await.unwrap(), "[request] page=1");
        assert_eq!(second.recv().await.unwrap(), "[request] page=1");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn detached_sink_is_silent_for_the_hub() {
        let hub = LogHub::new(10);
        LogSink::detached().line("nothing");
        assert!(hub.since("u1", 0).is_empty());
    }
}
