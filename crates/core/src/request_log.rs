//! In-memory ring buffers backing the read-only dashboard feeds
//! (`/api/recent-requests`, `/api/recent-payloads`, `/api/stats`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// A single webhook request outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub timestamp: i64,
    pub request_id: String,
    pub source: String,
    pub route: Option<String>,
    pub status: u16,
    pub forwarded: Option<bool>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Query parameters for filtering request logs.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub route: Option<String>,
    pub status: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub items: Vec<RequestLogEntry>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// In-memory ring buffer for request logs with broadcast notification.
pub struct RequestLogStore {
    entries: RwLock<VecDeque<RequestLogEntry>>,
    capacity: usize,
    tx: broadcast::Sender<RequestLogEntry>,
}

impl RequestLogStore {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            tx,
        }
    }

    pub fn push(&self, entry: RequestLogEntry) {
        let _ = self.tx.send(entry.clone());
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestLogEntry> {
        self.tx.subscribe()
    }

    pub fn query(&self, q: &LogQuery) -> LogPage {
        let page = q.page.unwrap_or(1).max(1);
        let page_size = q.page_size.unwrap_or(50).clamp(1, 200);

        let entries = self.entries.read().unwrap();
        let filtered: Vec<&RequestLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| {
                if let Some(ref r) = q.route
                    && e.route.as_deref() != Some(r.as_str())
                {
                    return false;
                }
                if let Some(ref s) = q.status {
                    let matches = match s.as_str() {
                        "2xx" => (200..300).contains(&e.status),
                        "4xx" => (400..500).contains(&e.status),
                        "5xx" => (500..600).contains(&e.status),
                        other => other.parse::<u16>().map(|code| e.status == code).unwrap_or(true),
                    };
                    if !matches {
                        return false;
                    }
                }
                if let Some(from) = q.from
                    && e.timestamp < from
                {
                    return false;
                }
                if let Some(to) = q.to
                    && e.timestamp > to
                {
                    return false;
                }
                true
            })
            .collect();

        let total = filtered.len();
        let start = (page - 1) * page_size;
        let items = filtered.into_iter().skip(start).take(page_size).cloned().collect();

        LogPage {
            items,
            total,
            page,
            page_size,
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        let entries = self.entries.read().unwrap();
        let total = entries.len();
        let errors = entries.iter().filter(|e| e.status >= 400).count();
        let forwarded_ok = entries.iter().filter(|e| e.forwarded == Some(true)).count();
        let avg_latency = if total > 0 {
            entries.iter().map(|e| e.duration_ms).sum::<u64>() / total as u64
        } else {
            0
        };
        serde_json::json!({
            "total_entries": total,
            "capacity": self.capacity,
            "error_count": errors,
            "forwarded_ok_count": forwarded_ok,
            "avg_latency_ms": avg_latency,
        })
    }
}

/// A sanitized payload snapshot kept for the `/api/recent-payloads` feed.
/// Always holds the output of [`crate::transform::sanitize`] — raw
/// payloads are never retained in memory beyond request handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadLogEntry {
    pub timestamp: i64,
    pub request_id: String,
    pub source: String,
    pub route: Option<String>,
    pub sanitized_payload: Value,
}

pub struct PayloadLogStore {
    entries: RwLock<VecDeque<PayloadLogEntry>>,
    capacity: usize,
}

impl PayloadLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: PayloadLogEntry) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<PayloadLogEntry> {
        let entries = self.entries.read().unwrap();
        entries.iter().rev().take(limit).cloned().collect()
    }
}
