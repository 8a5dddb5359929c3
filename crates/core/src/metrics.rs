//! Prometheus-style counters for the webhook relay, exposed as text
//! exposition format at `GET /metrics` rather than a JSON snapshot, since
//! this is a Prometheus-scraped surface in the original.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free-read, sharded-map counters keyed by label tuples, matching the
/// fast-read/slow-write-insert idiom used elsewhere in this codebase for
/// per-key state.
#[derive(Default)]
pub struct Metrics {
    requests_total: RwLock<HashMap<(String, String, u16), AtomicU64>>,
    forward_total: RwLock<HashMap<(String, &'static str), AtomicU64>>,
    forward_latency_seconds_sum: RwLock<HashMap<String, AtomicU64>>,
    forward_latency_seconds_count: RwLock<HashMap<String, AtomicU64>>,
    config_reload_total: RwLock<HashMap<&'static str, AtomicU64>>,
    hmac_verify_total: RwLock<HashMap<(String, &'static str), AtomicU64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, source: &str, route: &str, status: u16) {
        increment(&self.requests_total, (source.to_string(), route.to_string(), status));
    }

    pub fn record_forward(&self, route: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        increment(&self.forward_total, (route.to_string(), result));
    }

    pub fn record_forward_latency(&self, route: &str, seconds: f64) {
        let micros = (seconds * 1_000_000.0).round() as u64;
        increment_by(&self.forward_latency_seconds_sum, route.to_string(), micros);
        increment(&self.forward_latency_seconds_count, route.to_string());
    }

    pub fn record_config_reload(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        increment(&self.config_reload_total, result);
    }

    pub fn record_hmac_verify(&self, route: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        increment(&self.hmac_verify_total, (route.to_string(), result));
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP requests_total Inbound webhook requests.");
        let _ = writeln!(out, "# TYPE requests_total counter");
        if let Ok(m) = self.requests_total.read() {
            for ((source, route, status), v) in m.iter() {
                let _ = writeln!(
                    out,
                    "requests_total{{source=\"{source}\",route=\"{route}\",status=\"{status}\"}} {}",
                    v.load(Ordering::Relaxed)
                );
            }
        }

        let _ = writeln!(out, "# HELP forward_total Outbound forward attempts by final outcome.");
        let _ = writeln!(out, "# TYPE forward_total counter");
        if let Ok(m) = self.forward_total.read() {
            for ((route, result), v) in m.iter() {
                let _ = writeln!(
                    out,
                    "forward_total{{route=\"{route}\",result=\"{result}\"}} {}",
                    v.load(Ordering::Relaxed)
                );
            }
        }

        let _ = writeln!(out, "# HELP forward_latency_seconds Outbound forward latency.");
        let _ = writeln!(out, "# TYPE forward_latency_seconds summary");
        if let (Ok(sums), Ok(counts)) = (
            self.forward_latency_seconds_sum.read(),
            self.forward_latency_seconds_count.read(),
        ) {
            for (route, sum) in sums.iter() {
                let count = counts.get(route).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
                let sum_secs = sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
                let _ = writeln!(out, "forward_latency_seconds_sum{{route=\"{route}\"}} {sum_secs}");
                let _ = writeln!(out, "forward_latency_seconds_count{{route=\"{route}\"}} {count}");
            }
        }

        let _ = writeln!(out, "# HELP config_reload_total Rule document reload attempts.");
        let _ = writeln!(out, "# TYPE config_reload_total counter");
        if let Ok(m) = self.config_reload_total.read() {
            for (result, v) in m.iter() {
                let _ = writeln!(out, "config_reload_total{{result=\"{result}\"}} {}", v.load(Ordering::Relaxed));
            }
        }

        let _ = writeln!(out, "# HELP hmac_verify_total HMAC body verification outcomes.");
        let _ = writeln!(out, "# TYPE hmac_verify_total counter");
        if let Ok(m) = self.hmac_verify_total.read() {
            for ((route, result), v) in m.iter() {
                let _ = writeln!(
                    out,
                    "hmac_verify_total{{route=\"{route}\",result=\"{result}\"}} {}",
                    v.load(Ordering::Relaxed)
                );
            }
        }

        out
    }
}

fn increment<K: std::hash::Hash + Eq + Clone>(map: &RwLock<HashMap<K, AtomicU64>>, key: K) {
    increment_by(map, key, 1);
}

fn increment_by<K: std::hash::Hash + Eq + Clone>(
    map: &RwLock<HashMap<K, AtomicU64>>,
    key: K,
    by: u64,
) {
    if let Ok(m) = map.read()
        && let Some(counter) = m.get(&key)
    {
        counter.fetch_add(by, Ordering::Relaxed);
        return;
    }
    if let Ok(mut m) = map.write() {
        m.entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }
}
