//! Minimal metrics for the relay.
//!
//! No external dependencies: labelled counters backed by `DashMap` and
//! atomics, rendered in Prometheus text exposition format. Labels are
//! flattened into sorted key vectors for deterministic output.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();

        let counter = self.map.entry(key).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 when never incremented).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        self.map
            .get(&key)
            .map(|c| c.value().load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let label_str = r
                .key()
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(
                out,
                "{name}{{{label_str}}} {}",
                r.value().load(Ordering::Relaxed)
            );
        }
    }
}

/// Counters the relay maintains.
#[derive(Default)]
pub struct RelayMetrics {
    /// Labelled by `outcome` (accepted_forward, duplicate, ...).
    pub ingest: CounterVec,
    /// Labelled by `result` (derived, bad_signature, ...).
    pub handshake: CounterVec,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prometheus text exposition of all counters.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.ingest.render("palaver_ingest_total", &mut out);
        self.handshake.render("palaver_handshake_total", &mut out);
        out
    }
}
