//! In-process metrics registry with text exposition.
//!
//! Counters, gauges and fixed-bucket histograms keyed by label set,
//! rendered in the Prometheus text format on `GET /metrics`. Every
//! family name carries the configured namespace prefix.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::data::breaker::BreakerState;

/// Request-handling latency buckets, seconds.
pub const HTTP_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// External provider call latency buckets, seconds.
pub const EXTERNAL_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

type Labels = Vec<(&'static str, String)>;

#[derive(Debug, Clone)]
struct Histogram {
    bounds: &'static [f64],
    /// Non-cumulative per-bucket counts; rendered cumulatively.
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: vec![0; bounds.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        if let Some(i) = self.bounds.iter().position(|b| value <= *b) {
            self.counts[i] += 1;
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Registry {
    counters: BTreeMap<&'static str, BTreeMap<Labels, u64>>,
    gauges: BTreeMap<&'static str, BTreeMap<Labels, f64>>,
    histograms: BTreeMap<&'static str, BTreeMap<Labels, Histogram>>,
}

#[derive(Debug)]
pub struct Metrics {
    namespace: String,
    registry: Mutex<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new("propbet")
    }
}

impl Metrics {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.trim_end_matches('_').to_string(),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // -- Primitives ---------------------------------------------------------

    fn inc_counter(&self, name: &'static str, labels: Labels) {
        let mut reg = self.registry.lock();
        *reg.counters.entry(name).or_default().entry(labels).or_insert(0) += 1;
    }

    fn set_gauge(&self, name: &'static str, labels: Labels, value: f64) {
        let mut reg = self.registry.lock();
        reg.gauges.entry(name).or_default().insert(labels, value);
    }

    fn observe(&self, name: &'static str, bounds: &'static [f64], labels: Labels, value: f64) {
        let mut reg = self.registry.lock();
        reg.histograms
            .entry(name)
            .or_default()
            .entry(labels)
            .or_insert_with(|| Histogram::new(bounds))
            .observe(value);
    }

    // -- Typed helpers ------------------------------------------------------

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, seconds: f64) {
        self.inc_counter(
            "http_requests_total",
            vec![
                ("method", method.to_string()),
                ("path", path.to_string()),
                ("status", status.to_string()),
            ],
        );
        self.observe(
            "http_request_duration_seconds",
            HTTP_BUCKETS,
            vec![("method", method.to_string()), ("path", path.to_string())],
            seconds,
        );
    }

    /// An upstream call that actually went out.
    pub fn observe_external_call(&self, provider: &str, outcome: &str, seconds: f64) {
        self.inc_external_request(provider, outcome);
        self.observe(
            "external_request_duration_seconds",
            EXTERNAL_BUCKETS,
            vec![("provider", provider.to_string())],
            seconds,
        );
    }

    /// Count a request outcome without a latency sample (short-circuited calls).
    pub fn inc_external_request(&self, provider: &str, outcome: &str) {
        self.inc_counter(
            "external_requests_total",
            vec![("provider", provider.to_string()), ("outcome", outcome.to_string())],
        );
    }

    pub fn set_breaker_state(&self, provider: &str, state: BreakerState) {
        self.set_gauge(
            "circuit_breaker_state",
            vec![("provider", provider.to_string())],
            state.gauge_value(),
        );
    }

    pub fn set_resolution_queue_depth(&self, depth: usize) {
        self.set_gauge("resolution_queue_depth", Vec::new(), depth as f64);
    }

    pub fn set_lifecycle_queue_depth(&self, depth: usize) {
        self.set_gauge("lifecycle_queue_depth", Vec::new(), depth as f64);
    }

    pub fn inc_resolution_outcome(&self, outcome: &str) {
        self.inc_counter(
            "resolution_outcomes_total",
            vec![("outcome", outcome.to_string())],
        );
    }

    pub fn inc_manual_review(&self, reason: &str) {
        self.inc_counter("manual_reviews_total", vec![("reason", reason.to_string())]);
    }

    pub fn inc_baseline_capture(&self, outcome: &str) {
        self.inc_counter(
            "baseline_captures_total",
            vec![("outcome", outcome.to_string())],
        );
    }

    // -- Reads --------------------------------------------------------------

    /// Current value of a counter, or 0 if never incremented.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let reg = self.registry.lock();
        reg.counters
            .get(name)
            .and_then(|family| family.iter().find(|(l, _)| labels_match(l, labels)))
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let reg = self.registry.lock();
        reg.gauges
            .get(name)
            .and_then(|family| family.iter().find(|(l, _)| labels_match(l, labels)))
            .map(|(_, v)| *v)
    }

    /// Render every family in the text exposition format.
    pub fn render(&self) -> String {
        let reg = self.registry.lock();
        let ns = &self.namespace;
        let mut out = String::new();

        for (name, family) in &reg.counters {
            let _ = writeln!(out, "# TYPE {ns}_{name} counter");
            for (labels, value) in family {
                let _ = writeln!(out, "{ns}_{name}{} {value}", format_labels(labels, None));
            }
        }

        for (name, family) in &reg.gauges {
            let _ = writeln!(out, "# TYPE {ns}_{name} gauge");
            for (labels, value) in family {
                let _ = writeln!(out, "{ns}_{name}{} {value}", format_labels(labels, None));
            }
        }

        for (name, family) in &reg.histograms {
            let _ = writeln!(out, "# TYPE {ns}_{name} histogram");
            for (labels, h) in family {
                let mut cumulative = 0;
                for (bound, count) in h.bounds.iter().zip(&h.counts) {
                    cumulative += count;
                    let le = bound.to_string();
                    let _ = writeln!(
                        out,
                        "{ns}_{name}_bucket{} {cumulative}",
                        format_labels(labels, Some(&le))
                    );
                }
                let _ = writeln!(
                    out,
                    "{ns}_{name}_bucket{} {}",
                    format_labels(labels, Some("+Inf")),
                    h.count
                );
                let _ = writeln!(out, "{ns}_{name}_sum{} {}", format_labels(labels, None), h.sum);
                let _ = writeln!(out, "{ns}_{name}_count{} {}", format_labels(labels, None), h.count);
            }
        }

        out
    }
}

fn labels_match(have: &Labels, want: &[(&str, &str)]) -> bool {
    have.len() == want.len()
        && want
            .iter()
            .all(|(k, v)| have.iter().any(|(hk, hv)| hk == k && hv == v))
}

fn format_labels(labels: &Labels, le: Option<&str>) -> String {
    let mut parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
        .collect();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

fn escape(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
