//! Process-local counters exposed on `/metrics` in Prometheus text format.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Upper bounds (ms) of the model latency histogram buckets.
const LATENCY_BUCKETS_MS: &[u64] = &[100, 250, 500, 1000, 2000, 4000, 8000, 15000, 30000];

const ERROR_KINDS: &[&str] = &[
    "validation",
    "rate_limited",
    "too_large",
    "not_configured",
    "upstream",
];

pub struct EndpointMetrics {
    pub requests_total: AtomicU64,
    pub success_total: AtomicU64,
    pub refusals_total: AtomicU64,
    pub injection_flags_total: AtomicU64,
    errors: Vec<AtomicU64>, // aligned with ERROR_KINDS
    llm_hist_counts: Vec<AtomicU64>, // aligned with LATENCY_BUCKETS_MS
    llm_hist_sum_ms: AtomicU64,
    llm_hist_count: AtomicU64,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            refusals_total: AtomicU64::new(0),
            injection_flags_total: AtomicU64::new(0),
            errors: ERROR_KINDS.iter().map(|_| AtomicU64::new(0)).collect(),
            llm_hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            llm_hist_sum_ms: AtomicU64::new(0),
            llm_hist_count: AtomicU64::new(0),
        }
    }

    pub fn record_error(&self, kind: &str) {
        if let Some(idx) = ERROR_KINDS.iter().position(|k| *k == kind) {
            self.errors[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn error_count(&self, kind: &str) -> u64 {
        ERROR_KINDS
            .iter()
            .position(|k| *k == kind)
            .map(|idx| self.errors[idx].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn observe_llm_latency(&self, ms: u64) {
        self.llm_hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.llm_hist_count.fetch_add(1, Ordering::Relaxed);
        // find first bucket >= value
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if ms <= *ub {
                self.llm_hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
}

pub struct Metrics {
    endpoints: HashMap<&'static str, EndpointMetrics>,
    order: Vec<&'static str>,
    started_at: DateTime<Utc>,
    process_start_instant: Instant,
}

impl Metrics {
    pub fn new(endpoint_names: &[&'static str]) -> Self {
        Self {
            endpoints: endpoint_names
                .iter()
                .map(|name| (*name, EndpointMetrics::new()))
                .collect(),
            order: endpoint_names.to_vec(),
            started_at: Utc::now(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointMetrics> {
        self.endpoints.get(name)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_secs(&self) -> f64 {
        self.process_start_instant.elapsed().as_secs_f64()
    }

    /// Render the text exposition. `rate_limit_entries` is sampled by the caller.
    pub fn render(&self, rate_limit_entries: usize) -> String {
        let mut buf = String::new();
        let families: [(&str, &str, fn(&EndpointMetrics) -> u64); 4] = [
            ("assist_requests_total", "Assist requests received", |m| {
                m.requests_total.load(Ordering::Relaxed)
            }),
            ("assist_success_total", "Assist requests answered with a result", |m| {
                m.success_total.load(Ordering::Relaxed)
            }),
            ("assist_refusals_total", "Model refusals replaced by a fallback message", |m| {
                m.refusals_total.load(Ordering::Relaxed)
            }),
            ("assist_injection_flags_total", "Inputs flagged as prompt-injection attempts", |m| {
                m.injection_flags_total.load(Ordering::Relaxed)
            }),
        ];
        for (family, help, read) in families {
            writeln!(&mut buf, "# HELP {} {}", family, help).ok();
            writeln!(&mut buf, "# TYPE {} counter", family).ok();
            for name in &self.order {
                if let Some(m) = self.endpoints.get(name) {
                    writeln!(&mut buf, "{}{{endpoint=\"{}\"}} {}", family, name, read(m)).ok();
                }
            }
        }

        writeln!(&mut buf, "# HELP assist_errors_total Assist requests that ended in an error, by kind").ok();
        writeln!(&mut buf, "# TYPE assist_errors_total counter").ok();
        for name in &self.order {
            if let Some(m) = self.endpoints.get(name) {
                for (idx, kind) in ERROR_KINDS.iter().enumerate() {
                    writeln!(
                        &mut buf,
                        "assist_errors_total{{endpoint=\"{}\",kind=\"{}\"}} {}",
                        name,
                        kind,
                        m.errors[idx].load(Ordering::Relaxed)
                    )
                    .ok();
                }
            }
        }

        writeln!(&mut buf, "# HELP assist_llm_latency_ms Model call latency histogram (ms) per endpoint").ok();
        writeln!(&mut buf, "# TYPE assist_llm_latency_ms histogram").ok();
        for name in &self.order {
            let Some(m) = self.endpoints.get(name) else {
                continue;
            };
            let mut cumulative: u64 = 0;
            for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
                cumulative += m.llm_hist_counts[idx].load(Ordering::Relaxed);
                writeln!(
                    &mut buf,
                    "assist_llm_latency_ms_bucket{{endpoint=\"{}\",le=\"{}\"}} {}",
                    name, ub, cumulative
                )
                .ok();
            }
            let count = m.llm_hist_count.load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "assist_llm_latency_ms_bucket{{endpoint=\"{}\",le=\"+Inf\"}} {}",
                name, count
            )
            .ok();
            writeln!(
                &mut buf,
                "assist_llm_latency_ms_sum{{endpoint=\"{}\"}} {}",
                name,
                m.llm_hist_sum_ms.load(Ordering::Relaxed)
            )
            .ok();
            writeln!(&mut buf, "assist_llm_latency_ms_count{{endpoint=\"{}\"}} {}", name, count).ok();
        }

        writeln!(
            &mut buf,
            "# HELP assist_rate_limit_entries Identifiers currently tracked by the rate limiter\n# TYPE assist_rate_limit_entries gauge"
        )
        .ok();
        writeln!(&mut buf, "assist_rate_limit_entries {}", rate_limit_entries).ok();
        writeln!(
            &mut buf,
            "# HELP assist_build_info Build information\n# TYPE assist_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "assist_build_info{{version=\"{}\",patternTable=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION"),
            crate::patterns::PATTERN_TABLE_VERSION
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP assist_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE assist_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "assist_process_start_time_seconds {}",
            self.started_at.timestamp_millis() as f64 / 1000.0
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP assist_process_uptime_seconds Process uptime seconds\n# TYPE assist_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(&mut buf, "assist_process_uptime_seconds {}", self.uptime_secs()).ok();
        buf
    }
}
