//! Verdicts and the Verdict Aggregator (C5).

use std::collections::HashSet;

use crate::detectors::HIGH_THRESHOLD;

/// A single detector's finding for a single event. Constructed by a detector,
/// never mutated afterward.
#[derive(Debug, Clone)]
pub struct Verdict {
    /// `0.0..=10.0`, or `-1.0` for a synthetic parse/timeout error.
    pub level: f64,
    pub cvss_vector: &'static str,
    pub description: String,
    pub pid: i64,
    pub evidence: String,
    pub analyzer: &'static str,
}

impl Verdict {
    /// A synthetic verdict for a detector timeout or panic, dropped by the
    /// Aggregator before it ever reaches a report.
    pub fn timeout(analyzer: &'static str, pid: i64) -> Self {
        Self {
            level: -1.0,
            cvss_vector: "",
            description: "detector timed out".to_string(),
            pid,
            evidence: String::new(),
            analyzer,
        }
    }

    fn is_reportable(&self) -> bool {
        self.level >= 0.0
    }
}

/// One event's worth of aggregated verdicts, formatted for the Report Sink.
pub struct Report {
    pub target: String,
    pub verdicts: Vec<Verdict>,
}

impl Report {
    /// Renders the block exactly as the Sink writes it: header, separator,
    /// one line per verdict, trailing fifty-`=` delimiter.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== VERDICT REPORT: {} ===\n", self.target));
        out.push_str("-----------------------------------------------\n");
        for v in &self.verdicts {
            out.push_str(&format!(
                "[{}] level={:.1} cvss={} pid={} :: {} :: {}\n",
                v.analyzer, v.level, v.cvss_vector, v.pid, v.description, v.evidence
            ));
        }
        out.push_str(&"=".repeat(50));
        out.push('\n');
        out
    }
}

/// Session-scoped fan-in point. Single writer (per §5 Shared resources): only
/// the orchestrator's event loop calls [`Aggregator::aggregate`].
#[derive(Default)]
pub struct Aggregator {
    pub seen_pids: HashSet<i64>,
    pub hidden_failures: HashSet<i64>,
    /// Whether the operator has already been prompted for the emergency
    /// sweep this session — matches `wrapper.py`'s `isolation_asked`, which
    /// gates the `input()` prompt to at most once per run.
    pub isolation_asked: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuses one event's detector outputs into a report plus the subset that
    /// warrants containment. Drops `level < 0` verdicts; if nothing remains,
    /// returns `None` for the report (no block is emitted for a quiet event).
    pub fn aggregate(&mut self, target: &str, raw: Vec<Verdict>) -> (Option<Report>, Vec<Verdict>) {
        let verdicts: Vec<Verdict> = raw.into_iter().filter(Verdict::is_reportable).collect();
        if verdicts.is_empty() {
            return (None, Vec::new());
        }

        let mut high_risk = Vec::new();
        for v in &verdicts {
            if v.pid > 0 {
                self.seen_pids.insert(v.pid);
            }
            if v.level >= HIGH_THRESHOLD && v.pid > 0 {
                high_risk.push(v.clone());
            }
        }

        let report = Report { target: target.to_string(), verdicts };
        (Some(report), high_risk)
    }

    pub fn record_hidden_failure(&mut self, pid: i64) {
        self.hidden_failures.insert(pid);
    }
}
