//! D9 AbnormalSignal — a suspicious fatal signal delivered to a process.

use std::collections::HashMap;
use std::sync::Mutex;

use super::Detector;
use crate::events::Event;
use crate::state_store::AlertedSet;
use crate::verdict::Verdict;

const ANALYZER: &str = "abnormal_signal";
const CVSS: &str = "CVSS:4.0/AV:L/AC:H/AT:N/PR:L/UI:N/VC:L/VI:L/VA:L/SC:N/SI:N/SA:N";
const LEVEL: f64 = 3.1;
const WINDOW_WIDTH_SECS: f64 = 2.0;

const SIGILL: i64 = 4;
const SIGTRAP: i64 = 5;
const SIGBUS: i64 = 7;
const SIGFPE: i64 = 8;
const SIGSEGV: i64 = 11;
const SUSPICIOUS_SIGNALS: &[i64] = &[SIGILL, SIGTRAP, SIGBUS, SIGFPE, SIGSEGV];

pub struct AbnormalSignal {
    counts: Mutex<HashMap<(i64, i64), u64>>,
    alerted: AlertedSet,
    /// Count at which a verdict fires; §4.2 calls this "1 (configurable)".
    threshold: u64,
}

impl AbnormalSignal {
    pub fn new() -> Self {
        Self::with_threshold(1)
    }

    pub fn with_threshold(threshold: u64) -> Self {
        Self { counts: Mutex::new(HashMap::new()), alerted: AlertedSet::new(), threshold }
    }
}

impl Default for AbnormalSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for AbnormalSignal {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event != "SIGNAL_GENERATE" {
            return Vec::new();
        }
        let Some(sig) = event.attr_i64("sig") else { return Vec::new() };
        if !SUSPICIOUS_SIGNALS.contains(&sig) {
            return Vec::new();
        }

        let window = event.window(WINDOW_WIDTH_SECS);
        let count = {
            let mut counts = self.counts.lock().unwrap();
            let entry = counts.entry((window, event.pid)).or_insert(0);
            *entry += 1;
            *entry
        };

        if count >= self.threshold && self.alerted.try_alert(window, Some(event.pid)) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Abnormal Signal".to_string(),
                pid: event.pid,
                evidence: format!("sig={} count={}", sig, count),
                analyzer: ANALYZER,
            }]
        } else {
            Vec::new()
        }
    }

    fn reset(&self) {
        self.counts.lock().unwrap().clear();
        self.alerted.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signal_event(ts: f64, pid: i64, sig: i64) -> Event {
        serde_json::from_value(json!({"ts": ts, "pid": pid, "event": "SIGNAL_GENERATE", "sig": sig})).unwrap()
    }

    #[test]
    fn sigsegv_emits_low_severity_verdict() {
        let d = AbnormalSignal::new();
        let verdicts = d.observe(&signal_event(1.0, 1, SIGSEGV));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level < 6.0);
    }

    #[test]
    fn benign_signal_is_silent() {
        let d = AbnormalSignal::new();
        let verdicts = d.observe(&signal_event(1.0, 1, 2)); // SIGINT
        assert!(verdicts.is_empty());
    }

    #[test]
    fn fires_once_per_window_per_pid() {
        let d = AbnormalSignal::new();
        let mut verdicts = Vec::new();
        verdicts.extend(d.observe(&signal_event(1.0, 1, SIGSEGV)));
        verdicts.extend(d.observe(&signal_event(1.1, 1, SIGBUS)));
        assert_eq!(verdicts.len(), 1);
    }

    #[test]
    fn different_pids_alert_independently() {
        let d = AbnormalSignal::new();
        let mut verdicts = Vec::new();
        verdicts.extend(d.observe(&signal_event(1.0, 1, SIGSEGV)));
        verdicts.extend(d.observe(&signal_event(1.0, 2, SIGSEGV)));
        assert_eq!(verdicts.len(), 2);
    }
}
