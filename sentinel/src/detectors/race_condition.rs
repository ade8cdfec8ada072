//! D7 RaceCondition — Dirty-COW-shape race: a burst of `madvise(MADV_DONTNEED)`
//! overlapping a burst of writes to the same mapping within one window.
//!
//! §9 Open Question: the source disagrees with itself on whether `WRITE`
//! events should be filtered to `filename == /proc/self/mem` or counted
//! unfiltered. The filtered form is the semantically correct attack
//! signature (Dirty-COW always writes through `/proc/self/mem`), but the
//! filter is kept configurable rather than hard-coded.

use super::Detector;
use crate::events::Event;
use crate::state_store::{AlertedSet, CountByWindow};
use crate::verdict::Verdict;

const ANALYZER: &str = "race_condition";
const CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:P/PR:L/UI:N/VC:N/VI:H/VA:N/SC:H/SI:H/SA:H";
const LEVEL: f64 = 7.0;
const WINDOW_WIDTH_SECS: f64 = 2.0;
const THRESHOLD: u64 = 5;
const PROC_SELF_MEM: &str = "/proc/self/mem";

pub struct RaceCondition {
    madvise_counts: CountByWindow,
    write_counts: CountByWindow,
    alerted: AlertedSet,
    /// When `true` (the default), only `WRITE` events targeting
    /// `/proc/self/mem` count toward `write_counts`.
    filter_proc_self_mem: bool,
}

impl RaceCondition {
    pub fn new() -> Self {
        Self {
            madvise_counts: CountByWindow::new(),
            write_counts: CountByWindow::new(),
            alerted: AlertedSet::new(),
            filter_proc_self_mem: true,
        }
    }

    pub fn with_filter(filter_proc_self_mem: bool) -> Self {
        Self { filter_proc_self_mem, ..Self::new() }
    }

    fn maybe_fire(&self, window: i64, event: &Event) -> Vec<Verdict> {
        let madvise = self.madvise_counts.get(window);
        let write = self.write_counts.get(window);
        if madvise > THRESHOLD && write > THRESHOLD && self.alerted.try_alert(window, None) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Race Condition (Dirty-COW shape)".to_string(),
                pid: event.pid,
                evidence: format!(
                    "window={} madvise_count={} write_count={}",
                    window, madvise, write
                ),
                analyzer: ANALYZER,
            }]
        } else {
            Vec::new()
        }
    }
}

impl Default for RaceCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for RaceCondition {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        let window = event.window(WINDOW_WIDTH_SECS);

        if event.event == "MADVISE" && event.attr_str("advice") == Some("MADV_DONTNEED") {
            self.madvise_counts.increment(window);
            return self.maybe_fire(window, event);
        }

        if event.event == "WRITE" {
            let targets_proc_self_mem = event.file_path() == Some(PROC_SELF_MEM);
            if !self.filter_proc_self_mem || targets_proc_self_mem {
                self.write_counts.increment(window);
                return self.maybe_fire(window, event);
            }
        }

        Vec::new()
    }

    fn reset(&self) {
        self.madvise_counts.reset();
        self.write_counts.reset();
        self.alerted.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn madvise(ts: f64, pid: i64) -> Event {
        serde_json::from_value(json!({"ts": ts, "pid": pid, "event": "MADVISE", "advice": "MADV_DONTNEED"}))
            .unwrap()
    }

    fn write(ts: f64, pid: i64) -> Event {
        serde_json::from_value(json!({"ts": ts, "pid": pid, "event": "WRITE", "file": "/proc/self/mem"}))
            .unwrap()
    }

    #[test]
    fn overlapping_bursts_emit_one_verdict() {
        let d = RaceCondition::new();
        let mut verdicts = Vec::new();
        for i in 0..6 {
            verdicts.extend(d.observe(&madvise(i as f64 * 0.1, 1)));
            verdicts.extend(d.observe(&write(i as f64 * 0.1, 1)));
        }
        assert_eq!(verdicts.len(), 1);
    }

    #[test]
    fn madvise_alone_without_writes_never_fires() {
        let d = RaceCondition::new();
        let mut verdicts = Vec::new();
        for i in 0..20 {
            verdicts.extend(d.observe(&madvise(i as f64 * 0.1, 1)));
        }
        assert!(verdicts.is_empty());
    }

    #[test]
    fn unfiltered_mode_counts_any_write_target() {
        let d = RaceCondition::with_filter(false);
        let other_write = |ts: f64| -> Event {
            serde_json::from_value(json!({"ts": ts, "pid": 1, "event": "WRITE", "file": "/tmp/x"})).unwrap()
        };
        let mut verdicts = Vec::new();
        for i in 0..6 {
            verdicts.extend(d.observe(&madvise(i as f64 * 0.1, 1)));
            verdicts.extend(d.observe(&other_write(i as f64 * 0.1)));
        }
        assert_eq!(verdicts.len(), 1);
    }

    #[test]
    fn filtered_mode_ignores_writes_to_other_files() {
        let d = RaceCondition::new();
        let other_write = |ts: f64| -> Event {
            serde_json::from_value(json!({"ts": ts, "pid": 1, "event": "WRITE", "file": "/tmp/x"})).unwrap()
        };
        let mut verdicts = Vec::new();
        for i in 0..6 {
            verdicts.extend(d.observe(&madvise(i as f64 * 0.1, 1)));
            verdicts.extend(d.observe(&other_write(i as f64 * 0.1)));
        }
        assert!(verdicts.is_empty());
    }
}
