//! D4 ForkBomb — per-window fork count threshold.

use super::Detector;
use crate::events::Event;
use crate::state_store::{AlertedSet, CountByWindow};
use crate::verdict::Verdict;

const ANALYZER: &str = "fork_bomb";
const CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:N/VI:N/VA:H/SC:N/SI:N/SA:H";
const LEVEL: f64 = 7.5;
const WINDOW_WIDTH_SECS: f64 = 2.0;
const THRESHOLD: u64 = 50;

pub struct ForkBomb {
    counts: CountByWindow,
    alerted: AlertedSet,
}

impl ForkBomb {
    pub fn new() -> Self {
        Self { counts: CountByWindow::new(), alerted: AlertedSet::new() }
    }
}

impl Default for ForkBomb {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ForkBomb {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event != "TRACK_FORK" {
            return Vec::new();
        }
        let window = event.window(WINDOW_WIDTH_SECS);
        let count = self.counts.increment(window);
        if count > THRESHOLD && self.alerted.try_alert(window, None) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Resource Exhaustion".to_string(),
                pid: event.pid,
                evidence: format!("{} forks in window {}", count, window),
                analyzer: ANALYZER,
            }]
        } else {
            Vec::new()
        }
    }

    fn reset(&self) {
        self.counts.reset();
        self.alerted.reset();
    }
}
