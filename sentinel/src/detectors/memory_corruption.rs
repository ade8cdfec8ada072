//! D6 MemoryCorruption — executable remapping and oversized mmap summaries.

use super::Detector;
use crate::events::Event;
use crate::verdict::Verdict;

const ANALYZER: &str = "memory_corruption";
const MPROTECT_CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:H/VI:H/VA:H/SC:H/SI:H/SA:H";
const MMAP_CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:H/VI:H/VA:H/SC:H/SI:H/SA:H";
const MPROTECT_LEVEL: f64 = 9.8;
const MMAP_SUM_LEVEL: f64 = 5.5;
const MAX_PAGES_THRESHOLD: u64 = 65536;

#[derive(Default)]
pub struct MemoryCorruption;

impl MemoryCorruption {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for MemoryCorruption {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event == "MPROTECT" {
            if let Some(1) = event.attr_i64("exec") {
                return vec![Verdict {
                    level: MPROTECT_LEVEL,
                    cvss_vector: MPROTECT_CVSS,
                    description: "Memory Corruption: Executable Remapping".to_string(),
                    pid: event.pid,
                    evidence: "mprotect exec=1".to_string(),
                    analyzer: ANALYZER,
                }];
            }
        }

        if event.evt.as_deref() == Some("MMAP_SUM") {
            if let Some(max_pages) = event.nested_u64("meta", "max_pages") {
                if max_pages > MAX_PAGES_THRESHOLD {
                    return vec![Verdict {
                        level: MMAP_SUM_LEVEL,
                        cvss_vector: MMAP_CVSS,
                        description: "Memory Corruption: Oversized Mapping".to_string(),
                        pid: event.pid,
                        evidence: format!("mmap_sum max_pages={}", max_pages),
                        analyzer: ANALYZER,
                    }];
                }
            }
        }

        Vec::new()
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mprotect_exec_emits_critical_verdict() {
        let d = MemoryCorruption::new();
        let event: Event =
            serde_json::from_value(json!({"ts": 1.0, "pid": 505, "event": "MPROTECT", "exec": 1})).unwrap();
        let verdicts = d.observe(&event);
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level >= 9.0);
    }

    #[test]
    fn mprotect_non_exec_is_silent() {
        let d = MemoryCorruption::new();
        let event: Event =
            serde_json::from_value(json!({"ts": 1.0, "pid": 505, "event": "MPROTECT", "exec": 0})).unwrap();
        assert!(d.observe(&event).is_empty());
    }

    #[test]
    fn oversized_mmap_sum_emits_medium_verdict() {
        let d = MemoryCorruption::new();
        let event: Event = serde_json::from_value(json!({
            "ts": 1.0, "pid": 606, "event": "MMAP", "evt": "MMAP_SUM",
            "meta": {"max_pages": 100000}
        }))
        .unwrap();
        let verdicts = d.observe(&event);
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level < 9.0);
    }

    #[test]
    fn mmap_sum_below_threshold_is_silent() {
        let d = MemoryCorruption::new();
        let event: Event = serde_json::from_value(json!({
            "ts": 1.0, "pid": 606, "event": "MMAP", "evt": "MMAP_SUM",
            "meta": {"max_pages": 100}
        }))
        .unwrap();
        assert!(d.observe(&event).is_empty());
    }
}
