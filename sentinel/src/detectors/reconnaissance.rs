//! D10 Reconnaissance — a process probing its own identity via `/proc/self`.

use super::Detector;
use crate::events::Event;
use crate::verdict::Verdict;

const ANALYZER: &str = "reconnaissance";
const CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:L/VI:N/VA:N/SC:N/SI:N/SA:N";
const LEVEL: f64 = 2.5;

const WATCHED_PATHS: &[&str] = &["/proc/self/exe", "/proc/self/cwd", "/proc/self/maps"];

#[derive(Default)]
pub struct Reconnaissance;

impl Reconnaissance {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for Reconnaissance {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event != "READLINKAT" {
            return Vec::new();
        }
        let Some(path) = event.attr_str("path") else { return Vec::new() };
        if WATCHED_PATHS.contains(&path) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Reconnaissance".to_string(),
                pid: event.pid,
                evidence: format!("readlinkat {}", path),
                analyzer: ANALYZER,
            }]
        } else {
            Vec::new()
        }
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn readlinkat_event(path: &str, pid: i64) -> Event {
        serde_json::from_value(json!({"ts": 1.0, "pid": pid, "event": "READLINKAT", "path": path})).unwrap()
    }

    #[test]
    fn probing_proc_self_exe_emits_low_verdict() {
        let d = Reconnaissance::new();
        let verdicts = d.observe(&readlinkat_event("/proc/self/exe", 1));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level < 6.0);
    }

    #[test]
    fn unrelated_readlinkat_is_silent() {
        let d = Reconnaissance::new();
        let verdicts = d.observe(&readlinkat_event("/var/run/some.sock", 1));
        assert!(verdicts.is_empty());
    }
}
