//! D8 ReverseShell — a `CONNECT`ed process duplicating its socket onto
//! stdin/stdout/stderr, the canonical reverse-shell handoff.

use super::Detector;
use crate::events::Event;
use crate::state_store::PidMap;
use crate::verdict::Verdict;

const ANALYZER: &str = "reverse_shell";
const CVSS: &str = "CVSS:4.0/AV:N/AC:L/AT:N/PR:L/UI:N/VC:H/VI:H/VA:H/SC:H/SI:H/SA:H";
const LEVEL: f64 = 9.8;
const STD_FDS: &[i64] = &[0, 1, 2];

pub struct ReverseShell {
    /// `pid -> connected`. Absence means "never seen a CONNECT from this PID".
    connected: PidMap<bool>,
}

impl ReverseShell {
    pub fn new() -> Self {
        Self { connected: PidMap::new() }
    }
}

impl Default for ReverseShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ReverseShell {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event == "CONNECT" {
            self.connected.set(event.pid, true);
            return Vec::new();
        }

        if event.event == "DUP2" {
            let Some(newfd) = event.attr_i64("newfd") else { return Vec::new() };
            if self.connected.get(event.pid) == Some(true) && STD_FDS.contains(&newfd) {
                // Cleared on fire: a second DUP2 for the same PID produces no
                // further verdict (§8 S6) until another CONNECT re-arms it.
                self.connected.remove(event.pid);
                return vec![Verdict {
                    level: LEVEL,
                    cvss_vector: CVSS,
                    description: "Reverse Shell".to_string(),
                    pid: event.pid,
                    evidence: format!("dup2 newfd={}", newfd),
                    analyzer: ANALYZER,
                }];
            }
        }

        Vec::new()
    }

    fn reset(&self) {
        self.connected.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, pid: i64, extra: serde_json::Value) -> Event {
        let mut value = json!({"ts": 1.0, "pid": pid, "event": kind});
        value.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn connect_then_dup2_stdin_emits_critical_verdict() {
        let d = ReverseShell::new();
        assert!(d.observe(&event("CONNECT", 606, json!({}))).is_empty());
        let verdicts = d.observe(&event("DUP2", 606, json!({"newfd": 0, "oldfd": 7})));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level >= 9.0);
    }

    #[test]
    fn second_dup2_after_firing_is_silent() {
        let d = ReverseShell::new();
        d.observe(&event("CONNECT", 606, json!({})));
        d.observe(&event("DUP2", 606, json!({"newfd": 0, "oldfd": 7})));
        let verdicts = d.observe(&event("DUP2", 606, json!({"newfd": 1, "oldfd": 8})));
        assert!(verdicts.is_empty());
    }

    #[test]
    fn dup2_without_prior_connect_is_silent() {
        let d = ReverseShell::new();
        let verdicts = d.observe(&event("DUP2", 707, json!({"newfd": 0, "oldfd": 7})));
        assert!(verdicts.is_empty());
    }

    #[test]
    fn dup2_to_non_std_fd_is_silent() {
        let d = ReverseShell::new();
        d.observe(&event("CONNECT", 606, json!({})));
        let verdicts = d.observe(&event("DUP2", 606, json!({"newfd": 9, "oldfd": 7})));
        assert!(verdicts.is_empty());
    }
}
