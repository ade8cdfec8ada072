//! D1 AccessControl — privilege escalation, path traversal, sensitive-file access.

use super::Detector;
use crate::events::Event;
use crate::verdict::Verdict;

const ANALYZER: &str = "access_control";

const PRIV_ESC_EVENTS: &[&str] = &["SETUID", "SETGID", "SETREUID", "SETRESUID"];
const SENSITIVE_FILES: &[&str] = &["/etc/passwd", "/etc/shadow", "/etc/sudoers"];

const PRIV_ESC_CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:N/VI:N/VA:N/SC:H/SI:H/SA:H";
const PATH_TRAVERSAL_CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:N/VI:N/VA:N/SC:H/SI:N/SA:N";
const SENSITIVE_FILE_CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:N/VI:N/VA:N/SC:H/SI:N/SA:N";

const PRIV_ESC_LEVEL: f64 = 8.5;
const PATH_TRAVERSAL_LEVEL: f64 = 5.3;
const SENSITIVE_FILE_LEVEL: f64 = 7.5;

/// Stateless: every verdict is a pure function of the single observed event.
#[derive(Default)]
pub struct AccessControl;

impl AccessControl {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for AccessControl {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        let mut out = Vec::new();

        if PRIV_ESC_EVENTS.contains(&event.event.as_str()) {
            if let Some(0) = event.attr_i64("uid") {
                out.push(Verdict {
                    level: PRIV_ESC_LEVEL,
                    cvss_vector: PRIV_ESC_CVSS,
                    description: "Privilege Escalation".to_string(),
                    pid: event.pid,
                    evidence: format!("{} with uid=0", event.event),
                    analyzer: ANALYZER,
                });
            }
        }

        if event.event == "TRACK_OPENAT" {
            if let Some(file) = event.file_path() {
                // Path-traversal and sensitive-file are independent checks on
                // the same event; both may fire (§4.2).
                if file.contains("../") {
                    out.push(Verdict {
                        level: PATH_TRAVERSAL_LEVEL,
                        cvss_vector: PATH_TRAVERSAL_CVSS,
                        description: "Path Traversal".to_string(),
                        pid: event.pid,
                        evidence: format!("openat {}", file),
                        analyzer: ANALYZER,
                    });
                }
                if SENSITIVE_FILES.iter().any(|&s| file == s || file.ends_with(s)) {
                    out.push(Verdict {
                        level: SENSITIVE_FILE_LEVEL,
                        cvss_vector: SENSITIVE_FILE_CVSS,
                        description: "Sensitive File Access".to_string(),
                        pid: event.pid,
                        evidence: format!("openat {}", file),
                        analyzer: ANALYZER,
                    });
                }
            }
        }

        out
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event: &str, pid: i64, extra: serde_json::Value) -> Event {
        let mut value = json!({"ts": 1.0, "pid": pid, "event": event});
        value.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn setuid_to_root_emits_privilege_escalation() {
        let d = AccessControl::new();
        let verdicts = d.observe(&event("SETUID", 101, json!({"uid": 0})));
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].description, "Privilege Escalation");
        assert!(verdicts[0].level >= 6.0);
    }

    #[test]
    fn setuid_to_nonroot_is_silent() {
        let d = AccessControl::new();
        let verdicts = d.observe(&event("SETUID", 101, json!({"uid": 1000})));
        assert!(verdicts.is_empty());
    }

    #[test]
    fn traversal_and_sensitive_file_both_fire_for_the_same_event() {
        let d = AccessControl::new();
        let verdicts = d.observe(&event(
            "TRACK_OPENAT",
            202,
            json!({"file": "/var/www/../../../etc/passwd"}),
        ));
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.iter().any(|v| v.description == "Path Traversal"));
        assert!(verdicts.iter().any(|v| v.description == "Sensitive File Access"));
    }

    #[test]
    fn ordinary_openat_is_silent() {
        let d = AccessControl::new();
        let verdicts = d.observe(&event("TRACK_OPENAT", 303, json!({"file": "/tmp/foo.txt"})));
        assert!(verdicts.is_empty());
    }
}
