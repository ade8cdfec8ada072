//! D3 FilelessExecution — EXEC of a memfd/anonymous-fd path
//! (`/proc/(self|<pid>)/fd/<fd>`), the signature of fileless ("in-memory")
//! execution.
//!
//! The source's variants express this with a regex; the shape is fixed
//! (three literal segments separated by one variable digit-or-`self` token
//! and one pure-digit token) so it's matched by hand rather than pulling in
//! the `regex` crate for a single anchored pattern.

use super::Detector;
use crate::events::Event;
use crate::verdict::Verdict;

const ANALYZER: &str = "fileless_execution";
const CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:H/VI:H/VA:H/SC:H/SI:H/SA:H";
const LEVEL: f64 = 9.8;

#[derive(Default)]
pub struct FilelessExecution;

impl FilelessExecution {
    pub fn new() -> Self {
        Self
    }
}

/// `/proc/(self|[0-9]+)/fd/[0-9]+`
fn matches_fileless_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/proc/") else { return false };
    let Some((pid_segment, rest)) = rest.split_once('/') else { return false };
    let pid_valid = pid_segment == "self"
        || (!pid_segment.is_empty() && pid_segment.chars().all(|c| c.is_ascii_digit()));
    if !pid_valid {
        return false;
    }
    let Some(fd_segment) = rest.strip_prefix("fd/") else { return false };
    !fd_segment.is_empty() && fd_segment.chars().all(|c| c.is_ascii_digit())
}

impl Detector for FilelessExecution {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        if event.event != "EXEC" {
            return Vec::new();
        }
        let Some(filename) = event.attr_str("filename") else {
            return Vec::new();
        };
        if matches_fileless_path(filename) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Fileless Execution".to_string(),
                pid: event.pid,
                evidence: format!("exec {}", filename),
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

    fn exec_event(filename: &str, pid: i64) -> Event {
        serde_json::from_value(json!({"ts": 1.0, "pid": pid, "event": "EXEC", "filename": filename})).unwrap()
    }

    #[test]
    fn matches_self_fd_path() {
        assert!(matches_fileless_path("/proc/self/fd/3"));
    }

    #[test]
    fn matches_numeric_pid_fd_path() {
        assert!(matches_fileless_path("/proc/1234/fd/17"));
    }

    #[test]
    fn rejects_ordinary_paths() {
        assert!(!matches_fileless_path("/usr/bin/ls"));
        assert!(!matches_fileless_path("/proc/self/exe"));
        assert!(!matches_fileless_path("/proc/selfish/fd/3"));
        assert!(!matches_fileless_path("/proc/self/fd/"));
    }

    #[test]
    fn exec_of_fd_path_emits_critical_verdict() {
        let d = FilelessExecution::new();
        let verdicts = d.observe(&exec_event("/proc/self/fd/3", 101));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].level >= 9.0);
    }

    #[test]
    fn exec_of_normal_binary_is_silent() {
        let d = FilelessExecution::new();
        let verdicts = d.observe(&exec_event("/usr/bin/ls", 101));
        assert!(verdicts.is_empty());
    }
}
