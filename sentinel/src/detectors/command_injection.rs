//! D2 CommandInjection — EXEC of a known shell interpreter.

use super::Detector;
use crate::events::Event;
use crate::verdict::Verdict;

const ANALYZER: &str = "command_injection";
const CVSS: &str = "CVSS:4.0/AV:L/AC:L/AT:N/PR:L/UI:N/VC:H/VI:H/VA:H/SC:H/SI:H/SA:H";
const LEVEL: f64 = 7.8;

const SHELL_SET: &[&str] = &[
    "/bin/sh", "/bin/bash", "/bin/csh", "/usr/bin/sh", "/usr/bin/bash", "sh", "bash",
];

#[derive(Default)]
pub struct CommandInjection;

impl CommandInjection {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for CommandInjection {
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
        if SHELL_SET.contains(&filename) {
            vec![Verdict {
                level: LEVEL,
                cvss_vector: CVSS,
                description: "Command Injection".to_string(),
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
