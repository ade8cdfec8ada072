//! D5 InformationLeak — outbound payload disproportionate to any recent
//! inbound payload (the Heartbleed shape: a small request, a huge reply).

use super::Detector;
use crate::events::Event;
use crate::state_store::Buffer;
use crate::verdict::Verdict;

const ANALYZER: &str = "information_leak";
const CVSS: &str = "CVSS:4.0/AV:N/AC:H/AT:N/PR:N/UI:N/VC:N/VI:N/VA:N/SC:H/SI:N/SA:N";
const LEVEL: f64 = 7.5;

const BUFFER_CAPACITY: usize = 10;
const OUTBOUND_MIN: u64 = 16;
const RATIO: u64 = 10;

pub struct InformationLeak {
    /// Prior `RECVFROM.size` values, matched against `SENDTO.len`.
    recv_sizes: Buffer<u64>,
    /// Prior `READ.buf.length` values, matched against `WRITE.buf.length`.
    read_lengths: Buffer<u64>,
}

impl InformationLeak {
    pub fn new() -> Self {
        Self {
            recv_sizes: Buffer::new(BUFFER_CAPACITY),
            read_lengths: Buffer::new(BUFFER_CAPACITY),
        }
    }

    fn check(&self, outbound: u64, inbound_history: &[u64], evidence_kind: &str, event: &Event) -> Vec<Verdict> {
        if outbound <= OUTBOUND_MIN {
            return Vec::new();
        }
        for &inbound in inbound_history {
            if outbound > RATIO * inbound {
                return vec![Verdict {
                    level: LEVEL,
                    cvss_vector: CVSS,
                    description: "Information Leak".to_string(),
                    pid: event.pid,
                    evidence: format!(
                        "{} inbound={} outbound={}",
                        evidence_kind, inbound, outbound
                    ),
                    analyzer: ANALYZER,
                }];
            }
        }
        Vec::new()
    }
}

impl Default for InformationLeak {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for InformationLeak {
    fn id(&self) -> &'static str {
        ANALYZER
    }

    fn observe(&self, event: &Event) -> Vec<Verdict> {
        match event.event.as_str() {
            "RECVFROM" => {
                if let Some(size) = event.attr_u64("size") {
                    self.recv_sizes.push_front(size);
                }
                Vec::new()
            }
            "READ" => {
                if let Some(len) = event.buf_length() {
                    self.read_lengths.push_front(len);
                }
                Vec::new()
            }
            "SENDTO" => {
                let Some(len) = event.buf_length() else { return Vec::new() };
                self.check(len, &self.recv_sizes.snapshot(), "recvfrom", event)
            }
            "WRITE" => {
                let Some(len) = event.buf_length() else { return Vec::new() };
                self.check(len, &self.read_lengths.snapshot(), "read", event)
            }
            _ => Vec::new(),
        }
    }

    fn reset(&self) {
        self.recv_sizes.reset();
        self.read_lengths.reset();
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
    fn heartbleed_shape_recv_then_send_emits_verdict() {
        let d = InformationLeak::new();
        assert!(d.observe(&event("RECVFROM", 404, json!({"size": 16}))).is_empty());
        let verdicts = d.observe(&event("SENDTO", 404, json!({"len": 65536})));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].evidence.contains("16"));
        assert!(verdicts[0].evidence.contains("65536"));
    }

    #[test]
    fn small_outbound_after_small_inbound_is_silent() {
        let d = InformationLeak::new();
        d.observe(&event("RECVFROM", 404, json!({"size": 16})));
        let verdicts = d.observe(&event("SENDTO", 404, json!({"len": 20})));
        assert!(verdicts.is_empty());
    }

    #[test]
    fn write_matches_against_prior_reads_not_recvs() {
        let d = InformationLeak::new();
        d.observe(&event("RECVFROM", 404, json!({"size": 1})));
        d.observe(&event("READ", 404, json!({"buf": {"length": 16}})));
        let verdicts = d.observe(&event("WRITE", 404, json!({"buf": {"length": 65536}})));
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].evidence.contains("read"));
    }

    #[test]
    fn stops_at_first_matching_prior_inbound() {
        let d = InformationLeak::new();
        d.observe(&event("RECVFROM", 404, json!({"size": 1000})));
        d.observe(&event("RECVFROM", 404, json!({"size": 16})));
        let verdicts = d.observe(&event("SENDTO", 404, json!({"len": 500})));
        assert_eq!(verdicts.len(), 1);
        // Most-recent-first: size=16 is checked before size=1000.
        assert!(verdicts[0].evidence.contains("inbound=16"));
    }
}
