//! Mock tracer: emits synthetic syscall-shaped JSON events to stdout,
//! interleaved with banner lines, as a stand-in for the real tracing backend
//! (an external collaborator this workspace doesn't implement).

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

#[derive(Serialize)]
struct MockEvent {
    ts: f64,
    pid: i64,
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

#[tokio::main]
async fn main() {
    eprintln!("Attaching to tracee...");

    let target = std::env::args().nth(1).unwrap_or_else(|| "unknown".to_string());
    println!("tracer-harness monitoring {}", target);

    let mut rng = rand::thread_rng();
    let start = std::time::Instant::now();
    let events = ["EXEC", "TRACK_OPENAT", "TRACK_FORK", "CONNECT", "READ", "WRITE"];

    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let ts = start.elapsed().as_secs_f64();
        let pid = rng.gen_range(100..999);
        let kind = events[rng.gen_range(0..events.len())];

        let event = MockEvent {
            ts,
            pid,
            event: kind.to_string(),
            uid: None,
            filename: if kind == "EXEC" { Some("/usr/bin/ls".to_string()) } else { None },
        };

        if let Ok(json) = serde_json::to_string(&event) {
            println!("{}", json);
        }
    }

    println!("tracer-harness exiting");
}
