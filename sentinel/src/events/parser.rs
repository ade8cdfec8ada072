//! C1 Event Stream Parser.
//!
//! Extracts balanced JSON objects out of a byte stream that interleaves them
//! with arbitrary text (tracer banners, debug prints). Control characters
//! (0x00-0x1F) are stripped from object candidates before they reach
//! `serde_json`. Malformed candidates are dropped silently — the parser never
//! surfaces a hard error to its caller, per §4.1.
//!
//! The parser delivers each object to its consumer (via a bounded channel)
//! before reading the next chunk, so a slow detector pool applies backpressure
//! all the way back to the read loop instead of events being buffered
//! unboundedly or dropped.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use super::Event;

const READ_CHUNK_SIZE: usize = 4096;

/// Runs the parser loop over `reader`, sending each successfully parsed
/// [`Event`] to `tx`. Returns once `reader` reaches EOF or `tx`'s receiver is
/// dropped. Never returns an `Err` for malformed input — only genuine I/O
/// errors on the underlying reader propagate.
pub async fn run<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<Event>,
) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escape = false;
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if depth > 0 {
                debug!(
                    "[PARSER] stream EOF with an unterminated object (depth={}); discarding partial buffer",
                    depth
                );
            }
            return Ok(());
        }

        for &byte in &chunk[..n] {
            if byte <= 0x1F {
                // Control characters are stripped everywhere, including banner text.
                continue;
            }

            if depth == 0 {
                if byte == b'{' {
                    depth = 1;
                    in_string = false;
                    escape = false;
                    buf.clear();
                    buf.push(byte);
                }
                // Any other byte at depth 0 is banner/debug text — ignored.
                continue;
            }

            buf.push(byte);

            if in_string {
                if escape {
                    escape = false;
                } else if byte == b'\\' {
                    escape = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        emit_candidate(&buf, &tx).await;
                        buf.clear();
                        if tx.is_closed() {
                            return Ok(());
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

async fn emit_candidate(buf: &[u8], tx: &mpsc::Sender<Event>) {
    let candidate = String::from_utf8_lossy(buf);
    match serde_json::from_str::<Event>(&candidate) {
        Ok(event) => {
            // A closed receiver just means the session is tearing down; the
            // parser has nothing useful to do with that error.
            let _ = tx.send(event).await;
        }
        Err(e) => {
            debug!("[PARSER] dropping malformed candidate ({} bytes): {}", buf.len(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn collect(input: &str) -> Vec<Event> {
        let (tx, mut rx) = mpsc::channel(64);
        let reader = Cursor::new(input.as_bytes().to_vec());
        run(reader, tx).await.unwrap();
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn parses_single_object() {
        let events = collect(r#"{"ts":1.0,"pid":101,"event":"SETUID","uid":0}"#).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "SETUID");
        assert_eq!(events[0].pid, 101);
    }

    #[tokio::test]
    async fn ignores_banner_text_between_objects() {
        let input = format!(
            "Attaching to tracee...\n{}\nsome debug print\n{}\n",
            r#"{"ts":1.0,"pid":1,"event":"A"}"#,
            r#"{"ts":2.0,"pid":2,"event":"B"}"#
        );
        let events = collect(&input).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "A");
        assert_eq!(events[1].event, "B");
    }

    #[tokio::test]
    async fn strips_control_characters_from_candidates() {
        let input = "{\"ts\":1.0,\x01\"pid\":1,\"event\":\"A\"}";
        let events = collect(input).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn braces_inside_strings_do_not_affect_depth() {
        let input = r#"{"ts":1.0,"pid":1,"event":"A","note":"a { b } c"}"#;
        let events = collect(input).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attr_str("note"), Some("a { b } c"));
    }

    #[tokio::test]
    async fn drops_malformed_candidates_silently() {
        let input = format!(
            "{}{}",
            r#"{"ts": not valid json here}"#,
            r#"{"ts":1.0,"pid":1,"event":"A"}"#
        );
        let events = collect(&input).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "A");
    }

    #[tokio::test]
    async fn discards_unterminated_trailing_object_on_eof() {
        let input = r#"{"ts":1.0,"pid":1,"event":"A"}{"ts":2.0,"pid":2,"event":"#;
        let events = collect(input).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "A");
    }
}
