//! C8 Report Sink Adapter — writes framed verdict blocks to a downstream
//! consumer, falling back to standard output if that pipe breaks.

use log::warn;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Wraps whatever the report consumer is (another process's stdin, typically)
/// and degrades to stdout on a broken pipe rather than losing subsequent
/// reports.
pub struct ReportSink {
    downstream: Option<Box<dyn AsyncWrite + Unpin + Send>>,
    stdout: tokio::io::Stdout,
}

impl ReportSink {
    pub fn new(downstream: Option<Box<dyn AsyncWrite + Unpin + Send>>) -> Self {
        Self { downstream, stdout: tokio::io::stdout() }
    }

    pub fn stdout_only() -> Self {
        Self::new(None)
    }

    /// Writes `block` (already including its trailing delimiter) and flushes.
    /// A write failure against the downstream consumer permanently falls
    /// back to stdout for the remainder of the session.
    pub async fn write(&mut self, block: &str) {
        if let Some(downstream) = self.downstream.as_mut() {
            match downstream.write_all(block.as_bytes()).await.and(downstream.flush().await) {
                Ok(()) => return,
                Err(e) => {
                    warn!("[SINK] downstream write failed ({}), falling back to stdout", e);
                    self.downstream = None;
                }
            }
        }
        let _ = self.stdout.write_all(block.as_bytes()).await;
        let _ = self.stdout.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct BrokenPipe;
    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn falls_back_to_stdout_after_broken_pipe() {
        let mut sink = ReportSink::new(Some(Box::new(BrokenPipe)));
        sink.write("first block\n").await;
        assert!(sink.downstream.is_none());
        // Second write goes straight to stdout without panicking.
        sink.write("second block\n").await;
    }

    #[tokio::test]
    async fn stdout_only_sink_never_panics() {
        let mut sink = ReportSink::stdout_only();
        sink.write("block\n").await;
    }
}
