//! Error kinds the Orchestrator branches on explicitly (§7). Every other
//! component reports failures through logging and continues; only these
//! kinds cross a component boundary as a typed value.

use std::fmt;

#[derive(Debug)]
pub enum SentinelError {
    /// Neither cgroup v2 nor v1 could be acquired, and `--cgroup` was
    /// required by an unprivileged operator.
    SandboxAcquisitionFailure(String),
    /// The tracer subprocess exited or its pipe closed before the session
    /// reached DRAIN on its own.
    TracerFailure(String),
    /// A termination attempt could not reach the target process(es).
    TerminationFailure(String),
}

impl fmt::Display for SentinelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentinelError::SandboxAcquisitionFailure(msg) => {
                write!(f, "sandbox acquisition failed: {}", msg)
            }
            SentinelError::TracerFailure(msg) => write!(f, "tracer failure: {}", msg),
            SentinelError::TerminationFailure(msg) => write!(f, "termination failure: {}", msg),
        }
    }
}

impl std::error::Error for SentinelError {}
