//! C2 Detector Set — nine independent stateful analyzers (D1-D10; D1 covers
//! two verdict shapes) that turn a single [`Event`] into zero or more
//! [`Verdict`]s.
//!
//! Each detector is a struct holding its own State Store primitives
//! ([`crate::state_store`]) behind `&self` interior mutability, so a
//! `&Detector` can be invoked concurrently from the Router's worker pool
//! without a detector ever observing another's state (§3 Invariants).
//! `observe` returns `Vec<Verdict>` rather than `Option<Verdict>` because D1
//! alone can emit two independent verdicts from one event (§4.2); every other
//! detector returns at most one element.

pub mod access_control;
pub mod abnormal_signal;
pub mod command_injection;
pub mod fileless_execution;
pub mod fork_bomb;
pub mod information_leak;
pub mod memory_corruption;
pub mod race_condition;
pub mod reconnaissance;
pub mod reverse_shell;

use crate::events::Event;
use crate::verdict::Verdict;

/// Default high-risk promotion threshold (§4.5, §9 Open Question: "fixes the
/// levels used in the current orchestrator").
pub const HIGH_THRESHOLD: f64 = 9.0;

/// The per-detector contract, identical across all nine analyzers.
pub trait Detector: Send + Sync {
    /// Stable identifier used in verdicts, logs, and the event-to-detector maps.
    fn id(&self) -> &'static str;

    /// Called once before the session's first event. Detectors that hold no
    /// state beyond what's constructed by `new()` may no-op.
    fn init(&self) {}

    /// Classify one event against this detector's rule, consulting and
    /// updating only this detector's own state.
    fn observe(&self, event: &Event) -> Vec<Verdict>;

    /// Clears all state. Called between target sessions (Non-goals: "no
    /// persistent event archive across sessions").
    fn reset(&self);
}
