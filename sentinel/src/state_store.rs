//! C3 Detector State Store.
//!
//! The spec's source variant persists this state as on-disk JSON checkpoints
//! so that a one-shot detector invocation can see the accumulated state of
//! prior events. Since detectors here live in-process for the lifetime of a
//! session (§9 Design Notes), the store collapses to simple in-memory
//! structures behind a mutex — one instance per detector, held as a private
//! field on that detector's struct. No detector ever reaches into another's
//! state; that invariant is enforced by construction (nothing shared).
//!
//! Three shapes, matching §4.3 exactly:
//! - [`CountByWindow`] — `window -> count`, for threshold detectors.
//! - [`Buffer`] — a fixed-capacity most-recent-first queue.
//! - [`PidMap`] — `pid -> small record`, for per-process state.
//!
//! Plus [`AlertedSet`], the cross-cutting "has a verdict already fired for
//! this key" guard that gives count-threshold detectors their
//! at-most-one-alert-per-window property.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// `window -> count`. Lazily creates windows on first increment.
#[derive(Default)]
pub struct CountByWindow {
    counts: Mutex<HashMap<i64, u64>>,
}

impl CountByWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the window's count and returns the new total.
    pub fn increment(&self, window: i64) -> u64 {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(window).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current count for `window` without mutating it.
    pub fn get(&self, window: i64) -> u64 {
        self.counts.lock().unwrap().get(&window).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts.lock().unwrap().clear();
    }
}

/// A fixed-capacity most-recent-first queue, per §4.3 `buffer` shape.
pub struct Buffer<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T: Clone> Buffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push_front(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        items.push_front(item);
        while items.len() > self.capacity {
            items.pop_back();
        }
    }

    /// Most-recent-first snapshot, safe to iterate without holding the lock.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().unwrap().iter().cloned().collect()
    }

    pub fn reset(&self) {
        self.items.lock().unwrap().clear();
    }
}

/// `pid -> small record`, per §4.3 `pid_map` shape.
pub struct PidMap<T> {
    map: Mutex<HashMap<i64, T>>,
}

impl<T: Clone> PidMap<T> {
    pub fn new() -> Self {
        Self { map: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, pid: i64) -> Option<T> {
        self.map.lock().unwrap().get(&pid).cloned()
    }

    pub fn set(&self, pid: i64, value: T) {
        self.map.lock().unwrap().insert(pid, value);
    }

    pub fn remove(&self, pid: i64) {
        self.map.lock().unwrap().remove(&pid);
    }

    pub fn reset(&self) {
        self.map.lock().unwrap().clear();
    }
}

impl<T: Clone> Default for PidMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `(window, optional pid) -> already alerted`. Ensures at-most-one verdict
/// per window (per §3 Invariants: "A window key, once in AlertedSet, is
/// never re-alerted.").
#[derive(Default)]
pub struct AlertedSet {
    seen: Mutex<HashSet<(i64, Option<i64>)>>,
}

impl AlertedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time this key is seen (and records it);
    /// `false` on every subsequent call with the same key.
    pub fn try_alert(&self, window: i64, pid: Option<i64>) -> bool {
        self.seen.lock().unwrap().insert((window, pid))
    }

    pub fn reset(&self) {
        self.seen.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_by_window_increments_independently_per_window() {
        let store = CountByWindow::new();
        assert_eq!(store.increment(0), 1);
        assert_eq!(store.increment(0), 2);
        assert_eq!(store.increment(1), 1);
    }

    #[test]
    fn alerted_set_fires_once_per_key() {
        let alerted = AlertedSet::new();
        assert!(alerted.try_alert(0, None));
        assert!(!alerted.try_alert(0, None));
        assert!(alerted.try_alert(1, None));
        assert!(alerted.try_alert(0, Some(5)));
    }

    #[test]
    fn buffer_evicts_oldest_beyond_capacity() {
        let buf: Buffer<i32> = Buffer::new(3);
        for i in 0..5 {
            buf.push_front(i);
        }
        assert_eq!(buf.snapshot(), vec![4, 3, 2]);
    }

    #[test]
    fn pid_map_roundtrip() {
        let map: PidMap<bool> = PidMap::new();
        assert_eq!(map.get(1), None);
        map.set(1, true);
        assert_eq!(map.get(1), Some(true));
        map.remove(1);
        assert_eq!(map.get(1), None);
    }
}
