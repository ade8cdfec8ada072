//! Event data model (§3 Data Model, spec C1 payload).
//!
//! Events carry a fixed set of well-known fields plus a sparse attribute map
//! for everything else the tracer can emit (`file`, `buf.length`, `meta.max_pages`,
//! ...). Detectors read attributes defensively through the typed accessors below
//! rather than assuming a field is present.

pub mod parser;

use serde::Deserialize;
use serde_json::Value;

/// A single parsed tracer event. Immutable once constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub ts: f64,
    pub pid: i64,
    #[serde(default)]
    pub prev_pid: Option<i64>,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub child: Option<i64>,
    pub event: String,
    #[serde(default)]
    pub evt: Option<String>,
    #[serde(flatten)]
    pub attrs: serde_json::Map<String, Value>,
}

impl Event {
    /// Integer time-window bucket for this event at the given window width.
    pub fn window(&self, width_secs: f64) -> i64 {
        (self.ts / width_secs).floor() as i64
    }

    fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(Value::as_i64)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attr(key).and_then(Value::as_u64)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attr(key).and_then(Value::as_bool)
    }

    /// `file` or `filename`, whichever is present — the tracer is inconsistent
    /// about which name it uses per event kind.
    pub fn file_path(&self) -> Option<&str> {
        self.attr_str("file").or_else(|| self.attr_str("filename"))
    }

    /// A nested `object.field` lookup, e.g. `meta.max_pages`.
    pub fn nested_u64(&self, object: &str, field: &str) -> Option<u64> {
        self.attr(object)?.get(field)?.as_u64()
    }

    /// Length of a `{buf: {length: N}}`-shaped payload, falling back to a flat
    /// `len` field when present (SENDTO carries `len` directly; WRITE/READ
    /// carry `buf.length`).
    pub fn buf_length(&self) -> Option<u64> {
        self.nested_u64("buf", "length").or_else(|| self.attr_u64("len"))
    }
}
