//! Shared state snapshot read by behaviors and mode predicates.
//!
//! The arbitration loop is the only writer. It applies incoming mail and
//! behavior flags between cycles; during a cycle behaviors see the buffer
//! through a borrowed `CycleContext` and cannot keep it.

use crate::core::domain::DecisionDomain;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    Num(f64),
    Str(String),
}

impl InfoValue {
    /// Numbers stay numbers; strings that parse as numbers become numbers.
    pub fn parse(raw: &str) -> InfoValue {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => InfoValue::Num(v),
            _ => InfoValue::Str(raw.to_string()),
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            InfoValue::Num(v) => Some(*v),
            InfoValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::Str(s) => Some(s),
            InfoValue::Num(_) => None,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::Num(v) => write!(f, "{}", v),
            InfoValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        InfoValue::Num(v)
    }
}

impl From<&str> for InfoValue {
    fn from(s: &str) -> Self {
        InfoValue::Str(s.to_string())
    }
}

impl From<String> for InfoValue {
    fn from(s: String) -> Self {
        InfoValue::Str(s)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: InfoValue,
    updated: f64,
}

#[derive(Debug, Default, Clone)]
pub struct InfoBuffer {
    entries: FxHashMap<String, Entry>,
    curr_time: f64,
    deltas: Vec<String>,
}

impl InfoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&mut self, t: f64) {
        self.curr_time = t;
    }

    pub fn curr_time(&self) -> f64 {
        self.curr_time
    }

    pub fn set(&mut self, key: &str, value: impl Into<InfoValue>) {
        let entry = Entry {
            value: value.into(),
            updated: self.curr_time,
        };
        self.entries.insert(key.to_string(), entry);
        if !self.deltas.iter().any(|k| k == key) {
            self.deltas.push(key.to_string());
        }
    }

    pub fn value(&self, key: &str) -> Option<&InfoValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn num(&self, key: &str) -> Option<f64> {
        self.value(key)?.as_num()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key)?.as_str()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Seconds since `key` was last written.
    pub fn age(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|e| self.curr_time - e.updated)
    }

    /// Keys written since the last `clear_deltas`, in write order.
    pub fn deltas(&self) -> &[String] {
        &self.deltas
    }

    pub fn changed(&self, key: &str) -> bool {
        self.deltas.iter().any(|k| k == key)
    }

    pub fn clear_deltas(&mut self) {
        self.deltas.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a behavior may read during one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub info: &'a InfoBuffer,
    pub domain: &'a DecisionDomain,
    pub iteration: u64,
    pub time: f64,
}
