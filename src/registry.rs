//! Behavior registration: maps configured `kind` names to constructors.
//!
//! Adding a new built-in behavior: append one entry to `BEHAVIOR_KINDS`.
//! Embedders can `register` their own kinds on a registry before handing it
//! to the helm.

use crate::core::error::HelmError;
use crate::plugins::behavior::Behavior;
use crate::plugins::behaviors::{PeakBehavior, WaypointBehavior};

#[derive(Clone, Copy)]
pub struct BehaviorKind {
    pub name: &'static str,
    pub create: fn() -> Box<dyn Behavior>,
}

/// Behaviors available without registration.
pub const BEHAVIOR_KINDS: &[BehaviorKind] = &[
    BehaviorKind { name: "peak", create: PeakBehavior::boxed },
    BehaviorKind { name: "waypoint", create: WaypointBehavior::boxed },
];

#[derive(Clone)]
pub struct BehaviorRegistry {
    kinds: Vec<BehaviorKind>,
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BehaviorRegistry {
    pub fn empty() -> Self {
        BehaviorRegistry { kinds: Vec::new() }
    }

    pub fn builtin() -> Self {
        BehaviorRegistry {
            kinds: BEHAVIOR_KINDS.to_vec(),
        }
    }

    /// Add or replace a kind.
    pub fn register(&mut self, name: &'static str, create: fn() -> Box<dyn Behavior>) {
        self.kinds.retain(|k| k.name != name);
        self.kinds.push(BehaviorKind { name, create });
    }

    pub fn create(&self, kind: &str) -> Result<Box<dyn Behavior>, HelmError> {
        self.kinds
            .iter()
            .find(|k| k.name == kind)
            .map(|k| (k.create)())
            .ok_or_else(|| HelmError::ConfigError(format!("unknown behavior kind '{}'", kind)))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.name).collect()
    }
}
