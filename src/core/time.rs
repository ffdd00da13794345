//! Time sources and event stamping.
//!
//! The helm reads time only through `Clock`, so tests can drive cycles,
//! heartbeat timeouts and skew checks from a `ManualClock`.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", SystemClock.now() as u64)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Envelope wrapped around every JSON result the CLI prints.
pub fn report_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut envelope = serde_json::json!({
        "helmsman": env!("CARGO_PKG_VERSION"),
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(fields), JsonValue::Object(extra)) = (envelope.as_object_mut(), extra) {
        fields.extend(extra);
    }
    envelope
}
