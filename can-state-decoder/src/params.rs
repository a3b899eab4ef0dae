//! Configuration store boundary
//!
//! The decoder reads a few optional toggles from a key/value store and records
//! the active acceleration profile back into it. Writes are fire-and-forget:
//! implementations must return immediately and never block a decode cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Toggle enabling the secondary steering angle sensor
pub const KEY_SECONDARY_STEER_SENSOR: &str = "toyota_zss";
/// Toggle linking the drive-mode switch to the acceleration profile
pub const KEY_ACCEL_PROFILE_BUTTON_LINK: &str = "toyota_ap_btn_link";
/// Active acceleration profile (0 = eco, 1 = normal, 2 = sport)
pub const KEY_ACCEL_PROFILE: &str = "accel_profile";
/// Unix time in seconds of the last profile change
pub const KEY_LAST_MODIFIED: &str = "last_modified";

/// Key/value configuration store
pub trait ParamStore: Send {
    /// Read a boolean toggle; missing keys read as false
    fn get_bool(&self, key: &str) -> bool;

    /// Read a raw value
    fn get(&self, key: &str) -> Option<String>;

    /// Queue a write without waiting for it to land
    fn put_nonblocking(&self, key: &str, value: String);
}

/// Values a store treats as a set toggle
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True" | "TRUE")
}

/// In-process store shared between clones
///
/// Writes land immediately, which keeps them non-blocking for all practical
/// purposes and lets tests observe them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryParams {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: preset a value
    pub fn with(self, key: &str, value: &str) -> Self {
        self.put_nonblocking(key, value.to_string());
        self
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.lock().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParamStore for InMemoryParams {
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).map(|value| parse_bool(&value)).unwrap_or(false)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|values| values.get(key).cloned())
    }

    fn put_nonblocking(&self, key: &str, value: String) {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value);
            }
            Err(_) => log::warn!("Parameter store lock poisoned, dropping write to '{}'", key),
        }
    }
}
