use serde::{Deserialize, Serialize};

use crate::input::InputCategory;

/// Pipeline tuning. Every field has a default, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Ticks between a settled callback and the next render.
    pub rerender_delay_ticks: u32,
    /// Ticks between a state change on an open dialog and its replacement.
    pub state_update_delay_ticks: u32,
    pub lock_camera: bool,
    pub lock_movement: bool,
    /// Fibers idle for this many ticks are dropped after each cycle.
    pub evict_idle_after_ticks: Option<u64>,
    pub inspector: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rerender_delay_ticks: 1,
            state_update_delay_ticks: 1,
            lock_camera: true,
            lock_movement: true,
            evict_idle_after_ticks: None,
            inspector: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn lock_categories(&self) -> InputCategory {
        let mut c = InputCategory::empty();
        c.set(InputCategory::CAMERA, self.lock_camera);
        c.set(InputCategory::MOVEMENT, self.lock_movement);
        c
    }
}
