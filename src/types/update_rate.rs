//! Update rate control for frame streams

use serde::{Deserialize, Serialize};

/// Update rate for frame streams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every frame the cache sees
    Native,

    /// Throttled to at most this many frames per second.
    /// Rates at or above the provider's frame rate collapse to Native.
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against the provider's nominal frame rate
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            other => other,
        }
    }

    /// Throttle interval, if throttling applies at this source rate
    pub fn throttle_interval(self, source_hz: f64) -> Option<std::time::Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rates_above_source_collapse_to_native() {
        assert_eq!(UpdateRate::Max(200).normalize(120.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(120).normalize(120.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(30).normalize(120.0), UpdateRate::Max(30));
        assert_eq!(UpdateRate::Max(0).normalize(120.0), UpdateRate::Native);
    }

    #[test]
    fn throttle_interval_matches_rate() {
        assert_eq!(UpdateRate::Native.throttle_interval(90.0), None);
        assert_eq!(UpdateRate::Max(10).throttle_interval(90.0), Some(Duration::from_millis(100)));
    }
}
