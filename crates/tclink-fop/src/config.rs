//! FOP-1 engine configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::FopError;

/// Initial values for the directive-settable engine parameters.
///
/// Every field remains mutable at runtime through the corresponding
/// `SET_*` directive; this struct only seeds the engine at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct FopConfig {
    /// Retransmission timer initial value T1, in seconds.
    #[serde(default = "default_t1_initial_secs")]
    pub t1_initial_secs: u64,

    /// Maximum number of transmissions of the head of the sent queue.
    #[serde(default = "default_transmission_limit")]
    pub transmission_limit: u32,

    /// Action on timer expiry once the limit is reached: 0 alerts, 1 suspends.
    #[serde(default)]
    pub timeout_type: u8,

    /// Maximum number of unacknowledged AD frames in flight (1..=255).
    #[serde(default = "default_fop_sliding_window")]
    pub fop_sliding_window: u8,
}

fn default_t1_initial_secs() -> u64 {
    10
}

fn default_transmission_limit() -> u32 {
    3
}

fn default_fop_sliding_window() -> u8 {
    16
}

impl Default for FopConfig {
    fn default() -> Self {
        Self {
            t1_initial_secs: default_t1_initial_secs(),
            transmission_limit: default_transmission_limit(),
            timeout_type: 0,
            fop_sliding_window: default_fop_sliding_window(),
        }
    }
}

impl FopConfig {
    /// Check the range constraints that the `SET_*` directives also enforce.
    pub fn validate(&self) -> Result<(), FopError> {
        if self.transmission_limit < 1 {
            return Err(FopError::InvalidTransmissionLimit(self.transmission_limit));
        }
        if self.timeout_type > 1 {
            return Err(FopError::InvalidTimeoutType(u32::from(self.timeout_type)));
        }
        if self.fop_sliding_window < 1 {
            return Err(FopError::InvalidSlidingWindow(u32::from(
                self.fop_sliding_window,
            )));
        }
        Ok(())
    }

    /// T1 as a [`Duration`].
    pub fn t1_initial(&self) -> Duration {
        Duration::from_secs(self.t1_initial_secs)
    }
}
