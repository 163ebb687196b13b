//! Engine misuse and configuration errors.
//!
//! Protocol-level failures (lockout, limit exhaustion, lower-layer
//! rejection) are not errors in this sense: they are alerts and rejects
//! delivered through the observer interface. `FopError` covers only what a
//! caller can get wrong synchronously.

#[derive(Debug, thiserror::Error)]
pub enum FopError {
    #[error("invalid transmission limit: {0} (must be at least 1)")]
    InvalidTransmissionLimit(u32),

    #[error("invalid timeout type: {0} (must be 0 or 1)")]
    InvalidTimeoutType(u32),

    #[error("invalid FOP sliding window: {0} (must be 1..=255)")]
    InvalidSlidingWindow(u32),
}
