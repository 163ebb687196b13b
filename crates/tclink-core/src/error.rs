//! Error types for the tclink-core crate.

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: {actual} bytes (minimum {min})")]
    TooShort { min: usize, actual: usize },

    #[error("unsupported transfer frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid bypass/control flag combination: bypass={bypass}, control={control}")]
    InvalidFlagCombination { bypass: bool, control: bool },

    #[error("frame length field says {header_says} bytes but got {actual}")]
    LengthMismatch { header_says: usize, actual: usize },

    #[error("frame larger than the 10-bit length field allows: {0} bytes")]
    TooLong(usize),

    #[error("invalid control command payload")]
    InvalidControlCommand,
}

#[derive(Debug, thiserror::Error)]
pub enum ClcwError {
    #[error("CLCW too short: {actual} bytes (expected 4)")]
    TooShort { actual: usize },

    #[error("not a CLCW: control word type bit is set")]
    NotAClcw,

    #[error("unsupported CLCW version: {0}")]
    UnsupportedVersion(u8),
}
