//! Error types for the rig wire protocol

use thiserror::Error;

/// Protocol-level errors (framing, hex text, status decoding)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Hex text contains a non-hex character or an odd number of digits
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Status frame does not carry all nibble groups
    #[error("Frame too short: expected at least {expected} tokens, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    /// A nibble group token is not exactly two hex characters
    #[error("Malformed nibble group {group}: {token:?}")]
    MalformedNibble { group: usize, token: String },

    /// A requested value does not fit its register
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Trailing checksum does not match the frame body
    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    /// Frame is well-formed but not a motor command this codec knows
    #[error("Unsupported command: {0}")]
    Unsupported(String),
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
