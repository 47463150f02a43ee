use thiserror::Error;

/// Errors returned by packet/field decode operations.
///
/// Encoding never fails; every variant here describes malformed or truncated
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Datagram shorter than the fixed 6-byte envelope header.
    #[error("packet too short: {len} bytes, need at least 6")]
    PacketTooShort { len: usize },
    /// Fewer bytes remain than the field requires.
    #[error("buffer too short for {field}: need {needed} bytes, have {remaining}")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    /// Length-prefixed string bytes are not UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
}
