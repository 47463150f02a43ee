use thiserror::Error;

/// Shared lightweight error type for core primitive conversions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Operation code outside the closed operation set.
    #[error("unknown operation code: {0}")]
    UnknownOperation(u8),
    /// Currency byte outside the supported currency set.
    #[error("unknown currency code: {0}")]
    UnknownCurrency(u8),
}
