//! Core tally primitives shared across crates.
//!
//! Includes wire-level enums, identifier aliases, and base errors.

pub mod error;
pub mod types;

pub use types::{
    AccountId, Currency, MessageKind, Operation, RequestId, CALLBACK_OPERATION_CODE,
    CALLBACK_REQUEST_ID,
};
