//! tally wire codec primitives.
//!
//! Defines the packet envelope, the two positional field encodings, and the
//! request/reply/callback body shapes built from them.

pub mod body;
pub mod error;
pub mod field;
pub mod packet;
