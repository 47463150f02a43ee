//! Datagram transport abstractions for tally.
//!
//! The dispatcher and client only depend on the byte-oriented adapter trait
//! defined here. Loss, duplication, and reordering are properties of the
//! adapter, never of the layers above it.

pub mod adapter;
pub mod lossy;
pub mod udp;
