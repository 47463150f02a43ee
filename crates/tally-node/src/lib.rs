//! tally server core.
//!
//! This crate wires the invocation-semantics engine, the subscription
//! registry, and the account ledger into a datagram dispatch loop on top of
//! pluggable transports.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod operations;
pub mod semantics;
pub mod subscriptions;

/// Locks a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before any
/// call that could panic, so a poisoned lock still guards valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
