//! Invocation semantics: at-least-once for idempotent operations, at-most-once
//! for everything else.
//!
//! At-most-once is enforced with a single reply slot per session. A session
//! is expected to have at most one outstanding non-idempotent request, and a
//! new logical request is recognized purely by a different request id.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tally_core::{Operation, RequestId};

use crate::lock;

/// Static execution-guarantee class of an operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Re-executed on every retransmission; no history kept.
    Idempotent,
    /// Executed once per request id; retransmissions replay the cached reply.
    NonIdempotent,
}

/// Classifies a raw operation code. Only balance inquiry is idempotent;
/// unknown codes are treated as non-idempotent so their Error reply is cached.
pub fn classify(operation_code: u8) -> Idempotency {
    match Operation::from_code(operation_code) {
        Some(Operation::CheckBalance) => Idempotency::Idempotent,
        _ => Idempotency::NonIdempotent,
    }
}

/// Verdict for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// Retransmission of the last executed request: resend these bytes.
    Replay(Vec<u8>),
    /// New logical request (or idempotent): run the handler.
    Execute,
}

/// Last reply produced for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub last_request_id: RequestId,
    /// Fully encoded reply packet, success or error.
    pub encoded_reply: Vec<u8>,
}

/// Single-slot reply history for one session.
///
/// Holding the slot's lock across check, execute, and record makes the
/// Execute-vs-Replay decision exclusive per session.
#[derive(Debug, Default)]
pub struct SessionSlot {
    entry: Option<HistoryEntry>,
}

impl SessionSlot {
    pub fn check_duplicate(&self, request_id: RequestId, operation_code: u8) -> DuplicateCheck {
        if classify(operation_code) == Idempotency::Idempotent {
            return DuplicateCheck::Execute;
        }
        match &self.entry {
            Some(entry) if entry.last_request_id == request_id => {
                DuplicateCheck::Replay(entry.encoded_reply.clone())
            }
            _ => DuplicateCheck::Execute,
        }
    }

    /// Overwrites the slot; no-op for idempotent operations.
    pub fn record_result(&mut self, request_id: RequestId, operation_code: u8, encoded_reply: &[u8]) {
        if classify(operation_code) == Idempotency::Idempotent {
            return;
        }
        self.entry = Some(HistoryEntry {
            last_request_id: request_id,
            encoded_reply: encoded_reply.to_vec(),
        });
    }

    pub fn entry(&self) -> Option<&HistoryEntry> {
        self.entry.as_ref()
    }
}

/// Process-wide reply history keyed by session (transport source address).
///
/// Sessions are retained in LRU order up to an optional bound; evicting a
/// session forgets its slot, so a retransmission arriving after eviction is
/// executed again.
pub struct InvocationSemantics<K: Hash + Eq> {
    sessions: Mutex<LruCache<K, Arc<Mutex<SessionSlot>>>>,
}

impl<K: Hash + Eq + Clone> InvocationSemantics<K> {
    /// History bounded to `max_sessions` sessions; `0` means unbounded.
    pub fn new(max_sessions: usize) -> Self {
        let cache = match NonZeroUsize::new(max_sessions) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            sessions: Mutex::new(cache),
        }
    }

    /// Returns the session's slot, creating an empty one on first use.
    pub fn session(&self, key: &K) -> Arc<Mutex<SessionSlot>> {
        let mut sessions = lock(&self.sessions);
        Arc::clone(sessions.get_or_insert(key.clone(), || {
            Arc::new(Mutex::new(SessionSlot::default()))
        }))
    }

    pub fn check_duplicate(
        &self,
        key: &K,
        request_id: RequestId,
        operation_code: u8,
    ) -> DuplicateCheck {
        if classify(operation_code) == Idempotency::Idempotent {
            return DuplicateCheck::Execute;
        }
        let slot = lock(&self.sessions).get(key).map(Arc::clone);
        match slot {
            Some(slot) => lock(&slot).check_duplicate(request_id, operation_code),
            None => DuplicateCheck::Execute,
        }
    }

    pub fn record_result(
        &self,
        key: &K,
        request_id: RequestId,
        operation_code: u8,
        encoded_reply: &[u8],
    ) {
        if classify(operation_code) == Idempotency::Idempotent {
            return;
        }
        let slot = self.session(key);
        lock(&slot).record_result(request_id, operation_code, encoded_reply);
    }

    /// Number of sessions with a retained slot.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, DuplicateCheck, Idempotency, InvocationSemantics};
    use tally_core::Operation;

    const DEPOSIT: u8 = 3;
    const CHECK_BALANCE: u8 = 6;

    #[test]
    fn only_balance_inquiry_is_idempotent() {
        for op in Operation::ALL {
            let expected = if op == Operation::CheckBalance {
                Idempotency::Idempotent
            } else {
                Idempotency::NonIdempotent
            };
            assert_eq!(classify(op.code()), expected, "{op:?}");
        }
        assert_eq!(classify(0), Idempotency::NonIdempotent);
        assert_eq!(classify(200), Idempotency::NonIdempotent);
    }

    #[test]
    fn first_request_from_session_executes() {
        let semantics = InvocationSemantics::<String>::new(0);
        assert_eq!(
            semantics.check_duplicate(&"a".into(), 101, DEPOSIT),
            DuplicateCheck::Execute
        );
        assert_eq!(semantics.session_count(), 0);
    }

    #[test]
    fn same_request_id_replays_cached_reply() {
        let semantics = InvocationSemantics::<String>::new(0);
        let key = "a".to_string();
        semantics.record_result(&key, 101, DEPOSIT, &[1, 2, 3]);
        for _ in 0..3 {
            assert_eq!(
                semantics.check_duplicate(&key, 101, DEPOSIT),
                DuplicateCheck::Replay(vec![1, 2, 3])
            );
        }
    }

    #[test]
    fn new_request_id_is_never_a_duplicate() {
        let semantics = InvocationSemantics::<String>::new(0);
        let key = "a".to_string();
        semantics.record_result(&key, 101, DEPOSIT, &[1]);
        assert_eq!(
            semantics.check_duplicate(&key, 102, DEPOSIT),
            DuplicateCheck::Execute
        );
    }

    #[test]
    fn slot_is_overwritten_not_appended() {
        let semantics = InvocationSemantics::<String>::new(0);
        let key = "a".to_string();
        semantics.record_result(&key, 101, DEPOSIT, &[1]);
        semantics.record_result(&key, 102, DEPOSIT, &[2]);
        assert_eq!(
            semantics.check_duplicate(&key, 101, DEPOSIT),
            DuplicateCheck::Execute
        );
        assert_eq!(
            semantics.check_duplicate(&key, 102, DEPOSIT),
            DuplicateCheck::Replay(vec![2])
        );
        let slot = semantics.session(&key);
        let guard = slot.lock().expect("slot lock");
        assert_eq!(guard.entry().map(|e| e.last_request_id), Some(102));
    }

    #[test]
    fn sessions_are_partitioned_by_key() {
        let semantics = InvocationSemantics::<String>::new(0);
        semantics.record_result(&"a".into(), 101, DEPOSIT, &[1]);
        assert_eq!(
            semantics.check_duplicate(&"b".into(), 101, DEPOSIT),
            DuplicateCheck::Execute
        );
    }

    #[test]
    fn idempotent_operations_never_touch_history() {
        let semantics = InvocationSemantics::<String>::new(0);
        let key = "a".to_string();
        semantics.record_result(&key, 7, CHECK_BALANCE, &[9]);
        assert_eq!(semantics.session_count(), 0);

        semantics.record_result(&key, 7, DEPOSIT, &[1]);
        assert_eq!(
            semantics.check_duplicate(&key, 7, CHECK_BALANCE),
            DuplicateCheck::Execute
        );
    }

    #[test]
    fn bounded_history_evicts_least_recent_session() {
        let semantics = InvocationSemantics::<String>::new(2);
        semantics.record_result(&"a".into(), 1, DEPOSIT, &[1]);
        semantics.record_result(&"b".into(), 1, DEPOSIT, &[2]);
        semantics.record_result(&"c".into(), 1, DEPOSIT, &[3]);
        assert_eq!(semantics.session_count(), 2);
        assert_eq!(
            semantics.check_duplicate(&"a".into(), 1, DEPOSIT),
            DuplicateCheck::Execute
        );
        assert_eq!(
            semantics.check_duplicate(&"c".into(), 1, DEPOSIT),
            DuplicateCheck::Replay(vec![3])
        );
    }
}
