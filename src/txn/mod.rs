//! # Transaction Management
//!
//! Transaction primitives for the executor: a manager that resolves or
//! starts transactions by host-supplied id, allocates begin/commit
//! timestamps from one global counter, and tracks per-transaction outcome.
//!
//! ## Timestamps
//!
//! One `AtomicU64` hands out both read timestamps (at begin) and commit ids
//! (at commit), so "committed at or before my snapshot" is a single integer
//! comparison:
//!
//! ```text
//! begin()  ─> read_ts  = global_ts++
//! commit() ─> commit_id = global_ts++ , state = Committed
//! ```
//!
//! ## Visibility
//!
//! Row headers in storage record the *creating* and *deleting* transaction
//! ids. A version written by transaction W is visible to reader R when
//! W == R, or W committed with `commit_id <= R.read_ts`. Writes of aborted
//! transactions are never visible; the rows they stamped stay allocated but
//! unreadable, which is this engine's entire rollback story.
//!
//! ## Result Tracking
//!
//! Each transaction carries a `Result ∈ {Success, Failure}` the DML
//! executors flip on mutation errors and the driver consults when deciding
//! commit versus abort. State and result are atomics so visibility checks
//! and result updates stay lock-free; the registry lock is only taken to
//! resolve an id to its transaction object.

use eyre::{bail, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

pub type TxnId = u64;

/// Outcome recorded on the transaction, consulted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnResult {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

const STATE_ACTIVE: u8 = 0;
const STATE_COMMITTED: u8 = 1;
const STATE_ABORTED: u8 = 2;

const RESULT_SUCCESS: u8 = 0;
const RESULT_FAILURE: u8 = 1;

pub struct Transaction {
    txn_id: TxnId,
    read_ts: u64,
    commit_id: AtomicU64,
    state: AtomicU8,
    result: AtomicU8,
}

impl Transaction {
    fn new(txn_id: TxnId, read_ts: u64) -> Self {
        Self {
            txn_id,
            read_ts,
            commit_id: AtomicU64::new(0),
            state: AtomicU8::new(STATE_ACTIVE),
            result: AtomicU8::new(RESULT_SUCCESS),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    /// Commit id, or 0 while uncommitted.
    pub fn commit_id(&self) -> u64 {
        self.commit_id.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TxnState {
        match self.state.load(Ordering::Acquire) {
            STATE_COMMITTED => TxnState::Committed,
            STATE_ABORTED => TxnState::Aborted,
            _ => TxnState::Active,
        }
    }

    pub fn result(&self) -> TxnResult {
        match self.result.load(Ordering::Acquire) {
            RESULT_FAILURE => TxnResult::Failure,
            _ => TxnResult::Success,
        }
    }

    pub fn set_result(&self, result: TxnResult) {
        let raw = match result {
            TxnResult::Success => RESULT_SUCCESS,
            TxnResult::Failure => RESULT_FAILURE,
        };
        self.result.store(raw, Ordering::Release);
    }
}

#[derive(Default)]
pub struct TransactionManager {
    global_ts: AtomicU64,
    registry: RwLock<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            global_ts: AtomicU64::new(1),
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.registry.read().get(&txn_id).cloned()
    }

    /// Registers a new active transaction under the host-supplied id.
    pub fn start_transaction(&self, txn_id: TxnId) -> Result<Arc<Transaction>> {
        let read_ts = self.global_ts.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, read_ts));
        let mut registry = self.registry.write();
        if registry.contains_key(&txn_id) {
            bail!("transaction {} already registered", txn_id);
        }
        registry.insert(txn_id, Arc::clone(&txn));
        Ok(txn)
    }

    pub fn commit(&self, txn: &Transaction) -> Result<u64> {
        if txn.state() != TxnState::Active {
            bail!(
                "transaction conflict: commit of non-active transaction {}",
                txn.txn_id()
            );
        }
        let commit_id = self.global_ts.fetch_add(1, Ordering::SeqCst);
        txn.commit_id.store(commit_id, Ordering::Release);
        txn.state.store(STATE_COMMITTED, Ordering::Release);
        Ok(commit_id)
    }

    pub fn abort(&self, txn: &Transaction) {
        txn.state.store(STATE_ABORTED, Ordering::Release);
    }

    /// Whether a write stamped with `writer` is visible to a reader whose
    /// snapshot is `(reader_txn, read_ts)`.
    pub fn write_visible(&self, writer: TxnId, reader_txn: TxnId, read_ts: u64) -> bool {
        if writer == reader_txn {
            return true;
        }
        match self.get_transaction(writer) {
            Some(txn) => {
                txn.state() == TxnState::Committed && txn.commit_id() <= read_ts
            }
            // Unknown writer ids come from bootstrapped data stamped with
            // txn id 0, which is always visible.
            None => writer == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_get_commit() {
        let mgr = TransactionManager::new();
        let txn = mgr.start_transaction(17).unwrap();
        assert_eq!(txn.txn_id(), 17);
        assert_eq!(txn.state(), TxnState::Active);
        assert!(mgr.get_transaction(17).is_some());

        let cid = mgr.commit(&txn).unwrap();
        assert_eq!(txn.state(), TxnState::Committed);
        assert_eq!(txn.commit_id(), cid);
        assert!(cid > txn.read_ts());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mgr = TransactionManager::new();
        mgr.start_transaction(1).unwrap();
        assert!(mgr.start_transaction(1).is_err());
    }

    #[test]
    fn own_writes_visible_before_commit() {
        let mgr = TransactionManager::new();
        let txn = mgr.start_transaction(5).unwrap();
        assert!(mgr.write_visible(5, 5, txn.read_ts()));
    }

    #[test]
    fn committed_writes_visible_to_later_snapshots_only() {
        let mgr = TransactionManager::new();
        let writer = mgr.start_transaction(1).unwrap();
        let early_reader = mgr.start_transaction(2).unwrap();
        mgr.commit(&writer).unwrap();
        let late_reader = mgr.start_transaction(3).unwrap();

        assert!(!mgr.write_visible(1, 2, early_reader.read_ts()));
        assert!(mgr.write_visible(1, 3, late_reader.read_ts()));
    }

    #[test]
    fn aborted_writes_never_visible() {
        let mgr = TransactionManager::new();
        let writer = mgr.start_transaction(1).unwrap();
        mgr.abort(&writer);
        let reader = mgr.start_transaction(2).unwrap();
        assert!(!mgr.write_visible(1, 2, reader.read_ts()));
    }

    #[test]
    fn commit_twice_is_a_conflict() {
        let mgr = TransactionManager::new();
        let txn = mgr.start_transaction(1).unwrap();
        mgr.commit(&txn).unwrap();
        assert!(mgr.commit(&txn).is_err());
    }

    #[test]
    fn result_defaults_to_success_and_can_fail() {
        let mgr = TransactionManager::new();
        let txn = mgr.start_transaction(1).unwrap();
        assert_eq!(txn.result(), TxnResult::Success);
        txn.set_result(TxnResult::Failure);
        assert_eq!(txn.result(), TxnResult::Failure);
    }
}
