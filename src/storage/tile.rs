//! # Base Tiles
//!
//! A tile is a columnar block of tuples of one schema, addressable by row
//! offset. Two flavors share the type:
//!
//! - **Storage tiles** belong to a table. Every row slot has an MVCC
//!   header of two atomic transaction-id stamps (`begin`, `end`); the
//!   per-row visibility hook the executor relies on is a pair of
//!   [`TransactionManager::write_visible`] checks over those stamps.
//! - **Derived tiles** are produced by materialization and projection.
//!   They carry no headers and every row is visible to everyone.
//!
//! ## Visibility
//!
//! ```text
//! row visible to T  ⇔  write_visible(begin, T)
//!                      ∧ (end == 0 ∨ ¬write_visible(end, T))
//! ```
//!
//! Deletion stamps `end` by CAS, which doubles as first-writer-wins
//! write-write conflict detection: losing the CAS to a live transaction is
//! a conflict, while a stamp left by an aborted transaction is reclaimed
//! and overwritten.
//!
//! Appends are serialized by the column lock; offsets therefore hand out
//! densely and `row_count` is published with release ordering after the
//! values are in place.

use crate::schema::Schema;
use crate::txn::{Transaction, TransactionManager, TxnState};
use crate::types::Value;
use eyre::{bail, ensure, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Physical address of a row version: a tile block and an offset in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowPointer {
    pub block: u32,
    pub offset: u32,
}

struct RowHeader {
    begin: AtomicU64,
    end: AtomicU64,
}

impl RowHeader {
    fn empty() -> Self {
        Self {
            begin: AtomicU64::new(0),
            end: AtomicU64::new(0),
        }
    }
}

pub struct Tile {
    block: u32,
    schema: Schema,
    capacity: usize,
    row_count: AtomicU32,
    headers: Vec<RowHeader>,
    columns: RwLock<Vec<Vec<Value>>>,
}

impl Tile {
    /// A table-owned tile with MVCC headers for `capacity` rows.
    pub fn storage(block: u32, schema: Schema, capacity: usize) -> Self {
        let columns = (0..schema.column_count())
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        let headers = (0..capacity).map(|_| RowHeader::empty()).collect();
        Self {
            block,
            schema,
            capacity,
            row_count: AtomicU32::new(0),
            headers,
            columns: RwLock::new(columns),
        }
    }

    /// An immutable header-less tile holding pre-built rows; every row is
    /// visible to every transaction.
    pub fn derived(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Vec<Value>> = (0..schema.column_count())
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        let row_count = rows.len();
        for row in rows {
            ensure!(
                row.len() == schema.column_count(),
                "derived tile row has {} values, schema has {} columns",
                row.len(),
                schema.column_count()
            );
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Ok(Self {
            block: crate::config::INVALID_BLOCK,
            schema,
            capacity: row_count,
            row_count: AtomicU32::new(row_count as u32),
            headers: Vec::new(),
            columns: RwLock::new(columns),
        })
    }

    pub fn block(&self) -> u32 {
        self.block
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tuple_count(&self) -> usize {
        self.row_count.load(Ordering::Acquire) as usize
    }

    pub fn value_at(&self, offset: usize, column: usize) -> Option<Value> {
        if offset >= self.tuple_count() {
            return None;
        }
        let columns = self.columns.read();
        columns.get(column)?.get(offset).cloned()
    }

    /// Copies out one full row.
    pub fn row_values(&self, offset: usize) -> Result<Vec<Value>> {
        ensure!(
            offset < self.tuple_count(),
            "row {} out of range in tile {}",
            offset,
            self.block
        );
        let columns = self.columns.read();
        Ok(columns.iter().map(|col| col[offset].clone()).collect())
    }

    /// Appends a row stamped with the creating transaction. `None` means
    /// the tile is full.
    pub fn append(&self, values: Vec<Value>, txn_id: u64) -> Result<Option<u32>> {
        ensure!(
            values.len() == self.schema.column_count(),
            "tuple has {} values, schema has {} columns",
            values.len(),
            self.schema.column_count()
        );
        ensure!(!self.headers.is_empty(), "cannot append to a derived tile");
        let mut columns = self.columns.write();
        let offset = self.row_count.load(Ordering::Relaxed) as usize;
        if offset >= self.capacity {
            return Ok(None);
        }
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
        self.headers[offset].begin.store(txn_id, Ordering::Release);
        self.row_count.store(offset as u32 + 1, Ordering::Release);
        Ok(Some(offset as u32))
    }

    pub fn begin_txn(&self, offset: usize) -> Option<u64> {
        if self.headers.is_empty() || offset >= self.tuple_count() {
            return None;
        }
        Some(self.headers[offset].begin.load(Ordering::Acquire))
    }

    pub fn end_txn(&self, offset: usize) -> Option<u64> {
        if self.headers.is_empty() || offset >= self.tuple_count() {
            return None;
        }
        Some(self.headers[offset].end.load(Ordering::Acquire))
    }

    /// MVCC visibility of one row for the given transaction.
    pub fn visible(
        &self,
        offset: usize,
        txn: &Transaction,
        manager: &TransactionManager,
    ) -> bool {
        if offset >= self.tuple_count() {
            return false;
        }
        if self.headers.is_empty() {
            return true;
        }
        let begin = self.headers[offset].begin.load(Ordering::Acquire);
        if !manager.write_visible(begin, txn.txn_id(), txn.read_ts()) {
            return false;
        }
        let end = self.headers[offset].end.load(Ordering::Acquire);
        end == 0 || !manager.write_visible(end, txn.txn_id(), txn.read_ts())
    }

    /// Stamps the row deleted by `txn`. Returns false when the row was
    /// already deleted by this transaction or a visible committed one;
    /// fails on a write-write conflict with a live transaction.
    pub fn mark_deleted(
        &self,
        offset: usize,
        txn: &Transaction,
        manager: &TransactionManager,
    ) -> Result<bool> {
        ensure!(!self.headers.is_empty(), "cannot delete from a derived tile");
        ensure!(
            offset < self.tuple_count(),
            "row {} out of range in tile {}",
            offset,
            self.block
        );
        let header = &self.headers[offset];
        loop {
            let end = header.end.load(Ordering::Acquire);
            if end == 0 {
                if header
                    .end
                    .compare_exchange(0, txn.txn_id(), Ordering::Release, Ordering::Acquire)
                    .is_ok()
                {
                    return Ok(true);
                }
                continue;
            }
            if end == txn.txn_id() {
                return Ok(false);
            }
            match manager.get_transaction(end).map(|t| t.state()) {
                Some(TxnState::Aborted) => {
                    // Reclaim a stamp left behind by an aborted deleter.
                    if header
                        .end
                        .compare_exchange(end, txn.txn_id(), Ordering::Release, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(true);
                    }
                }
                Some(TxnState::Committed) => {
                    if manager.write_visible(end, txn.txn_id(), txn.read_ts()) {
                        return Ok(false);
                    }
                    bail!(
                        "transaction conflict: row deleted by transaction {} after this snapshot",
                        end
                    );
                }
                _ => bail!(
                    "transaction conflict: row locked for deletion by transaction {}",
                    end
                ),
            }
        }
    }
}
