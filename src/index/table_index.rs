//! # Table-Facing Index Wrapper
//!
//! Binds a BW-tree to a table: composite keys built from chosen tuple
//! columns, row pointers as values, and a uniqueness policy expressed as
//! the tree's duplicate-keys flag (a unique index disallows duplicate
//! keys; a secondary index allows them).

use super::bwtree::{BwTree, KeyComparator, KeyEquality};
use super::scan::{RangeScan, ScanBounds};
use crate::storage::RowPointer;
use crate::types::Value;
use eyre::{ensure, Result};
use std::cmp::Ordering;

/// Component-wise total order over composite keys. NULL components sort
/// lowest so every stored key is orderable.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeKeyOrd;

impl KeyComparator<Vec<Value>> for CompositeKeyOrd {
    fn cmp(&self, a: &Vec<Value>, b: &Vec<Value>) -> Ordering {
        for (x, y) in a.iter().zip(b.iter()) {
            match x.total_cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeKeyEq;

impl KeyEquality<Vec<Value>> for CompositeKeyEq {
    fn eq(&self, a: &Vec<Value>, b: &Vec<Value>) -> bool {
        CompositeKeyOrd.cmp(a, b) == Ordering::Equal
    }
}

pub type IndexKey = Vec<Value>;

pub struct TableIndex {
    name: String,
    key_columns: Vec<usize>,
    unique: bool,
    tree: BwTree<IndexKey, RowPointer, CompositeKeyOrd, CompositeKeyEq>,
}

impl TableIndex {
    pub fn new(name: impl Into<String>, key_columns: Vec<usize>, unique: bool) -> Self {
        Self {
            name: name.into(),
            key_columns,
            unique,
            tree: BwTree::new(CompositeKeyOrd, CompositeKeyEq, !unique),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Extracts this index's key from a full tuple.
    pub fn key_from_tuple(&self, tuple: &[Value]) -> Result<IndexKey> {
        let mut key = Vec::with_capacity(self.key_columns.len());
        for &column in &self.key_columns {
            ensure!(
                column < tuple.len(),
                "index {} references column {} but the tuple has {}",
                self.name,
                column,
                tuple.len()
            );
            key.push(tuple[column].clone());
        }
        Ok(key)
    }

    /// False means the key is already taken on a unique index.
    pub fn insert_entry(&self, key: &IndexKey, pointer: RowPointer) -> Result<bool> {
        self.tree.insert(key, &pointer)
    }

    pub fn delete_entry(&self, key: &IndexKey, pointer: RowPointer) -> Result<bool> {
        self.tree.delete(key, &pointer)
    }

    /// An update is one logical event against the index: the old key goes
    /// away and the new key appears, even when the two are equal.
    pub fn update_entry(
        &self,
        old_key: &IndexKey,
        new_key: &IndexKey,
        old_pointer: RowPointer,
        new_pointer: RowPointer,
    ) -> Result<bool> {
        self.tree.delete(old_key, &old_pointer)?;
        self.tree.insert(new_key, &new_pointer)
    }

    pub fn search_key(&self, key: &IndexKey) -> Result<Vec<RowPointer>> {
        self.tree.search(key)
    }

    pub fn scan_range(
        &self,
        bounds: ScanBounds<IndexKey>,
    ) -> Result<RangeScan<'_, IndexKey, RowPointer, CompositeKeyOrd, CompositeKeyEq>> {
        self.tree.range_scan(bounds)
    }
}
