//! # Data Tables
//!
//! A table is a list of storage tiles plus the registered BW-tree indexes
//! over them. DML goes through the table so index maintenance and
//! constraint checks cannot be skipped:
//!
//! - **Insert** appends a version stamped with the writing transaction and
//!   inserts into every index. A unique index reporting the key taken is a
//!   constraint violation unless every holder of the key turns out to be a
//!   dead version (aborted writer, or deleted by a committed transaction),
//!   in which case the stale entries are swept and the insert retried.
//! - **Delete** stamps the row's `end` transaction (detecting write-write
//!   conflicts) and removes the row's index entries.
//! - **Update** is delete-then-insert at the storage layer, but each index
//!   sees exactly one logical event: old key out, new key in.
//!
//! Tiles are append-only and fixed-capacity; a full tail tile causes a new
//! tile to be linked under the table lock.

use super::tile::{RowPointer, Tile};
use crate::config::DEFAULT_TILE_CAPACITY;
use crate::index::TableIndex;
use crate::schema::Schema;
use crate::txn::{Transaction, TransactionManager, TxnState};
use crate::types::Value;
use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

pub struct DataTable {
    name: String,
    schema: Schema,
    manager: Arc<TransactionManager>,
    tiles: RwLock<Vec<Arc<Tile>>>,
    indexes: RwLock<HashMap<String, Arc<TableIndex>>>,
    tile_capacity: usize,
}

impl DataTable {
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        manager: Arc<TransactionManager>,
    ) -> Self {
        Self::with_tile_capacity(name, schema, manager, DEFAULT_TILE_CAPACITY)
    }

    pub fn with_tile_capacity(
        name: impl Into<String>,
        schema: Schema,
        manager: Arc<TransactionManager>,
        tile_capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            manager,
            tiles: RwLock::new(Vec::new()),
            indexes: RwLock::new(HashMap::new()),
            tile_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Registers an index. Indexes are created before data arrives; there
    /// is no backfill.
    pub fn add_index(
        &self,
        name: impl Into<String>,
        key_columns: Vec<usize>,
        unique: bool,
    ) -> Result<Arc<TableIndex>> {
        let name = name.into();
        for &column in &key_columns {
            ensure!(
                column < self.schema.column_count(),
                "index {} references column {} but table {} has {}",
                name,
                column,
                self.name,
                self.schema.column_count()
            );
        }
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&name) {
            bail!("index {} already exists on table {}", name, self.name);
        }
        let index = Arc::new(TableIndex::new(name.clone(), key_columns, unique));
        indexes.insert(name, Arc::clone(&index));
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Option<Arc<TableIndex>> {
        self.indexes.read().get(name).cloned()
    }

    pub fn indexes(&self) -> Vec<Arc<TableIndex>> {
        self.indexes.read().values().cloned().collect()
    }

    /// Snapshot of the table's tiles for one scan pass.
    pub fn tiles(&self) -> Vec<Arc<Tile>> {
        self.tiles.read().clone()
    }

    pub fn tile(&self, block: u32) -> Option<Arc<Tile>> {
        self.tiles.read().get(block as usize).cloned()
    }

    pub fn insert_tuple(&self, txn: &Transaction, tuple: Vec<Value>) -> Result<RowPointer> {
        self.check_tuple(&tuple)?;
        let pointer = self.append_version(&tuple, txn)?;
        for index in self.indexes() {
            let key = index.key_from_tuple(&tuple)?;
            if index.is_unique() {
                self.insert_unique(&index, &key, pointer, txn)?;
            } else {
                index.insert_entry(&key, pointer)?;
            }
        }
        Ok(pointer)
    }

    pub fn delete_tuple(&self, txn: &Transaction, pointer: RowPointer) -> Result<()> {
        let Some(tile) = self.tile(pointer.block) else {
            bail!("row {:?} points at a missing tile", pointer);
        };
        let row = tile.row_values(pointer.offset as usize)?;
        if !tile.mark_deleted(pointer.offset as usize, txn, &self.manager)? {
            return Ok(());
        }
        for index in self.indexes() {
            let key = index.key_from_tuple(&row)?;
            index.delete_entry(&key, pointer)?;
        }
        Ok(())
    }

    /// Delete-then-insert at the storage layer; one logical event per
    /// index.
    pub fn update_tuple(
        &self,
        txn: &Transaction,
        pointer: RowPointer,
        new_tuple: Vec<Value>,
    ) -> Result<RowPointer> {
        self.check_tuple(&new_tuple)?;
        let Some(tile) = self.tile(pointer.block) else {
            bail!("row {:?} points at a missing tile", pointer);
        };
        let old_tuple = tile.row_values(pointer.offset as usize)?;
        if !tile.mark_deleted(pointer.offset as usize, txn, &self.manager)? {
            bail!("row {:?} was already deleted in this transaction", pointer);
        }
        let new_pointer = self.append_version(&new_tuple, txn)?;
        for index in self.indexes() {
            let old_key = index.key_from_tuple(&old_tuple)?;
            let new_key = index.key_from_tuple(&new_tuple)?;
            if !index.update_entry(&old_key, &new_key, pointer, new_pointer)? {
                bail!(
                    "constraint violation: duplicate key in unique index {}",
                    index.name()
                );
            }
        }
        Ok(new_pointer)
    }

    fn append_version(&self, tuple: &[Value], txn: &Transaction) -> Result<RowPointer> {
        loop {
            let tail = self.tiles.read().last().cloned();
            if let Some(tile) = tail {
                if let Some(offset) = tile.append(tuple.to_vec(), txn.txn_id())? {
                    return Ok(RowPointer {
                        block: tile.block(),
                        offset,
                    });
                }
            }
            // Tail missing or full: link a fresh tile, then retry the
            // append through the common path.
            let mut tiles = self.tiles.write();
            let needs_tile = match tiles.last() {
                Some(tile) => tile.tuple_count() >= self.tile_capacity,
                None => true,
            };
            if needs_tile {
                let block = tiles.len() as u32;
                tiles.push(Arc::new(Tile::storage(
                    block,
                    self.schema.clone(),
                    self.tile_capacity,
                )));
            }
        }
    }

    fn insert_unique(
        &self,
        index: &TableIndex,
        key: &[Value],
        pointer: RowPointer,
        txn: &Transaction,
    ) -> Result<()> {
        let key = key.to_vec();
        loop {
            if index.insert_entry(&key, pointer)? {
                return Ok(());
            }
            // The key is held. Entries pointing at dead versions (aborted
            // writers, rows deleted by committed transactions) are swept;
            // a live holder is a genuine violation.
            let mut swept = false;
            for existing in index.search_key(&key)? {
                if self.version_dead(existing, txn) {
                    if index.delete_entry(&key, existing)? {
                        swept = true;
                    }
                }
            }
            if !swept {
                bail!(
                    "constraint violation: duplicate key in unique index {}",
                    index.name()
                );
            }
        }
    }

    /// Whether the version a stale index entry points at can no longer
    /// block a unique-key insert.
    fn version_dead(&self, pointer: RowPointer, txn: &Transaction) -> bool {
        let Some(tile) = self.tile(pointer.block) else {
            return true;
        };
        let Some(begin) = tile.begin_txn(pointer.offset as usize) else {
            return true;
        };
        if begin != txn.txn_id() {
            match self.manager.get_transaction(begin).map(|t| t.state()) {
                Some(TxnState::Aborted) => return true,
                Some(_) => {}
                None => {
                    if begin != 0 {
                        return true;
                    }
                }
            }
        }
        match tile.end_txn(pointer.offset as usize) {
            Some(0) | None => false,
            Some(end) if end == txn.txn_id() => true,
            Some(end) => matches!(
                self.manager.get_transaction(end).map(|t| t.state()),
                Some(TxnState::Committed)
            ),
        }
    }

    fn check_tuple(&self, tuple: &[Value]) -> Result<()> {
        ensure!(
            tuple.len() == self.schema.column_count(),
            "tuple has {} values, table {} has {} columns",
            tuple.len(),
            self.name,
            self.schema.column_count()
        );
        for (value, column) in tuple.iter().zip(self.schema.columns()) {
            if value.is_null() {
                ensure!(
                    column.nullable,
                    "constraint violation: column {} is not nullable",
                    column.name
                );
                continue;
            }
            if let Some(data_type) = value.data_type() {
                ensure!(
                    data_type == column.data_type,
                    "type mismatch: column {} is {:?}, value is {:?}",
                    column.name,
                    column.data_type,
                    data_type
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::types::DataType;

    fn test_table() -> (Arc<TransactionManager>, DataTable) {
        let manager = Arc::new(TransactionManager::new());
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer, false),
            Column::new("name", DataType::Varchar, true),
        ]);
        let table = DataTable::with_tile_capacity("users", schema, Arc::clone(&manager), 4);
        (manager, table)
    }

    fn row(id: i32, name: &str) -> Vec<Value> {
        vec![Value::Integer(id), Value::Varchar(name.into())]
    }

    #[test]
    fn insert_spills_into_new_tiles() {
        let (manager, table) = test_table();
        let txn = manager.start_transaction(1).unwrap();
        for id in 0..10 {
            table.insert_tuple(&txn, row(id, "x")).unwrap();
        }
        assert_eq!(table.tiles().len(), 3);
        assert_eq!(table.tiles()[0].tuple_count(), 4);
        assert_eq!(table.tiles()[2].tuple_count(), 2);
    }

    #[test]
    fn null_in_non_nullable_column_rejected() {
        let (manager, table) = test_table();
        let txn = manager.start_transaction(1).unwrap();
        let result = table.insert_tuple(&txn, vec![Value::Null, Value::Null]);
        assert!(result.is_err());
    }

    #[test]
    fn unique_index_blocks_duplicates() {
        let (manager, table) = test_table();
        table.add_index("pk", vec![0], true).unwrap();
        let txn = manager.start_transaction(1).unwrap();
        table.insert_tuple(&txn, row(1, "a")).unwrap();
        assert!(table.insert_tuple(&txn, row(1, "b")).is_err());
    }

    #[test]
    fn aborted_insert_frees_the_unique_key() {
        let (manager, table) = test_table();
        table.add_index("pk", vec![0], true).unwrap();

        let loser = manager.start_transaction(1).unwrap();
        table.insert_tuple(&loser, row(1, "a")).unwrap();
        manager.abort(&loser);

        let winner = manager.start_transaction(2).unwrap();
        table.insert_tuple(&winner, row(1, "b")).unwrap();
        let index = table.index("pk").unwrap();
        let found = index.search_key(&vec![Value::Integer(1)]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn delete_then_reinsert_same_key() {
        let (manager, table) = test_table();
        table.add_index("pk", vec![0], true).unwrap();
        let txn = manager.start_transaction(1).unwrap();
        let pointer = table.insert_tuple(&txn, row(1, "a")).unwrap();
        table.delete_tuple(&txn, pointer).unwrap();
        table.insert_tuple(&txn, row(1, "b")).unwrap();
    }

    #[test]
    fn update_maintains_indexes_as_one_event() {
        let (manager, table) = test_table();
        table.add_index("pk", vec![0], true).unwrap();
        let txn = manager.start_transaction(1).unwrap();
        let pointer = table.insert_tuple(&txn, row(1, "a")).unwrap();
        let new_pointer = table.update_tuple(&txn, pointer, row(2, "a")).unwrap();

        let index = table.index("pk").unwrap();
        assert!(index.search_key(&vec![Value::Integer(1)]).unwrap().is_empty());
        assert_eq!(
            index.search_key(&vec![Value::Integer(2)]).unwrap(),
            vec![new_pointer]
        );
    }
}
