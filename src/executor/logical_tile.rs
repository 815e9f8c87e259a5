//! # Logical Tiles
//!
//! The unit of transfer between operators: a view over one or more base
//! tiles. For each referenced base tile the logical tile keeps a position
//! list (row offsets into that tile); the i-th logical row is the
//! concatenation of the i-th entry of every position list. A visibility
//! bitmap of the same length lets operators hide rows (failed predicates,
//! limit trimming) without copying anything.
//!
//! ```text
//!  columns:   [ (tile 0, col 0), (tile 0, col 1), (tile 1, col 0) ]
//!  positions: tile 0 -> [4, 4, 7]      tile 1 -> [0, 2, 2]
//!  visible:   [ true, false, true ]
//! ```
//!
//! Join output is built by zipping the parents' position lists: one
//! `add_join_row(l, r)` appends the l-th entry of every left list and the
//! r-th entry of every right list, which is how a join composes without
//! touching tuple data.
//!
//! A logical tile is produced fresh per pull and owned by its producer
//! until `take_output` hands it to the consumer.

use crate::expr::TupleAccess;
use crate::schema::Schema;
use crate::storage::{RowPointer, Tile};
use crate::types::Value;
use eyre::{ensure, Result};
use std::sync::Arc;

/// One output column: a column of one of the referenced base tiles.
#[derive(Debug, Clone, Copy)]
struct ColumnRef {
    tile_idx: usize,
    column_idx: usize,
}

#[derive(Clone)]
pub struct LogicalTile {
    base_tiles: Vec<Arc<Tile>>,
    position_lists: Vec<Vec<u32>>,
    visible: Vec<bool>,
    columns: Vec<ColumnRef>,
}

impl LogicalTile {
    /// Wraps one base tile. `column_ids` selects and orders the exposed
    /// columns; empty means all of them.
    pub fn wrap_tile(
        tile: Arc<Tile>,
        positions: Vec<u32>,
        column_ids: &[usize],
    ) -> Result<LogicalTile> {
        let column_count = tile.schema().column_count();
        let ids: Vec<usize> = if column_ids.is_empty() {
            (0..column_count).collect()
        } else {
            column_ids.to_vec()
        };
        for &id in &ids {
            ensure!(
                id < column_count,
                "column {} out of range (tile has {})",
                id,
                column_count
            );
        }
        let visible = vec![true; positions.len()];
        Ok(LogicalTile {
            base_tiles: vec![tile],
            position_lists: vec![positions],
            visible,
            columns: ids
                .into_iter()
                .map(|column_idx| ColumnRef {
                    tile_idx: 0,
                    column_idx,
                })
                .collect(),
        })
    }

    /// Wraps every row of a tile with all columns exposed.
    pub fn wrap_whole_tile(tile: Arc<Tile>) -> Result<LogicalTile> {
        let positions = (0..tile.tuple_count() as u32).collect();
        Self::wrap_tile(tile, positions, &[])
    }

    /// An empty join-output tile over the two parents; rows arrive through
    /// [`add_join_row`](Self::add_join_row).
    pub fn join_tile(left: &LogicalTile, right: &LogicalTile) -> LogicalTile {
        let mut base_tiles =
            Vec::with_capacity(left.base_tiles.len() + right.base_tiles.len());
        base_tiles.extend(left.base_tiles.iter().cloned());
        base_tiles.extend(right.base_tiles.iter().cloned());
        let position_lists = vec![Vec::new(); left.position_lists.len() + right.position_lists.len()];
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().map(|col| ColumnRef {
            tile_idx: col.tile_idx + left.base_tiles.len(),
            column_idx: col.column_idx,
        }));
        LogicalTile {
            base_tiles,
            position_lists,
            visible: Vec::new(),
            columns,
        }
    }

    /// Appends the pair `(left row l, right row r)` of the parent tiles
    /// this join tile was created from.
    pub fn add_join_row(&mut self, left: &LogicalTile, right: &LogicalTile, l: usize, r: usize) {
        let split = left.position_lists.len();
        for (idx, list) in left.position_lists.iter().enumerate() {
            self.position_lists[idx].push(list[l]);
        }
        for (idx, list) in right.position_lists.iter().enumerate() {
            self.position_lists[split + idx].push(list[r]);
        }
        self.visible.push(true);
    }

    pub fn row_count(&self) -> usize {
        self.visible.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }

    pub fn is_visible(&self, row: usize) -> bool {
        self.visible.get(row).copied().unwrap_or(false)
    }

    pub fn set_visible(&mut self, row: usize, visible: bool) {
        if let Some(slot) = self.visible.get_mut(row) {
            *slot = visible;
        }
    }

    /// Row indexes whose visibility bit is set.
    pub fn visible_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.visible
            .iter()
            .enumerate()
            .filter_map(|(row, visible)| visible.then_some(row))
    }

    pub fn value_at(&self, row: usize, column: usize) -> Option<Value> {
        let col = self.columns.get(column)?;
        let positions = self.position_lists.get(col.tile_idx)?;
        let offset = *positions.get(row)? as usize;
        self.base_tiles[col.tile_idx].value_at(offset, col.column_idx)
    }

    /// Copies out one logical row across all output columns.
    pub fn row_values(&self, row: usize) -> Result<Vec<Value>> {
        ensure!(row < self.row_count(), "row {} out of range", row);
        let mut values = Vec::with_capacity(self.columns.len());
        for column in 0..self.columns.len() {
            match self.value_at(row, column) {
                Some(value) => values.push(value),
                None => eyre::bail!("row {} column {} unreadable", row, column),
            }
        }
        Ok(values)
    }

    /// Storage address of the row in the first referenced base tile. DML
    /// executors use this to map scan output back to table rows.
    pub fn row_pointer(&self, row: usize) -> Option<RowPointer> {
        let positions = self.position_lists.first()?;
        let offset = *positions.get(row)?;
        Some(RowPointer {
            block: self.base_tiles.first()?.block(),
            offset,
        })
    }

    /// Schema of the exposed columns, reconstructed from the base tiles.
    pub fn output_schema(&self) -> Schema {
        let columns = self
            .columns
            .iter()
            .filter_map(|col| {
                self.base_tiles[col.tile_idx]
                    .schema()
                    .column(col.column_idx)
                    .cloned()
            })
            .collect();
        Schema::new(columns)
    }

    pub fn row_ref(&self, row: usize) -> LogicalTileRow<'_> {
        LogicalTileRow { tile: self, row }
    }
}

/// One logical row viewed as a tuple for expression evaluation.
pub struct LogicalTileRow<'a> {
    tile: &'a LogicalTile,
    row: usize,
}

impl TupleAccess for LogicalTileRow<'_> {
    fn value_at(&self, column: usize) -> Option<Value> {
        self.tile.value_at(self.row, column)
    }

    fn column_count(&self) -> usize {
        self.tile.column_count()
    }
}

/// One physical tile row viewed as a tuple, used by scans to evaluate
/// predicates against the base relation's full schema.
pub struct TileRow<'a> {
    tile: &'a Tile,
    offset: usize,
}

impl<'a> TileRow<'a> {
    pub fn new(tile: &'a Tile, offset: usize) -> Self {
        Self { tile, offset }
    }
}

impl TupleAccess for TileRow<'_> {
    fn value_at(&self, column: usize) -> Option<Value> {
        self.tile.value_at(self.offset, column)
    }

    fn column_count(&self) -> usize {
        self.tile.schema().column_count()
    }
}
