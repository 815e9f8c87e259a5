//! Shared join machinery: NULL-padding tiles for outer joins and the
//! unmatched-row bookkeeping both join executors use. Buffered input tiles
//! are kept alive alongside a matched bitmap; after both inputs drain, the
//! unmatched visible rows of the padded side are emitted against a
//! single-row all-NULL tile of the opposite schema.

use super::logical_tile::LogicalTile;
use crate::schema::Schema;
use crate::storage::Tile;
use crate::types::Value;
use eyre::Result;
use std::sync::Arc;

/// A buffered input tile plus the per-row matched bits used for outer
/// padding.
pub(super) struct BufferedSide {
    pub(super) tiles: Vec<(LogicalTile, Vec<bool>)>,
}

impl BufferedSide {
    pub(super) fn new() -> Self {
        Self { tiles: Vec::new() }
    }

    pub(super) fn push(&mut self, tile: LogicalTile) {
        let rows = tile.row_count();
        self.tiles.push((tile, vec![false; rows]));
    }

    pub(super) fn mark_matched(&mut self, row: usize) {
        if let Some((_, matched)) = self.tiles.last_mut() {
            if let Some(slot) = matched.get_mut(row) {
                *slot = true;
            }
        }
    }

    pub(super) fn last_tile(&self) -> Option<&LogicalTile> {
        self.tiles.last().map(|(tile, _)| tile)
    }
}

/// A one-row tile of NULLs in the given schema, used to pad the missing
/// side of outer-join output.
pub(super) fn null_side_tile(schema: &Schema) -> Result<LogicalTile> {
    let nulls = vec![vec![Value::Null; schema.column_count()]];
    let tile = Tile::derived(schema.clone(), nulls)?;
    LogicalTile::wrap_whole_tile(Arc::new(tile))
}

/// Builds padding tiles for every unmatched visible row of the buffered
/// side. `pad_right` chooses whether the NULLs land in the right or the
/// left half of the output.
pub(super) fn padding_tiles(
    buffered: &BufferedSide,
    pad_schema: &Schema,
    pad_right: bool,
) -> Result<Vec<LogicalTile>> {
    let mut tiles = Vec::new();
    for (tile, matched) in &buffered.tiles {
        let null_tile = null_side_tile(pad_schema)?;
        let mut out = if pad_right {
            LogicalTile::join_tile(tile, &null_tile)
        } else {
            LogicalTile::join_tile(&null_tile, tile)
        };
        for row in tile.visible_rows() {
            if matched[row] {
                continue;
            }
            if pad_right {
                out.add_join_row(tile, &null_tile, row, 0);
            } else {
                out.add_join_row(&null_tile, tile, 0, row);
            }
        }
        if out.row_count() > 0 {
            tiles.push(out);
        }
    }
    Ok(tiles)
}
