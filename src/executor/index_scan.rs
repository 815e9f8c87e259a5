//! Index scan: consults the BW-tree for the plan's key bounds, batches the
//! matching row pointers into logical tiles, and applies MVCC visibility
//! plus the residual predicate per row. Pointers are grouped by tile
//! because a position list can only reference one base tile.

use super::logical_tile::{LogicalTile, TileRow};
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::config::DEFAULT_TILE_CAPACITY;
use crate::index::TableIndex;
use crate::plan::IndexScanPlan;
use crate::storage::RowPointer;
use eyre::{ensure, eyre, Result};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct IndexScanExecutor<'p> {
    plan: &'p IndexScanPlan,
    ctx: Arc<ExecutorContext>,
    index: Option<Arc<TableIndex>>,
    batches: VecDeque<LogicalTile>,
    scanned: bool,
    output: Option<LogicalTile>,
}

impl<'p> IndexScanExecutor<'p> {
    pub fn new(plan: &'p IndexScanPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            index: None,
            batches: VecDeque::new(),
            scanned: false,
            output: None,
        }
    }

    fn run_scan(&mut self) -> Result<()> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| eyre!("index scan executed before init"))?;

        let mut pointers: Vec<RowPointer> = Vec::new();
        for item in index.scan_range(self.plan.bounds.clone())? {
            let (_, pointer) = item?;
            pointers.push(pointer);
        }

        // One position list addresses one base tile; group by block while
        // keeping key order within each group.
        let mut blocks: Vec<(u32, Vec<u32>)> = Vec::new();
        for pointer in pointers {
            match blocks.iter_mut().find(|(block, _)| *block == pointer.block) {
                Some((_, offsets)) => offsets.push(pointer.offset),
                None => blocks.push((pointer.block, vec![pointer.offset])),
            }
        }

        let txn = Arc::clone(self.ctx.txn());
        let manager = Arc::clone(self.ctx.manager());
        for (block, offsets) in blocks {
            let tile = self
                .plan
                .table
                .tile(block)
                .ok_or_else(|| eyre!("index entry points at missing tile {}", block))?;
            for chunk in offsets.chunks(DEFAULT_TILE_CAPACITY) {
                let mut logical = LogicalTile::wrap_tile(
                    Arc::clone(&tile),
                    chunk.to_vec(),
                    &self.plan.column_ids,
                )?;
                for (row, &offset) in chunk.iter().enumerate() {
                    let mut visible = tile.visible(offset as usize, &txn, &manager);
                    if visible {
                        if let Some(predicate) = &self.plan.predicate {
                            let tuple = TileRow::new(&tile, offset as usize);
                            visible = predicate.evaluate_predicate(Some(&tuple), None)?;
                        }
                    }
                    logical.set_visible(row, visible);
                }
                if logical.visible_count() > 0 {
                    self.batches.push_back(logical);
                }
            }
        }
        Ok(())
    }
}

impl<'p> Executor<'p> for IndexScanExecutor<'p> {
    fn add_child(&mut self, _child: BoxedExecutor<'p>) {}

    fn init(&mut self) -> Result<()> {
        let column_count = self.plan.table.schema().column_count();
        for &id in &self.plan.column_ids {
            ensure!(
                id < column_count,
                "index scan projects column {} but table {} has {}",
                id,
                self.plan.table.name(),
                column_count
            );
        }
        let index = self
            .plan
            .table
            .index(&self.plan.index_name)
            .ok_or_else(|| {
                eyre!(
                    "index {} does not exist on table {}",
                    self.plan.index_name,
                    self.plan.table.name()
                )
            })?;
        self.index = Some(index);
        self.batches.clear();
        self.scanned = false;
        self.output = None;
        Ok(())
    }

    fn execute(&mut self) -> Result<bool> {
        if !self.scanned {
            self.scanned = true;
            self.run_scan()?;
        }
        match self.batches.pop_front() {
            Some(tile) => {
                self.output = Some(tile);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
