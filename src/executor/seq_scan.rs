//! Sequential scan: one logical tile per storage tile, with MVCC
//! visibility and the optional scan predicate folded into the visibility
//! bitmap. Predicate column references address the base relation's full
//! schema, independent of which columns the scan projects.

use super::logical_tile::{LogicalTile, TileRow};
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::SeqScanPlan;
use crate::storage::Tile;
use eyre::{ensure, Result};
use std::sync::Arc;

pub struct SeqScanExecutor<'p> {
    plan: &'p SeqScanPlan,
    ctx: Arc<ExecutorContext>,
    tiles: Vec<Arc<Tile>>,
    cursor: usize,
    output: Option<LogicalTile>,
}

impl<'p> SeqScanExecutor<'p> {
    pub fn new(plan: &'p SeqScanPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            tiles: Vec::new(),
            cursor: 0,
            output: None,
        }
    }
}

impl<'p> Executor<'p> for SeqScanExecutor<'p> {
    fn add_child(&mut self, _child: BoxedExecutor<'p>) {
        // Scans are leaves; an attached child is a planner bug surfaced in
        // init via the plan's child list instead.
    }

    fn init(&mut self) -> Result<()> {
        let column_count = self.plan.table.schema().column_count();
        for &id in &self.plan.column_ids {
            ensure!(
                id < column_count,
                "sequential scan projects column {} but table {} has {}",
                id,
                self.plan.table.name(),
                column_count
            );
        }
        self.tiles = self.plan.table.tiles();
        self.cursor = 0;
        self.output = None;
        Ok(())
    }

    fn execute(&mut self) -> Result<bool> {
        while self.cursor < self.tiles.len() {
            let tile = Arc::clone(&self.tiles[self.cursor]);
            self.cursor += 1;

            let row_count = tile.tuple_count();
            let positions: Vec<u32> = (0..row_count as u32).collect();
            let mut logical =
                LogicalTile::wrap_tile(Arc::clone(&tile), positions, &self.plan.column_ids)?;

            let txn = self.ctx.txn();
            let manager = self.ctx.manager();
            for row in 0..row_count {
                let mut visible = tile.visible(row, txn, manager);
                if visible {
                    if let Some(predicate) = &self.plan.predicate {
                        let tuple = TileRow::new(&tile, row);
                        visible = predicate.evaluate_predicate(Some(&tuple), None)?;
                    }
                }
                logical.set_visible(row, visible);
            }

            if logical.visible_count() > 0 {
                self.output = Some(logical);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
