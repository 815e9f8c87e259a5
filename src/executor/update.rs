//! Update executor: for every visible child row, evaluates the plan's
//! assignment expressions over the old row, then applies the new version
//! through the table. Storage sees delete-then-insert; each index sees one
//! logical event. No output tiles.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::UpdatePlan;
use crate::txn::TxnResult;
use eyre::{ensure, eyre, Result};
use std::sync::Arc;

pub struct UpdateExecutor<'p> {
    plan: &'p UpdatePlan,
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
}

impl<'p> UpdateExecutor<'p> {
    pub fn new(plan: &'p UpdatePlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            child: None,
        }
    }

    fn update_tile(&self, tile: &LogicalTile) -> Result<()> {
        let txn = self.ctx.txn();
        let column_count = self.plan.table.schema().column_count();
        for row in tile.visible_rows() {
            let pointer = tile
                .row_pointer(row)
                .ok_or_else(|| eyre!("update input has no row provenance"))?;
            let old_values = tile.row_values(row)?;
            ensure!(
                old_values.len() == column_count,
                "update child must project the full schema of table {}",
                self.plan.table.name()
            );
            let mut new_values = old_values.clone();
            for (column, expr) in &self.plan.assignments {
                ensure!(
                    *column < column_count,
                    "update assigns to column {} but table {} has {}",
                    column,
                    self.plan.table.name(),
                    column_count
                );
                new_values[*column] = expr.evaluate(Some(&old_values), None)?;
            }
            self.plan.table.update_tuple(txn, pointer, new_values)?;
        }
        Ok(())
    }
}

impl<'p> Executor<'p> for UpdateExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| eyre!("update requires a child scan"))?;
        child.init()
    }

    fn execute(&mut self) -> Result<bool> {
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };
        if !child.execute()? {
            return Ok(false);
        }
        let tile = child
            .take_output()
            .ok_or_else(|| eyre!("update child yielded no tile"))?;
        if let Err(err) = self.update_tile(&tile) {
            self.ctx.txn().set_result(TxnResult::Failure);
            return Err(err);
        }
        Ok(true)
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        None
    }
}
