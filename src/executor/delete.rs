//! Delete executor: consumes its child's tiles and stamps every visible
//! row deleted in the current transaction, maintaining the table's
//! indexes. No output tiles.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::DeletePlan;
use crate::txn::TxnResult;
use eyre::{eyre, Result};
use std::sync::Arc;

pub struct DeleteExecutor<'p> {
    plan: &'p DeletePlan,
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
}

impl<'p> DeleteExecutor<'p> {
    pub fn new(plan: &'p DeletePlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            child: None,
        }
    }

    fn delete_tile(&self, tile: &LogicalTile) -> Result<()> {
        let txn = self.ctx.txn();
        for row in tile.visible_rows() {
            let pointer = tile
                .row_pointer(row)
                .ok_or_else(|| eyre!("delete input has no row provenance"))?;
            self.plan.table.delete_tuple(txn, pointer)?;
        }
        Ok(())
    }
}

impl<'p> Executor<'p> for DeleteExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| eyre!("delete requires a child scan"))?;
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
            .ok_or_else(|| eyre!("delete child yielded no tile"))?;
        if let Err(err) = self.delete_tile(&tile) {
            self.ctx.txn().set_result(TxnResult::Failure);
            return Err(err);
        }
        Ok(true)
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        None
    }
}
