//! Insert executor: applies plan-embedded tuples, or rows pulled from a
//! child subtree, to the target table within the current transaction.
//! Produces no output tiles; any mutation error flips the transaction
//! result to Failure and surfaces.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::InsertPlan;
use crate::txn::TxnResult;
use eyre::{eyre, Result};
use std::sync::Arc;

pub struct InsertExecutor<'p> {
    plan: &'p InsertPlan,
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
    done: bool,
}

impl<'p> InsertExecutor<'p> {
    pub fn new(plan: &'p InsertPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            child: None,
            done: false,
        }
    }

    fn insert_embedded(&self) -> Result<()> {
        let txn = self.ctx.txn();
        for tuple in &self.plan.tuples {
            self.plan.table.insert_tuple(txn, tuple.clone())?;
        }
        Ok(())
    }

    fn insert_from_tile(&self, tile: &LogicalTile) -> Result<()> {
        let txn = self.ctx.txn();
        for row in tile.visible_rows() {
            let tuple = tile.row_values(row)?;
            self.plan.table.insert_tuple(txn, tuple)?;
        }
        Ok(())
    }
}

impl<'p> Executor<'p> for InsertExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        self.done = false;
        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        let result = match self.child.as_mut() {
            None => {
                self.done = true;
                self.insert_embedded().map(|()| true)
            }
            Some(child) => {
                if !child.execute()? {
                    self.done = true;
                    return Ok(false);
                }
                let tile = child
                    .take_output()
                    .ok_or_else(|| eyre!("insert child yielded no tile"));
                match tile {
                    Ok(tile) => self.insert_from_tile(&tile).map(|()| true),
                    Err(err) => Err(err),
                }
            }
        };
        if result.is_err() {
            self.ctx.txn().set_result(TxnResult::Failure);
        }
        result
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        None
    }
}
