//! Limit: passes through up to `limit` visible rows after hiding the
//! first `offset`, trimming the visibility bitmap of pass-through tiles.
//! Limit 0 produces nothing.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::LimitPlan;
use eyre::{eyre, Result};
use std::sync::Arc;

pub struct LimitExecutor<'p> {
    plan: &'p LimitPlan,
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
    skipped: usize,
    returned: usize,
    output: Option<LogicalTile>,
}

impl<'p> LimitExecutor<'p> {
    pub fn new(plan: &'p LimitPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            child: None,
            skipped: 0,
            returned: 0,
            output: None,
        }
    }
}

impl<'p> Executor<'p> for LimitExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        self.skipped = 0;
        self.returned = 0;
        self.output = None;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| eyre!("limit requires a child"))?;
        child.init()
    }

    fn execute(&mut self) -> Result<bool> {
        loop {
            if self.returned >= self.plan.limit {
                return Ok(false);
            }
            let Some(child) = self.child.as_mut() else {
                return Ok(false);
            };
            if !child.execute()? {
                return Ok(false);
            }
            let mut tile = child
                .take_output()
                .ok_or_else(|| eyre!("limit child yielded no tile"))?;

            for row in 0..tile.row_count() {
                if !tile.is_visible(row) {
                    continue;
                }
                if self.skipped < self.plan.offset {
                    self.skipped += 1;
                    tile.set_visible(row, false);
                } else if self.returned >= self.plan.limit {
                    tile.set_visible(row, false);
                } else {
                    self.returned += 1;
                }
            }
            if tile.visible_count() > 0 {
                self.output = Some(tile);
                return Ok(true);
            }
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
