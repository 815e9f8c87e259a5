//! Materialization: copies a position-list-bearing logical tile into a
//! contiguous derived tile so consumers iterate without position
//! indirection. The driver auto-inserts one above scan, nested-loop, and
//! limit roots.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::MaterializePlan;
use crate::storage::Tile;
use eyre::{eyre, Result};
use std::sync::Arc;

pub struct MaterializationExecutor<'p> {
    #[allow(dead_code)]
    plan: Option<&'p MaterializePlan>,
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
    output: Option<LogicalTile>,
}

impl<'p> MaterializationExecutor<'p> {
    pub fn new(plan: &'p MaterializePlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan: Some(plan),
            ctx,
            child: None,
            output: None,
        }
    }

    /// The driver-inserted variant with no plan node behind it.
    pub fn wrapping(root: BoxedExecutor<'p>, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan: None,
            ctx,
            child: Some(root),
            output: None,
        }
    }
}

impl<'p> Executor<'p> for MaterializationExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        self.output = None;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| eyre!("materialization requires a child"))?;
        child.init()
    }

    fn execute(&mut self) -> Result<bool> {
        loop {
            let Some(child) = self.child.as_mut() else {
                return Ok(false);
            };
            if !child.execute()? {
                return Ok(false);
            }
            let tile = child
                .take_output()
                .ok_or_else(|| eyre!("materialization child yielded no tile"))?;

            let mut rows = Vec::with_capacity(tile.visible_count());
            for row in tile.visible_rows() {
                rows.push(tile.row_values(row)?);
            }
            if rows.is_empty() {
                continue;
            }
            let derived = Tile::derived(tile.output_schema(), rows)?;
            self.output = Some(LogicalTile::wrap_whole_tile(Arc::new(derived))?);
            return Ok(true);
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
