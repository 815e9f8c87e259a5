//! Projection: evaluates the plan's target expressions per visible input
//! row into a fresh derived tile of the plan-specified output schema.

use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::ProjectionPlan;
use crate::storage::Tile;
use eyre::{ensure, eyre, Result};
use std::sync::Arc;

pub struct ProjectionExecutor<'p> {
    plan: &'p ProjectionPlan,
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    child: Option<BoxedExecutor<'p>>,
    output: Option<LogicalTile>,
}

impl<'p> ProjectionExecutor<'p> {
    pub fn new(plan: &'p ProjectionPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            child: None,
            output: None,
        }
    }
}

impl<'p> Executor<'p> for ProjectionExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        self.child = Some(child);
    }

    fn init(&mut self) -> Result<()> {
        ensure!(
            self.plan.targets.len() == self.plan.output_schema.column_count(),
            "projection has {} targets but {} output columns",
            self.plan.targets.len(),
            self.plan.output_schema.column_count()
        );
        self.output = None;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| eyre!("projection requires a child"))?;
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
                .ok_or_else(|| eyre!("projection child yielded no tile"))?;

            let mut rows = Vec::with_capacity(tile.visible_count());
            for row in tile.visible_rows() {
                let tuple = tile.row_ref(row);
                let mut values = Vec::with_capacity(self.plan.targets.len());
                for target in &self.plan.targets {
                    values.push(target.evaluate(Some(&tuple), None)?);
                }
                rows.push(values);
            }
            if rows.is_empty() {
                continue;
            }
            let derived = Tile::derived(self.plan.output_schema.clone(), rows)?;
            self.output = Some(LogicalTile::wrap_whole_tile(Arc::new(derived))?);
            return Ok(true);
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
