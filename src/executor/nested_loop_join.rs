//! Nested-loop join: for each outer tile, for each visible outer row, the
//! inner subtree is restarted with `init` and scanned to exhaustion; pairs
//! that satisfy the join predicate are emitted. Supports inner and
//! left-outer modes — unmatched outer rows come out NULL-padded after the
//! outer stream ends.

use super::join::{padding_tiles, BufferedSide};
use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::{JoinType, NestedLoopPlan};
use eyre::{bail, eyre, Result};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct NestedLoopJoinExecutor<'p> {
    plan: &'p NestedLoopPlan,
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    left: Option<BoxedExecutor<'p>>,
    right: Option<BoxedExecutor<'p>>,
    buffered_left: BufferedSide,
    pending: VecDeque<LogicalTile>,
    left_done: bool,
    padding_emitted: bool,
    output: Option<LogicalTile>,
}

impl<'p> NestedLoopJoinExecutor<'p> {
    pub fn new(plan: &'p NestedLoopPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            left: None,
            right: None,
            buffered_left: BufferedSide::new(),
            pending: VecDeque::new(),
            left_done: false,
            padding_emitted: false,
            output: None,
        }
    }

    /// Joins one outer row against a full restart of the inner subtree,
    /// queueing one output tile per inner tile that produced matches.
    fn join_outer_row(&mut self, left_tile: &LogicalTile, left_row: usize) -> Result<bool> {
        let right = self
            .right
            .as_mut()
            .ok_or_else(|| eyre!("nested loop join lost its inner child"))?;
        right.init()?;

        let mut matched = false;
        while right.execute()? {
            let right_tile = right
                .take_output()
                .ok_or_else(|| eyre!("join child yielded no tile"))?;
            let mut out = LogicalTile::join_tile(left_tile, &right_tile);
            let left_tuple = left_tile.row_ref(left_row);
            for right_row in right_tile.visible_rows() {
                let right_tuple = right_tile.row_ref(right_row);
                let qualifies = match &self.plan.predicate {
                    Some(predicate) => {
                        predicate.evaluate_predicate(Some(&left_tuple), Some(&right_tuple))?
                    }
                    None => true,
                };
                if qualifies {
                    out.add_join_row(left_tile, &right_tile, left_row, right_row);
                    matched = true;
                }
            }
            if out.row_count() > 0 {
                self.pending.push_back(out);
            }
        }
        Ok(matched)
    }
}

impl<'p> Executor<'p> for NestedLoopJoinExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        if self.left.is_none() {
            self.left = Some(child);
        } else {
            self.right = Some(child);
        }
    }

    fn init(&mut self) -> Result<()> {
        if matches!(self.plan.join_type, JoinType::Right | JoinType::Full) {
            bail!("nested loop join supports inner and left outer modes only");
        }
        self.buffered_left = BufferedSide::new();
        self.pending.clear();
        self.left_done = false;
        self.padding_emitted = false;
        self.output = None;
        let left = self
            .left
            .as_mut()
            .ok_or_else(|| eyre!("nested loop join requires two children"))?;
        left.init()?;
        let right = self
            .right
            .as_mut()
            .ok_or_else(|| eyre!("nested loop join requires two children"))?;
        right.init()
    }

    fn execute(&mut self) -> Result<bool> {
        loop {
            if let Some(tile) = self.pending.pop_front() {
                self.output = Some(tile);
                return Ok(true);
            }
            if self.left_done {
                if self.plan.join_type == JoinType::Left && !self.padding_emitted {
                    self.padding_emitted = true;
                    let padding =
                        padding_tiles(&self.buffered_left, &self.plan.right_schema, true)?;
                    self.pending.extend(padding);
                    continue;
                }
                return Ok(false);
            }

            let left = self
                .left
                .as_mut()
                .ok_or_else(|| eyre!("nested loop join lost its outer child"))?;
            if !left.execute()? {
                self.left_done = true;
                continue;
            }
            let left_tile = left
                .take_output()
                .ok_or_else(|| eyre!("join child yielded no tile"))?;
            self.buffered_left.push(left_tile.clone());

            let left_rows: Vec<usize> = left_tile.visible_rows().collect();
            for left_row in left_rows {
                if self.join_outer_row(&left_tile, left_row)? {
                    self.buffered_left.mark_matched(left_row);
                }
            }
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
