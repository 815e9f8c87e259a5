//! # Merge Join
//!
//! Joins two inputs that arrive sorted on the conjunctive equality join
//! keys. Each side maintains a buffered tile and a half-open `[start,
//! end)` row range delimiting the current **run** — the maximal contiguous
//! group of rows equal in the join keys. Runs never cross tile
//! boundaries; a run cut off by the end of its tile simply ends there.
//!
//! The matching loop compares the head rows of the two current runs clause
//! by clause. The first non-equal clause decides: less advances the left
//! run, greater advances the right run; all-equal emits the Cartesian
//! product of the two runs and advances both. A false join predicate (or
//! a NULL join key, which can never compare equal) emits nothing and
//! advances both sides. The drive loop is iterative throughout — an empty
//! match round loops back for more input rather than recursing.
//!
//! Left/right/full outer modes emit the unmatched rows of the buffered
//! tiles with NULL padding after both inputs drain.

use super::join::{padding_tiles, BufferedSide};
use super::logical_tile::LogicalTile;
use super::{BoxedExecutor, Executor, ExecutorContext};
use crate::plan::{JoinType, MergeJoinPlan};
use eyre::{ensure, eyre, Result};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct MergeJoinExecutor<'p> {
    plan: &'p MergeJoinPlan,
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    left: Option<BoxedExecutor<'p>>,
    right: Option<BoxedExecutor<'p>>,
    buffered_left: BufferedSide,
    buffered_right: BufferedSide,
    left_start: usize,
    left_end: usize,
    right_start: usize,
    right_end: usize,
    left_done: bool,
    right_done: bool,
    pending: VecDeque<LogicalTile>,
    padding_emitted: bool,
    output: Option<LogicalTile>,
}

impl<'p> MergeJoinExecutor<'p> {
    pub fn new(plan: &'p MergeJoinPlan, ctx: Arc<ExecutorContext>) -> Self {
        Self {
            plan,
            ctx,
            left: None,
            right: None,
            buffered_left: BufferedSide::new(),
            buffered_right: BufferedSide::new(),
            left_start: 0,
            left_end: 0,
            right_start: 0,
            right_end: 0,
            left_done: false,
            right_done: false,
            pending: VecDeque::new(),
            padding_emitted: false,
            output: None,
        }
    }

    /// Scans forward from `start` until a row's join keys differ from the
    /// previous row's; returns the exclusive end of the run. Runs end at
    /// the tile boundary by contract.
    fn advance_run(&self, tile: &LogicalTile, start: usize, is_left: bool) -> Result<usize> {
        let count = tile.row_count();
        if start >= count {
            return Ok(start);
        }
        let mut end = start + 1;
        while end < count {
            let this = tile.row_ref(end - 1);
            let next = tile.row_ref(end);
            let mut differs = false;
            for clause in &self.plan.join_clauses {
                let expr = if is_left { &clause.left } else { &clause.right };
                let this_key = expr.evaluate(Some(&this), Some(&this))?;
                let next_key = expr.evaluate(Some(&next), Some(&next))?;
                if this_key.total_cmp(&next_key) != Ordering::Equal {
                    differs = true;
                    break;
                }
            }
            if differs {
                break;
            }
            end += 1;
        }
        Ok(end)
    }

    /// Runs the matching loop over the current tile pair. `true` when an
    /// output tile was produced.
    fn match_runs(&mut self) -> Result<bool> {
        let left_tile = self
            .buffered_left
            .last_tile()
            .ok_or_else(|| eyre!("merge join has no buffered left tile"))?
            .clone();
        let right_tile = self
            .buffered_right
            .last_tile()
            .ok_or_else(|| eyre!("merge join has no buffered right tile"))?
            .clone();

        let mut out = LogicalTile::join_tile(&left_tile, &right_tile);
        let mut left_matched: Vec<usize> = Vec::new();
        let mut right_matched: Vec<usize> = Vec::new();

        while self.left_end > self.left_start && self.right_end > self.right_start {
            let left_tuple = left_tile.row_ref(self.left_start);
            let right_tuple = right_tile.row_ref(self.right_start);

            // Compare the run heads clause by clause; the first non-equal
            // clause decides which side advances.
            let mut decided: Option<Ordering> = None;
            let mut null_key = false;
            for clause in &self.plan.join_clauses {
                let left_key = clause.left.evaluate(Some(&left_tuple), Some(&right_tuple))?;
                let right_key = clause.right.evaluate(Some(&left_tuple), Some(&right_tuple))?;
                if left_key.is_null() || right_key.is_null() {
                    null_key = true;
                }
                match left_key.total_cmp(&right_key) {
                    Ordering::Equal => continue,
                    unequal => {
                        decided = Some(unequal);
                        break;
                    }
                }
            }

            match decided {
                Some(Ordering::Less) => {
                    self.left_start = self.left_end;
                    self.left_end = self.advance_run(&left_tile, self.left_start, true)?;
                }
                Some(_) => {
                    self.right_start = self.right_end;
                    self.right_end = self.advance_run(&right_tile, self.right_start, false)?;
                }
                None => {
                    // Keys equal. NULL keys never join, and a false
                    // residual predicate emits nothing; both cases advance
                    // both sides.
                    let qualifies = if null_key {
                        false
                    } else {
                        match &self.plan.predicate {
                            Some(predicate) => predicate
                                .evaluate_predicate(Some(&left_tuple), Some(&right_tuple))?,
                            None => true,
                        }
                    };
                    if qualifies {
                        for l in self.left_start..self.left_end {
                            if !left_tile.is_visible(l) {
                                continue;
                            }
                            for r in self.right_start..self.right_end {
                                if !right_tile.is_visible(r) {
                                    continue;
                                }
                                out.add_join_row(&left_tile, &right_tile, l, r);
                                left_matched.push(l);
                                right_matched.push(r);
                            }
                        }
                    }
                    self.left_start = self.left_end;
                    self.left_end = self.advance_run(&left_tile, self.left_start, true)?;
                    self.right_start = self.right_end;
                    self.right_end = self.advance_run(&right_tile, self.right_start, false)?;
                }
            }
        }

        for row in left_matched {
            self.buffered_left.mark_matched(row);
        }
        for row in right_matched {
            self.buffered_right.mark_matched(row);
        }
        if out.row_count() > 0 {
            self.output = Some(out);
            return Ok(true);
        }
        Ok(false)
    }

    fn emit_padding(&mut self) -> Result<()> {
        if matches!(self.plan.join_type, JoinType::Left | JoinType::Full) {
            let tiles = padding_tiles(&self.buffered_left, &self.plan.right_schema, true)?;
            self.pending.extend(tiles);
        }
        if matches!(self.plan.join_type, JoinType::Right | JoinType::Full) {
            let tiles = padding_tiles(&self.buffered_right, &self.plan.left_schema, false)?;
            self.pending.extend(tiles);
        }
        Ok(())
    }
}

impl<'p> Executor<'p> for MergeJoinExecutor<'p> {
    fn add_child(&mut self, child: BoxedExecutor<'p>) {
        if self.left.is_none() {
            self.left = Some(child);
        } else {
            self.right = Some(child);
        }
    }

    fn init(&mut self) -> Result<()> {
        ensure!(
            !self.plan.join_clauses.is_empty(),
            "merge join requires at least one join clause"
        );
        self.buffered_left = BufferedSide::new();
        self.buffered_right = BufferedSide::new();
        self.left_start = 0;
        self.left_end = 0;
        self.right_start = 0;
        self.right_end = 0;
        self.left_done = false;
        self.right_done = false;
        self.pending.clear();
        self.padding_emitted = false;
        self.output = None;
        let left = self
            .left
            .as_mut()
            .ok_or_else(|| eyre!("merge join requires two children"))?;
        left.init()?;
        let right = self
            .right
            .as_mut()
            .ok_or_else(|| eyre!("merge join requires two children"))?;
        right.init()
    }

    fn execute(&mut self) -> Result<bool> {
        loop {
            if let Some(tile) = self.pending.pop_front() {
                self.output = Some(tile);
                return Ok(true);
            }
            if self.left_done && self.right_done {
                if !self.padding_emitted {
                    self.padding_emitted = true;
                    self.emit_padding()?;
                    continue;
                }
                return Ok(false);
            }

            // Pull the next right tile when its run is exhausted, or drain
            // the right side once the left is done (its tiles still feed
            // outer padding).
            if (!self.right_done && self.right_start == self.right_end) || self.left_done {
                let right = self
                    .right
                    .as_mut()
                    .ok_or_else(|| eyre!("merge join lost its right child"))?;
                if !right.execute()? {
                    self.right_done = true;
                    continue;
                }
                let tile = right
                    .take_output()
                    .ok_or_else(|| eyre!("join child yielded no tile"))?;
                self.right_start = 0;
                self.right_end = self.advance_run(&tile, 0, false)?;
                self.buffered_right.push(tile);
            }

            if (!self.left_done && self.left_start == self.left_end) || self.right_done {
                let left = self
                    .left
                    .as_mut()
                    .ok_or_else(|| eyre!("merge join lost its left child"))?;
                if !left.execute()? {
                    self.left_done = true;
                    continue;
                }
                let tile = left
                    .take_output()
                    .ok_or_else(|| eyre!("join child yielded no tile"))?;
                self.left_start = 0;
                self.left_end = self.advance_run(&tile, 0, true)?;
                self.buffered_left.push(tile);
            }

            if self.left_done || self.right_done {
                continue;
            }
            if self.match_runs()? {
                return Ok(true);
            }
        }
    }

    fn take_output(&mut self) -> Option<LogicalTile> {
        self.output.take()
    }
}
