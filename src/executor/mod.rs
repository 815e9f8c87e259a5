//! # Query Executor — Volcano Model
//!
//! Pull-based query evaluation: the driver mirrors the plan tree with one
//! operator per plan node, then repeatedly pulls logical tiles from the
//! root. Each operator implements the same three-call contract:
//!
//! - `init()`: one-time setup — resolve schemas, read plan parameters,
//!   validate children. Also resets iteration state, which is what lets
//!   the nested-loop join restart its inner subtree by re-initializing it.
//! - `execute()`: pull enough input to produce one non-empty output tile.
//!   `Ok(false)` means permanently exhausted; errors are unrecoverable and
//!   the driver translates them into transaction failure.
//! - `take_output()`: transfer ownership of the last produced tile. DML
//!   operators always return `None`.
//!
//! ## Operator Tree
//!
//! ```text
//! MaterializationExecutor
//!     └── LimitExecutor
//!             └── SeqScanExecutor
//!                     └── [table tiles]
//! ```
//!
//! Children are attached before `init`; every operator in one tree shares
//! a single [`ExecutorContext`] carrying the transaction, the snapshotted
//! parameter values, and the cooperative cancellation flag the driver
//! checks between pulls.
//!
//! ## State Machine
//!
//! `Created → Initialized → (Executing ↔ Yielded) → Exhausted`. DML
//! operators with plan-embedded input move to Exhausted after their first
//! `execute`; everything else exhausts when its input does.

mod delete;
pub mod driver;
mod index_scan;
mod insert;
mod join;
mod limit;
mod logical_tile;
mod materialize;
mod merge_join;
mod nested_loop_join;
mod projection;
mod seq_scan;
mod update;

pub use delete::DeleteExecutor;
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use logical_tile::{LogicalTile, LogicalTileRow, TileRow};
pub use materialize::MaterializationExecutor;
pub use merge_join::MergeJoinExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

use crate::txn::{Transaction, TransactionManager};
use crate::types::Value;
use eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The iterator contract every operator implements. The lifetime ties an
/// operator to the plan tree it was built from.
pub trait Executor<'p> {
    /// Attaches a child; must happen before `init`.
    fn add_child(&mut self, child: BoxedExecutor<'p>);

    fn init(&mut self) -> Result<()>;

    /// Produces one non-empty output tile, or `Ok(false)` on exhaustion.
    fn execute(&mut self) -> Result<bool>;

    fn take_output(&mut self) -> Option<LogicalTile>;
}

pub type BoxedExecutor<'p> = Box<dyn Executor<'p> + 'p>;

/// Per-statement state shared by every operator of one tree: the
/// transaction, the parameter snapshot, and the cancellation flag. Shared
/// read-only after construction.
pub struct ExecutorContext {
    txn: Arc<Transaction>,
    manager: Arc<TransactionManager>,
    params: Vec<Value>,
    cancel: AtomicBool,
}

impl ExecutorContext {
    pub fn new(
        txn: Arc<Transaction>,
        manager: Arc<TransactionManager>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            txn,
            manager,
            params,
            cancel: AtomicBool::new(false),
        }
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Requests cooperative cancellation; the driver honors it between
    /// tile pulls.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}
