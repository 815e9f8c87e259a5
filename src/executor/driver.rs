//! # Executor Driver
//!
//! Owns the life of one statement: resolve or start the transaction,
//! mirror the plan tree with executors, auto-insert materialization over
//! roots that emit position-indirect tiles, run the pull loop, transform
//! each output row for the caller, and commit or abort.
//!
//! ## Tree Construction
//!
//! [`build_executor_tree`] is a single match over the plan variant.
//! Unknown or invalid nodes are logged and skipped; their children are
//! still walked and the first surviving child takes the skipped node's
//! place, so a degraded plan still yields a valid subtree.
//!
//! ## Transaction Coupling
//!
//! When the caller's transaction id is unknown to the manager the driver
//! starts (and therefore owns) a single-statement transaction: it commits
//! on success and aborts on any failure, including init failure and
//! cooperative cancellation. A pre-existing transaction is left for its
//! owner to finish; only the result flag is updated. The executor tree is
//! torn down on every exit path when it drops at the end of the call.
//!
//! ## Result Materialization
//!
//! Output rows pass through the caller-supplied [`TupleTransformer`] with
//! an explicit arena argument, so callers with region-allocated result
//! formats can build their rows in place.

use super::{
    BoxedExecutor, DeleteExecutor, Executor, ExecutorContext, IndexScanExecutor, InsertExecutor,
    LimitExecutor, MaterializationExecutor, MergeJoinExecutor, NestedLoopJoinExecutor,
    ProjectionExecutor, SeqScanExecutor, UpdateExecutor,
};
use crate::index::IndexCorruption;
use crate::plan::{PlanNode, PlanState};
use crate::schema::Schema;
use crate::txn::{TransactionManager, TxnId, TxnResult};
use crate::types::Value;
use bumpalo::Bump;
use eyre::{bail, Result};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Converts engine rows into the caller's tuple format. The arena is the
/// allocator for whatever intermediate or final storage the caller's
/// format needs; returning `None` drops the row.
pub trait TupleTransformer {
    type Row;

    fn transform(&self, tuple: &[Value], schema: &Schema, arena: &Bump) -> Result<Option<Self::Row>>;
}

/// The identity transformer: rows come back as owned value vectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueRows;

impl TupleTransformer for ValueRows {
    type Row = Vec<Value>;

    fn transform(
        &self,
        tuple: &[Value],
        _schema: &Schema,
        _arena: &Bump,
    ) -> Result<Option<Self::Row>> {
        Ok(Some(tuple.to_vec()))
    }
}

/// What one `execute_plan` call produced: the transaction's result flag
/// and the transformed output rows.
pub struct ExecutionStatus<R> {
    pub result: TxnResult,
    pub rows: Vec<R>,
}

/// Parameter array from the plan state; missing parameter info is empty.
pub fn build_params(plan_state: &PlanState) -> Vec<Value> {
    plan_state.params.clone().unwrap_or_default()
}

/// Trace-level dump of the plan tree shape.
pub fn print_plan(plan: &PlanNode) {
    fn walk(plan: &PlanNode, depth: usize) {
        trace!(kind = plan.kind_name(), depth, "plan node");
        for child in plan.children() {
            walk(child, depth + 1);
        }
    }
    walk(plan, 0);
}

/// Recursively instantiates an operator per plan node. `None` when the
/// whole subtree was skipped.
pub fn build_executor_tree<'p>(
    plan: &'p PlanNode,
    ctx: &Arc<ExecutorContext>,
) -> Option<BoxedExecutor<'p>> {
    let children: Vec<BoxedExecutor<'p>> = plan
        .children()
        .iter()
        .filter_map(|child| build_executor_tree(child, ctx))
        .collect();

    let executor: Option<BoxedExecutor<'p>> = match plan {
        PlanNode::Invalid { .. } => {
            warn!("invalid plan node, skipping");
            None
        }
        PlanNode::SeqScan(node) => Some(Box::new(SeqScanExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::IndexScan(node) => Some(Box::new(IndexScanExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::Insert(node) => Some(Box::new(InsertExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::Delete(node) => Some(Box::new(DeleteExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::Update(node) => Some(Box::new(UpdateExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::Limit(node) => Some(Box::new(LimitExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::NestedLoop(node) => {
            Some(Box::new(NestedLoopJoinExecutor::new(node, Arc::clone(ctx))))
        }
        PlanNode::MergeJoin(node) => Some(Box::new(MergeJoinExecutor::new(node, Arc::clone(ctx)))),
        PlanNode::Projection(node) => {
            Some(Box::new(ProjectionExecutor::new(node, Arc::clone(ctx))))
        }
        PlanNode::Materialize(node) => {
            Some(Box::new(MaterializationExecutor::new(node, Arc::clone(ctx))))
        }
    };

    match executor {
        Some(mut executor) => {
            for child in children {
                executor.add_child(child);
            }
            Some(executor)
        }
        None => {
            // Skipped node: promote the first surviving child so the
            // subtree stays valid.
            let mut children = children.into_iter();
            let promoted = children.next();
            if children.next().is_some() {
                warn!("skipped plan node had multiple children; extras dropped");
            }
            promoted
        }
    }
}

/// The plan node the built tree effectively roots at, skipping nodes that
/// produce no operator.
fn effective_root(plan: &PlanNode) -> Option<&PlanNode> {
    match plan {
        PlanNode::Invalid { .. } => plan.children().first().and_then(effective_root),
        _ => Some(plan),
    }
}

/// Wraps the root in a materialization if its kind emits position-indirect
/// tiles the caller would otherwise have to traverse.
pub fn add_materialization<'p>(
    root: BoxedExecutor<'p>,
    plan: &'p PlanNode,
    ctx: &Arc<ExecutorContext>,
) -> BoxedExecutor<'p> {
    let needs_wrap = matches!(
        effective_root(plan),
        Some(
            PlanNode::SeqScan(_)
                | PlanNode::IndexScan(_)
                | PlanNode::NestedLoop(_)
                | PlanNode::Limit(_)
        )
    );
    if needs_wrap {
        debug!("added materialization above the plan root");
        Box::new(MaterializationExecutor::wrapping(root, Arc::clone(ctx)))
    } else {
        root
    }
}

/// Builds, initializes, and drains an executor tree for the plan under the
/// given transaction, transforming every output row.
///
/// Operator failures abort an owned transaction and come back as a
/// `Failure` status; index corruption is fatal and surfaces as an error
/// after the abort.
pub fn execute_plan<T: TupleTransformer>(
    manager: &Arc<TransactionManager>,
    plan: &PlanNode,
    plan_state: &PlanState,
    output_schema: &Schema,
    transformer: &T,
    txn_id: TxnId,
) -> Result<ExecutionStatus<T::Row>> {
    print_plan(plan);

    let (txn, owned) = match manager.get_transaction(txn_id) {
        Some(txn) => (txn, false),
        None => {
            // Single-statement transaction; the driver owns its outcome.
            (manager.start_transaction(txn_id)?, true)
        }
    };
    debug!(txn_id = txn.txn_id(), owned, "executing plan");

    let params = build_params(plan_state);
    let ctx = Arc::new(ExecutorContext::new(
        Arc::clone(&txn),
        Arc::clone(manager),
        params,
    ));

    let Some(root) = build_executor_tree(plan, &ctx) else {
        txn.set_result(TxnResult::Failure);
        if owned {
            manager.abort(&txn);
        }
        bail!("plan produced no executable operators");
    };
    let mut root = add_materialization(root, plan, &ctx);

    let arena = Bump::new();
    let mut rows: Vec<T::Row> = Vec::new();
    let outcome = pull_loop(
        &mut root,
        &ctx,
        transformer,
        output_schema,
        &arena,
        &mut rows,
    );

    match outcome {
        Ok(()) => {
            if owned {
                match txn.result() {
                    TxnResult::Success => {
                        if let Err(err) = manager.commit(&txn) {
                            error!(error = %err, "commit rejected");
                            txn.set_result(TxnResult::Failure);
                            manager.abort(&txn);
                        }
                    }
                    TxnResult::Failure => manager.abort(&txn),
                }
            }
            Ok(ExecutionStatus {
                result: txn.result(),
                rows,
            })
        }
        Err(err) => {
            txn.set_result(TxnResult::Failure);
            if owned {
                manager.abort(&txn);
            }
            if err.downcast_ref::<IndexCorruption>().is_some() {
                return Err(err);
            }
            error!(error = %err, "plan execution failed");
            Ok(ExecutionStatus {
                result: TxnResult::Failure,
                rows: Vec::new(),
            })
        }
    }
}

fn pull_loop<T: TupleTransformer>(
    root: &mut BoxedExecutor<'_>,
    ctx: &ExecutorContext,
    transformer: &T,
    output_schema: &Schema,
    arena: &Bump,
    rows: &mut Vec<T::Row>,
) -> Result<()> {
    root.init()?;
    loop {
        if ctx.is_cancelled() {
            bail!("execution cancelled");
        }
        if !root.execute()? {
            return Ok(());
        }
        // DML operators yield without producing tiles.
        let Some(tile) = root.take_output() else {
            continue;
        };
        for row in tile.visible_rows() {
            let values = tile.row_values(row)?;
            if let Some(out) = transformer.transform(&values, output_schema, arena)? {
                rows.push(out);
            }
        }
    }
}
