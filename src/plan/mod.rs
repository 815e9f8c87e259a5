//! # Plan Nodes
//!
//! The logical description of a statement as handed over by the upstream
//! planner: one tagged variant per operation, each carrying its
//! kind-specific fields plus a child list. The executor driver walks this
//! tree once, producing a mirrored operator tree; unknown kinds are logged
//! and skipped while their children are still walked.
//!
//! Plan nodes borrow nothing from the executor; executors hold plan nodes
//! by shared reference for the lifetime of one statement.

use crate::expr::Expression;
use crate::index::{IndexKey, ScanBounds};
use crate::schema::Schema;
use crate::storage::DataTable;
use crate::types::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// One equality clause of a merge join: `left_expr = right_expr`, with the
/// left expression evaluated over the outer tuple and the right over the
/// inner.
pub struct JoinClause {
    pub left: Expression,
    pub right: Expression,
}

pub struct SeqScanPlan {
    pub table: Arc<DataTable>,
    pub predicate: Option<Expression>,
    pub column_ids: Vec<usize>,
    pub children: Vec<PlanNode>,
}

pub struct IndexScanPlan {
    pub table: Arc<DataTable>,
    pub index_name: String,
    pub bounds: ScanBounds<IndexKey>,
    pub predicate: Option<Expression>,
    pub column_ids: Vec<usize>,
    pub children: Vec<PlanNode>,
}

pub struct InsertPlan {
    pub table: Arc<DataTable>,
    pub tuples: Vec<Vec<Value>>,
    pub children: Vec<PlanNode>,
}

pub struct DeletePlan {
    pub table: Arc<DataTable>,
    pub children: Vec<PlanNode>,
}

pub struct UpdatePlan {
    pub table: Arc<DataTable>,
    /// `(column index, value expression)` pairs applied over the old row.
    pub assignments: Vec<(usize, Expression)>,
    pub children: Vec<PlanNode>,
}

pub struct LimitPlan {
    pub limit: usize,
    pub offset: usize,
    pub children: Vec<PlanNode>,
}

pub struct NestedLoopPlan {
    pub join_type: JoinType,
    pub predicate: Option<Expression>,
    pub left_schema: Schema,
    pub right_schema: Schema,
    pub children: Vec<PlanNode>,
}

pub struct MergeJoinPlan {
    pub join_type: JoinType,
    pub predicate: Option<Expression>,
    pub join_clauses: Vec<JoinClause>,
    pub left_schema: Schema,
    pub right_schema: Schema,
    pub children: Vec<PlanNode>,
}

pub struct ProjectionPlan {
    pub targets: Vec<Expression>,
    pub output_schema: Schema,
    pub children: Vec<PlanNode>,
}

pub struct MaterializePlan {
    pub children: Vec<PlanNode>,
}

pub enum PlanNode {
    Invalid { children: Vec<PlanNode> },
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Insert(InsertPlan),
    Delete(DeletePlan),
    Update(UpdatePlan),
    Limit(LimitPlan),
    NestedLoop(NestedLoopPlan),
    MergeJoin(MergeJoinPlan),
    Projection(ProjectionPlan),
    Materialize(MaterializePlan),
}

impl PlanNode {
    pub fn children(&self) -> &[PlanNode] {
        match self {
            PlanNode::Invalid { children } => children,
            PlanNode::SeqScan(plan) => &plan.children,
            PlanNode::IndexScan(plan) => &plan.children,
            PlanNode::Insert(plan) => &plan.children,
            PlanNode::Delete(plan) => &plan.children,
            PlanNode::Update(plan) => &plan.children,
            PlanNode::Limit(plan) => &plan.children,
            PlanNode::NestedLoop(plan) => &plan.children,
            PlanNode::MergeJoin(plan) => &plan.children,
            PlanNode::Projection(plan) => &plan.children,
            PlanNode::Materialize(plan) => &plan.children,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanNode::Invalid { .. } => "Invalid",
            PlanNode::SeqScan(_) => "SeqScan",
            PlanNode::IndexScan(_) => "IndexScan",
            PlanNode::Insert(_) => "Insert",
            PlanNode::Delete(_) => "Delete",
            PlanNode::Update(_) => "Update",
            PlanNode::Limit(_) => "Limit",
            PlanNode::NestedLoop(_) => "NestedLoop",
            PlanNode::MergeJoin(_) => "MergeJoin",
            PlanNode::Projection(_) => "Projection",
            PlanNode::Materialize(_) => "Materialize",
        }
    }
}

/// Host-supplied statement state. The only field the executor consumes is
/// the optional parameter list.
#[derive(Default)]
pub struct PlanState {
    pub params: Option<Vec<Value>>,
}
