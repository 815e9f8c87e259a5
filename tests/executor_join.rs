//! # Join Executor Integration Tests
//!
//! Merge-join run semantics over sorted inputs, nested-loop restart
//! semantics with left-outer padding, and the empty-side boundary cases.

use std::sync::Arc;
use vulcandb::expr::{ComparisonOp, Expression};
use vulcandb::plan::{
    JoinClause, JoinType, MergeJoinPlan, NestedLoopPlan, PlanNode, PlanState, SeqScanPlan,
};
use vulcandb::{
    execute_plan, Column, DataTable, DataType, Schema, TransactionManager, TxnResult, Value,
    ValueRows,
};

fn side_schema(prefix: &str) -> Schema {
    Schema::new(vec![
        Column::new(format!("{}_key", prefix), DataType::Integer, true),
        Column::new(format!("{}_tag", prefix), DataType::Varchar, true),
    ])
}

fn seeded_side(
    manager: &Arc<TransactionManager>,
    name: &str,
    txn_id: u64,
    rows: &[(i32, &str)],
) -> Arc<DataTable> {
    let table = Arc::new(DataTable::new(
        name,
        side_schema(name),
        Arc::clone(manager),
    ));
    let txn = manager.start_transaction(txn_id).unwrap();
    for (key, tag) in rows {
        table
            .insert_tuple(
                &txn,
                vec![Value::Integer(*key), Value::Varchar((*tag).into())],
            )
            .unwrap();
    }
    manager.commit(&txn).unwrap();
    table
}

fn scan(table: &Arc<DataTable>) -> PlanNode {
    PlanNode::SeqScan(SeqScanPlan {
        table: Arc::clone(table),
        predicate: None,
        column_ids: Vec::new(),
        children: Vec::new(),
    })
}

fn equality_clause() -> JoinClause {
    JoinClause {
        left: Expression::column(0, 0),
        right: Expression::column(1, 0),
    }
}

fn merge_join_plan(
    left: &Arc<DataTable>,
    right: &Arc<DataTable>,
    join_type: JoinType,
) -> PlanNode {
    PlanNode::MergeJoin(MergeJoinPlan {
        join_type,
        predicate: None,
        join_clauses: vec![equality_clause()],
        left_schema: left.schema().clone(),
        right_schema: right.schema().clone(),
        children: vec![scan(left), scan(right)],
    })
}

fn row_pair(row: &[Value]) -> (Value, Value) {
    (row[1].clone(), row[3].clone())
}

#[test]
fn merge_join_equal_key_runs() {
    let manager = Arc::new(TransactionManager::new());
    let left = seeded_side(
        &manager,
        "left",
        1,
        &[(1, "l0"), (1, "l1"), (2, "l2"), (3, "l3")],
    );
    let right = seeded_side(
        &manager,
        "right",
        2,
        &[(1, "r0"), (2, "r1"), (2, "r2"), (4, "r3")],
    );

    let plan = merge_join_plan(&left, &right, JoinType::Inner);
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    let mut pairs: Vec<(Value, Value)> = status.rows.iter().map(|r| row_pair(r)).collect();
    pairs.sort_by_key(|(l, r)| (format!("{:?}", l), format!("{:?}", r)));
    assert_eq!(
        pairs,
        vec![
            (Value::Varchar("l0".into()), Value::Varchar("r0".into())),
            (Value::Varchar("l1".into()), Value::Varchar("r0".into())),
            (Value::Varchar("l2".into()), Value::Varchar("r1".into())),
            (Value::Varchar("l2".into()), Value::Varchar("r2".into())),
        ]
    );
}

#[test]
fn merge_join_empty_side_inner_is_empty() {
    let manager = Arc::new(TransactionManager::new());
    let left = seeded_side(&manager, "left", 1, &[(1, "l0"), (2, "l1")]);
    let right = seeded_side(&manager, "right", 2, &[]);

    let plan = merge_join_plan(&left, &right, JoinType::Inner);
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();
    assert_eq!(status.result, TxnResult::Success);
    assert!(status.rows.is_empty());
}

#[test]
fn merge_join_empty_side_left_outer_pads_everything() {
    let manager = Arc::new(TransactionManager::new());
    let left = seeded_side(&manager, "left", 1, &[(1, "l0"), (2, "l1")]);
    let right = seeded_side(&manager, "right", 2, &[]);

    let plan = merge_join_plan(&left, &right, JoinType::Left);
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    assert_eq!(status.rows.len(), 2);
    for row in &status.rows {
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[3], Value::Null);
    }
}

#[test]
fn merge_join_null_keys_do_not_match() {
    let manager = Arc::new(TransactionManager::new());
    let left = Arc::new(DataTable::new(
        "left",
        side_schema("left"),
        Arc::clone(&manager),
    ));
    let txn = manager.start_transaction(1).unwrap();
    left.insert_tuple(&txn, vec![Value::Null, Value::Varchar("ln".into())])
        .unwrap();
    left.insert_tuple(&txn, vec![Value::Integer(1), Value::Varchar("l1".into())])
        .unwrap();
    manager.commit(&txn).unwrap();
    let right = seeded_side(&manager, "right", 2, &[(1, "r1")]);

    let plan = merge_join_plan(&left, &right, JoinType::Inner);
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    assert_eq!(status.rows.len(), 1);
    assert_eq!(row_pair(&status.rows[0]).0, Value::Varchar("l1".into()));
}

#[test]
fn nested_loop_left_outer_scenario() {
    let manager = Arc::new(TransactionManager::new());
    let left = seeded_side(&manager, "left", 1, &[(1, "l1"), (2, "l2"), (3, "l3")]);
    let right = seeded_side(&manager, "right", 2, &[(2, "r2"), (4, "r4")]);

    let plan = PlanNode::NestedLoop(NestedLoopPlan {
        join_type: JoinType::Left,
        predicate: Some(Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(0, 0),
            Expression::column(1, 0),
        )),
        left_schema: left.schema().clone(),
        right_schema: right.schema().clone(),
        children: vec![scan(&left), scan(&right)],
    });
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    let mut rows: Vec<(Value, Value)> = status
        .rows
        .iter()
        .map(|row| (row[0].clone(), row[2].clone()))
        .collect();
    rows.sort_by_key(|(l, _)| format!("{:?}", l));
    assert_eq!(
        rows,
        vec![
            (Value::Integer(1), Value::Null),
            (Value::Integer(2), Value::Integer(2)),
            (Value::Integer(3), Value::Null),
        ]
    );
}

#[test]
fn nested_loop_inner_join_cross_product_with_predicate() {
    let manager = Arc::new(TransactionManager::new());
    let left = seeded_side(&manager, "left", 1, &[(1, "a"), (2, "b")]);
    let right = seeded_side(&manager, "right", 2, &[(1, "x"), (1, "y"), (2, "z")]);

    let plan = PlanNode::NestedLoop(NestedLoopPlan {
        join_type: JoinType::Inner,
        predicate: Some(Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(0, 0),
            Expression::column(1, 0),
        )),
        left_schema: left.schema().clone(),
        right_schema: right.schema().clone(),
        children: vec![scan(&left), scan(&right)],
    });
    let schema = Schema::join(left.schema(), right.schema());
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    let mut pairs: Vec<(Value, Value)> = status.rows.iter().map(|r| row_pair(r)).collect();
    pairs.sort_by_key(|(l, r)| (format!("{:?}", l), format!("{:?}", r)));
    assert_eq!(
        pairs,
        vec![
            (Value::Varchar("a".into()), Value::Varchar("x".into())),
            (Value::Varchar("a".into()), Value::Varchar("y".into())),
            (Value::Varchar("b".into()), Value::Varchar("z".into())),
        ]
    );
}
