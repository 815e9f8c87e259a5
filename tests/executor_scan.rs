//! # Scan, Projection, and Limit Integration Tests
//!
//! Drives full plans through `execute_plan`: sequential scans with
//! predicates under an auto-materialized root, index scans through the
//! BW-tree, projection targets, and limit/offset boundaries.

use std::sync::Arc;
use vulcandb::expr::{ComparisonOp, Expression};
use vulcandb::plan::{
    IndexScanPlan, LimitPlan, PlanNode, PlanState, ProjectionPlan, SeqScanPlan,
};
use vulcandb::{
    execute_plan, Column, DataTable, DataType, Schema, ScanBounds, TransactionManager, TxnResult,
    Value, ValueRows,
};

fn users_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer, false),
        Column::new("name", DataType::Varchar, true),
    ])
}

fn seeded_table(manager: &Arc<TransactionManager>, rows: &[(i32, &str)]) -> Arc<DataTable> {
    let table = Arc::new(DataTable::new("users", users_schema(), Arc::clone(manager)));
    let txn = manager.start_transaction(1).unwrap();
    for (id, name) in rows {
        table
            .insert_tuple(&txn, vec![Value::Integer(*id), Value::Varchar((*name).into())])
            .unwrap();
    }
    manager.commit(&txn).unwrap();
    table
}

fn seq_scan(table: &Arc<DataTable>, predicate: Option<Expression>) -> PlanNode {
    PlanNode::SeqScan(SeqScanPlan {
        table: Arc::clone(table),
        predicate,
        column_ids: Vec::new(),
        children: Vec::new(),
    })
}

#[test]
fn seq_scan_with_predicate_under_materialized_root() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(1, "a"), (2, "b"), (3, "c")]);

    // col0 > 1
    let predicate = Expression::comparison(
        ComparisonOp::Gt,
        Expression::column(0, 0),
        Expression::constant(Value::Integer(1)),
    );
    let plan = seq_scan(&table, Some(predicate));

    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();

    assert_eq!(status.result, TxnResult::Success);
    assert_eq!(
        status.rows,
        vec![
            vec![Value::Integer(2), Value::Varchar("b".into())],
            vec![Value::Integer(3), Value::Varchar("c".into())],
        ]
    );
}

#[test]
fn seq_scan_projects_selected_columns() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(1, "a"), (2, "b")]);

    let plan = PlanNode::SeqScan(SeqScanPlan {
        table: Arc::clone(&table),
        predicate: None,
        column_ids: vec![1],
        children: Vec::new(),
    });
    let schema = Schema::new(vec![Column::new("name", DataType::Varchar, true)]);
    let status =
        execute_plan(&manager, &plan, &PlanState::default(), &schema, &ValueRows, 100).unwrap();

    assert_eq!(
        status.rows,
        vec![
            vec![Value::Varchar("a".into())],
            vec![Value::Varchar("b".into())],
        ]
    );
}

#[test]
fn index_scan_point_and_range() {
    let manager = Arc::new(TransactionManager::new());
    let table = Arc::new(DataTable::new("users", users_schema(), Arc::clone(&manager)));
    table.add_index("pk", vec![0], true).unwrap();
    let txn = manager.start_transaction(1).unwrap();
    for id in 0..50 {
        table
            .insert_tuple(&txn, vec![Value::Integer(id), Value::Varchar("x".into())])
            .unwrap();
    }
    manager.commit(&txn).unwrap();

    let point = PlanNode::IndexScan(IndexScanPlan {
        table: Arc::clone(&table),
        index_name: "pk".into(),
        bounds: ScanBounds::point(vec![Value::Integer(7)]),
        predicate: None,
        column_ids: Vec::new(),
        children: Vec::new(),
    });
    let status = execute_plan(
        &manager,
        &point,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();
    assert_eq!(status.rows.len(), 1);
    assert_eq!(status.rows[0][0], Value::Integer(7));

    let range = PlanNode::IndexScan(IndexScanPlan {
        table: Arc::clone(&table),
        index_name: "pk".into(),
        bounds: ScanBounds::range(
            Some(vec![Value::Integer(10)]),
            Some(vec![Value::Integer(20)]),
            true,
            false,
        ),
        predicate: None,
        column_ids: Vec::new(),
        children: Vec::new(),
    });
    let status = execute_plan(
        &manager,
        &range,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        101,
    )
    .unwrap();
    let mut ids: Vec<i32> = status
        .rows
        .iter()
        .map(|row| match row[0] {
            Value::Integer(id) => id,
            _ => panic!("unexpected value"),
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (10..20).collect::<Vec<i32>>());
}

#[test]
fn index_scan_applies_residual_predicate() {
    let manager = Arc::new(TransactionManager::new());
    let table = Arc::new(DataTable::new("users", users_schema(), Arc::clone(&manager)));
    table.add_index("pk", vec![0], true).unwrap();
    let txn = manager.start_transaction(1).unwrap();
    table
        .insert_tuple(&txn, vec![Value::Integer(1), Value::Varchar("keep".into())])
        .unwrap();
    table
        .insert_tuple(&txn, vec![Value::Integer(2), Value::Varchar("drop".into())])
        .unwrap();
    manager.commit(&txn).unwrap();

    let plan = PlanNode::IndexScan(IndexScanPlan {
        table: Arc::clone(&table),
        index_name: "pk".into(),
        bounds: ScanBounds::all(),
        predicate: Some(Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(0, 1),
            Expression::constant(Value::Varchar("keep".into())),
        )),
        column_ids: Vec::new(),
        children: Vec::new(),
    });
    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();
    assert_eq!(status.rows.len(), 1);
    assert_eq!(status.rows[0][1], Value::Varchar("keep".into()));
}

#[test]
fn limit_zero_produces_no_rows() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(1, "a"), (2, "b")]);

    let plan = PlanNode::Limit(LimitPlan {
        limit: 0,
        offset: 0,
        children: vec![seq_scan(&table, None)],
    });
    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();
    assert_eq!(status.result, TxnResult::Success);
    assert!(status.rows.is_empty());
}

#[test]
fn limit_with_offset_trims_both_ends() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")]);

    let plan = PlanNode::Limit(LimitPlan {
        limit: 2,
        offset: 1,
        children: vec![seq_scan(&table, None)],
    });
    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();
    let ids: Vec<Value> = status.rows.iter().map(|row| row[0].clone()).collect();
    assert_eq!(ids, vec![Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn projection_builds_plan_specified_tuples() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(10, "a"), (20, "b")]);

    let output_schema = Schema::new(vec![
        Column::new("id", DataType::Integer, false),
        Column::new("flag", DataType::Boolean, false),
    ]);
    let plan = PlanNode::Projection(ProjectionPlan {
        targets: vec![
            Expression::column(0, 0),
            Expression::comparison(
                ComparisonOp::Gt,
                Expression::column(0, 0),
                Expression::constant(Value::Integer(15)),
            ),
        ],
        output_schema: output_schema.clone(),
        children: vec![seq_scan(&table, None)],
    });
    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        &output_schema,
        &ValueRows,
        100,
    )
    .unwrap();
    assert_eq!(
        status.rows,
        vec![
            vec![Value::Integer(10), Value::Boolean(false)],
            vec![Value::Integer(20), Value::Boolean(true)],
        ]
    );
}

#[test]
fn invalid_plan_node_is_skipped_and_children_survive() {
    let manager = Arc::new(TransactionManager::new());
    let table = seeded_table(&manager, &[(1, "a"), (2, "b")]);

    // An Invalid wrapper over a real scan degrades to the scan itself.
    let plan = PlanNode::Invalid {
        children: vec![seq_scan(&table, None)],
    };
    let status = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        table.schema(),
        &ValueRows,
        100,
    )
    .unwrap();
    assert_eq!(status.result, TxnResult::Success);
    assert_eq!(status.rows.len(), 2);
}

#[test]
fn empty_invalid_plan_cannot_execute() {
    let manager = Arc::new(TransactionManager::new());
    let plan = PlanNode::Invalid {
        children: Vec::new(),
    };
    let schema = users_schema();
    let result = execute_plan(
        &manager,
        &plan,
        &PlanState::default(),
        &schema,
        &ValueRows,
        100,
    );
    assert!(result.is_err(), "a plan with no operators cannot execute");
}
