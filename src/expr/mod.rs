//! # Expression Trees
//!
//! The executor's predicate and projection language: constants, column
//! references, and binary comparisons. An expression evaluates against up
//! to two tuples; column references select the left/outer tuple with
//! `tuple_idx == 0` and the right/inner tuple with `tuple_idx == 1`, which
//! is how join predicates address both sides.
//!
//! ## NULL Handling
//!
//! Three-valued logic is not implemented. A comparison with a NULL operand
//! (or operands from incomparable type families) evaluates to
//! `Boolean(false)`; operators treat false as "row does not qualify".
//!
//! ## Failure
//!
//! A column reference past the end of its tuple is a hard evaluation error
//! (the plan addressed a column that does not exist), not a NULL.

pub mod translate;

use crate::types::Value;
use eyre::{bail, Result};
use std::cmp::Ordering;

/// Read access to one tuple's columns, implemented by physical tuples,
/// logical tile rows, and the NULL-padding tuples joins use.
pub trait TupleAccess {
    fn value_at(&self, column: usize) -> Option<Value>;
    fn column_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ord == Ordering::Equal,
            ComparisonOp::Ne => ord != Ordering::Equal,
            ComparisonOp::Lt => ord == Ordering::Less,
            ComparisonOp::Le => ord != Ordering::Greater,
            ComparisonOp::Gt => ord == Ordering::Greater,
            ComparisonOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Value),
    ColumnRef {
        /// 0 selects the left/outer tuple, 1 the right/inner tuple.
        tuple_idx: usize,
        column_idx: usize,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn constant(value: Value) -> Expression {
        Expression::Constant(value)
    }

    pub fn column(tuple_idx: usize, column_idx: usize) -> Expression {
        Expression::ColumnRef {
            tuple_idx,
            column_idx,
        }
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates against up to two tuples. Constants and single-tuple trees
    /// ignore the tuple they do not reference.
    pub fn evaluate(
        &self,
        left: Option<&dyn TupleAccess>,
        right: Option<&dyn TupleAccess>,
    ) -> Result<Value> {
        match self {
            Expression::Constant(value) => Ok(value.clone()),
            Expression::ColumnRef {
                tuple_idx,
                column_idx,
            } => {
                let tuple = match tuple_idx {
                    0 => left,
                    1 => right,
                    n => bail!("bad column reference: tuple index {} out of range", n),
                };
                let Some(tuple) = tuple else {
                    bail!(
                        "bad column reference: tuple {} not bound for this evaluation",
                        tuple_idx
                    );
                };
                match tuple.value_at(*column_idx) {
                    Some(value) => Ok(value),
                    None => bail!(
                        "bad column reference: column {} out of range (tuple has {})",
                        column_idx,
                        tuple.column_count()
                    ),
                }
            }
            Expression::Comparison { op, left: l, right: r } => {
                let lv = l.evaluate(left, right)?;
                let rv = r.evaluate(left, right)?;
                let qualified = match lv.compare(&rv) {
                    Some(ord) => op.matches(ord),
                    None => false,
                };
                Ok(Value::Boolean(qualified))
            }
        }
    }

    /// Evaluates as a predicate: anything other than `Boolean(true)` is a
    /// non-qualifying row.
    pub fn evaluate_predicate(
        &self,
        left: Option<&dyn TupleAccess>,
        right: Option<&dyn TupleAccess>,
    ) -> Result<bool> {
        Ok(matches!(self.evaluate(left, right)?, Value::Boolean(true)))
    }
}

/// A tuple whose every column reads as NULL, for evaluating expressions
/// against a side that has no row.
pub struct NullTuple {
    columns: usize,
}

impl NullTuple {
    pub fn new(columns: usize) -> Self {
        Self { columns }
    }
}

impl TupleAccess for NullTuple {
    fn value_at(&self, column: usize) -> Option<Value> {
        (column < self.columns).then_some(Value::Null)
    }

    fn column_count(&self) -> usize {
        self.columns
    }
}

impl TupleAccess for Vec<Value> {
    fn value_at(&self, column: usize) -> Option<Value> {
        self.get(column).cloned()
    }

    fn column_count(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Vec<Value> {
        values
    }

    #[test]
    fn constant_ignores_tuples() {
        let expr = Expression::constant(Value::Integer(7));
        assert_eq!(expr.evaluate(None, None).unwrap(), Value::Integer(7));
    }

    #[test]
    fn column_ref_selects_tuple_by_index() {
        let left = row(vec![Value::Integer(1), Value::Varchar("l".into())]);
        let right = row(vec![Value::Integer(2)]);
        let lhs = Expression::column(0, 0);
        let rhs = Expression::column(1, 0);
        assert_eq!(
            lhs.evaluate(Some(&left), Some(&right)).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            rhs.evaluate(Some(&left), Some(&right)).unwrap(),
            Value::Integer(2)
        );
    }

    #[test]
    fn out_of_range_column_fails() {
        let left = row(vec![Value::Integer(1)]);
        let expr = Expression::column(0, 5);
        assert!(expr.evaluate(Some(&left), None).is_err());
    }

    #[test]
    fn comparison_with_null_is_false() {
        let left = row(vec![Value::Null]);
        let expr = Expression::comparison(
            ComparisonOp::Eq,
            Expression::column(0, 0),
            Expression::constant(Value::Null),
        );
        assert_eq!(
            expr.evaluate(Some(&left), None).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn comparison_widens_numeric_operands() {
        let left = row(vec![Value::TinyInt(5)]);
        let expr = Expression::comparison(
            ComparisonOp::Gt,
            Expression::column(0, 0),
            Expression::constant(Value::BigInt(4)),
        );
        assert_eq!(
            expr.evaluate(Some(&left), None).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn null_tuple_pads_every_column() {
        let pad = NullTuple::new(2);
        assert_eq!(pad.value_at(1), Some(Value::Null));
        assert_eq!(pad.value_at(2), None);
    }
}
