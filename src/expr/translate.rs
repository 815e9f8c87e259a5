//! # Host Expression Translation
//!
//! Translates the host frontend's expression representation into the
//! engine's [`Expression`] tree. The host hands over three node kinds:
//! constants, variable references, and operator applications identified by
//! the host's builtin comparison-function ids.
//!
//! The id table is fixed: the host's integer/char equality functions map to
//! `Eq`, its inequality functions to `Ne`. Any other id is unsupported and
//! fails translation.

use super::{ComparisonOp, Expression};
use crate::types::Value;
use eyre::{bail, Result};
use tracing::warn;

/// Host-side expression tree as delivered by the frontend bridge.
#[derive(Debug, Clone)]
pub enum HostExpr {
    Const {
        value: Value,
    },
    /// Variable reference. `tuple_idx` 0 addresses the scan/outer tuple,
    /// 1 the inner tuple; `column` is zero-based.
    Var {
        tuple_idx: usize,
        column: usize,
    },
    OpExpr {
        func_id: u32,
        args: Vec<HostExpr>,
    },
}

const EQ_FUNC_IDS: &[u32] = &[63, 65, 67, 158, 159];
const NE_FUNC_IDS: &[u32] = &[84, 144, 145, 157, 164, 165];

/// Translates a host expression tree. Unsupported operator ids fail the
/// whole translation; the caller decides whether the plan degrades or the
/// statement is rejected.
pub fn translate_expr(host: &HostExpr) -> Result<Expression> {
    match host {
        HostExpr::Const { value } => Ok(Expression::Constant(value.clone())),
        HostExpr::Var { tuple_idx, column } => Ok(Expression::column(*tuple_idx, *column)),
        HostExpr::OpExpr { func_id, args } => {
            if args.len() > 2 {
                // The host occasionally carries trailing arguments; only the
                // first two participate in a binary comparison.
                warn!(func_id, argc = args.len(), "operator expression with extra arguments");
            }
            let mut children = args.iter().take(2).map(translate_expr);
            let left = match children.next() {
                Some(child) => child?,
                None => bail!("unsupported expression: operator {} with no arguments", func_id),
            };
            let right = match children.next() {
                Some(child) => child?,
                None => bail!("unsupported expression: operator {} with one argument", func_id),
            };
            let op = remap_host_func(*func_id)?;
            Ok(Expression::comparison(op, left, right))
        }
    }
}

fn remap_host_func(func_id: u32) -> Result<ComparisonOp> {
    if EQ_FUNC_IDS.contains(&func_id) {
        Ok(ComparisonOp::Eq)
    } else if NE_FUNC_IDS.contains(&func_id) {
        Ok(ComparisonOp::Ne)
    } else {
        bail!("unsupported expression: host function id {}", func_id)
    }
}
