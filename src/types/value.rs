//! # Runtime Value Representation
//!
//! `Value` is the tagged scalar passed between the storage layer, the
//! expression evaluator, and the index. Variants map one-to-one onto
//! [`DataType`](super::DataType) tags.
//!
//! ## Comparison Semantics
//!
//! Two comparison surfaces exist and they are deliberately different:
//!
//! - [`Value::compare`] implements SQL predicate comparison: NULL compared
//!   to anything (including NULL) yields `None`, and so does a cross-family
//!   comparison. Operators treat `None` as "does not qualify".
//! - [`Value::total_cmp`] is the total order used by index keys and
//!   merge-join run advancement, where every pair of values must order:
//!   NULL sorts lowest, then the numeric family (widened), then text, with
//!   a type-rank fallback for anything left over.
//!
//! Integer widening goes through `i128`; `Decimal` against other numerics
//! compares through `f64`, which is adequate for the scales the engine
//! stores but is not exact past 2^53.

use super::DataType;
use std::cmp::Ordering;

/// Tagged scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Decimal { digits: i128, scale: i16 },
    Timestamp(i64),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::TinyInt(_) => Some(DataType::TinyInt),
            Value::SmallInt(_) => Some(DataType::SmallInt),
            Value::Integer(_) => Some(DataType::Integer),
            Value::BigInt(_) => Some(DataType::BigInt),
            Value::Double(_) => Some(DataType::Double),
            Value::Decimal { .. } => Some(DataType::Decimal),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Varchar(_) => Some(DataType::Varchar),
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::TinyInt(v) => Some(*v as i128),
            Value::SmallInt(v) => Some(*v as i128),
            Value::Integer(v) => Some(*v as i128),
            Value::BigInt(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::TinyInt(v) => Some(*v as f64),
            Value::SmallInt(v) => Some(*v as f64),
            Value::Integer(v) => Some(*v as f64),
            Value::BigInt(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal { digits, scale } => {
                Some(*digits as f64 / 10f64.powi(*scale as i32))
            }
            _ => None,
        }
    }

    /// SQL predicate comparison. `None` when either side is NULL or the
    /// sides belong to different (non-widening) families.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => {
                // Integer-family pairs compare exactly; anything touching
                // Double or Decimal goes through f64.
                if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
                    return Some(a.cmp(&b));
                }
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                }
            }
        }
    }

    /// SQL equality: NULL is unequal to everything, including itself.
    pub fn sql_eq(&self, other: &Value) -> bool {
        matches!(self.compare(other), Some(Ordering::Equal))
    }

    /// Total order for index keys and run advancement. NULL sorts lowest;
    /// incomparable families fall back to a fixed type rank.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        self.type_rank().cmp(&other.type_rank())
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::TinyInt(_)
            | Value::SmallInt(_)
            | Value::Integer(_)
            | Value::BigInt(_)
            | Value::Double(_)
            | Value::Decimal { .. } => 2,
            Value::Timestamp(_) => 3,
            Value::Varchar(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_compares_unequal_to_everything() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert!(!Value::Null.sql_eq(&Value::Null));
    }

    #[test]
    fn integer_family_widens() {
        assert_eq!(
            Value::TinyInt(3).compare(&Value::BigInt(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::SmallInt(-1).compare(&Value::Integer(2)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn integer_against_double() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn decimal_scaling() {
        // 12.50 as digits=1250, scale=2
        let d = Value::Decimal {
            digits: 1250,
            scale: 2,
        };
        assert_eq!(d.compare(&Value::Double(12.5)), Some(Ordering::Equal));
        assert_eq!(d.compare(&Value::Integer(13)), Some(Ordering::Less));
    }

    #[test]
    fn cross_family_is_incomparable() {
        assert_eq!(
            Value::Varchar("1".into()).compare(&Value::Integer(1)),
            None
        );
    }

    #[test]
    fn total_order_places_null_first() {
        assert_eq!(Value::Null.total_cmp(&Value::Integer(i32::MIN)), Ordering::Less);
        assert_eq!(Value::Null.total_cmp(&Value::Null), Ordering::Equal);
    }
}
