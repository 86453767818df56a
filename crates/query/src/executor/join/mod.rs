//! JOIN algorithm implementations.
//!
//! Every algorithm emits left columns followed by right columns and supports
//! inner, left outer and right outer joins. Equality joins take one
//! precomputed [`JoinKey`] per input entry.

mod hash;
mod merge;
mod nested;

pub use hash::HashJoin;
pub use merge::SortMergeJoin;
pub use nested::NestedLoopJoin;

use quarry_core::Value;

/// A normalized composite join key, `None` when any component is null.
pub type JoinKey = Option<Vec<Value>>;

/// Builds the join key of one entry. Integer widths and integral floats are
/// normalized so `1`, `1L` and `1.0` match.
pub fn join_key(values: Vec<Value>) -> JoinKey {
    if values.iter().any(Value::is_null) {
        return None;
    }
    Some(values.iter().map(Value::key_normalized).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key_normalizes_and_rejects_nulls() {
        assert_eq!(
            join_key(vec![Value::Int32(1), Value::Float64(2.0)]),
            join_key(vec![Value::Int64(1), Value::Int64(2)])
        );
        assert_eq!(join_key(vec![Value::Int32(1), Value::Null]), None);
    }
}
