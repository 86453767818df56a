//! Row structure.
//!
//! A `Row` is an ordered sequence of values laid out according to the column
//! metadata of the table or relation that owns it.

use crate::value::Value;

/// A row of values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row of `len` nulls.
    pub fn nulls(len: usize) -> Self {
        Self {
            values: vec![Value::Null; len],
        }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value by column index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Creates a row that is `left` followed by `right`.
    pub fn concat(left: &[Value], right: &[Value]) -> Self {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend_from_slice(left);
        values.extend_from_slice(right);
        Self { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let row = Row::new(vec![Value::Int64(1), Value::String("Alice".into())]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1), Some(&Value::String("Alice".into())));
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn test_row_concat() {
        let row = Row::concat(&[Value::Int32(1)], &[Value::Null, Value::Boolean(true)]);
        assert_eq!(row.values(), &[Value::Int32(1), Value::Null, Value::Boolean(true)]);
    }

    #[test]
    fn test_nulls() {
        let row = Row::nulls(3);
        assert!(row.values().iter().all(Value::is_null));
        assert!(Row::default().is_empty());
    }
}
