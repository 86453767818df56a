//! Query results.

use quarry_core::{DataType, Row, Value};
use std::fmt;

/// A result column. The type is `None` for columns that are always null.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputColumn {
    pub name: String,
    pub data_type: Option<DataType>,
}

impl OutputColumn {
    pub fn new(name: impl Into<String>, data_type: Option<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An immutable result table: column metadata plus rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<OutputColumn>,
    rows: Vec<Row>,
}

impl Table {
    /// Starts building a table with the given columns.
    pub fn builder(columns: Vec<OutputColumn>) -> TableBuilder {
        TableBuilder {
            columns,
            rows: Vec::new(),
        }
    }

    #[inline]
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns one cell.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Returns every value of one column.
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().filter_map(|r| r.get(index)).collect())
    }

    /// Consumes the table, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        writeln!(f, "{}", header.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.values().iter().map(ToString::to_string).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

/// Accumulates rows before freezing them into a [`Table`].
#[derive(Debug)]
pub struct TableBuilder {
    columns: Vec<OutputColumn>,
    rows: Vec<Row>,
}

impl TableBuilder {
    /// Appends a row. The row must have one value per column.
    pub fn push(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.push(row);
        }
    }

    pub fn build(self) -> Table {
        Table {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let mut builder = Table::builder(vec![
            OutputColumn::new("Name", Some(DataType::String)),
            OutputColumn::new("Age", Some(DataType::Int32)),
        ]);
        builder.push(Row::new(vec![Value::from("Ann"), Value::Int32(31)]));
        builder.extend([Row::new(vec![Value::from("Bob"), Value::Null])]);
        let table = builder.build();

        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "Name"), Some(&Value::from("Ann")));
        assert_eq!(table.value(1, "Age"), Some(&Value::Null));
        assert_eq!(table.value(2, "Age"), None);
        assert_eq!(table.column_values("Age").map(|v| v.len()), Some(2));
        assert_eq!(table.to_string(), "Name | Age\nAnn | 31\nBob | null\n");
    }
}
