//! Table metadata.

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::DataType;

/// Ordered column metadata of one table served by a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMetadata {
    /// Table name.
    name: String,
    /// Column definitions in row order.
    columns: Vec<Column>,
}

impl TableMetadata {
    /// Creates table metadata from a list of columns.
    ///
    /// Column indices are assigned from the list order. Duplicate names are
    /// not checked here; use [`TableMetadataBuilder`] for validated input.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_index(i))
            .collect();
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column index by name.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }
}

/// Builder for table metadata.
#[derive(Debug)]
pub struct TableMetadataBuilder {
    name: String,
    columns: Vec<Column>,
}

impl TableMetadataBuilder {
    /// Creates a new builder, validating the table name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(Error::invalid_schema("name cannot be empty")),
            Some(first) if !first.is_alphabetic() && first != '_' => {
                return Err(Error::invalid_schema(format!(
                    "name must start with a letter or underscore: {}",
                    name
                )));
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "name may only contain letters, digits and underscores: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::invalid_schema(format!(
                "duplicate column {} in table {}",
                name, self.name
            )));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Builds the table metadata.
    pub fn build(self) -> TableMetadata {
        TableMetadata::new(self.name, self.columns)
    }
}
