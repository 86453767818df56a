//! Relation and RelationEntry types for query execution.

use quarry_core::{Row, Value};
use std::rc::Rc;
use std::sync::Arc;

/// Shared source aliases to avoid repeated cloning during joins.
pub type SharedSources = Arc<[String]>;

/// A relation entry wraps a row with the aliases of the sources it was
/// built from.
#[derive(Clone, Debug)]
pub struct RelationEntry {
    /// The underlying row (reference counted for efficient sharing).
    pub row: Rc<Row>,
    sources: SharedSources,
}

impl RelationEntry {
    /// Creates a relation entry with shared sources.
    #[inline]
    pub fn new(row: Rc<Row>, sources: SharedSources) -> Self {
        Self { row, sources }
    }

    /// Creates a relation entry from owned values.
    pub fn from_values(values: Vec<Value>, sources: SharedSources) -> Self {
        Self::new(Rc::new(Row::new(values)), sources)
    }

    /// Returns the source aliases this entry was built from.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Returns true if this entry is the result of a join or apply.
    pub fn is_combined(&self) -> bool {
        self.sources.len() > 1
    }

    /// Returns the row values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        self.row.values()
    }

    /// Gets a field value by column index.
    pub fn get_field(&self, index: usize) -> Option<&Value> {
        self.row.get(index)
    }

    /// Combines two entries into a joined entry.
    #[inline]
    pub fn combine(left: &RelationEntry, right: &RelationEntry, sources: SharedSources) -> Self {
        Self::new(Rc::new(Row::concat(left.values(), right.values())), sources)
    }

    /// Combines a left entry with a null right side (left outer joins).
    #[inline]
    pub fn combine_with_null(left: &RelationEntry, right_column_count: usize, sources: SharedSources) -> Self {
        let left_values = left.values();
        let mut values = Vec::with_capacity(left_values.len() + right_column_count);
        values.extend(left_values.iter().cloned());
        values.resize(left_values.len() + right_column_count, Value::Null);
        Self::from_values(values, sources)
    }

    /// Combines a null left side with a right entry (right outer joins).
    #[inline]
    pub fn combine_null_with(left_column_count: usize, right: &RelationEntry, sources: SharedSources) -> Self {
        let right_values = right.values();
        let mut values = vec![Value::Null; left_column_count];
        values.extend(right_values.iter().cloned());
        Self::from_values(values, sources)
    }
}

/// A relation is a collection of entries with source context.
#[derive(Clone, Debug)]
pub struct Relation {
    /// The entries in this relation.
    pub entries: Vec<RelationEntry>,
    /// Source aliases in this relation, in column order.
    pub sources: Vec<String>,
    /// The i-th element is the number of columns of the i-th source.
    pub source_column_counts: Vec<usize>,
}

impl Relation {
    /// Creates a new empty relation.
    pub fn new(sources: Vec<String>, source_column_counts: Vec<usize>) -> Self {
        Self {
            entries: Vec::new(),
            sources,
            source_column_counts,
        }
    }

    /// Creates a relation of one source from its rows.
    pub fn from_rows(rows: Vec<Vec<Value>>, source: impl Into<String>, column_count: usize) -> Self {
        let sources = vec![source.into()];
        let shared = Arc::from(sources.as_slice());
        let entries = rows
            .into_iter()
            .map(|values| RelationEntry::from_values(values, Arc::clone(&shared)))
            .collect();
        Self {
            entries,
            sources,
            source_column_counts: vec![column_count],
        }
    }

    /// Creates a relation with the layout of `self` holding other entries.
    pub fn with_entries(&self, entries: Vec<RelationEntry>) -> Self {
        Self {
            entries,
            sources: self.sources.clone(),
            source_column_counts: self.source_column_counts.clone(),
        }
    }

    /// Returns the sources of the combination of `self` and `right`.
    pub fn combined_sources(&self, right: &Relation) -> SharedSources {
        let mut sources = self.sources.clone();
        sources.extend(right.sources.iter().cloned());
        Arc::from(sources)
    }

    /// Creates the empty result of joining `self` with `right`.
    pub fn joined_layout(&self, right: &Relation) -> Self {
        let mut sources = self.sources.clone();
        sources.extend(right.sources.iter().cloned());
        let mut counts = self.source_column_counts.clone();
        counts.extend(right.source_column_counts.iter().copied());
        Self::new(sources, counts)
    }

    /// Returns the sources in this relation.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of columns of every entry.
    pub fn width(&self) -> usize {
        self.source_column_counts.iter().sum()
    }

    /// Computes the column offset for a given source alias.
    pub fn get_source_offset(&self, alias: &str) -> Option<usize> {
        let mut offset = 0;
        for (i, s) in self.sources.iter().enumerate() {
            if s == alias {
                return Some(offset);
            }
            offset += self.source_column_counts.get(i).copied().unwrap_or(0);
        }
        None
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the relation is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry to the relation.
    pub fn push(&mut self, entry: RelationEntry) {
        self.entries.push(entry);
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &RelationEntry> {
        self.entries.iter()
    }

    /// Consumes the relation, returning owned rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.entries
            .into_iter()
            .map(|e| Rc::try_unwrap(e.row).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

impl IntoIterator for Relation {
    type Item = RelationEntry;
    type IntoIter = std::vec::IntoIter<RelationEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
