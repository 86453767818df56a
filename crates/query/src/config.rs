use serde::{Deserialize, Serialize};

/// Compiler and runtime switches. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Use a hash join for equality-only join conditions.
    pub enable_hash_join: bool,
    /// Use a sort-merge join when hash joins are disabled.
    pub enable_sort_merge_join: bool,
    /// Check `TABLE` / `COUPLE` declared column types against provider metadata.
    pub enable_primitive_type_validation: bool,
    /// Rows between two `RowsRead` progress reports.
    pub progress_interval: u64,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enable_hash_join: true,
            enable_sort_merge_join: true,
            enable_primitive_type_validation: true,
            progress_interval: 1000,
        }
    }
}
