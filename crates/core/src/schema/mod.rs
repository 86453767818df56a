//! Column and table metadata exposed by schema providers.
//!
//! Providers describe each table they serve as an ordered list of typed
//! columns. The query engine reads this metadata while resolving names and
//! never mutates it.

mod column;
mod table;

pub use column::Column;
pub use table::{TableMetadata, TableMetadataBuilder};
