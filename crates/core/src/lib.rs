//! Quarry Core - value and metadata types for the Quarry query engine.
//!
//! This crate provides the types shared between the query engine and the
//! schema providers that feed it rows:
//!
//! - `DataType`: Supported column types (Boolean, Int32, Int64, Float64, String, DateTime, Bytes)
//! - `Value`: Runtime values flowing through rows
//! - `Row`: An ordered sequence of values
//! - `schema`: Column and table metadata
//! - `Error`: Errors raised by providers and metadata construction
//!
//! # Example
//!
//! ```rust
//! use quarry_core::{DataType, Value, Row};
//! use quarry_core::schema::TableMetadataBuilder;
//!
//! let table = TableMetadataBuilder::new("Entities")
//!     .unwrap()
//!     .add_column("Name", DataType::String)
//!     .unwrap()
//!     .add_column("Population", DataType::Int64)
//!     .unwrap()
//!     .build();
//!
//! let row = Row::new(vec![Value::from("Warsaw"), Value::Int64(1_800_000)]);
//!
//! assert_eq!(table.get_column_index("Population"), Some(1));
//! assert_eq!(row.get(1), Some(&Value::Int64(1_800_000)));
//! ```

mod error;
pub mod pattern_match;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::Row;
pub use types::DataType;
pub use value::Value;
