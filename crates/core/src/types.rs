//! Data type definitions for Quarry.
//!
//! This module defines the primitive column types a schema can expose and the
//! numeric widening rules the analyzer relies on.

use std::fmt;

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number, also used for decimals
    Float64,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns the canonical name used in `TABLE` declarations and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "bool",
            DataType::Int32 => "int",
            DataType::Int64 => "long",
            DataType::Float64 => "decimal",
            DataType::String => "string",
            DataType::DateTime => "datetime",
            DataType::Bytes => "bytes",
        }
    }

    /// Parses a type name as written in a `TABLE` declaration.
    ///
    /// Names are case-insensitive and accept the common aliases
    /// (`int`/`int32`, `long`/`int64`, `double`/`decimal`/`float`, ...).
    pub fn from_name(name: &str) -> Option<DataType> {
        let lower = name.to_ascii_lowercase();
        let ty = match lower.as_str() {
            "bool" | "boolean" => DataType::Boolean,
            "byte" | "sbyte" | "short" | "ushort" | "int" | "int16" | "int32" => DataType::Int32,
            "uint" | "long" | "int64" | "ulong" => DataType::Int64,
            "float" | "double" | "decimal" | "float64" => DataType::Float64,
            "string" | "char" | "text" => DataType::String,
            "datetime" | "datetimeoffset" | "timestamp" => DataType::DateTime,
            "bytes" | "binary" => DataType::Bytes,
            _ => return None,
        };
        Some(ty)
    }

    /// Returns true for the integer and floating point types.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }

    /// Widening rank for numeric types, `None` for everything else.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Int32 => Some(0),
            DataType::Int64 => Some(1),
            DataType::Float64 => Some(2),
            _ => None,
        }
    }

    /// Returns the wider of two numeric types.
    ///
    /// Returns `None` when either side is not numeric.
    pub fn widen(self, other: DataType) -> Option<DataType> {
        let (a, b) = (self.numeric_rank()?, other.numeric_rank()?);
        Some(if a >= b { self } else { other })
    }

    /// Returns true if a value of type `self` can be passed where `target`
    /// is expected without losing information.
    pub fn can_widen_to(self, target: DataType) -> bool {
        if self == target {
            return true;
        }
        match (self.numeric_rank(), target.numeric_rank()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
