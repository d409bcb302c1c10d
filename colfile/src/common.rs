//! Common types and constants used throughout the project.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the per-table schema descriptor.
///
/// Its presence in a table directory is the signal that every column of the
/// table was written successfully.
pub const SCHEMA_FILE_NAME: &str = "__schema__";

/// Width of a single entry in a string column's offsets array.
pub const OFFSET_WIDTH: usize = std::mem::size_of::<u64>();

// ============================================================================
// Logical Types
// ============================================================================

/// The abstract value kind a column holds, independent of its byte layout.
///
/// | LogicalType | Tag      | On-disk layout                                   |
/// |-------------|----------|--------------------------------------------------|
/// | Int         | `int`    | `[i32; n]` little-endian                         |
/// | Double      | `double` | `[f64; n]` little-endian                         |
/// | String      | `string` | `[u64; n + 1]` LE offsets, then the UTF-8 bytes  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Int,
    Double,
    String,
}

impl LogicalType {
    /// Tag written to the schema descriptor.
    pub const fn tag(self) -> &'static str {
        match self {
            LogicalType::Int => "int",
            LogicalType::Double => "double",
            LogicalType::String => "string",
        }
    }

    /// Cell width in bytes for fixed-width types, `None` for strings.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            LogicalType::Int => Some(std::mem::size_of::<i32>()),
            LogicalType::Double => Some(std::mem::size_of::<f64>()),
            LogicalType::String => None,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown logical type tag '{0}'")]
pub struct UnknownTypeTag(pub String);

impl FromStr for LogicalType {
    type Err = UnknownTypeTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(LogicalType::Int),
            "double" => Ok(LogicalType::Double),
            "string" => Ok(LogicalType::String),
            other => Err(UnknownTypeTag(other.to_string())),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single typed cell handed to the encoder.
///
/// Integers are carried as `i64` so that values outside the `i32` range
/// reach the encoder and are reported instead of silently wrapping.
/// Missing strings are represented as `Str("")`; there is no null.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Int(i64),
    Double(f64),
    Str(&'a str),
}

impl Value<'_> {
    /// The logical type this value belongs to.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Value::Int(_) => LogicalType::Int,
            Value::Double(_) => LogicalType::Double,
            Value::Str(_) => LogicalType::String,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
        }
    }
}

// ============================================================================
// Schema Objects
// ============================================================================

/// A named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub logical_type: LogicalType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// A named relation with an ordered list of columns.
///
/// Column order here is the order used for encoding, for the schema
/// descriptor, and for reading fields out of source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Column Sources
// ============================================================================

/// Produces the ordered, row-aligned value sequence of one column.
///
/// Implementations must yield exactly [`num_rows`](Self::num_rows) values,
/// each already typed according to the column's logical type.
pub trait ColumnSource: Sync {
    fn def(&self) -> &ColumnDef;

    fn num_rows(&self) -> usize;

    fn values(&self) -> Box<dyn Iterator<Item = Value<'_>> + '_>;
}

/// An in-memory [`ColumnSource`] over borrowed values.
#[derive(Debug, Clone)]
pub struct MemColumn<'a> {
    def: ColumnDef,
    values: Vec<Value<'a>>,
}

impl<'a> MemColumn<'a> {
    pub fn new(def: ColumnDef, values: Vec<Value<'a>>) -> Self {
        Self { def, values }
    }

    pub fn ints(name: &str, values: &[i64]) -> Self {
        Self::new(
            ColumnDef::new(name, LogicalType::Int),
            values.iter().map(|&v| Value::Int(v)).collect(),
        )
    }

    pub fn doubles(name: &str, values: &[f64]) -> Self {
        Self::new(
            ColumnDef::new(name, LogicalType::Double),
            values.iter().map(|&v| Value::Double(v)).collect(),
        )
    }

    pub fn strings(name: &str, values: &[&'a str]) -> Self {
        Self::new(
            ColumnDef::new(name, LogicalType::String),
            values.iter().map(|&v| Value::Str(v)).collect(),
        )
    }
}

impl ColumnSource for MemColumn<'_> {
    fn def(&self) -> &ColumnDef {
        &self.def
    }

    fn num_rows(&self) -> usize {
        self.values.len()
    }

    fn values(&self) -> Box<dyn Iterator<Item = Value<'_>> + '_> {
        Box::new(self.values.iter().copied())
    }
}
