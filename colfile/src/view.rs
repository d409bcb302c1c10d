//! Zero-copy, memory-mapped views over encoded tables.
//!
//! These are the read side of the layout produced by
//! [`encoder`](crate::encoder): a downstream engine opens a table directory,
//! reads `__schema__` first, and then maps only the columns it needs.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;
use tracing::debug;

use crate::common::{ColumnDef, LogicalType, OFFSET_WIDTH, Value};
use crate::schema::{SchemaError, read_schema};

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("failed to open column file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt column file {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("column {column} has {found} rows, expected {expected}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// Backing bytes of a column file. Zero-length files cannot be mapped.
enum ColumnBytes {
    Mapped(Mmap),
    Empty,
}

impl ColumnBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            ColumnBytes::Mapped(mmap) => &mmap[..],
            ColumnBytes::Empty => &[],
        }
    }
}

// ============================================================================
// Column View
// ============================================================================

/// A read-only view of one encoded column file.
///
/// Fixed-width columns are accessed at `row * width`; string columns through
/// their offsets array. The file is validated once at open time so the
/// accessors never re-check the layout.
pub struct ColumnView {
    bytes: ColumnBytes,
    logical_type: LogicalType,
    num_rows: usize,
    /// Start of the string blob; 0 for fixed-width columns.
    blob_start: usize,
}

impl ColumnView {
    /// Map the column file at `path`, which must hold a `logical_type` column.
    pub fn open(path: &Path, logical_type: LogicalType) -> Result<Self, ViewError> {
        let io_err = |source: io::Error| ViewError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();

        let bytes = if len == 0 {
            ColumnBytes::Empty
        } else {
            // SAFETY: column files are written once and never mutated in
            // place; the map is read-only.
            ColumnBytes::Mapped(unsafe { Mmap::map(&file) }.map_err(io_err)?)
        };

        let corrupt = |reason: String| ViewError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let data = bytes.as_slice();
        let (num_rows, blob_start) = match logical_type.fixed_width() {
            Some(width) => {
                if data.len() % width != 0 {
                    return Err(corrupt(format!(
                        "{} bytes is not a multiple of the {logical_type} width {width}",
                        data.len()
                    )));
                }
                (data.len() / width, 0)
            }
            None => {
                let num_rows = validate_strings(data).map_err(corrupt)?;
                (num_rows, (num_rows + 1) * OFFSET_WIDTH)
            }
        };

        debug!(
            "Opened {} column {} ({num_rows} rows)",
            logical_type,
            path.display()
        );
        Ok(Self {
            bytes,
            logical_type,
            num_rows,
            blob_start,
        })
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Size of the column file in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.as_slice().len()
    }

    /// Returns the `i32` at `row`.
    ///
    /// # Panics
    /// Panics if the column is not Int or `row` is out of bounds.
    #[inline]
    pub fn int(&self, row: usize) -> i32 {
        assert_eq!(self.logical_type, LogicalType::Int, "column is not Int");
        let mut cell = [0u8; 4];
        cell.copy_from_slice(&self.bytes.as_slice()[row * 4..row * 4 + 4]);
        i32::from_le_bytes(cell)
    }

    /// Returns the `f64` at `row`.
    ///
    /// # Panics
    /// Panics if the column is not Double or `row` is out of bounds.
    #[inline]
    pub fn double(&self, row: usize) -> f64 {
        assert_eq!(
            self.logical_type,
            LogicalType::Double,
            "column is not Double"
        );
        let mut cell = [0u8; 8];
        cell.copy_from_slice(&self.bytes.as_slice()[row * 8..row * 8 + 8]);
        f64::from_le_bytes(cell)
    }

    /// Returns the string at `row`. Empty strings stand in for missing values.
    ///
    /// # Panics
    /// Panics if the column is not String or `row` is out of bounds.
    #[inline]
    pub fn string(&self, row: usize) -> &str {
        assert_eq!(
            self.logical_type,
            LogicalType::String,
            "column is not String"
        );
        assert!(row < self.num_rows, "row {row} out of bounds");
        let data = self.bytes.as_slice();
        let start = self.blob_start + read_offset(data, row) as usize;
        let end = self.blob_start + read_offset(data, row + 1) as usize;
        // SAFETY: every value's byte range was checked to be valid UTF-8
        // when the view was opened, and the mapping is immutable.
        unsafe { std::str::from_utf8_unchecked(&data[start..end]) }
    }

    /// Returns the value at `row` as a [`Value`] of the column's type.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    pub fn value(&self, row: usize) -> Value<'_> {
        match self.logical_type {
            LogicalType::Int => Value::Int(i64::from(self.int(row))),
            LogicalType::Double => Value::Double(self.double(row)),
            LogicalType::String => Value::Str(self.string(row)),
        }
    }
}

#[inline]
fn read_offset(data: &[u8], index: usize) -> u64 {
    let start = index * OFFSET_WIDTH;
    let mut entry = [0u8; OFFSET_WIDTH];
    entry.copy_from_slice(&data[start..start + OFFSET_WIDTH]);
    u64::from_le_bytes(entry)
}

/// Validate a string column and return its row count.
///
/// The row count is not stored: it is the unique `n` for which
/// `offsets[n] == len - (n + 1) * 8`. Walking the offsets in order, that
/// difference shrinks by at least 8 per step (offsets never decrease), so
/// the first index where it reaches zero is the end of the offsets array.
fn validate_strings(data: &[u8]) -> Result<usize, String> {
    if data.len() < OFFSET_WIDTH {
        return Err(format!(
            "{} bytes is too small for an offsets array",
            data.len()
        ));
    }
    if read_offset(data, 0) != 0 {
        return Err("first offset is not 0".to_string());
    }

    let len = data.len() as u64;
    let mut index = 0usize;
    let mut prev = 0u64;
    let num_rows = loop {
        let entry_end = ((index + 1) * OFFSET_WIDTH) as u64;
        if entry_end > len {
            return Err("offsets array runs past the end of the file".to_string());
        }
        let offset = read_offset(data, index);
        if offset < prev {
            return Err(format!("offset {index} decreases ({offset} < {prev})"));
        }
        let remaining = len - entry_end;
        if offset == remaining {
            break index;
        }
        if offset > remaining {
            return Err(format!(
                "offset {index} ({offset}) points past the end of the blob"
            ));
        }
        prev = offset;
        index += 1;
    };

    let blob = &data[(num_rows + 1) * OFFSET_WIDTH..];
    for row in 0..num_rows {
        let start = read_offset(data, row) as usize;
        let end = read_offset(data, row + 1) as usize;
        if std::str::from_utf8(&blob[start..end]).is_err() {
            return Err(format!("row {row} is not valid UTF-8"));
        }
    }
    Ok(num_rows)
}

// ============================================================================
// Table View
// ============================================================================

/// A view of one converted table directory.
///
/// Opening reads `__schema__` before touching any column file; a directory
/// without a descriptor is an incomplete conversion and is refused.
pub struct TableView {
    dir: PathBuf,
    columns: Vec<ColumnDef>,
    views: Vec<ColumnView>,
    num_rows: usize,
}

impl TableView {
    pub fn open(dir: &Path) -> Result<Self, ViewError> {
        let columns = read_schema(dir)?;
        let mut views = Vec::with_capacity(columns.len());
        for def in &columns {
            views.push(ColumnView::open(&dir.join(&def.name), def.logical_type)?);
        }

        let num_rows = views.first().map(ColumnView::num_rows).unwrap_or_default();
        for (def, view) in columns.iter().zip(views.iter()) {
            if view.num_rows() != num_rows {
                return Err(ViewError::RowCountMismatch {
                    column: def.name.clone(),
                    expected: num_rows,
                    found: view.num_rows(),
                });
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            columns,
            views,
            num_rows,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column definitions in schema order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// # Panics
    /// Panics if `col` is out of bounds.
    pub fn column(&self, col: usize) -> &ColumnView {
        &self.views[col]
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnView> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| &self.views[i])
    }
}
