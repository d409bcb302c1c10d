//! Ingestion: read a pipe-delimited `.tbl` file and convert it into a table
//! directory of per-column files.
//!
//! ## Pipeline (per table)
//!
//! 1. Resolve the table from the lowercased file stem via the [`Catalog`].
//! 2. Parse the file with the arrow CSV reader (`|` delimiter, no header),
//!    typed by the catalog: `int` → Int64, `double` → Float64,
//!    `string` → Utf8. Integers are read wide so that out-of-range values
//!    surface as encoder overflows instead of parse errors.
//! 3. Substitute `""` for missing strings; reject missing numerics.
//! 4. Encode every column (in parallel, each into its own file).
//! 5. Write `__schema__` once all columns succeeded.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::csv::reader::{Format, ReaderBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use colfile::common::{ColumnDef, ColumnSource, LogicalType, TableDef, Value};
use colfile::encoder::{ColumnSink, EncodeError};
use colfile::schema::SchemaError;
use colfile::table::TableWriter;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;

/// Field separator of dbgen-style `.tbl` files.
pub const TBL_DELIMITER: u8 = b'|';

/// Rows per arrow record batch.
const BATCH_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },

    #[error("no schema known for table '{0}'")]
    UnknownTable(String),

    #[error("table {table}: column {column} is missing a value at row {row}")]
    MissingValue {
        table: String,
        column: String,
        row: usize,
    },

    #[error("table {table}: column {column} has {found} rows, expected {expected}")]
    RowCountMismatch {
        table: String,
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("table {table}: column {column}: {source}")]
    Encode {
        table: String,
        column: String,
        #[source]
        source: EncodeError,
    },

    #[error("table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: SchemaError,
    },
}

// ============================================================================
// Arrow-backed column source
// ============================================================================

/// Typed arrow chunks of one column, one chunk per record batch.
enum Chunks {
    Int(Vec<Int64Array>),
    Double(Vec<Float64Array>),
    Str(Vec<StringArray>),
}

/// A column read from a `.tbl` file, exposed as a [`ColumnSource`].
pub struct ArrowColumn {
    def: ColumnDef,
    chunks: Chunks,
    num_rows: usize,
}

impl ArrowColumn {
    /// Gather column `index` of `batches` into typed chunks.
    ///
    /// Null strings are kept as nulls here and read back as `""`; a null in
    /// a numeric column is rejected with the row it occurred at.
    fn from_batches(
        table: &str,
        def: &ColumnDef,
        index: usize,
        batches: &[RecordBatch],
        path: &Path,
    ) -> Result<Self, IngestError> {
        let arrays: Vec<&ArrayRef> = batches.iter().map(|b| b.column(index)).collect();
        let num_rows = arrays.iter().map(|a| a.len()).sum();

        if def.logical_type != LogicalType::String {
            let mut row_base = 0usize;
            for array in &arrays {
                if let Some(i) = (0..array.len()).find(|&i| array.is_null(i)) {
                    return Err(IngestError::MissingValue {
                        table: table.to_string(),
                        column: def.name.clone(),
                        row: row_base + i,
                    });
                }
                row_base += array.len();
            }
        }

        let unexpected = |array: &ArrayRef| IngestError::Arrow {
            path: path.to_path_buf(),
            source: ArrowError::SchemaError(format!(
                "column {} was read as {}, expected {}",
                def.name,
                array.data_type(),
                def.logical_type
            )),
        };
        let chunks = match def.logical_type {
            LogicalType::Int => Chunks::Int(downcast(&arrays, unexpected)?),
            LogicalType::Double => Chunks::Double(downcast(&arrays, unexpected)?),
            LogicalType::String => Chunks::Str(downcast(&arrays, unexpected)?),
        };

        Ok(Self {
            def: def.clone(),
            chunks,
            num_rows,
        })
    }
}

/// Downcast every chunk of a column to its concrete arrow array type.
fn downcast<T: Array + Clone + 'static>(
    arrays: &[&ArrayRef],
    unexpected: impl Fn(&ArrayRef) -> IngestError,
) -> Result<Vec<T>, IngestError> {
    arrays
        .iter()
        .map(|&a| {
            a.as_any()
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| unexpected(a))
        })
        .collect()
}

impl ColumnSource for ArrowColumn {
    fn def(&self) -> &ColumnDef {
        &self.def
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn values(&self) -> Box<dyn Iterator<Item = Value<'_>> + '_> {
        match &self.chunks {
            Chunks::Int(chunks) => Box::new(
                chunks
                    .iter()
                    .flat_map(|a| a.values().iter().map(|&v| Value::Int(v))),
            ),
            Chunks::Double(chunks) => Box::new(
                chunks
                    .iter()
                    .flat_map(|a| a.values().iter().map(|&v| Value::Double(v))),
            ),
            Chunks::Str(chunks) => Box::new(
                chunks
                    .iter()
                    .flat_map(|a| a.iter().map(|v| Value::Str(v.unwrap_or("")))),
            ),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

fn arrow_type(logical_type: LogicalType) -> DataType {
    match logical_type {
        LogicalType::Int => DataType::Int64,
        LogicalType::Double => DataType::Float64,
        LogicalType::String => DataType::Utf8,
    }
}

/// Read a `.tbl` file into one [`ArrowColumn`] per column of `table`, in
/// catalog order.
pub fn read_tbl(path: &Path, table: &TableDef) -> Result<Vec<ArrowColumn>, IngestError> {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.logical_type), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let arrow_err = |source: ArrowError| IngestError::Arrow {
        path: path.to_path_buf(),
        source,
    };
    let format = Format::default()
        .with_header(false)
        .with_delimiter(TBL_DELIMITER);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .map_err(arrow_err)?;
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().map_err(arrow_err)?;

    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, def)| ArrowColumn::from_batches(&table.name, def, i, &batches, path))
        .collect()
}

// ============================================================================
// Conversion
// ============================================================================

/// Outcome of a successfully converted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub num_rows: usize,
    pub num_cols: usize,
    pub bytes_written: u64,
}

/// Table name for an input file: its lowercased stem.
pub fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// List the input files of `indir` to convert, in path order.
///
/// `filter` holds table names; matching is case-insensitive. Requested
/// tables without an input file are reported with a warning.
pub fn select_inputs(indir: &Path, filter: Option<&[String]>) -> Result<Vec<PathBuf>, IngestError> {
    let io_err = |source: std::io::Error| IngestError::Io {
        path: indir.to_path_buf(),
        source,
    };
    let mut inputs = Vec::new();
    for entry in fs::read_dir(indir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() {
            inputs.push(path);
        }
    }
    inputs.sort();

    let Some(filter) = filter else {
        return Ok(inputs);
    };
    let wanted: Vec<String> = filter.iter().map(|t| t.trim().to_lowercase()).collect();
    inputs.retain(|p| wanted.contains(&table_name(p)));
    for name in &wanted {
        if !inputs.iter().any(|p| table_name(p) == *name) {
            warn!("Table '{name}' requested but no input file found in {}", indir.display());
        }
    }
    Ok(inputs)
}

/// Convert one `.tbl` file into `outdir/<table>/`.
///
/// On success the table directory holds one file per column and a fresh
/// `__schema__`. On failure it holds no `__schema__`, which marks it
/// incomplete.
pub fn convert_table(
    table_path: &Path,
    outdir: &Path,
    catalog: &Catalog,
) -> Result<TableReport, IngestError> {
    let name = table_name(table_path);
    let table = catalog
        .get(&name)
        .ok_or_else(|| IngestError::UnknownTable(name.clone()))?;

    info!("Reading {}", table_path.display());
    let columns = read_tbl(table_path, table)?;
    let num_rows = columns.first().map(|c| c.num_rows()).unwrap_or_default();
    for column in &columns {
        if column.num_rows() != num_rows {
            return Err(IngestError::RowCountMismatch {
                table: table.name.clone(),
                column: column.def().name.clone(),
                expected: num_rows,
                found: column.num_rows(),
            });
        }
    }
    debug!("  {} rows x {} columns", num_rows, columns.len());

    let table_dir = outdir.join(&table.name);
    let writer = TableWriter::create(&table_dir).map_err(|source| IngestError::Io {
        path: table_dir.clone(),
        source,
    })?;

    let bytes_written = columns
        .par_iter()
        .map(|column| {
            writer
                .write_column(column)
                .map(|encoded| encoded.byte_len)
                .map_err(|source| IngestError::Encode {
                    table: table.name.clone(),
                    column: column.def().name.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<u64>, _>>()?
        .into_iter()
        .sum();

    writer
        .finish(&table.columns)
        .map_err(|source| IngestError::Schema {
            table: table.name.clone(),
            source,
        })?;

    Ok(TableReport {
        table: table.name.clone(),
        num_rows,
        num_cols: columns.len(),
        bytes_written,
    })
}

/// Result of converting one input file during a directory run.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub result: Result<TableReport, IngestError>,
}

/// Convert every selected `.tbl` file of `indir` into `outdir`, one table
/// after another.
///
/// A failing table does not stop the run; its error is kept in the returned
/// outcomes. `on_table` is called after each table with its outcome and the
/// number of selected inputs.
pub fn convert_dir(
    indir: &Path,
    outdir: &Path,
    filter: Option<&[String]>,
    catalog: &Catalog,
    mut on_table: impl FnMut(&TableOutcome, usize),
) -> Result<Vec<TableOutcome>, IngestError> {
    fs::create_dir_all(outdir).map_err(|source| IngestError::Io {
        path: outdir.to_path_buf(),
        source,
    })?;
    let inputs = select_inputs(indir, filter)?;
    info!("Converting {} tables from {}", inputs.len(), indir.display());

    let mut outcomes = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let outcome = TableOutcome {
            table: table_name(path),
            result: convert_table(path, outdir, catalog),
        };
        on_table(&outcome, inputs.len());
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
