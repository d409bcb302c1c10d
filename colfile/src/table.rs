//! Table output directory: one file per column plus `__schema__`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::{ColumnDef, ColumnSource};
use crate::encoder::{ColumnSink, EncodeError, EncodedColumn, encode_column};
use crate::schema::{SchemaError, schema_path, write_schema};

/// Writes the columns of one table into its output directory.
///
/// Usage is strictly two-phase: [`write_column`](ColumnSink::write_column)
/// once per column (in any order, possibly in parallel, since every column
/// owns a disjoint file), then [`finish`](Self::finish) once to write the
/// schema descriptor.
#[derive(Debug, Clone)]
pub struct TableWriter {
    dir: PathBuf,
}

impl TableWriter {
    /// Prepare `dir` for a (re-)conversion of a table.
    ///
    /// Creates the directory if needed and removes a schema descriptor left
    /// by an earlier run, so the table reads as incomplete until
    /// [`finish`](Self::finish) succeeds.
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        match fs::remove_file(schema_path(&dir)) {
            Ok(()) => debug!("Removed stale schema descriptor in {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File the column named `name` is written to.
    pub fn column_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write the schema descriptor, marking the table complete.
    pub fn finish(self, columns: &[ColumnDef]) -> Result<(), SchemaError> {
        write_schema(&self.dir, columns)
    }
}

impl ColumnSink for TableWriter {
    fn write_column(&self, source: &dyn ColumnSource) -> Result<EncodedColumn, EncodeError> {
        let def = source.def();
        encode_column(
            &self.column_path(&def.name),
            def.logical_type,
            source.values(),
        )
    }
}
