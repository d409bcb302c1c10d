//! Schema descriptor (`__schema__`) writer and reader.
//!
//! ## File layout
//!
//! UTF-8 text, exactly three `\n`-terminated lines, each with one
//! comma-separated field per column:
//!
//! ```text
//! i_id,i_im_id,i_name,i_price,i_data      ← column names
//! int,int,string,double,string            ← logical type tags
//! ,,,,                                    ← modifiers (reserved, always empty)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::common::{ColumnDef, LogicalType, SCHEMA_FILE_NAME};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to access schema descriptor {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no schema descriptor in {0:?}; the table is incomplete")]
    Missing(PathBuf),

    #[error("malformed schema descriptor {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("column name {0:?} cannot be stored in a schema descriptor")]
    InvalidName(String),

    #[error("a schema descriptor needs at least one column")]
    Empty,
}

/// Path of the schema descriptor inside a table directory.
pub fn schema_path(dir: &Path) -> PathBuf {
    dir.join(SCHEMA_FILE_NAME)
}

/// Render the three descriptor lines for `columns`.
pub fn render_schema(columns: &[ColumnDef]) -> Result<String, SchemaError> {
    if columns.is_empty() {
        return Err(SchemaError::Empty);
    }
    if let Some(bad) = columns
        .iter()
        .find(|c| c.name.is_empty() || c.name.contains([',', '\n', '\r']))
    {
        return Err(SchemaError::InvalidName(bad.name.clone()));
    }

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let tags: Vec<&str> = columns.iter().map(|c| c.logical_type.tag()).collect();
    let modifiers = vec![""; columns.len()];

    Ok(format!(
        "{}\n{}\n{}\n",
        names.join(","),
        tags.join(","),
        modifiers.join(",")
    ))
}

/// Write the schema descriptor for a table into `dir`.
///
/// Must only be called once every column of the table has been encoded: the
/// descriptor's presence is what tells readers the table is complete.
/// Re-running with the same columns rewrites identical bytes.
pub fn write_schema(dir: &Path, columns: &[ColumnDef]) -> Result<(), SchemaError> {
    let contents = render_schema(columns)?;
    let path = schema_path(dir);
    fs::write(&path, contents).map_err(|source| SchemaError::Io {
        path: path.clone(),
        source,
    })?;
    debug!("Wrote schema for {} columns to {}", columns.len(), path.display());
    Ok(())
}

/// Read the schema descriptor from `dir`.
///
/// A missing descriptor is reported as [`SchemaError::Missing`]: whatever
/// column files the directory holds must not be trusted.
pub fn read_schema(dir: &Path) -> Result<Vec<ColumnDef>, SchemaError> {
    let path = schema_path(dir);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SchemaError::Missing(dir.to_path_buf()));
        }
        Err(source) => return Err(SchemaError::Io { path, source }),
    };
    parse_schema(&contents).map_err(|reason| SchemaError::Malformed { path, reason })
}

fn parse_schema(contents: &str) -> Result<Vec<ColumnDef>, String> {
    let body = contents
        .strip_suffix('\n')
        .ok_or("last line is not newline-terminated")?;
    let lines: Vec<&str> = body.split('\n').collect();
    let [names, tags, modifiers] = lines.as_slice() else {
        return Err(format!("expected 3 lines, found {}", lines.len()));
    };

    let names: Vec<&str> = names.split(',').collect();
    let tags: Vec<&str> = tags.split(',').collect();
    let num_modifiers = modifiers.split(',').count();
    if tags.len() != names.len() || num_modifiers != names.len() {
        return Err(format!(
            "field counts differ: {} names, {} types, {} modifiers",
            names.len(),
            tags.len(),
            num_modifiers
        ));
    }

    names
        .iter()
        .zip(tags.iter())
        .map(|(name, tag)| {
            if name.is_empty() {
                return Err("empty column name".to_string());
            }
            let logical_type: LogicalType = tag.parse().map_err(|e| format!("{e}"))?;
            Ok(ColumnDef::new(*name, logical_type))
        })
        .collect()
}
