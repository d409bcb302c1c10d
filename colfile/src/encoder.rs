//! Column encoder: writes one column's values to a single on-disk file.
//!
//! ## File layouts
//!
//! ```text
//! Int    : [i32 LE; num_rows]                    row i at byte i * 4
//! Double : [f64 LE; num_rows]                    row i at byte i * 8
//! String : [u64 LE; num_rows + 1] offsets        offsets[0] = 0, offsets[n] = blob length
//!          [u8; offsets[n]] blob                 row i is blob[offsets[i]..offsets[i+1]]
//! ```
//!
//! No header, no padding. The logical type is recorded in the table's schema
//! descriptor, not in the column file.
//!
//! A failed encode removes the target file, so a reader never sees a column
//! with a misleading row count.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::{ColumnSource, LogicalType, OFFSET_WIDTH, Value};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to write column file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("row {row}: expected {expected} value, got {found}")]
    TypeMismatch {
        row: usize,
        expected: LogicalType,
        found: LogicalType,
    },

    #[error("row {row}: value {value} does not fit in a 32-bit int")]
    Overflow { row: usize, value: i64 },
}

/// Size summary of a successfully written column file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedColumn {
    pub num_rows: usize,
    pub byte_len: u64,
}

// ============================================================================
// Sink
// ============================================================================

/// Consumes a [`ColumnSource`] into some destination.
pub trait ColumnSink {
    fn write_column(&self, source: &dyn ColumnSource) -> Result<EncodedColumn, EncodeError>;
}

// ============================================================================
// Encoder
// ============================================================================

/// Encode `values` as a column of `logical_type` into the file at `path`.
///
/// Creates or truncates the file and creates its parent directory if needed.
/// Every value must already carry `logical_type`; nothing is coerced. On any
/// error the file at `path` is removed before returning.
pub fn encode_column<'a, I>(
    path: &Path,
    logical_type: LogicalType,
    values: I,
) -> Result<EncodedColumn, EncodeError>
where
    I: IntoIterator<Item = Value<'a>>,
{
    let result = write_column_file(path, logical_type, values.into_iter());
    match &result {
        Ok(encoded) => debug!(
            "Encoded {} {} rows into {} ({} bytes)",
            encoded.num_rows,
            logical_type,
            path.display(),
            encoded.byte_len
        ),
        Err(_) => discard(path),
    }
    result
}

fn write_column_file<'a>(
    path: &Path,
    logical_type: LogicalType,
    values: impl Iterator<Item = Value<'a>>,
) -> Result<EncodedColumn, EncodeError> {
    let io_err = |source: io::Error| EncodeError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut w = BufWriter::new(File::create(path).map_err(io_err)?);
    let encoded = match logical_type {
        LogicalType::Int => write_ints(&mut w, values),
        LogicalType::Double => write_doubles(&mut w, values),
        LogicalType::String => write_strings(&mut w, values),
    }
    .map_err(|e| match e {
        CellError::Io(source) => io_err(source),
        CellError::Encode(e) => e,
    })?;
    w.flush().map_err(io_err)?;
    Ok(encoded)
}

/// Raised inside the per-type writers, which do not know the file path.
enum CellError {
    Io(io::Error),
    Encode(EncodeError),
}

impl From<io::Error> for CellError {
    fn from(e: io::Error) -> Self {
        CellError::Io(e)
    }
}

impl From<EncodeError> for CellError {
    fn from(e: EncodeError) -> Self {
        CellError::Encode(e)
    }
}

fn mismatch(row: usize, expected: LogicalType, found: &Value<'_>) -> CellError {
    CellError::Encode(EncodeError::TypeMismatch {
        row,
        expected,
        found: found.logical_type(),
    })
}

fn write_ints<'a, W: Write>(
    w: &mut W,
    values: impl Iterator<Item = Value<'a>>,
) -> Result<EncodedColumn, CellError> {
    let mut num_rows = 0usize;
    for (row, value) in values.enumerate() {
        let cell = match value {
            Value::Int(v) => {
                i32::try_from(v).map_err(|_| EncodeError::Overflow { row, value: v })?
            }
            other => return Err(mismatch(row, LogicalType::Int, &other)),
        };
        w.write_all(&cell.to_le_bytes())?;
        num_rows += 1;
    }
    Ok(EncodedColumn {
        num_rows,
        byte_len: (num_rows * std::mem::size_of::<i32>()) as u64,
    })
}

fn write_doubles<'a, W: Write>(
    w: &mut W,
    values: impl Iterator<Item = Value<'a>>,
) -> Result<EncodedColumn, CellError> {
    let mut num_rows = 0usize;
    for (row, value) in values.enumerate() {
        match value {
            Value::Double(v) => w.write_all(&v.to_le_bytes())?,
            other => return Err(mismatch(row, LogicalType::Double, &other)),
        }
        num_rows += 1;
    }
    Ok(EncodedColumn {
        num_rows,
        byte_len: (num_rows * std::mem::size_of::<f64>()) as u64,
    })
}

/// Write the offsets array followed by the concatenated string bytes.
///
/// Values are borrowed, so collecting them to compute the offsets first
/// copies only the slice headers.
fn write_strings<'a, W: Write>(
    w: &mut W,
    values: impl Iterator<Item = Value<'a>>,
) -> Result<EncodedColumn, CellError> {
    let mut strings: Vec<&str> = Vec::new();
    for (row, value) in values.enumerate() {
        match value {
            Value::Str(s) => strings.push(s),
            other => return Err(mismatch(row, LogicalType::String, &other)),
        }
    }

    let offsets = string_offsets(&strings);
    for offset in &offsets {
        w.write_all(&offset.to_le_bytes())?;
    }
    for s in &strings {
        w.write_all(s.as_bytes())?;
    }

    let blob_len = offsets.last().copied().unwrap_or_default();
    Ok(EncodedColumn {
        num_rows: strings.len(),
        byte_len: (offsets.len() * OFFSET_WIDTH) as u64 + blob_len,
    })
}

/// Exclusive prefix sum of UTF-8 byte lengths: `strings.len() + 1` entries,
/// starting at 0 and ending at the total byte length.
pub fn string_offsets(strings: &[&str]) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(strings.len() + 1);
    let mut total = 0u64;
    offsets.push(total);
    for s in strings {
        total += s.len() as u64;
        offsets.push(total);
    }
    offsets
}

/// Remove a partially written column file.
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial column file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove partial column file {}: {e}",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_i32s(bytes: &[u8]) -> Vec<i32> {
        bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn read_f64s(bytes: &[u8]) -> Vec<f64> {
        bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    /// Split a string column file into its offsets and blob.
    fn split_strings(bytes: &[u8], num_rows: usize) -> (Vec<u64>, &[u8]) {
        let offsets_len = (num_rows + 1) * OFFSET_WIDTH;
        let offsets = bytes[..offsets_len]
            .chunks_exact(OFFSET_WIDTH)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        (offsets, &bytes[offsets_len..])
    }

    #[test]
    fn test_int_column_is_flat_little_endian() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_id");
        let values = [1i64, -1, 0, i32::MAX as i64, i32::MIN as i64];

        let encoded =
            encode_column(&path, LogicalType::Int, values.iter().map(|&v| Value::Int(v))).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(bytes.len(), values.len() * 4);
        assert_eq!(encoded.num_rows, values.len());
        assert_eq!(encoded.byte_len, bytes.len() as u64);
        assert_eq!(
            read_i32s(&bytes),
            vec![1, -1, 0, i32::MAX, i32::MIN]
        );
    }

    #[test]
    fn test_double_column_round_trips_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_price");
        let values = [19.99, -0.0, f64::NAN, f64::INFINITY, f64::MIN_POSITIVE, 1e308];

        encode_column(&path, LogicalType::Double, values.iter().map(|&v| Value::Double(v)))
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), values.len() * 8);
        let decoded = read_f64s(&bytes);
        for (got, want) in decoded.iter().zip(values.iter()) {
            assert_eq!(got.to_bits(), want.to_bits());
        }
    }

    #[test]
    fn test_string_column_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_name");

        encode_column(&path, LogicalType::String, [Value::Str("Widget")]).unwrap();

        let bytes = fs::read(&path).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&0u64.to_le_bytes());
        expected.extend_from_slice(&6u64.to_le_bytes());
        expected.extend_from_slice(b"Widget");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_string_column_round_trips_with_empty_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ol_dist_info");
        let values = ["", "héllo", "", "wörld ✓", ""];

        let encoded = encode_column(
            &path,
            LogicalType::String,
            values.iter().map(|&s| Value::Str(s)),
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(encoded.byte_len, bytes.len() as u64);
        let (offsets, blob) = split_strings(&bytes, values.len());
        assert_eq!(offsets[0], 0);
        assert_eq!(*offsets.last().unwrap(), blob.len() as u64);
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        for (i, want) in values.iter().enumerate() {
            let got = &blob[offsets[i] as usize..offsets[i + 1] as usize];
            assert_eq!(std::str::from_utf8(got).unwrap(), *want);
        }
    }

    #[test]
    fn test_empty_string_yields_zero_length_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_data");

        encode_column(
            &path,
            LogicalType::String,
            [Value::Str("a"), Value::Str("b"), Value::Str("")],
        )
        .unwrap();

        let bytes = fs::read(&path).unwrap();
        let (offsets, _) = split_strings(&bytes, 3);
        assert_eq!(offsets, vec![0, 1, 2, 2]);
        assert_eq!(offsets[2], offsets[3]);
    }

    #[test]
    fn test_empty_columns() {
        let dir = TempDir::new().unwrap();

        let ints = dir.path().join("ints");
        let encoded = encode_column(&ints, LogicalType::Int, std::iter::empty()).unwrap();
        assert_eq!(encoded, EncodedColumn::default());
        assert_eq!(fs::read(&ints).unwrap().len(), 0);

        let strings = dir.path().join("strings");
        let encoded = encode_column(&strings, LogicalType::String, std::iter::empty()).unwrap();
        assert_eq!(encoded.num_rows, 0);
        assert_eq!(fs::read(&strings).unwrap(), 0u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_overflow_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_id");
        let values = [Value::Int(1), Value::Int(2), Value::Int(1 << 31)];

        let err = encode_column(&path, LogicalType::Int, values).unwrap_err();

        assert!(matches!(
            err,
            EncodeError::Overflow {
                row: 2,
                value: 2147483648
            }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_overflow_below_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("neg");
        let err =
            encode_column(&path, LogicalType::Int, [Value::Int(i32::MIN as i64 - 1)]).unwrap_err();
        assert!(matches!(err, EncodeError::Overflow { row: 0, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_failure_removes_stale_file_from_earlier_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i_id");
        encode_column(&path, LogicalType::Int, [Value::Int(7), Value::Int(8)]).unwrap();
        assert!(path.exists());

        let err = encode_column(&path, LogicalType::Int, [Value::Int(7), Value::Str("8")])
            .unwrap_err();

        assert!(matches!(err, EncodeError::TypeMismatch { row: 1, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_type_mismatch_reports_row_and_types() {
        let dir = TempDir::new().unwrap();

        let err = encode_column(
            &dir.path().join("d"),
            LogicalType::Double,
            [Value::Double(1.0), Value::Int(2)],
        )
        .unwrap_err();
        match err {
            EncodeError::TypeMismatch {
                row,
                expected,
                found,
            } => {
                assert_eq!(row, 1);
                assert_eq!(expected, LogicalType::Double);
                assert_eq!(found, LogicalType::Int);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = encode_column(&dir.path().join("s"), LogicalType::String, [Value::Int(0)])
            .unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { row: 0, .. }));
        assert!(!dir.path().join("s").exists());
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("col");
        let values = ["x", "", "yy", "zzz"];

        encode_column(&path, LogicalType::String, values.iter().map(|&s| Value::Str(s))).unwrap();
        let first = fs::read(&path).unwrap();
        encode_column(&path, LogicalType::String, values.iter().map(|&s| Value::Str(s))).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_rewrite_truncates_longer_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("col");
        encode_column(&path, LogicalType::Int, (0..100).map(Value::Int)).unwrap();
        encode_column(&path, LogicalType::Int, [Value::Int(5)]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), 5i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("item").join("i_id");
        encode_column(&path, LogicalType::Int, [Value::Int(3)]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_io_error_carries_path() {
        let dir = TempDir::new().unwrap();
        // A directory where the column file should go.
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();

        let err = encode_column(&path, LogicalType::Int, [Value::Int(1)]).unwrap_err();
        match err {
            EncodeError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_string_offsets_prefix_sum() {
        assert_eq!(string_offsets(&[]), vec![0]);
        assert_eq!(string_offsets(&["ab", "", "c"]), vec![0, 2, 2, 3]);
        // Byte lengths, not char counts.
        assert_eq!(string_offsets(&["é"]), vec![0, 2]);
    }
}
