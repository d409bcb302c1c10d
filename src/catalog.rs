//! Static table catalog: table name → ordered column definitions.
//!
//! The built-in catalog covers the TPC-C and TPC-H tables the benchmark
//! queries touch. A JSON catalog can replace it:
//!
//! ```json
//! {
//!   "item": { "i_id": "int", "i_name": "string", "i_price": "double" }
//! }
//! ```
//!
//! Key order in the JSON object is the column order.

use std::fs;
use std::path::{Path, PathBuf};

use colfile::common::{ColumnDef, LogicalType, SCHEMA_FILE_NAME, TableDef};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::info;

use colfile::common::LogicalType::{Double, Int, String as Str};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("table '{0}' has no columns")]
    EmptyTable(String),

    #[error("table '{table}': column name {column:?} cannot be used as a file name")]
    InvalidColumnName { table: String, column: String },

    #[error("table '{table}': duplicate column '{column}'")]
    DuplicateColumn { table: String, column: String },
}

// ============================================================================
// Built-in schemas
// ============================================================================

const ITEM: &[(&str, LogicalType)] = &[
    ("i_id", Int),
    ("i_im_id", Int),
    ("i_name", Str),
    ("i_price", Double),
    ("i_data", Str),
];

const ORDERLINE: &[(&str, LogicalType)] = &[
    ("ol_o_id", Int),
    ("ol_d_id", Int),
    ("ol_w_id", Int),
    ("ol_number", Int),
    ("ol_i_id", Int),
    ("ol_supply_w_id", Int),
    ("ol_delivery_d", Str),
    ("ol_quantity", Int),
    ("ol_amount", Double),
    ("ol_dist_info", Str),
];

// dbgen terminates every row with `|`, which reads as one more (empty) field.
const LINEITEM: &[(&str, LogicalType)] = &[
    ("l_orderkey", Int),
    ("l_partkey", Int),
    ("l_suppkey", Int),
    ("l_linenumber", Int),
    ("l_quantity", Double),
    ("l_extendedprice", Double),
    ("l_discount", Double),
    ("l_tax", Double),
    ("l_returnflag", Str),
    ("l_linestatus", Str),
    ("l_shipdate", Str),
    ("l_commitdate", Str),
    ("l_receiptdate", Str),
    ("l_shipinstruct", Str),
    ("l_shipmode", Str),
    ("l_comment", Str),
    ("extra_field", Str),
];

const PART: &[(&str, LogicalType)] = &[
    ("p_partkey", Int),
    ("p_name", Str),
    ("p_mfgr", Str),
    ("p_brand", Str),
    ("p_type", Str),
    ("p_size", Int),
    ("p_container", Str),
    ("p_retailprice", Double),
    ("p_comment", Str),
    ("extra_field", Str),
];

const BUILTIN: &[(&str, &[(&str, LogicalType)])] = &[
    ("item", ITEM),
    ("orderline", ORDERLINE),
    ("lineitem", LINEITEM),
    ("part", PART),
];

// ============================================================================
// Catalog
// ============================================================================

/// Immutable mapping from lowercase table name to its definition.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: IndexMap<String, TableDef>,
}

impl Catalog {
    /// The TPC-C (`item`, `orderline`) and TPC-H (`lineitem`, `part`) tables.
    pub fn builtin() -> Self {
        let tables = BUILTIN
            .iter()
            .map(|(name, columns)| {
                let columns = columns
                    .iter()
                    .map(|&(col, ty)| ColumnDef::new(col, ty))
                    .collect();
                (name.to_string(), TableDef::new(*name, columns))
            })
            .collect();
        Self { tables }
    }

    /// Load a catalog from a JSON file, replacing the built-in tables.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: IndexMap<String, IndexMap<String, LogicalType>> = serde_json::from_str(&text)
            .map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut tables = IndexMap::with_capacity(raw.len());
        for (name, columns) in raw {
            let name = name.to_lowercase();
            let columns = columns
                .into_iter()
                .map(|(col, ty)| ColumnDef::new(col, ty))
                .collect();
            let table = TableDef::new(name.clone(), columns);
            validate(&table)?;
            tables.insert(name, table);
        }

        info!("Loaded {} tables from catalog {}", tables.len(), path.display());
        Ok(Self { tables })
    }

    /// Look up a table by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Every column must map to its own file inside the table directory and be
/// representable in the schema descriptor.
fn validate(table: &TableDef) -> Result<(), CatalogError> {
    if table.columns.is_empty() {
        return Err(CatalogError::EmptyTable(table.name.clone()));
    }
    let mut seen = std::collections::HashSet::new();
    for col in &table.columns {
        let name = col.name.as_str();
        let unusable = name.is_empty()
            || name == "."
            || name == ".."
            || name == SCHEMA_FILE_NAME
            || name.contains([',', '\n', '\r', '/', '\\', '\0']);
        if unusable {
            return Err(CatalogError::InvalidColumnName {
                table: table.name.clone(),
                column: col.name.clone(),
            });
        }
        if !seen.insert(name) {
            return Err(CatalogError::DuplicateColumn {
                table: table.name.clone(),
                column: col.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load_json(json: &str) -> Result<Catalog, CatalogError> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(&path, json).unwrap();
        Catalog::from_json_file(&path)
    }

    #[test]
    fn test_builtin_tables_are_valid() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 4);
        for table in catalog.tables() {
            validate(table).unwrap();
        }
    }

    #[test]
    fn test_builtin_item_order() {
        let catalog = Catalog::builtin();
        let item = catalog.get("item").unwrap();
        let names: Vec<&str> = item.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["i_id", "i_im_id", "i_name", "i_price", "i_data"]);
        assert_eq!(item.column("i_price").unwrap().logical_type, Double);
    }

    #[test]
    fn test_tpch_tables_carry_trailing_field() {
        let catalog = Catalog::builtin();
        for name in ["lineitem", "part"] {
            let last = catalog.get(name).unwrap().columns.last().unwrap();
            assert_eq!(last.name, "extra_field");
            assert_eq!(last.logical_type, Str);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = Catalog::builtin();
        assert!(catalog.get("ORDERLINE").is_some());
        assert!(catalog.get("LineItem").is_some());
        assert!(catalog.get("customer").is_none());
    }

    #[test]
    fn test_json_catalog_preserves_column_order() {
        let catalog = load_json(
            r#"{ "Nation": { "n_nationkey": "int", "n_name": "string", "n_regionkey": "int", "n_weight": "double" } }"#,
        )
        .unwrap();
        let nation = catalog.get("nation").unwrap();
        assert_eq!(nation.name, "nation");
        let columns: Vec<(&str, LogicalType)> = nation
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.logical_type))
            .collect();
        assert_eq!(
            columns,
            [
                ("n_nationkey", Int),
                ("n_name", Str),
                ("n_regionkey", Int),
                ("n_weight", Double)
            ]
        );
    }

    #[test]
    fn test_json_catalog_rejects_bad_input() {
        assert!(matches!(
            load_json(r#"{ "t": { "a": "bigint" } }"#),
            Err(CatalogError::Parse { .. })
        ));
        assert!(matches!(
            load_json(r#"{ "t": {} }"#),
            Err(CatalogError::EmptyTable(t)) if t == "t"
        ));
        for bad in ["a/b", "a,b", "__schema__", ".."] {
            let json = format!(r#"{{ "t": {{ "{bad}": "int" }} }}"#);
            assert!(
                matches!(
                    load_json(&json),
                    Err(CatalogError::InvalidColumnName { .. })
                ),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let table = TableDef::new(
            "t",
            vec![ColumnDef::new("a", Int), ColumnDef::new("a", Double)],
        );
        assert!(matches!(
            validate(&table),
            Err(CatalogError::DuplicateColumn { column, .. }) if column == "a"
        ));
    }

    #[test]
    fn test_json_file_errors_carry_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");

        let err = Catalog::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CatalogError::Io { path: p, .. } if p == path));

        fs::write(&path, "not json").unwrap();
        let err = Catalog::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { path: p, .. } if p == path));
    }
}
