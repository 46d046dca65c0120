//! Table query abstraction over the SONiC databases
//!
//! The show-command layer owns the real database client. Discovery only
//! needs "give me the rows of this table", so it is expressed as the
//! [`DbQuery`] trait and handed to each component through its constructor.

use crate::error::{IpIntfError, Result};
use crate::types::DEFAULT_NAMESPACE;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

pub const CONFIG_DB: &str = "CONFIG_DB";

pub const CFG_DEVICE_METADATA_TABLE: &str = "DEVICE_METADATA";
pub const CFG_BGP_NEIGHBOR_TABLE: &str = "BGP_NEIGHBOR";

/// Row key of the device's own metadata entry
pub const DEVICE_METADATA_LOCALHOST: &str = "localhost";

/// Separator between table name and row key in result keys
pub const TABLE_KEY_SEPARATOR: char = '|';

/// Query result: `TABLE|key` to a field map (or any other JSON value)
pub type TableData = HashMap<String, Value>;

/// Database name for `namespace`: `CONFIG_DB` or `CONFIG_DB/<ns>`
pub fn config_db_name(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        CONFIG_DB.to_string()
    } else {
        format!("{}/{}", CONFIG_DB, namespace)
    }
}

/// Composite result key, e.g. `DEVICE_METADATA|localhost`
pub fn table_key(table: &str, key: &str) -> String {
    format!("{}{}{}", table, TABLE_KEY_SEPARATOR, key)
}

/// One table (optionally one row) of one database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSelector {
    /// Database name, optionally namespace-suffixed: `CONFIG_DB/asic0`
    pub database: String,
    pub table: String,
    pub key: Option<String>,
}

impl TableSelector {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            key: None,
        }
    }

    /// Whole CONFIG_DB table in `namespace`
    pub fn config_db(namespace: &str, table: &str) -> Self {
        Self::new(config_db_name(namespace), table)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Injectable table query function
pub trait DbQuery: Send + Sync {
    fn query(&self, selectors: &[TableSelector]) -> Result<TableData>;
}

impl<F> DbQuery for F
where
    F: Fn(&[TableSelector]) -> Result<TableData> + Send + Sync,
{
    fn query(&self, selectors: &[TableSelector]) -> Result<TableData> {
        self(selectors)
    }
}

/// In-memory databases loaded from a JSON snapshot
///
/// Layout: `{ "CONFIG_DB": { "BGP_NEIGHBOR|10.0.0.1": { "local_addr": ... } },
/// "CONFIG_DB/asic0": { ... } }`
#[derive(Debug, Clone, Default)]
pub struct SnapshotDbQuery {
    databases: HashMap<String, TableData>,
}

impl SnapshotDbQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(dbs) = value else {
            return Err(IpIntfError::Database(
                "snapshot root must be an object".to_string(),
            ));
        };

        let mut databases = HashMap::with_capacity(dbs.len());
        for (db, rows) in dbs {
            let Value::Object(rows) = rows else {
                return Err(IpIntfError::Database(format!(
                    "snapshot database {} must be an object",
                    db
                )));
            };
            databases.insert(db, rows.into_iter().collect());
        }
        Ok(Self { databases })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(value)
    }

    /// Insert or replace one row
    pub fn insert(&mut self, database: &str, table: &str, key: &str, fields: Value) {
        self.databases
            .entry(database.to_string())
            .or_default()
            .insert(table_key(table, key), fields);
    }
}

impl DbQuery for SnapshotDbQuery {
    #[instrument(skip(self))]
    fn query(&self, selectors: &[TableSelector]) -> Result<TableData> {
        let mut out = TableData::new();
        for selector in selectors {
            let Some(rows) = self.databases.get(&selector.database) else {
                debug!(database = %selector.database, "Database not present in snapshot");
                continue;
            };
            match &selector.key {
                Some(key) => {
                    let full = table_key(&selector.table, key);
                    if let Some(row) = rows.get(&full) {
                        out.insert(full, row.clone());
                    }
                }
                None => {
                    let prefix = format!("{}{}", selector.table, TABLE_KEY_SEPARATOR);
                    out.extend(
                        rows.iter()
                            .filter(|(k, _)| k.starts_with(&prefix))
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                }
            }
        }
        Ok(out)
    }
}
