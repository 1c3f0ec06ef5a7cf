//! Save and load tables with provenance tracking.
//!
//! [`PersistenceService`] writes tables to the data database and appends a
//! [`MetadataRecord`] per save to the metadata table of the runs database.
//! Loading consults the metadata first: a name that was never saved is
//! reported as [`PersistenceError::NotFound`] without touching the data
//! database.
//!
//! The two databases are written independently. If the metadata append
//! fails after the data write succeeded, the data table stays in place
//! without a provenance record.
mod codec;
mod error;
mod metadata;

use log::{debug, info, warn};
use snafu::prelude::*;

pub use codec::{DATETIME_FORMAT, decode_table, encode_table};
pub use error::{PersistenceError, PersistenceResult};
pub use metadata::{DATA_HIERARCHY, MetadataRecord};

use crate::{
    config::StoreConfig,
    hash::content_hash,
    schema::{INDEX_COLUMN, TableSchema},
    store::{IfExists, RelationalStore, SqlColumn, SqlTable, SqlValue, StoreError},
    table::Table,
};
use error::{InvalidNameSnafu, NotFoundSnafu, SchemaSnafu, StoreSnafu};

/// Companion table in the data database holding schema descriptors.
pub const SCHEMA_TABLE: &str = "_synthtable_schema";

/// Saves and loads tables through a [`RelationalStore`].
#[derive(Debug)]
pub struct PersistenceService<S> {
    config: StoreConfig,
    store: S,
}

impl<S: RelationalStore> PersistenceService<S> {
    /// Create a service over `store` using the names in `config`.
    pub fn new(config: StoreConfig, store: S) -> Self {
        Self { config, store }
    }

    /// Configuration in use.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Save `table` under `table_name` and append its provenance record.
    ///
    /// Fails with [`PersistenceError::Conflict`] if the data database already
    /// holds a table (or index) with that name, ignoring ASCII case; the
    /// existing object is not modified.
    pub fn save(&self, table: &Table, table_name: &str) -> PersistenceResult<MetadataRecord> {
        validate_name(table_name)?;
        let data_db = self.config.data_db_name.as_str();
        debug!("saving {table_name} to {}", self.config.connection_url(data_db));

        let encoded = encode_table(table);
        if let Err(source) = self
            .store
            .write_table(data_db, table_name, &encoded, IfExists::Fail)
        {
            return Err(match source {
                StoreError::TableExists { .. } | StoreError::NameTaken { .. } => {
                    PersistenceError::Conflict {
                        table_name: table_name.to_string(),
                        source: Box::new(source),
                    }
                }
                other => PersistenceError::Store {
                    operation: format!("writing table {table_name}"),
                    source: Box::new(other),
                },
            });
        }

        self.write_schema(table_name, table.schema())?;

        let record = MetadataRecord::now(table_name, content_hash(table));
        let runs_db = self.config.runs_db_name.as_str();
        let runs_table = self.config.runs_table_name.as_str();
        self.store
            .write_table(runs_db, runs_table, &record.to_sql_table(), IfExists::Append)
            .context(StoreSnafu {
                operation: format!("appending metadata for {table_name}"),
            })?;

        info!(
            "saved {table_name}: {} rows, {} columns, hash {}",
            table.num_rows(),
            table.num_columns(),
            record.hash
        );
        Ok(record)
    }

    /// Load the table saved under `table_name`.
    ///
    /// Several metadata records with the same name are tolerated with a
    /// warning.
    pub fn load(&self, table_name: &str) -> PersistenceResult<Table> {
        let matches = self.records_for(table_name)?.len();
        ensure!(matches > 0, NotFoundSnafu { table_name });
        if matches > 1 {
            warn!("multiple tables with the name '{table_name}' found in the metadata store ({matches} records)");
        }

        let data_db = self.config.data_db_name.as_str();
        debug!("loading {table_name} from {}", self.config.connection_url(data_db));

        let stored = self
            .store
            .read_table(data_db, table_name, Some(INDEX_COLUMN))
            .context(StoreSnafu {
                operation: format!("reading table {table_name}"),
            })?;
        let schema = self.read_schema(table_name)?;
        if schema.is_none() {
            debug!("no schema descriptor for {table_name}; inferring column types");
        }

        let table = decode_table(table_name, &stored, schema.as_ref())?;
        info!(
            "loaded {table_name}: {} rows, {} columns",
            table.num_rows(),
            table.num_columns()
        );
        Ok(table)
    }

    /// All provenance records in insertion order.
    ///
    /// Returns an empty list when the metadata table has not been created yet.
    pub fn records(&self) -> PersistenceResult<Vec<MetadataRecord>> {
        let runs_db = self.config.runs_db_name.as_str();
        let runs_table = self.config.runs_table_name.as_str();

        let exists = self
            .store
            .table_exists(runs_db, runs_table)
            .context(StoreSnafu {
                operation: "checking the metadata table",
            })?;
        if !exists {
            return Ok(Vec::new());
        }

        let stored = self
            .store
            .read_table(runs_db, runs_table, None)
            .context(StoreSnafu {
                operation: "reading the metadata table",
            })?;
        MetadataRecord::from_sql_table(runs_table, &stored)
    }

    /// Provenance records saved under `table_name`.
    pub fn records_for(&self, table_name: &str) -> PersistenceResult<Vec<MetadataRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.table_name == table_name)
            .collect())
    }

    fn write_schema(&self, table_name: &str, schema: &TableSchema) -> PersistenceResult<()> {
        let json = schema.to_json().context(SchemaSnafu { table_name })?;
        let mut row = SqlTable::new(vec![
            SqlColumn::new("table_name", "TEXT"),
            SqlColumn::new("schema", "TEXT"),
        ]);
        row.rows
            .push(vec![SqlValue::Text(table_name.to_string()), SqlValue::Text(json)]);

        self.store
            .write_table(&self.config.data_db_name, SCHEMA_TABLE, &row, IfExists::Append)
            .context(StoreSnafu {
                operation: format!("writing schema descriptor for {table_name}"),
            })
    }

    /// Latest descriptor stored for `table_name`, if any.
    fn read_schema(&self, table_name: &str) -> PersistenceResult<Option<TableSchema>> {
        let data_db = self.config.data_db_name.as_str();
        let exists = self
            .store
            .table_exists(data_db, SCHEMA_TABLE)
            .context(StoreSnafu {
                operation: "checking schema descriptors",
            })?;
        if !exists {
            return Ok(None);
        }

        let stored = self
            .store
            .read_table(data_db, SCHEMA_TABLE, None)
            .context(StoreSnafu {
                operation: "reading schema descriptors",
            })?;
        let (Some(name_pos), Some(schema_pos)) = (
            stored.column_position("table_name"),
            stored.column_position("schema"),
        ) else {
            return Ok(None);
        };

        stored
            .rows
            .iter()
            .rev()
            .find(|row| row[name_pos].as_text() == Some(table_name))
            .and_then(|row| row[schema_pos].as_text())
            .map(|json| TableSchema::from_json(json).context(SchemaSnafu { table_name }))
            .transpose()
    }
}

fn validate_name(table_name: &str) -> PersistenceResult<()> {
    ensure!(
        !table_name.is_empty(),
        InvalidNameSnafu {
            table_name,
            reason: "name is empty",
        }
    );
    ensure!(
        !table_name.eq_ignore_ascii_case(SCHEMA_TABLE),
        InvalidNameSnafu {
            table_name,
            reason: "name is reserved for schema descriptors",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        generate::{BlockOptions, generate_wide_table},
        store::sqlite::SqliteStore,
    };
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn service(tmp: &TempDir) -> Result<PersistenceService<SqliteStore>, Box<dyn std::error::Error>> {
        Ok(PersistenceService::new(
            StoreConfig::default(),
            SqliteStore::open(tmp.path())?,
        ))
    }

    #[test]
    fn save_writes_data_schema_and_metadata() -> TestResult {
        let tmp = TempDir::new()?;
        let svc = service(&tmp)?;
        let table = generate_wide_table(&BlockOptions::default().with_rows(20), 2)?;

        let record = svc.save(&table, "t0")?;
        assert_eq!(record.table_name, "t0");
        assert_eq!(record.hierarchy, DATA_HIERARCHY);
        assert_eq!(record.hash, content_hash(&table));

        assert!(svc.store().table_exists("data", "t0")?);
        assert!(svc.store().table_exists("data", SCHEMA_TABLE)?);
        assert!(svc.store().table_exists("runs", "meta")?);
        assert_eq!(svc.records()?, vec![record]);
        Ok(())
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let svc = service(&tmp)?;
        let table = generate_wide_table(&BlockOptions::default().with_rows(1), 1)?;
        assert!(matches!(
            svc.save(&table, ""),
            Err(PersistenceError::InvalidName { .. })
        ));
        assert!(matches!(
            svc.save(&table, SCHEMA_TABLE),
            Err(PersistenceError::InvalidName { .. })
        ));
        Ok(())
    }

    #[test]
    fn load_without_metadata_table_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let svc = service(&tmp)?;
        assert!(svc.records()?.is_empty());
        assert!(matches!(
            svc.load("anything"),
            Err(PersistenceError::NotFound { table_name }) if table_name == "anything"
        ));
        Ok(())
    }

    #[test]
    fn custom_names_from_config_are_used() -> TestResult {
        let tmp = TempDir::new()?;
        let config = StoreConfig::default().with_names("warehouse", "audit", "provenance");
        let svc = PersistenceService::new(config, SqliteStore::open(tmp.path())?);
        let table = generate_wide_table(&BlockOptions::default().with_rows(5), 1)?;

        svc.save(&table, "t")?;
        assert!(svc.store().table_exists("warehouse", "t")?);
        assert!(svc.store().table_exists("audit", "provenance")?);
        assert_eq!(svc.load("t")?, table);
        Ok(())
    }
}
