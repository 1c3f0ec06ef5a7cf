//! Provenance records appended on every save.
use chrono::Local;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::error::{MetadataShapeSnafu, PersistenceResult};
use crate::store::{SqlColumn, SqlTable, SqlValue};

/// Hierarchy tag written on every record.
pub const DATA_HIERARCHY: &str = "data";

const COLUMNS: [&str; 4] = ["table_name", "hierarchy", "time_stamp", "hash"];

/// One row of the metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Name the table was saved under. Not unique.
    pub table_name: String,
    /// Always [`DATA_HIERARCHY`] for records written by this crate.
    pub hierarchy: String,
    /// Local time of the save, `YYYY-MM-DD HH:MM:SS.ffffff`.
    pub time_stamp: String,
    /// Hex content hash of the saved table.
    pub hash: String,
}

impl MetadataRecord {
    /// Record for a save happening now.
    pub fn now(table_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hierarchy: DATA_HIERARCHY.to_string(),
            time_stamp: Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            hash: hash.into(),
        }
    }

    pub(crate) fn to_sql_table(&self) -> SqlTable {
        let mut table = SqlTable::new(COLUMNS.iter().map(|c| SqlColumn::new(*c, "TEXT")).collect());
        table.rows.push(vec![
            SqlValue::Text(self.table_name.clone()),
            SqlValue::Text(self.hierarchy.clone()),
            SqlValue::Text(self.time_stamp.clone()),
            SqlValue::Text(self.hash.clone()),
        ]);
        table
    }

    pub(crate) fn from_sql_table(
        meta_table: &str,
        stored: &SqlTable,
    ) -> PersistenceResult<Vec<Self>> {
        let mut positions = [0usize; 4];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = stored
                .column_position(column)
                .context(MetadataShapeSnafu {
                    table: meta_table,
                    column,
                })?;
        }

        let text = |row: &[SqlValue], pos: usize| match &row[pos] {
            SqlValue::Null => String::new(),
            SqlValue::Text(s) => s.clone(),
            other => other.to_string(),
        };

        Ok(stored
            .rows
            .iter()
            .map(|row| Self {
                table_name: text(row, positions[0]),
                hierarchy: text(row, positions[1]),
                time_stamp: text(row, positions[2]),
                hash: text(row, positions[3]),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceError;

    #[test]
    fn new_record_carries_fixed_hierarchy_and_timestamp() {
        let record = MetadataRecord::now("t0", "abc");
        assert_eq!(record.hierarchy, "data");
        assert!(
            chrono::NaiveDateTime::parse_from_str(&record.time_stamp, "%Y-%m-%d %H:%M:%S%.f").is_ok(),
            "unexpected timestamp {}",
            record.time_stamp
        );
    }

    #[test]
    fn sql_round_trip_tolerates_column_order() -> PersistenceResult<()> {
        let record = MetadataRecord::now("t0", "abc");
        let mut stored = record.to_sql_table();
        stored.columns.reverse();
        for row in &mut stored.rows {
            row.reverse();
        }
        let back = MetadataRecord::from_sql_table("meta", &stored)?;
        assert_eq!(back, vec![record]);
        Ok(())
    }

    #[test]
    fn missing_column_is_reported() {
        let stored = SqlTable::new(vec![SqlColumn::new("table_name", "TEXT")]);
        let err = MetadataRecord::from_sql_table("meta", &stored).unwrap_err();
        assert!(matches!(err, PersistenceError::MetadataShape { column, .. } if column == "hierarchy"));
    }
}
