//! Relational store abstraction.
//!
//! The persistence layer talks to its databases only through the
//! [`RelationalStore`] trait: write a table, read a table, check whether a
//! table exists. Tables cross this boundary as [`SqlTable`], a row-oriented
//! frame of [`SqlValue`]s with declared SQL column types, so backends need
//! no knowledge of Arrow.
//!
//! The bundled backend is [`sqlite::SqliteStore`].
pub mod sqlite;

use std::{fmt, io};

use snafu::{Backtrace, prelude::*};

/// General result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by a relational store backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// A write with [`IfExists::Fail`] targeted an existing table.
    #[snafu(display("Table {database}.{table} already exists"))]
    TableExists {
        /// Database holding the table.
        database: String,
        /// The existing table.
        table: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The name is already used by another kind of schema object.
    ///
    /// SQLite keeps tables and indexes in one case-insensitive namespace.
    #[snafu(display("Name {table} in {database} is already used by an {kind}"))]
    NameTaken {
        /// Database holding the object.
        database: String,
        /// The requested table name.
        table: String,
        /// Type of the existing object, e.g. `index`.
        kind: String,
    },

    /// The requested table does not exist.
    #[snafu(display("Table {database}.{table} does not exist"))]
    TableMissing {
        /// Database that was searched.
        database: String,
        /// The missing table.
        table: String,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// The table exists but has no column with the requested name.
    #[snafu(display("Table {database}.{table} has no column {column}"))]
    ColumnMissing {
        /// Database holding the table.
        database: String,
        /// Table that was read.
        table: String,
        /// The missing column.
        column: String,
    },

    /// A row does not match the declared column list.
    #[snafu(display("Row {row} has {actual} values but {expected} columns are declared"))]
    RowWidth {
        /// Offending row position.
        row: usize,
        /// Declared column count.
        expected: usize,
        /// Value count of the row.
        actual: usize,
    },

    /// Any error reported by the SQLite client (connectivity, SQL, constraints).
    #[snafu(display("SQLite error on {database}: {source}"))]
    Sqlite {
        /// Database the statement ran against.
        database: String,
        /// Underlying client error.
        source: rusqlite::Error,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Filesystem error while preparing the store location.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    Io {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },
}

/// Behaviour of [`RelationalStore::write_table`] when the target exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
    /// Refuse to write; the existing table is left untouched.
    Fail,
    /// Append rows to the existing table (it is created when absent).
    Append,
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// Text.
    Text(String),
}

impl SqlValue {
    /// Whether this value is SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(v) => write!(f, "{v}"),
            SqlValue::Real(v) => write!(f, "{v}"),
            SqlValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Declared column of an [`SqlTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumn {
    /// Column name.
    pub name: String,
    /// Declared SQL type (may be empty for untyped columns).
    pub sql_type: String,
}

impl SqlColumn {
    /// Column with the given name and declared type.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Row-oriented table exchanged with a [`RelationalStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlTable {
    /// Declared columns.
    pub columns: Vec<SqlColumn>,
    /// Rows; each row holds one value per declared column.
    pub rows: Vec<Vec<SqlValue>>,
    /// Column used as the row key; backends index it on creation.
    pub key: Option<String>,
}

impl SqlTable {
    /// Empty table with the given columns.
    pub fn new(columns: Vec<SqlColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            key: None,
        }
    }

    /// Mark `column` as the row key.
    pub fn with_key(mut self, column: impl Into<String>) -> Self {
        self.key = Some(column.into());
        self
    }

    /// Position of a column by name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterate over the values of one column.
    pub fn column_values(&self, position: usize) -> impl Iterator<Item = &SqlValue> + '_ {
        self.rows.iter().map(move |row| &row[position])
    }

    /// Check that every row matches the declared column count.
    pub fn check_shape(&self) -> StoreResult<()> {
        for (row, values) in self.rows.iter().enumerate() {
            ensure!(
                values.len() == self.columns.len(),
                RowWidthSnafu {
                    row,
                    expected: self.columns.len(),
                    actual: values.len(),
                }
            );
        }
        Ok(())
    }
}

/// Minimal interface to an external relational store.
///
/// Every call is synchronous and self-contained: implementations acquire a
/// connection for the duration of the call and release it on every exit
/// path.
pub trait RelationalStore {
    /// Whether `table` exists in `database`.
    fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool>;

    /// Write `data` to `database.table`.
    ///
    /// With [`IfExists::Fail`] an existing table yields
    /// [`StoreError::TableExists`] and is not modified. With
    /// [`IfExists::Append`] rows are appended, creating the table first when
    /// needed.
    fn write_table(
        &self,
        database: &str,
        table: &str,
        data: &SqlTable,
        if_exists: IfExists,
    ) -> StoreResult<()>;

    /// Read every row of `database.table`.
    ///
    /// When `order_by` is given, rows are returned sorted ascending by that
    /// column; otherwise in storage order.
    fn read_table(
        &self,
        database: &str,
        table: &str,
        order_by: Option<&str>,
    ) -> StoreResult<SqlTable>;
}

impl<S: RelationalStore + ?Sized> RelationalStore for &S {
    fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool> {
        (**self).table_exists(database, table)
    }

    fn write_table(
        &self,
        database: &str,
        table: &str,
        data: &SqlTable,
        if_exists: IfExists,
    ) -> StoreResult<()> {
        (**self).write_table(database, table, data, if_exists)
    }

    fn read_table(
        &self,
        database: &str,
        table: &str,
        order_by: Option<&str>,
    ) -> StoreResult<SqlTable> {
        (**self).read_table(database, table, order_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_shape_reports_first_bad_row() {
        let mut t = SqlTable::new(vec![SqlColumn::new("a", "BIGINT"), SqlColumn::new("b", "TEXT")]);
        t.rows.push(vec![SqlValue::Integer(1), SqlValue::Null]);
        t.rows.push(vec![SqlValue::Integer(2)]);
        let err = t.check_shape().unwrap_err();
        assert!(matches!(
            err,
            StoreError::RowWidth {
                row: 1,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn column_lookup_and_values() {
        let mut t = SqlTable::new(vec![SqlColumn::new("a", "BIGINT"), SqlColumn::new("b", "TEXT")]);
        t.rows.push(vec![SqlValue::Integer(1), SqlValue::Text("x".into())]);
        t.rows.push(vec![SqlValue::Integer(2), SqlValue::Null]);

        let pos = t.column_position("b").expect("column b");
        let values: Vec<_> = t.column_values(pos).collect();
        assert_eq!(values, vec![&SqlValue::Text("x".into()), &SqlValue::Null]);
        assert!(t.column_position("c").is_none());
        assert_eq!(SqlValue::Text("x".into()).to_string(), "\"x\"");
    }
}
