//! SQLite backend for [`RelationalStore`].
//!
//! Each logical database maps to one file under the store root:
//!
//! - `<root>/data.sqlite3`
//! - `<root>/runs.sqlite3`
//!
//! A connection is opened at the start of every call and dropped when the
//! call returns, on success and on error alike.
use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{
    Connection, OptionalExtension, ToSql, params, params_from_iter,
    types::{ToSqlOutput, Type, Value, ValueRef},
};
use snafu::prelude::*;

use super::{
    ColumnMissingSnafu, IfExists, IoSnafu, NameTakenSnafu, RelationalStore, SqlColumn, SqlTable,
    SqlValue, SqliteSnafu, StoreResult, TableExistsSnafu, TableMissingSnafu,
};

const FILE_EXTENSION: &str = "sqlite3";

/// File-backed SQLite store rooted at a directory.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    root: PathBuf,
}

impl SqliteStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).context(IoSnafu {
            path: root.display().to_string(),
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `database`.
    pub fn database_path(&self, database: &str) -> PathBuf {
        self.root.join(format!("{database}.{FILE_EXTENSION}"))
    }

    fn connect(&self, database: &str) -> StoreResult<Connection> {
        let path = self.database_path(database);
        debug!("opening sqlite database {}", path.display());
        Connection::open(&path).context(SqliteSnafu { database })
    }
}

/// Quote an identifier for use in SQL text.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists_on(conn: &Connection, database: &str, table: &str) -> StoreResult<bool> {
    Ok(object_type_on(conn, database, table)?.as_deref() == Some("table"))
}

/// Type of the schema object named `name` (`table`, `index`, ...), if any.
///
/// SQLite resolves identifiers case-insensitively, so the lookup does too.
fn object_type_on(conn: &Connection, database: &str, name: &str) -> StoreResult<Option<String>> {
    conn.query_row(
        "SELECT type FROM sqlite_master WHERE name = ?1 COLLATE NOCASE",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context(SqliteSnafu { database })
}

/// First index name for `table.key` not already used by another object.
fn free_index_name(conn: &Connection, database: &str, table: &str, key: &str) -> StoreResult<String> {
    let base = format!("ix_{table}_{key}");
    let mut candidate = base.clone();
    let mut n = 1;
    while object_type_on(conn, database, &candidate)?.is_some() {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    Ok(candidate)
}

fn create_table(conn: &Connection, database: &str, table: &str, data: &SqlTable) -> StoreResult<()> {
    let column_defs: Vec<String> = data
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
        .collect();
    let sql = format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        column_defs.join(", ")
    );
    conn.execute(&sql, []).context(SqliteSnafu { database })?;

    if let Some(key) = &data.key {
        let sql = format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&free_index_name(conn, database, table, key)?),
            quote_ident(table),
            quote_ident(key)
        );
        conn.execute(&sql, []).context(SqliteSnafu { database })?;
    }
    Ok(())
}

fn insert_rows(conn: &Connection, database: &str, table: &str, data: &SqlTable) -> StoreResult<()> {
    if data.rows.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = data.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders: Vec<String> = (1..=data.columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql).context(SqliteSnafu { database })?;
    for row in &data.rows {
        stmt.execute(params_from_iter(row.iter()))
            .context(SqliteSnafu { database })?;
    }
    Ok(())
}

fn declared_columns(conn: &Connection, database: &str, table: &str) -> StoreResult<Vec<SqlColumn>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql).context(SqliteSnafu { database })?;
    let columns = stmt
        .query_map([], |row| {
            Ok(SqlColumn {
                name: row.get(1)?,
                sql_type: row.get(2)?,
            })
        })
        .context(SqliteSnafu { database })?
        .collect::<Result<Vec<_>, _>>()
        .context(SqliteSnafu { database })?;
    Ok(columns)
}

fn value_from_ref(value: ValueRef<'_>, idx: usize, name: &str) -> rusqlite::Result<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(v) => Ok(SqlValue::Integer(v)),
        ValueRef::Real(v) => Ok(SqlValue::Real(v)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| SqlValue::Text(s.to_string()))
            .map_err(rusqlite::Error::Utf8Error),
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            name.to_string(),
            Type::Blob,
        )),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl RelationalStore for SqliteStore {
    fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool> {
        let conn = self.connect(database)?;
        table_exists_on(&conn, database, table)
    }

    fn write_table(
        &self,
        database: &str,
        table: &str,
        data: &SqlTable,
        if_exists: IfExists,
    ) -> StoreResult<()> {
        data.check_shape()?;

        let mut conn = self.connect(database)?;
        let tx = conn.transaction().context(SqliteSnafu { database })?;

        match (object_type_on(&tx, database, table)?.as_deref(), if_exists) {
            (Some("table"), IfExists::Fail) => {
                return TableExistsSnafu { database, table }.fail();
            }
            (Some("table"), IfExists::Append) => {}
            (Some(kind), _) => {
                return NameTakenSnafu {
                    database,
                    table,
                    kind,
                }
                .fail();
            }
            (None, _) => create_table(&tx, database, table, data)?,
        }

        insert_rows(&tx, database, table, data)?;
        tx.commit().context(SqliteSnafu { database })?;

        debug!(
            "wrote {} rows to {database}.{table} ({if_exists:?})",
            data.rows.len()
        );
        Ok(())
    }

    fn read_table(
        &self,
        database: &str,
        table: &str,
        order_by: Option<&str>,
    ) -> StoreResult<SqlTable> {
        let conn = self.connect(database)?;
        ensure!(
            table_exists_on(&conn, database, table)?,
            TableMissingSnafu { database, table }
        );

        let columns = declared_columns(&conn, database, table)?;
        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        if let Some(key) = order_by {
            ensure!(
                columns.iter().any(|c| c.name == key),
                ColumnMissingSnafu {
                    database,
                    table,
                    column: key,
                }
            );
            sql.push_str(&format!(" ORDER BY {}", quote_ident(key)));
        }

        let mut stmt = conn.prepare(&sql).context(SqliteSnafu { database })?;
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| value_from_ref(row.get_ref(i)?, i, &columns[i].name))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .context(SqliteSnafu { database })?
            .collect::<Result<Vec<_>, _>>()
            .context(SqliteSnafu { database })?;

        Ok(SqlTable {
            columns,
            rows,
            key: order_by.map(str::to_string),
        })
    }
}
