//! Conversion between [`Table`] and the row-oriented [`SqlTable`].
//!
//! Encoding prepends the positional index as a `BIGINT` column named
//! `index` and renders each cell in its column's SQL representation.
//! Decoding checks the index and rebuilds Arrow columns, either from a
//! stored [`TableSchema`] or, for tables written by other tools, from the
//! first kind every stored value decodes into.
use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray, TimestampSecondArray},
    datatypes::{Float64Type, Int64Type, TimestampSecondType},
};
use chrono::{DateTime, NaiveDateTime};
use snafu::prelude::*;

use super::error::{
    AssembleSnafu, CorruptIndexSnafu, DecodeSnafu, MissingColumnSnafu, PersistenceError,
    PersistenceResult, SchemaSnafu,
};
use crate::{
    schema::{ColumnKind, ColumnSpec, INDEX_COLUMN, TableSchema},
    store::{SqlColumn, SqlTable, SqlValue},
    table::Table,
};

/// Text layout of persisted datetimes.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Encode a table (plus its positional index) for the store.
pub fn encode_table(table: &Table) -> SqlTable {
    let mut columns = Vec::with_capacity(table.num_columns() + 1);
    columns.push(SqlColumn::new(INDEX_COLUMN, ColumnKind::Int.sql_type()));
    columns.extend(
        table
            .schema()
            .columns()
            .iter()
            .map(|c| SqlColumn::new(c.name.clone(), c.kind.sql_type())),
    );

    let arrays: Vec<(ColumnKind, &ArrayRef)> = table
        .schema()
        .columns()
        .iter()
        .zip(table.batch().columns())
        .map(|(spec, col)| (spec.kind, col))
        .collect();

    let rows = (0..table.num_rows())
        .map(|row| {
            let mut values = Vec::with_capacity(arrays.len() + 1);
            values.push(SqlValue::Integer(row as i64));
            values.extend(arrays.iter().map(|(kind, col)| encode_cell(*kind, col, row)));
            values
        })
        .collect();

    SqlTable {
        columns,
        rows,
        key: Some(INDEX_COLUMN.to_string()),
    }
}

fn encode_cell(kind: ColumnKind, col: &ArrayRef, row: usize) -> SqlValue {
    if col.is_null(row) {
        return SqlValue::Null;
    }
    match kind {
        ColumnKind::Datetime => {
            let secs = col.as_primitive::<TimestampSecondType>().value(row);
            match DateTime::from_timestamp(secs, 0) {
                Some(dt) => SqlValue::Text(dt.naive_utc().format(DATETIME_FORMAT).to_string()),
                // Outside chrono's range; keep the raw epoch seconds.
                None => SqlValue::Integer(secs),
            }
        }
        ColumnKind::Int => SqlValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        ColumnKind::Float => SqlValue::Real(col.as_primitive::<Float64Type>().value(row)),
        ColumnKind::Str => SqlValue::Text(col.as_string::<i32>().value(row).to_string()),
    }
}

/// Decode a stored table.
///
/// Rows must already be ordered by `index`; the index has to be the
/// contiguous sequence `0..n`. Columns are decoded with `schema` when
/// given, otherwise every non-index column is inferred.
pub fn decode_table(
    table_name: &str,
    stored: &SqlTable,
    schema: Option<&TableSchema>,
) -> PersistenceResult<Table> {
    let index_pos = stored
        .column_position(INDEX_COLUMN)
        .context(MissingColumnSnafu {
            table_name,
            column: INDEX_COLUMN,
        })?;
    check_index(table_name, stored, index_pos)?;

    let schema = match schema {
        Some(schema) => schema.clone(),
        None => infer_schema(table_name, stored, index_pos)?,
    };

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.columns().len());
    for spec in schema.columns() {
        let pos = stored
            .column_position(&spec.name)
            .context(MissingColumnSnafu {
                table_name,
                column: spec.name.clone(),
            })?;
        arrays.push(decode_column(table_name, stored, pos, spec)?);
    }

    Table::from_columns(schema, arrays, stored.rows.len()).context(AssembleSnafu { table_name })
}

fn check_index(table_name: &str, stored: &SqlTable, index_pos: usize) -> PersistenceResult<()> {
    for (position, value) in stored.column_values(index_pos).enumerate() {
        let ok = matches!(value, SqlValue::Integer(v) if *v == position as i64);
        ensure!(
            ok,
            CorruptIndexSnafu {
                table_name,
                position,
                found: value.to_string(),
            }
        );
    }
    Ok(())
}

fn infer_schema(
    table_name: &str,
    stored: &SqlTable,
    index_pos: usize,
) -> PersistenceResult<TableSchema> {
    let columns = stored
        .columns
        .iter()
        .enumerate()
        .filter(|(pos, _)| *pos != index_pos)
        .map(|(pos, col)| ColumnSpec::new(col.name.clone(), infer_kind(stored, pos, &col.sql_type)))
        .collect();
    TableSchema::new(columns).context(SchemaSnafu { table_name })
}

/// Pick the narrowest kind that decodes every stored value of a column.
///
/// The declared SQL type is tried first; `Str` always succeeds.
fn infer_kind(stored: &SqlTable, pos: usize, declared: &str) -> ColumnKind {
    let fallbacks = [ColumnKind::Int, ColumnKind::Float, ColumnKind::Datetime];
    ColumnKind::infer_from_sql_type(declared)
        .into_iter()
        .chain(fallbacks)
        .find(|kind| {
            stored
                .column_values(pos)
                .all(|v| v.is_null() || decodes_as(*kind, v))
        })
        .unwrap_or(ColumnKind::Str)
}

fn decodes_as(kind: ColumnKind, value: &SqlValue) -> bool {
    match kind {
        ColumnKind::Datetime => decode_datetime(value).is_some(),
        ColumnKind::Int => decode_int(value).is_some(),
        ColumnKind::Float => decode_float(value).is_some(),
        ColumnKind::Str => true,
    }
}

fn decode_datetime(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(secs) => Some(*secs),
        SqlValue::Text(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .ok()
            .map(|dt| dt.and_utc().timestamp()),
        _ => None,
    }
}

fn decode_int(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(v) => Some(*v),
        // Stores without a nullable integer type may widen to float.
        SqlValue::Real(v) if v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 => {
            Some(*v as i64)
        }
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_float(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Real(v) => Some(*v),
        SqlValue::Integer(v) => Some(*v as f64),
        SqlValue::Text(s) => s.trim().parse().ok(),
        SqlValue::Null => None,
    }
}

fn decode_str(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Integer(v) => Some(v.to_string()),
        SqlValue::Real(v) => Some(v.to_string()),
        SqlValue::Null => None,
    }
}

fn decode_column(
    table_name: &str,
    stored: &SqlTable,
    pos: usize,
    spec: &ColumnSpec,
) -> PersistenceResult<ArrayRef> {
    let fail = |row: usize, value: &SqlValue| {
        DecodeSnafu {
            table_name,
            column: spec.name.clone(),
            row,
            value: value.to_string(),
            kind: spec.kind,
        }
        .build()
    };

    fn collect<T>(
        stored: &SqlTable,
        pos: usize,
        decode: impl Fn(&SqlValue) -> Option<T>,
        fail: impl Fn(usize, &SqlValue) -> PersistenceError,
    ) -> PersistenceResult<Vec<Option<T>>> {
        stored
            .column_values(pos)
            .enumerate()
            .map(|(row, value)| match value {
                SqlValue::Null => Ok(None),
                other => decode(other).map(Some).ok_or_else(|| fail(row, other)),
            })
            .collect()
    }

    let array: ArrayRef = match spec.kind {
        ColumnKind::Datetime => Arc::new(TimestampSecondArray::from(collect(
            stored,
            pos,
            decode_datetime,
            fail,
        )?)),
        ColumnKind::Int => Arc::new(Int64Array::from(collect(stored, pos, decode_int, fail)?)),
        ColumnKind::Float => Arc::new(Float64Array::from(collect(stored, pos, decode_float, fail)?)),
        ColumnKind::Str => Arc::new(StringArray::from(collect(stored, pos, decode_str, fail)?)),
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{BlockOptions, generate_wide_table};

    fn stored(columns: &[(&str, &str)], rows: Vec<Vec<SqlValue>>) -> SqlTable {
        SqlTable {
            columns: columns
                .iter()
                .map(|(n, t)| SqlColumn::new(*n, *t))
                .collect(),
            rows,
            key: Some(INDEX_COLUMN.to_string()),
        }
    }

    #[test]
    fn encode_prepends_index_and_renders_cells() -> Result<(), Box<dyn std::error::Error>> {
        let table = generate_wide_table(&BlockOptions::default().with_rows(3).with_ratio_nans(0.0), 1)?;
        let sql = encode_table(&table);

        let names: Vec<_> = sql.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["index", "datetime", "int", "float", "str"]);
        let types: Vec<_> = sql.columns.iter().map(|c| c.sql_type.as_str()).collect();
        assert_eq!(types, vec!["BIGINT", "DATETIME", "BIGINT", "DOUBLE", "TEXT"]);

        assert_eq!(sql.rows.len(), 3);
        assert_eq!(sql.rows[2][0], SqlValue::Integer(2));
        let dt = sql.rows[0][1].as_text().expect("datetime text");
        assert!(NaiveDateTime::parse_from_str(dt, DATETIME_FORMAT).is_ok());
        Ok(())
    }

    #[test]
    fn decode_with_schema_restores_table() -> Result<(), Box<dyn std::error::Error>> {
        let table = generate_wide_table(&BlockOptions::default().with_rows(40).with_ratio_nans(0.3), 2)?;
        let sql = encode_table(&table);
        let decoded = decode_table("t", &sql, Some(table.schema()))?;
        assert_eq!(decoded, table);
        Ok(())
    }

    #[test]
    fn decode_without_schema_infers_kinds() -> Result<(), Box<dyn std::error::Error>> {
        let table = generate_wide_table(&BlockOptions::default().with_rows(40).with_ratio_nans(0.3), 1)?;
        let decoded = decode_table("t", &encode_table(&table), None)?;
        assert_eq!(decoded.schema(), table.schema());
        assert_eq!(decoded, table);
        Ok(())
    }

    #[test]
    fn inference_falls_back_to_values() -> PersistenceResult<()> {
        let rows = vec![
            vec![
                SqlValue::Integer(0),
                SqlValue::Real(1.0),
                SqlValue::Text("2001-02-03 04:05:06".into()),
                SqlValue::Text("x".into()),
            ],
            vec![
                SqlValue::Integer(1),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Integer(7),
            ],
        ];
        let sql = stored(&[("index", ""), ("a", ""), ("b", ""), ("c", "")], rows);
        let table = decode_table("foreign", &sql, None)?;

        let kinds: Vec<_> = table.schema().columns().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ColumnKind::Int, ColumnKind::Datetime, ColumnKind::Str]);
        let c = table.column_by_name("c").expect("column c").as_string::<i32>();
        assert_eq!(c.value(1), "7");
        Ok(())
    }

    #[test]
    fn widened_integers_decode_back() -> PersistenceResult<()> {
        let schema = TableSchema::new(vec![ColumnSpec::new("int", ColumnKind::Int)])
            .expect("valid schema");
        let sql = stored(
            &[("index", "BIGINT"), ("int", "DOUBLE")],
            vec![
                vec![SqlValue::Integer(0), SqlValue::Real(42.0)],
                vec![SqlValue::Integer(1), SqlValue::Null],
            ],
        );
        let table = decode_table("t", &sql, Some(&schema))?;
        let ints = table.column_by_name("int").expect("int").as_primitive::<Int64Type>();
        assert_eq!(ints.value(0), 42);
        assert!(ints.is_null(1));
        Ok(())
    }

    #[test]
    fn corrupt_index_is_rejected() {
        let sql = stored(
            &[("index", "BIGINT")],
            vec![vec![SqlValue::Integer(0)], vec![SqlValue::Integer(2)]],
        );
        let err = decode_table("t", &sql, None).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::CorruptIndex { position: 1, .. }
        ));

        let no_index = stored(&[("a", "TEXT")], vec![]);
        assert!(matches!(
            decode_table("t", &no_index, None),
            Err(PersistenceError::MissingColumn { .. })
        ));
    }

    #[test]
    fn undecodable_value_names_cell() {
        let schema = TableSchema::new(vec![ColumnSpec::new("f", ColumnKind::Float)])
            .expect("valid schema");
        let sql = stored(
            &[("index", "BIGINT"), ("f", "DOUBLE")],
            vec![vec![SqlValue::Integer(0), SqlValue::Text("abc".into())]],
        );
        let err = decode_table("t", &sql, Some(&schema)).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Decode { row: 0, kind: ColumnKind::Float, .. }
        ));
    }
}
