//! End-to-end save/load tests against the SQLite store.

use std::sync::{Arc, Mutex, Once};

use arrow::array::{Array, AsArray, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use log::{Level, LevelFilter, Log, Metadata, Record};
use rusqlite::Connection;
use synthtable_core::{
    BlockOptions, ColumnKind, PersistenceError, PersistenceService, SqliteStore, StoreConfig,
    StoreError, Table, TableError, content_hash, generate_single_block, generate_wide_table,
    persistence::SCHEMA_TABLE,
    store::{IfExists, RelationalStore, SqlColumn, SqlTable, SqlValue},
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Keeps every warning logged by the process.
struct WarningLog(Mutex<Vec<String>>);

impl Log for WarningLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut lines) = self.0.lock() {
            lines.push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static WARNINGS: WarningLog = WarningLog(Mutex::new(Vec::new()));

fn warnings() -> &'static WarningLog {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if log::set_logger(&WARNINGS).is_ok() {
            log::set_max_level(LevelFilter::Warn);
        }
    });
    &WARNINGS
}

fn warned_about(needle: &str) -> bool {
    warnings()
        .0
        .lock()
        .map(|lines| lines.iter().any(|l| l.contains(needle)))
        .unwrap_or(false)
}

fn service(tmp: &TempDir) -> Result<PersistenceService<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(PersistenceService::new(
        StoreConfig::default(),
        SqliteStore::open(tmp.path())?,
    ))
}

#[test]
fn generate_save_load_scenario() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;

    let options = BlockOptions::default().with_rows(10_000).with_seed(42);
    let table = generate_wide_table(&options, 4)?;
    svc.save(&table, "t0")?;

    let loaded = svc.load("t0")?;
    assert_eq!(loaded.num_rows(), 10_000);
    assert_eq!(loaded.num_columns(), 16);

    for spec in loaded.schema().columns() {
        if spec.kind != ColumnKind::Int {
            continue;
        }
        let ints = loaded
            .column_by_name(&spec.name)
            .expect("int column")
            .as_primitive::<Int64Type>();
        for v in ints.iter().flatten() {
            assert!((1..100).contains(&v), "{} holds {v}", spec.name);
        }
    }
    Ok(())
}

#[test]
fn round_trip_preserves_values_and_nulls() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;

    let table = generate_wide_table(&BlockOptions::default().with_rows(500).with_ratio_nans(0.2), 3)?;
    svc.save(&table, "roundtrip")?;
    let loaded = svc.load("roundtrip")?;

    assert_eq!(loaded.column_names(), table.column_names());
    assert_eq!(loaded.null_count(), table.null_count());
    assert_eq!(loaded, table);
    assert_eq!(content_hash(&loaded), content_hash(&table));
    Ok(())
}

#[test]
fn second_save_under_same_name_conflicts() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;

    let first = generate_single_block(&BlockOptions::default().with_rows(30))?;
    let second = generate_single_block(&BlockOptions::default().with_rows(60).with_seed(7))?;
    svc.save(&first, "t")?;

    let err = svc.save(&second, "t").unwrap_err();
    assert!(matches!(err, PersistenceError::Conflict { .. }), "{err}");

    assert_eq!(svc.load("t")?, first);
    assert_eq!(svc.records_for("t")?.len(), 1);
    Ok(())
}

#[test]
fn loading_unknown_name_leaves_data_store_alone() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    svc.save(
        &generate_single_block(&BlockOptions::default().with_rows(5))?,
        "known",
    )?;

    let err = svc.load("unknown").unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound { .. }));
    assert!(!svc.store().table_exists("data", "unknown")?);
    Ok(())
}

#[test]
fn same_contents_hash_equal_across_names() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let table = generate_wide_table(&BlockOptions::default().with_rows(100), 2)?;

    let a = svc.save(&table, "copy_a")?;
    let b = svc.save(&table, "copy_b")?;
    assert_eq!(a.hash, b.hash);
    assert_ne!(a.table_name, b.table_name);

    let records = svc.records()?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.hierarchy == "data"));
    Ok(())
}

#[test]
fn duplicate_metadata_records_warn_and_load() -> TestResult {
    warnings();
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let table = generate_single_block(&BlockOptions::default().with_rows(10))?;
    let record = svc.save(&table, "dup")?;

    // A second provenance row for the same name, as another writer might leave.
    let mut extra = SqlTable::new(
        ["table_name", "hierarchy", "time_stamp", "hash"]
            .iter()
            .map(|c| SqlColumn::new(*c, "TEXT"))
            .collect(),
    );
    extra.rows.push(vec![
        SqlValue::Text("dup".into()),
        SqlValue::Text("data".into()),
        SqlValue::Text(record.time_stamp.clone()),
        SqlValue::Text(record.hash.clone()),
    ]);
    svc.store()
        .write_table("runs", "meta", &extra, IfExists::Append)?;

    assert_eq!(svc.records_for("dup")?.len(), 2);
    assert!(!warned_about("'dup'"));
    assert_eq!(svc.load("dup")?, table);
    assert!(warned_about("multiple tables with the name 'dup'"));
    Ok(())
}

#[test]
fn names_differing_only_in_case_conflict() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let first = generate_single_block(&BlockOptions::default().with_rows(8))?;
    let second = generate_single_block(&BlockOptions::default().with_rows(8).with_seed(3))?;
    svc.save(&first, "T1")?;

    let err = svc.save(&second, "t1").unwrap_err();
    assert!(matches!(err, PersistenceError::Conflict { .. }), "{err}");
    assert_eq!(svc.load("T1")?, first);
    assert!(svc.records_for("t1")?.is_empty());
    Ok(())
}

#[test]
fn table_names_shared_with_store_indexes() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let table = generate_single_block(&BlockOptions::default().with_rows(4))?;

    // Saved before the table whose index would carry this name.
    svc.save(&table, "ix_u_index")?;
    svc.save(&table, "u")?;
    assert_eq!(svc.load("u")?, table);
    assert_eq!(svc.load("ix_u_index")?, table);

    // Saved after: the name belongs to the index of `t`.
    svc.save(&table, "t")?;
    let err = svc.save(&table, "ix_t_index").unwrap_err();
    match err {
        PersistenceError::Conflict { source, .. } => {
            assert!(matches!(*source, StoreError::NameTaken { .. }), "{source}");
        }
        other => panic!("expected a conflict, got {other}"),
    }
    Ok(())
}

#[test]
fn index_column_is_reserved_in_any_case() {
    let schema = Arc::new(Schema::new(vec![Field::new("Index", DataType::Int64, true)]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))])
        .expect("valid batch");
    assert!(matches!(
        Table::try_new(batch),
        Err(TableError::InvalidSchema { .. })
    ));
}

#[test]
fn foreign_table_without_descriptor_is_inferred() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let table = generate_wide_table(&BlockOptions::default().with_rows(50), 1)?;
    svc.save(&table, "inferred")?;

    // Drop the descriptor so the loader has to infer the column types.
    let conn = Connection::open(svc.store().database_path("data"))?;
    conn.execute(
        &format!("DELETE FROM \"{SCHEMA_TABLE}\" WHERE table_name = ?1"),
        ["inferred"],
    )?;
    drop(conn);

    let loaded = svc.load("inferred")?;
    assert_eq!(loaded.schema(), table.schema());
    assert_eq!(loaded, table);
    Ok(())
}

#[test]
fn empty_table_round_trips() -> TestResult {
    let tmp = TempDir::new()?;
    let svc = service(&tmp)?;
    let table = generate_wide_table(&BlockOptions::default().with_rows(0), 2)?;
    svc.save(&table, "empty")?;

    let loaded = svc.load("empty")?;
    assert_eq!(loaded.num_rows(), 0);
    assert_eq!(loaded.num_columns(), 8);
    assert_eq!(loaded.batch().column(0).len(), 0);
    Ok(())
}
