//! Error types and SNAFU context selectors for `persistence`.
//!
//! Store failures are wrapped with the operation that triggered them but
//! otherwise passed through untouched; there is no retry. Duplicate
//! metadata records are not an error and never show up here.

use snafu::prelude::*;

use crate::{
    schema::{ColumnKind, SchemaError},
    store::StoreError,
    table::TableError,
};

/// Errors from `save` / `load` and the metadata helpers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PersistenceError {
    /// No metadata record exists for the requested table.
    #[snafu(display("Table {table_name} not found in the metadata store"))]
    NotFound {
        /// Requested table name.
        table_name: String,
    },

    /// The name is already taken in the data store, by a table or by
    /// another schema object. Names are compared case-insensitively.
    #[snafu(display("Table {table_name} already exists in the data store: {source}"))]
    Conflict {
        /// Requested table name.
        table_name: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// The table name is empty or reserved.
    #[snafu(display("Invalid table name {table_name:?}: {reason}"))]
    InvalidName {
        /// Offending name.
        table_name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// Any other store failure (connectivity, SQL errors, missing tables).
    #[snafu(display("Store error while {operation}: {source}"))]
    Store {
        /// What the service was doing when the store failed.
        operation: String,
        /// Underlying store error.
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    /// The persisted `index` column is missing, has gaps, or is out of order.
    #[snafu(display(
        "Corrupt row index in {table_name} at row {position}: expected {position}, found {found}"
    ))]
    CorruptIndex {
        /// Table being loaded.
        table_name: String,
        /// Row position where the index diverged.
        position: usize,
        /// Value found at that position.
        found: String,
    },

    /// A column named by the schema descriptor is absent from the stored table.
    #[snafu(display("Stored table {table_name} has no column {column}"))]
    MissingColumn {
        /// Table being loaded.
        table_name: String,
        /// Column from the descriptor.
        column: String,
    },

    /// A stored value cannot be represented in its column's kind.
    #[snafu(display(
        "Cannot decode {value} as {kind} in {table_name}.{column} at row {row}"
    ))]
    Decode {
        /// Table being loaded.
        table_name: String,
        /// Column being decoded.
        column: String,
        /// Row position of the value.
        row: usize,
        /// Rendered stored value.
        value: String,
        /// Target kind.
        kind: ColumnKind,
    },

    /// The stored schema descriptor is invalid.
    #[snafu(display("Invalid schema descriptor for {table_name}: {source}"))]
    Schema {
        /// Table the descriptor belongs to.
        table_name: String,
        /// Underlying schema error.
        source: SchemaError,
    },

    /// A metadata row is missing one of the provenance columns.
    #[snafu(display("Metadata table {table} has no column {column}"))]
    MetadataShape {
        /// Metadata table name.
        table: String,
        /// Missing column.
        column: String,
    },

    /// Assembling the decoded columns into a table failed.
    #[snafu(display("Failed to assemble loaded table {table_name}: {source}"))]
    Assemble {
        /// Table being loaded.
        table_name: String,
        /// Underlying table error.
        source: TableError,
    },
}

/// Result alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
