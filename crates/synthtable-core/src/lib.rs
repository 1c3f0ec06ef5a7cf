//! Synthetic tabular test data with provenance-tracked persistence.
//!
//! This crate provides the pieces behind the `synthtable` tool:
//!
//! - Seeded generators for tables with `datetime`, `int`, `float` and `str`
//!   columns and a configurable share of missing values (`generate`).
//! - An Arrow-backed [`Table`] with a positional row index and a
//!   serializable schema descriptor (`table`, `schema`).
//! - An order-sensitive BLAKE3 content hash (`hash`).
//! - A minimal [`RelationalStore`] interface with a SQLite backend
//!   (`store`), configured through [`StoreConfig`] (`config`).
//! - [`PersistenceService`], which saves tables to a data database and
//!   records a provenance row per save in a metadata database
//!   (`persistence`).
#![deny(missing_docs)]
pub mod config;
pub mod generate;
pub mod hash;
pub mod persistence;
pub mod schema;
pub mod store;
pub mod table;

pub use config::{ConfigError, StoreConfig};
pub use generate::{
    BlockOptions, GenerateError, generate_block_with_rng, generate_datetime_range,
    generate_single_block, generate_wide_table,
};
pub use hash::content_hash;
pub use persistence::{MetadataRecord, PersistenceError, PersistenceService};
pub use schema::{ColumnKind, ColumnSpec, TableSchema};
pub use store::{RelationalStore, StoreError, sqlite::SqliteStore};
pub use table::{Table, TableError};
