//! In-memory table model.
//!
//! A [`Table`] wraps an Arrow [`RecordBatch`] whose columns all have a
//! supported [`ColumnKind`]. Row identity is positional: row `i` has index
//! `i`. The index is not held as a data column; it is materialized as the
//! `index` column only when a table is written to the relational store.
use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, Int64Array, RecordBatch, RecordBatchOptions},
    datatypes::{Field, Schema},
    error::ArrowError,
};
use snafu::prelude::*;

use crate::schema::{SchemaError, TableSchema};

/// Errors raised while constructing or combining tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The column set does not form a valid schema descriptor.
    #[snafu(display("Invalid table schema: {source}"))]
    InvalidSchema {
        /// Underlying schema error.
        source: SchemaError,
    },

    /// Blocks joined side by side must have the same number of rows.
    #[snafu(display("Cannot join block {block} with {actual} rows onto a table of {expected} rows"))]
    RowCountMismatch {
        /// Position of the offending block.
        block: usize,
        /// Row count of the first block.
        expected: usize,
        /// Row count of the offending block.
        actual: usize,
    },

    /// Joining requires at least one block.
    #[snafu(display("Cannot join an empty list of blocks"))]
    NoBlocks,

    /// Arrow rejected the assembled columns.
    #[snafu(display("Arrow error while assembling table: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for table construction.
pub type TableResult<T> = Result<T, TableError>;

/// Tabular dataset with typed, nullable columns and a positional row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    batch: RecordBatch,
    schema: TableSchema,
}

impl Table {
    /// Wrap a record batch, validating column names and types.
    pub fn try_new(batch: RecordBatch) -> TableResult<Self> {
        let schema = TableSchema::from_arrow(batch.schema_ref()).context(InvalidSchemaSnafu)?;
        Ok(Self { batch, schema })
    }

    /// Build a table from a descriptor and matching Arrow columns.
    ///
    /// `num_rows` is required so tables without columns keep their length.
    pub fn from_columns(
        schema: TableSchema,
        columns: Vec<ArrayRef>,
        num_rows: usize,
    ) -> TableResult<Self> {
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch =
            RecordBatch::try_new_with_options(schema.to_arrow_schema_ref(), columns, &options)
                .context(ArrowSnafu)?;
        Ok(Self { batch, schema })
    }

    /// Join blocks side by side on row position.
    ///
    /// Columns of block `i >= 1` get the suffix `_i`; block 0 keeps its
    /// names. Blocks must all have the same row count.
    pub fn hstack(blocks: &[Table]) -> TableResult<Self> {
        let first = blocks.first().context(NoBlocksSnafu)?;
        let num_rows = first.num_rows();

        let mut fields: Vec<Field> = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for (block_idx, block) in blocks.iter().enumerate() {
            ensure!(
                block.num_rows() == num_rows,
                RowCountMismatchSnafu {
                    block: block_idx,
                    expected: num_rows,
                    actual: block.num_rows(),
                }
            );

            for (field, column) in block.batch.schema().fields().iter().zip(block.batch.columns()) {
                let name = if block_idx == 0 {
                    field.name().clone()
                } else {
                    format!("{}_{block_idx}", field.name())
                };
                fields.push((**field).clone().with_name(name));
                columns.push(Arc::clone(column));
            }
        }

        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch =
            RecordBatch::try_new_with_options(schema, columns, &options).context(ArrowSnafu)?;
        Self::try_new(batch)
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of data columns (the row index is not counted).
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.columns().iter().map(|c| c.name.as_str()).collect()
    }

    /// Column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Schema descriptor of this table.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Underlying Arrow batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table and return the Arrow batch.
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Materialize the positional row index (`0..num_rows`).
    pub fn index(&self) -> Int64Array {
        Int64Array::from_iter_values(0..self.num_rows() as i64)
    }

    /// The first `n` rows (or all rows when `n` exceeds the length).
    pub fn head(&self, n: usize) -> Table {
        Table {
            batch: self.batch.slice(0, n.min(self.num_rows())),
            schema: self.schema.clone(),
        }
    }

    /// Total number of null cells across all columns.
    pub fn null_count(&self) -> usize {
        self.batch.columns().iter().map(|c| c.null_count()).sum()
    }
}
