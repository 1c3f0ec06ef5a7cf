//! Terminal previews of generated and loaded tables.
//!
//! Arrow's pretty printer renders `f64` values with their full binary
//! representation (`48.27399999999999`). Previews go through a formatter
//! factory that rounds floats to a fixed number of decimals and trims
//! trailing zeros, and show the positional index as the first column.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, Float64Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    util::{
        display::{
            ArrayFormatter, ArrayFormatterFactory, DisplayIndex, FormatOptions, FormatResult,
        },
        pretty::pretty_format_batches_with_options,
    },
};
use synthtable_core::{Table, schema::INDEX_COLUMN};

/// Decimal places shown for float cells.
pub const PREVIEW_FLOAT_DECIMALS: usize = 4;

/// Rendering of missing values.
const NULL_DISPLAY: &str = "NaN";

#[derive(Debug)]
struct CompactFloatFormatterFactory {
    max_decimals: usize,
}

#[derive(Debug)]
struct CompactFloat64Formatter<'a> {
    array: &'a Float64Array,
    null: &'a str,
    max_decimals: usize,
}

impl DisplayIndex for CompactFloat64Formatter<'_> {
    fn write(&self, idx: usize, f: &mut dyn std::fmt::Write) -> FormatResult {
        if self.array.is_null(idx) {
            write!(f, "{}", self.null)?;
            return Ok(());
        }
        write!(f, "{}", format_compact_float(self.array.value(idx), self.max_decimals))?;
        Ok(())
    }
}

impl ArrayFormatterFactory for CompactFloatFormatterFactory {
    fn create_array_formatter<'formatter>(
        &self,
        array: &'formatter dyn Array,
        options: &FormatOptions<'formatter>,
        _field: Option<&'formatter Field>,
    ) -> Result<Option<ArrayFormatter<'formatter>>, ArrowError> {
        if array.data_type() != &DataType::Float64 {
            return Ok(None);
        }
        let array = array
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| ArrowError::CastError("expected Float64Array for Float64".to_string()))?;

        let display_index = Box::new(CompactFloat64Formatter {
            array,
            null: options.null(),
            max_decimals: self.max_decimals,
        });
        Ok(Some(ArrayFormatter::new(display_index, options.safe())))
    }
}

fn format_compact_float(value: f64, max_decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let mut s = format!("{value:.prec$}", prec = max_decimals.min(15));
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Attach the positional index as a leading column.
fn with_index(table: &Table) -> Result<RecordBatch, ArrowError> {
    let batch = table.batch();
    let mut fields = vec![Arc::new(Field::new(INDEX_COLUMN, DataType::Int64, false))];
    fields.extend(batch.schema().fields().iter().cloned());

    let mut columns: Vec<ArrayRef> = vec![Arc::new(table.index())];
    columns.extend(batch.columns().iter().cloned());

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Render the first `rows` rows of `table`.
pub fn format_head(table: &Table, rows: usize) -> Result<String, ArrowError> {
    let batch = with_index(&table.head(rows))?;
    let factory = CompactFloatFormatterFactory {
        max_decimals: PREVIEW_FLOAT_DECIMALS,
    };
    let options = FormatOptions::default()
        .with_null(NULL_DISPLAY)
        .with_formatter_factory(Some(&factory));
    Ok(pretty_format_batches_with_options(&[batch], &options)?.to_string())
}
