//! Synthetic test-data generation.
//!
//! Every generator here is a pure function of its options. Randomness comes
//! from an owned [`StdRng`] seeded from [`BlockOptions::seed`], so the same
//! options always produce bit-identical tables and no process-wide state is
//! touched.
//!
//! A *block* is the unit of generation: four columns (`datetime`, `int`,
//! `float`, `str`) with independently injected missing values. Wide tables
//! are built by joining several blocks side by side.
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampSecondArray};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{Rng, SeedableRng, rngs::StdRng};
use snafu::prelude::*;

use crate::{
    schema::{ColumnKind, ColumnSpec, SchemaError, TableSchema},
    table::{InvalidSchemaSnafu, Table, TableError},
};

/// Largest allowed `max_str`: keeps generated characters within `A..=~`.
pub const MAX_STR_LIMIT: u32 = 62;

/// Errors raised when generation options are out of range.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GenerateError {
    /// `date_start` must be strictly before `date_end`.
    #[snafu(display("Invalid date range: start={start}, end={end} (expect start < end)"))]
    InvalidDateRange {
        /// Lower bound supplied by the caller.
        start: NaiveDate,
        /// Upper bound supplied by the caller.
        end: NaiveDate,
    },

    /// Integers are drawn from `[1, max_int)`, which must be non-empty.
    #[snafu(display("max_int must be at least 2, got {max_int}"))]
    InvalidMaxInt {
        /// Value supplied by the caller.
        max_int: i64,
    },

    /// Floats are drawn from `[0, max_float)`, which must be non-empty.
    #[snafu(display("max_float must be finite and positive, got {max_float}"))]
    InvalidMaxFloat {
        /// Value supplied by the caller.
        max_float: f64,
    },

    /// Character offsets are drawn from `[0, max_str)`.
    #[snafu(display("max_str must be in 1..={MAX_STR_LIMIT}, got {max_str}"))]
    InvalidMaxStr {
        /// Value supplied by the caller.
        max_str: u32,
    },

    /// Missing-value ratio must be a probability.
    #[snafu(display("ratio_nans must be within [0, 1], got {ratio_nans}"))]
    InvalidRatio {
        /// Value supplied by the caller.
        ratio_nans: f64,
    },

    /// A wide table needs at least one block.
    #[snafu(display("n_copies must be at least 1"))]
    NoCopies,

    /// A sampled epoch second could not be converted back to a timestamp.
    #[snafu(display("Sampled timestamp {secs} is out of range"))]
    TimestampOutOfRange {
        /// Offending epoch second.
        secs: i64,
    },

    /// Assembling the generated columns into a table failed.
    #[snafu(display("Failed to assemble generated table: {source}"))]
    Assemble {
        /// Underlying table error.
        source: TableError,
    },
}

/// Result alias for generation.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Parameters of a generated block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOptions {
    /// Number of rows.
    pub n: usize,
    /// Seed of the block's random generator.
    pub seed: u64,
    /// Exclusive upper bound of generated integers (lower bound is 1).
    pub max_int: i64,
    /// Exclusive upper bound of generated floats (lower bound is 0).
    pub max_float: f64,
    /// Number of distinct characters, starting at `A`.
    pub max_str: u32,
    /// First day of the sampled datetime range (inclusive).
    pub date_start: NaiveDate,
    /// Last day of the sampled datetime range (exclusive, at midnight).
    pub date_end: NaiveDate,
    /// Probability that any single cell is replaced by a missing value.
    pub ratio_nans: f64,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            n: 1000,
            seed: 42,
            max_int: 100,
            max_float: 100.0,
            max_str: 26,
            date_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            date_end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or(NaiveDate::MAX),
            ratio_nans: 0.1,
        }
    }
}

impl BlockOptions {
    /// Set the row count.
    pub fn with_rows(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the exclusive integer bound.
    pub fn with_max_int(mut self, max_int: i64) -> Self {
        self.max_int = max_int;
        self
    }

    /// Set the exclusive float bound.
    pub fn with_max_float(mut self, max_float: f64) -> Self {
        self.max_float = max_float;
        self
    }

    /// Set the number of distinct characters.
    pub fn with_max_str(mut self, max_str: u32) -> Self {
        self.max_str = max_str;
        self
    }

    /// Set the sampled date range.
    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_start = start;
        self.date_end = end;
        self
    }

    /// Set the missing-value ratio.
    pub fn with_ratio_nans(mut self, ratio_nans: f64) -> Self {
        self.ratio_nans = ratio_nans;
        self
    }

    /// Check that every option describes a non-empty sampling range.
    pub fn validate(&self) -> GenerateResult<()> {
        ensure!(
            self.date_start < self.date_end,
            InvalidDateRangeSnafu {
                start: self.date_start,
                end: self.date_end,
            }
        );
        ensure!(
            self.max_int >= 2,
            InvalidMaxIntSnafu {
                max_int: self.max_int
            }
        );
        ensure!(
            self.max_float.is_finite() && self.max_float > 0.0,
            InvalidMaxFloatSnafu {
                max_float: self.max_float
            }
        );
        ensure!(
            (1..=MAX_STR_LIMIT).contains(&self.max_str),
            InvalidMaxStrSnafu {
                max_str: self.max_str
            }
        );
        ensure!(
            (0.0..=1.0).contains(&self.ratio_nans),
            InvalidRatioSnafu {
                ratio_nans: self.ratio_nans
            }
        );
        Ok(())
    }
}

/// Column names of a single block, in order.
pub const BLOCK_COLUMNS: [(&str, ColumnKind); 4] = [
    ("datetime", ColumnKind::Datetime),
    ("int", ColumnKind::Int),
    ("float", ColumnKind::Float),
    ("str", ColumnKind::Str),
];

fn midnight_epoch_secs(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Sample `count` timestamps uniformly from `[start_date, end_date)`.
///
/// Both bounds are taken at midnight and converted to Unix epoch seconds;
/// each timestamp is an independent uniform integer draw from that range.
/// The result is not sorted.
pub fn generate_datetime_range<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> GenerateResult<Vec<NaiveDateTime>> {
    ensure!(
        start_date < end_date,
        InvalidDateRangeSnafu {
            start: start_date,
            end: end_date,
        }
    );

    let start = midnight_epoch_secs(start_date);
    let end = midnight_epoch_secs(end_date);

    (0..count)
        .map(|_| {
            let secs = rng.gen_range(start..end);
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .context(TimestampOutOfRangeSnafu { secs })
        })
        .collect()
}

/// Generate one seeded block.
///
/// Repeated calls with identical options return identical tables.
pub fn generate_single_block(options: &BlockOptions) -> GenerateResult<Table> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    generate_block_with_rng(&mut rng, options)
}

/// Generate one block from a caller-owned random generator.
///
/// `options.seed` is ignored; the caller controls the generator state.
/// Values are drawn column by column (datetimes, ints, floats, strs), then
/// the missing-value mask is drawn row-major with one uniform draw per cell.
pub fn generate_block_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    options: &BlockOptions,
) -> GenerateResult<Table> {
    options.validate()?;
    let n = options.n;

    let datetimes = generate_datetime_range(rng, n, options.date_start, options.date_end)?;
    let ints: Vec<i64> = (0..n).map(|_| rng.gen_range(1..options.max_int)).collect();
    let floats: Vec<f64> = (0..n)
        .map(|_| rng.gen_range(0.0..options.max_float))
        .collect();
    let strs: Vec<String> = (0..n)
        .map(|_| {
            let offset = rng.gen_range(0..options.max_str);
            // 65 + offset stays within ASCII for offsets below MAX_STR_LIMIT.
            char::from(b'A' + offset as u8).to_string()
        })
        .collect();

    let width = BLOCK_COLUMNS.len();
    let mask: Vec<bool> = (0..n * width)
        .map(|_| rng.gen_range(0.0..1.0) < options.ratio_nans)
        .collect();
    let keep = |row: usize, col: usize| !mask[row * width + col];

    let datetime_col: TimestampSecondArray = datetimes
        .iter()
        .enumerate()
        .map(|(row, dt)| keep(row, 0).then(|| dt.and_utc().timestamp()))
        .collect();
    let int_col: Int64Array = ints
        .iter()
        .enumerate()
        .map(|(row, v)| keep(row, 1).then_some(*v))
        .collect();
    let float_col: Float64Array = floats
        .iter()
        .enumerate()
        .map(|(row, v)| keep(row, 2).then_some(*v))
        .collect();
    let str_col: StringArray = strs
        .iter()
        .enumerate()
        .map(|(row, v)| keep(row, 3).then_some(v.as_str()))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(datetime_col),
        Arc::new(int_col),
        Arc::new(float_col),
        Arc::new(str_col),
    ];

    let schema = block_schema()
        .context(InvalidSchemaSnafu)
        .context(AssembleSnafu)?;
    Table::from_columns(schema, columns, n).context(AssembleSnafu)
}

/// Generate `n_copies` blocks with consecutive seeds and join them side by side.
///
/// Block `i` is generated with seed `options.seed + i`; its columns get the
/// suffix `_i` for `i >= 1`. The result has `options.n` rows and
/// `4 * n_copies` columns.
pub fn generate_wide_table(options: &BlockOptions, n_copies: usize) -> GenerateResult<Table> {
    ensure!(n_copies >= 1, NoCopiesSnafu);

    let blocks = (0..n_copies)
        .map(|copy| {
            let block_options = options.clone().with_seed(options.seed.wrapping_add(copy as u64));
            generate_single_block(&block_options)
        })
        .collect::<GenerateResult<Vec<_>>>()?;

    Table::hstack(&blocks).context(AssembleSnafu)
}

fn block_schema() -> Result<TableSchema, SchemaError> {
    let columns = BLOCK_COLUMNS
        .iter()
        .map(|(name, kind)| ColumnSpec::new(*name, *kind))
        .collect();
    TableSchema::new(columns)
}
