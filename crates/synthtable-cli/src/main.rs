//! CLI tool for generating synthetic tables and saving them with provenance.

mod error;
mod pretty;

use std::{
    io::{self, Write},
    path::PathBuf,
};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::info;
use snafu::ResultExt;
use synthtable_core::{
    BlockOptions, PersistenceService, SqliteStore, StoreConfig, Table, generate_wide_table,
};

use crate::{
    error::{
        CliResult, GenerateSnafu, LoadSnafu, OpenStoreSnafu, RecordsSnafu, RenderSnafu,
        SaveSnafu, SerializeRecordSnafu, StdoutSnafu,
    },
    pretty::format_head,
};

/// Where tables and provenance records are kept.
#[derive(Debug, Args)]
struct StoreArgs {
    /// Directory holding one SQLite file per database
    #[arg(long, env = "SYNTHTABLE_DATA_DIR", default_value = "synthtable-data", global = true)]
    data_dir: PathBuf,

    #[arg(long, env = "DB_HOST", default_value = "localhost", global = true)]
    db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 3306, global = true)]
    db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "root", global = true)]
    db_user: String,

    #[arg(
        long,
        env = "DB_PASSWORD",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    db_password: String,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Rows per block
    #[arg(long, default_value_t = 1000)]
    rows: usize,

    /// Number of side-by-side blocks
    #[arg(long, default_value_t = 1)]
    copies: usize,

    /// Seed of the first block; block i uses seed + i
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Exclusive upper bound of integer values
    #[arg(long, default_value_t = 100)]
    max_int: i64,

    /// Exclusive upper bound of float values
    #[arg(long, default_value_t = 100.0)]
    max_float: f64,

    /// Number of distinct characters, starting at 'A'
    #[arg(long, default_value_t = 26)]
    max_str: u32,

    /// First day of the datetime range, e.g. 2000-01-01
    #[arg(long, default_value = "2000-01-01")]
    date_start: NaiveDate,

    /// Last day of the datetime range (exclusive)
    #[arg(long, default_value = "2020-12-31")]
    date_end: NaiveDate,

    /// Probability that a cell is missing
    #[arg(long, default_value_t = 0.1)]
    ratio_nans: f64,
}

impl GenerateArgs {
    fn options(&self) -> BlockOptions {
        BlockOptions::default()
            .with_rows(self.rows)
            .with_seed(self.seed)
            .with_max_int(self.max_int)
            .with_max_float(self.max_float)
            .with_max_str(self.max_str)
            .with_dates(self.date_start, self.date_end)
            .with_ratio_nans(self.ratio_nans)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate and save two wide tables, then load the first one back (default)
    Demo {
        /// Rows to preview
        #[arg(long, default_value_t = 5)]
        head: usize,
    },

    /// Generate a table and print its first rows
    Generate {
        #[command(flatten)]
        options: GenerateArgs,

        #[arg(long, default_value_t = 5)]
        head: usize,
    },

    /// Generate a table and save it under a new name
    Save {
        #[arg(long)]
        name: String,

        #[command(flatten)]
        options: GenerateArgs,
    },

    /// Load a saved table and print its first rows
    Load {
        #[arg(long)]
        name: String,

        #[arg(long, default_value_t = 5)]
        head: usize,
    },

    /// List provenance records as JSON lines
    Records {
        /// Only records saved under this name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "synthtable", version, about)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

type Service = PersistenceService<SqliteStore>;

fn open_service(args: &StoreArgs) -> CliResult<Service> {
    let config = StoreConfig::new(
        args.db_host.as_str(),
        args.db_port,
        args.db_user.as_str(),
        args.db_password.as_str(),
    );
    let store = SqliteStore::open(args.data_dir.clone()).context(OpenStoreSnafu {
        path: args.data_dir.clone(),
    })?;
    info!(
        "using store {} under {}",
        config.connection_url(&config.data_db_name),
        args.data_dir.display()
    );
    Ok(PersistenceService::new(config, store))
}

fn print_head(label: &str, table: &Table, rows: usize) -> CliResult<()> {
    println!(
        "{label}: {} rows x {} columns",
        table.num_rows(),
        table.num_columns()
    );
    println!("{}", format_head(table, rows).context(RenderSnafu)?);
    Ok(())
}

fn save_generated(svc: &Service, name: &str, options: &BlockOptions, copies: usize) -> CliResult<()> {
    let table = generate_wide_table(options, copies).context(GenerateSnafu)?;
    let record = svc.save(&table, name).context(SaveSnafu { name })?;
    println!(
        "Saved {name}: {} rows x {} columns (hash {})",
        table.num_rows(),
        table.num_columns(),
        record.hash
    );
    Ok(())
}

/// Print a progress label and leave the line open for its outcome.
fn progress(label: &str) -> CliResult<()> {
    print!("{label}... ");
    io::stdout().flush().context(StdoutSnafu)
}

fn cmd_demo(svc: &Service, head: usize) -> CliResult<()> {
    let runs = [("test_table0", 10_000, 4), ("test_table1", 100, 10)];
    let mut tables = Vec::with_capacity(runs.len());
    for (name, rows, copies) in runs {
        let table = generate_wide_table(&BlockOptions::default().with_rows(rows), copies)
            .context(GenerateSnafu)?;
        print_head(name, &table, head)?;
        tables.push((name, table));
    }

    progress("Save data to database")?;
    for (name, table) in &tables {
        let record = svc.save(table, name).context(SaveSnafu { name: *name })?;
        info!("saved {name} with hash {}", record.hash);
    }
    println!("Success!");

    progress("Load data from database")?;
    let loaded = svc.load("test_table0").context(LoadSnafu {
        name: "test_table0",
    })?;
    println!("Success!");
    print_head("test_table0 (loaded)", &loaded, head)
}

fn cmd_generate(options: &GenerateArgs, head: usize) -> CliResult<()> {
    let table = generate_wide_table(&options.options(), options.copies).context(GenerateSnafu)?;
    print_head("generated", &table, head)
}

fn cmd_load(svc: &Service, name: &str, head: usize) -> CliResult<()> {
    let table = svc.load(name).context(LoadSnafu { name })?;
    print_head(name, &table, head)
}

fn cmd_records(svc: &Service, name: Option<&str>) -> CliResult<()> {
    let records = match name {
        Some(name) => svc.records_for(name),
        None => svc.records(),
    }
    .context(RecordsSnafu)?;

    for record in &records {
        println!(
            "{}",
            serde_json::to_string(record).context(SerializeRecordSnafu)?
        );
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd.unwrap_or(Command::Demo { head: 5 }) {
        Command::Demo { head } => cmd_demo(&open_service(&cli.store)?, head),
        Command::Generate { options, head } => cmd_generate(&options, head),
        Command::Save { name, options } => save_generated(
            &open_service(&cli.store)?,
            &name,
            &options.options(),
            options.copies,
        ),
        Command::Load { name, head } => cmd_load(&open_service(&cli.store)?, &name, head),
        Command::Records { name } => cmd_records(&open_service(&cli.store)?, name.as_deref()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("{e}");
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}
