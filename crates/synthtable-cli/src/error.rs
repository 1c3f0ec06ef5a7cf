use std::path::PathBuf;

use arrow::error::ArrowError;
use snafu::Snafu;
use synthtable_core::{GenerateError, PersistenceError, StoreError};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display(
        "Failed to open the store under {}. Ensure the directory is writable.",
        path.display()
    ))]
    OpenStore {
        path: PathBuf,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Invalid generation options"))]
    Generate { source: GenerateError },

    #[snafu(display("Failed to save table '{name}'"))]
    Save {
        name: String,
        #[snafu(source(from(PersistenceError, Box::new)))]
        source: Box<PersistenceError>,
    },

    #[snafu(display("Failed to load table '{name}'"))]
    Load {
        name: String,
        #[snafu(source(from(PersistenceError, Box::new)))]
        source: Box<PersistenceError>,
    },

    #[snafu(display("Failed to read provenance records"))]
    Records {
        #[snafu(source(from(PersistenceError, Box::new)))]
        source: Box<PersistenceError>,
    },

    #[snafu(display("Failed to render table preview"))]
    Render { source: ArrowError },

    #[snafu(display("Failed to write to stdout"))]
    Stdout { source: std::io::Error },

    #[snafu(display("Failed to serialize provenance record"))]
    SerializeRecord { source: serde_json::Error },
}
