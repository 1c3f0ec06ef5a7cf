//! Relational store configuration.
//!
//! Credentials are carried explicitly in a [`StoreConfig`] instead of being
//! read from the environment at call time. [`StoreConfig::from_env`] is the
//! one place that reads `DB_USER`, `DB_PASSWORD`, `DB_HOST` and `DB_PORT`.
use std::{env, fmt};

use snafu::prelude::*;

/// Default name of the database holding saved tables.
pub const DEFAULT_DATA_DB: &str = "data";
/// Default name of the database holding provenance records.
pub const DEFAULT_RUNS_DB: &str = "runs";
/// Default name of the provenance table inside the runs database.
pub const DEFAULT_RUNS_TABLE: &str = "meta";

/// Errors raised while building a configuration.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A required environment variable is not set (or not valid unicode).
    #[snafu(display("Missing environment variable {var}"))]
    MissingEnv {
        /// Name of the variable.
        var: &'static str,
        /// Underlying lookup error.
        source: env::VarError,
    },

    /// The port is not a valid TCP port number.
    #[snafu(display("Invalid port {value:?}: {source}"))]
    InvalidPort {
        /// Raw value that failed to parse.
        value: String,
        /// Underlying parse error.
        source: std::num::ParseIntError,
    },
}

/// Connection settings for the data and metadata databases.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database holding saved tables.
    pub data_db_name: String,
    /// Database holding provenance records.
    pub runs_db_name: String,
    /// Provenance table inside `runs_db_name`.
    pub runs_table_name: String,
}

impl StoreConfig {
    /// Configuration with the given credentials and the default database names.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            data_db_name: DEFAULT_DATA_DB.to_string(),
            runs_db_name: DEFAULT_RUNS_DB.to_string(),
            runs_table_name: DEFAULT_RUNS_TABLE.to_string(),
        }
    }

    /// Read credentials from `DB_USER`, `DB_PASSWORD`, `DB_HOST` and `DB_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var))
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, env::VarError>,
    {
        let fetch = |var: &'static str| lookup(var).context(MissingEnvSnafu { var });

        let user = fetch("DB_USER")?;
        let password = fetch("DB_PASSWORD")?;
        let host = fetch("DB_HOST")?;
        let raw_port = fetch("DB_PORT")?;
        let port = raw_port
            .trim()
            .parse::<u16>()
            .context(InvalidPortSnafu { value: raw_port.clone() })?;

        Ok(Self::new(host, port, user, password))
    }

    /// Override the database and table names.
    pub fn with_names(
        mut self,
        data_db_name: impl Into<String>,
        runs_db_name: impl Into<String>,
        runs_table_name: impl Into<String>,
    ) -> Self {
        self.data_db_name = data_db_name.into();
        self.runs_db_name = runs_db_name.into();
        self.runs_table_name = runs_table_name.into();
        self
    }

    /// Connection URL for `database` with the password redacted.
    pub fn connection_url(&self, database: &str) -> String {
        format!(
            "mysql://{}:***@{}:{}/{}",
            self.user, self.host, self.port, database
        )
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("localhost", 3306, "root", "")
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("data_db_name", &self.data_db_name)
            .field("runs_db_name", &self.runs_db_name)
            .field("runs_table_name", &self.runs_table_name)
            .finish()
    }
}
