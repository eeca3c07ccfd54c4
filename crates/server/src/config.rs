//! Server configuration.
//!
//! Configuration merges three sources, later ones winning: a TOML file,
//! environment variables with the `SEGMENTD__` prefix, and CLI flags. The
//! result is loaded once at startup and immutable thereafter.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use snafu::Snafu;

use segmentd_types::config::{
    ConfigError, HttpConfig, LoggingConfig, PostgresConfig, SweeperConfig,
};

/// Command-line interface for the `segmentd` binary.
#[derive(Debug, Parser)]
#[command(name = "segmentd", about = "User segmentation service", version)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the HTTP listen address.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Override the sweeper interval in seconds.
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    /// Run against the volatile in-memory store even when a postgres section
    /// is configured. All data is lost on shutdown.
    #[arg(long)]
    pub ephemeral: bool,
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// PostgreSQL connection parameters. Absent section means ephemeral mode.
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
    /// TTL sweeper configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Address to expose Prometheus metrics. If not set, the metrics
    /// endpoint is disabled.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from a file and the environment.
    ///
    /// With no explicit path, `segmentd.toml` in the working directory and
    /// `/etc/segmentd/config.toml` are tried, both optional. Environment
    /// variables use the `SEGMENTD__` prefix with `__` separating nesting
    /// levels (e.g. `SEGMENTD__SWEEPER__INTERVAL_SECS=30`).
    pub fn load(path: Option<&PathBuf>) -> Result<Self, LoadError> {
        let builder = config::Config::builder();

        let builder = if let Some(path) = path {
            builder.add_source(config::File::from(path.as_path()))
        } else {
            builder
                .add_source(config::File::with_name("segmentd").required(false))
                .add_source(config::File::with_name("/etc/segmentd/config").required(false))
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("SEGMENTD").separator("__").try_parsing(true),
        );

        let merged = builder.build().map_err(|e| LoadError::Load { message: e.to_string() })?;

        merged.try_deserialize().map_err(|e| LoadError::Parse { message: e.to_string() })
    }

    /// Apply CLI flag overrides on top of file and environment values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = cli.listen {
            self.http.listen_addr = listen;
        }
        if let Some(interval) = cli.sweep_interval {
            self.sweeper.interval_secs = interval;
        }
        if cli.ephemeral {
            self.postgres = None;
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.sweeper.validate()?;
        if let Some(postgres) = &self.postgres {
            postgres.validate()?;
        }
        Ok(())
    }

    /// Whether the service runs against the volatile in-memory store.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.postgres.is_none()
    }
}

/// Configuration loading error.
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// Failed to read a configuration source.
    #[snafu(display("failed to load config: {message}"))]
    Load {
        /// Underlying loader message.
        message: String,
    },
    /// Merged configuration did not deserialize.
    #[snafu(display("failed to parse config: {message}"))]
    Parse {
        /// Underlying parser message.
        message: String,
    },
}
