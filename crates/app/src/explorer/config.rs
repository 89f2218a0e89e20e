//! Translation of CLI arguments into validated engine, server and query
//! settings, so downstream code never re-parses flags.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow, bail};
use clap::{Args, ValueEnum};
use map_layers::TileLayer;
use sql_engine::{DatabaseLocation, EngineConfig, ExtensionPolicy, QueryOptions};

use crate::explorer::loader::Registration;

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing bootstrap and query spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// Engine flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct EngineCliArgs {
    /// Database file to open; in-memory when omitted.
    #[arg(long = "database", value_name = "PATH")]
    pub database: Option<PathBuf>,
    /// Upper bound on engine threads.
    #[arg(long = "threads", value_name = "N")]
    pub threads: Option<usize>,
    /// Engine memory limit, e.g. `2GB`.
    #[arg(long = "memory-limit", value_name = "SIZE")]
    pub memory_limit: Option<String>,
    /// Extension installed and loaded before each query (repeatable).
    /// Defaults to `httpfs` and `spatial`.
    #[arg(long = "extension", value_name = "NAME", conflicts_with = "offline")]
    pub extensions: Vec<String>,
    /// Skip extension directives entirely.
    #[arg(long = "offline", action = clap::ArgAction::SetTrue)]
    pub offline: bool,
    /// Load extensions once per engine instead of on every connection.
    #[arg(long = "extension-cache", action = clap::ArgAction::SetTrue)]
    pub extension_cache: bool,
    /// Per-query time limit in seconds; 0 disables it.
    #[arg(long = "query-timeout-secs", value_name = "SECS")]
    pub query_timeout_secs: Option<u64>,
    /// Directory receiving registered files; a temp dir removed at shutdown when unset.
    #[arg(long = "scratch-dir", value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,
    /// Register a file under NAME before serving; SOURCE is a path or an http(s) URL.
    #[arg(long = "register", value_name = "NAME=SOURCE")]
    pub register: Vec<String>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

#[derive(Clone, Debug)]
/// Engine settings plus the files to register once it is ready.
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub registrations: Vec<Registration>,
    pub telemetry: TelemetryOptions,
}

impl TryFrom<EngineCliArgs> for EngineSettings {
    type Error = anyhow::Error;

    fn try_from(args: EngineCliArgs) -> Result<Self> {
        if args.threads == Some(0) {
            bail!("--threads must be at least 1");
        }
        if args.memory_limit.as_deref().is_some_and(|limit| limit.trim().is_empty()) {
            bail!("--memory-limit must not be empty");
        }

        let defaults = QueryOptions::default();
        let extensions = if args.offline {
            Vec::new()
        } else if args.extensions.is_empty() {
            defaults.extensions
        } else {
            args.extensions
        };
        let query = QueryOptions {
            extensions,
            extension_policy: if args.extension_cache {
                ExtensionPolicy::OncePerEngine
            } else {
                ExtensionPolicy::EveryConnection
            },
            timeout: match args.query_timeout_secs {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.timeout,
            },
        };
        if let Some(name) = query.invalid_extension() {
            bail!("--extension {name:?} is not a valid extension name");
        }

        let registrations = args
            .register
            .iter()
            .map(|arg| arg.parse::<Registration>())
            .collect::<Result<Vec<_>>>()?;
        if let Some(dup) = registrations
            .iter()
            .enumerate()
            .find(|(i, r)| registrations[..*i].iter().any(|prev| prev.name == r.name))
            .map(|(_, r)| r.name.clone())
        {
            bail!("--register uses the name {dup:?} more than once");
        }

        let engine = EngineConfig {
            database: args
                .database
                .map(DatabaseLocation::File)
                .unwrap_or(DatabaseLocation::InMemory),
            max_threads: args.threads,
            memory_limit: args.memory_limit,
            scratch_dir: args.scratch_dir,
            query,
        };

        Ok(Self {
            engine,
            registrations,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ExplorerCliArgs {
    #[command(flatten)]
    pub engine: EngineCliArgs,
    /// Address the HTTP server binds to.
    #[arg(long = "bind", value_name = "ADDR", default_value = "127.0.0.1")]
    pub bind: String,
    /// Port the HTTP server listens on.
    #[arg(long = "port", value_name = "PORT", default_value_t = 8080)]
    pub port: u16,
    /// Raster tile URL template with `{z}`, `{x}` and `{y}` placeholders.
    #[arg(long = "tile-url", value_name = "TEMPLATE")]
    pub tile_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ExplorerConfig {
    pub bind: String,
    pub port: u16,
    pub tiles: TileLayer,
    pub settings: EngineSettings,
}

impl TryFrom<ExplorerCliArgs> for ExplorerConfig {
    type Error = anyhow::Error;

    fn try_from(args: ExplorerCliArgs) -> Result<Self> {
        if args.port == 0 {
            bail!("--port must be between 1 and 65535");
        }
        if args.bind.trim().is_empty() {
            bail!("--bind must not be empty");
        }
        let tiles = match args.tile_url {
            Some(template) => {
                TileLayer::with_template(template).map_err(|err| anyhow!("--tile-url: {err}"))?
            }
            None => TileLayer::default(),
        };

        Ok(Self {
            bind: args.bind,
            port: args.port,
            tiles,
            settings: EngineSettings::try_from(args.engine)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
/// What the `query` subcommand prints.
pub enum OutputFormat {
    /// Padded text table of every column.
    #[default]
    Table,
    /// GeoJSON feature collection built from the `geojson` column.
    Geojson,
    /// Render layers as handed to the map front-end.
    Layers,
}

/// CLI arguments accepted by the `query` subcommand.
#[derive(Debug, Args)]
pub struct QueryCliArgs {
    #[command(flatten)]
    pub engine: EngineCliArgs,
    /// SQL to run, in the engine's dialect.
    #[arg(long = "sql", value_name = "SQL")]
    pub sql: String,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Clone, Debug)]
pub struct QueryConfig {
    pub sql: String,
    pub format: OutputFormat,
    pub settings: EngineSettings,
}

impl TryFrom<QueryCliArgs> for QueryConfig {
    type Error = anyhow::Error;

    fn try_from(args: QueryCliArgs) -> Result<Self> {
        if args.sql.trim().is_empty() {
            bail!("--sql must not be blank");
        }
        Ok(Self {
            sql: args.sql,
            format: args.format,
            settings: EngineSettings::try_from(args.engine)?,
        })
    }
}
