//! Spatial SQL explorer: runs user SQL on the embedded engine, turns the
//! `geojson` column into map features, and serves the result over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: Process-wide engine and the `serve`/`query` entry points.
//! - `loader`: Registers local or remote files with the engine.
//! - `session`: Last result snapshot and last error.
//! - `server`: Actix Web endpoints.
//! - `telemetry`: Tracing subscriber and Prometheus recorder.

pub use config::{ExplorerCliArgs, ExplorerConfig, QueryCliArgs, QueryConfig};
pub use pipeline::{run_query, serve};

mod config;
mod loader;
mod pipeline;
mod server;
mod session;
mod telemetry;
