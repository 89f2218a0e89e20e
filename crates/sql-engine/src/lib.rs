//! Embedded query engine plumbing.
//!
//! The engine runs on a dedicated worker thread that owns the database and
//! every open session. Async callers talk to it through [`EngineHandle`] and
//! per-query [`Connection`]s; [`EngineManager`] guards the single bootstrap and
//! publishes the loading state; [`QueryService`] runs one user query with its
//! extension preconditions and always releases the connection.
//!
//! Module map:
//! - `driver`: traits a database backend implements, plus distribution selection.
//! - `duckdb_driver`: the DuckDB backend.
//! - `worker`: the command loop running on the engine thread.
//! - `engine`: async handle and connection types.
//! - `manager`: init-once lifecycle and state.
//! - `query`: the query execution service.

pub use config::{DatabaseLocation, EngineConfig, ExtensionPolicy, QueryOptions};
pub use driver::{
    Database, Distribution, DistributionKind, Driver, Interrupt, RuntimeProbe, Session, WorkerJob,
};
pub use duckdb_driver::DuckDbDriver;
pub use engine::{Connection, ConnectionId, EngineHandle};
pub use error::{BackendError, BootstrapStage, InitError, QueryError};
pub use logger::EngineLogger;
pub use manager::{EngineManager, EngineState};
pub use query::{QueryService, extension_directives};

mod config;
mod driver;
mod duckdb_driver;
mod engine;
mod error;
mod logger;
mod manager;
mod query;
mod worker;
