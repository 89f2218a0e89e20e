use std::{fmt, time::Duration};

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
/// Error text reported by a database backend, kept verbatim.
pub struct BackendError(String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<duckdb::Error> for BackendError {
    fn from(err: duckdb::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Ordered steps of the engine bootstrap.
pub enum BootstrapStage {
    SelectDistribution,
    SpawnWorker,
    Instantiate,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootstrapStage::SelectDistribution => "selecting engine distribution",
            BootstrapStage::SpawnWorker => "spawning engine worker",
            BootstrapStage::Instantiate => "instantiating engine",
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("engine bootstrap failed while {stage}: {message}")]
pub struct InitError {
    pub stage: BootstrapStage,
    /// Underlying failure text, unmodified.
    pub message: String,
}

impl InitError {
    pub fn new(stage: BootstrapStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The engine rejected a statement. Display is the engine text unchanged.
    #[error("{0}")]
    Engine(String),
    #[error("query engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("query timed out after {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },
    #[error("query engine worker has stopped")]
    WorkerStopped,
}

impl QueryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }
}

impl From<BackendError> for QueryError {
    fn from(err: BackendError) -> Self {
        QueryError::Engine(err.0)
    }
}
