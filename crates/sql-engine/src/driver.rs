//! Backend traits and the runtime-dependent choice of engine distribution.
//!
//! A [`Driver`] is shared between the async side and the worker thread. The
//! [`Database`] and its [`Session`]s it instantiates live only on the worker
//! thread, so they need not be `Send`.

use std::{
    io,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use geo_core::ColumnarResult;
use serde::Serialize;

use crate::config::{DatabaseLocation, EngineConfig};
use crate::error::BackendError;

/// Body of the engine worker thread.
pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

pub trait Driver: Send + Sync + 'static {
    type Database: Database;

    fn name(&self) -> &'static str;

    /// Pick the engine build matching the host.
    fn select_distribution(
        &self,
        config: &EngineConfig,
        probe: &RuntimeProbe,
    ) -> Result<Distribution, BackendError> {
        Distribution::select(config, probe)
    }

    /// Start the worker thread; it inherits the caller's tracing dispatcher.
    fn spawn_worker(&self, name: String, job: WorkerJob) -> io::Result<JoinHandle<()>> {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        thread::Builder::new()
            .name(name)
            .spawn(move || tracing::dispatcher::with_default(&dispatch, job))
    }

    /// Open the database. Runs on the worker thread.
    fn instantiate(&self, distribution: &Distribution) -> Result<Self::Database, BackendError>;
}

pub trait Database {
    type Session: Session;

    fn connect(&mut self) -> Result<Self::Session, BackendError>;

    /// Make `bytes` addressable from SQL under the bare file `name`.
    fn register_file(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, BackendError>;
}

pub trait Session {
    /// Run a statement whose result is discarded (extension directives, settings).
    fn execute(&mut self, sql: &str) -> Result<(), BackendError>;

    fn query(&mut self, sql: &str) -> Result<ColumnarResult, BackendError>;

    /// Cancellation handle usable from any thread while a statement runs.
    fn interrupt_handle(&self) -> Arc<dyn Interrupt>;

    fn close(self) -> Result<(), BackendError>;
}

/// Cancels whatever statement its session is running; a no-op when idle.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Host capabilities relevant to choosing a distribution.
pub struct RuntimeProbe {
    pub available_parallelism: usize,
}

impl RuntimeProbe {
    pub fn detect() -> Self {
        let available_parallelism = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            available_parallelism,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    /// One execution thread; no secondary pool.
    SingleThreaded,
    /// Worker plus a secondary pool of engine threads.
    Parallel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub kind: DistributionKind,
    pub threads: usize,
    pub database: DatabaseLocation,
    pub memory_limit: Option<String>,
    /// Caller-provided directory for registered files; `None` lets the
    /// database own a temporary one.
    pub scratch_dir: Option<PathBuf>,
}

impl Distribution {
    pub fn select(config: &EngineConfig, probe: &RuntimeProbe) -> Result<Self, BackendError> {
        let available = probe.available_parallelism.max(1);
        let threads = match config.max_threads {
            Some(0) => return Err(BackendError::new("max_threads must be at least 1")),
            Some(cap) => cap.min(available),
            None => available,
        };
        let kind = if threads == 1 {
            DistributionKind::SingleThreaded
        } else {
            DistributionKind::Parallel
        };
        Ok(Self {
            kind,
            threads,
            database: config.database.clone(),
            memory_limit: config.memory_limit.clone(),
            scratch_dir: config.scratch_dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(cores: usize) -> RuntimeProbe {
        RuntimeProbe {
            available_parallelism: cores,
        }
    }

    #[test]
    fn single_core_hosts_get_single_threaded_build() {
        let dist = Distribution::select(&EngineConfig::default(), &probe(1)).unwrap();
        assert_eq!(dist.kind, DistributionKind::SingleThreaded);
        assert_eq!(dist.threads, 1);
    }

    #[test]
    fn thread_cap_never_exceeds_host() {
        let config = EngineConfig {
            max_threads: Some(16),
            ..EngineConfig::default()
        };
        let dist = Distribution::select(&config, &probe(4)).unwrap();
        assert_eq!(dist.kind, DistributionKind::Parallel);
        assert_eq!(dist.threads, 4);

        let config = EngineConfig {
            max_threads: Some(1),
            ..EngineConfig::default()
        };
        let dist = Distribution::select(&config, &probe(8)).unwrap();
        assert_eq!(dist.kind, DistributionKind::SingleThreaded);
    }

    #[test]
    fn zero_thread_cap_is_rejected() {
        let config = EngineConfig {
            max_threads: Some(0),
            ..EngineConfig::default()
        };
        assert!(Distribution::select(&config, &probe(4)).is_err());
    }
}
