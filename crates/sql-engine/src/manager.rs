//! Init-once engine lifecycle.
//!
//! An [`EngineManager`] attempts exactly one bootstrap for its lifetime, no
//! matter how many callers race on [`EngineManager::initialize`]. Loading state
//! is published on a watch channel so UIs can show progress and failures.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use geo_core::ColumnarResult;
use serde::Serialize;
use tokio::sync::{OnceCell, watch};
use tracing::{Instrument, error, info, info_span};

use crate::config::EngineConfig;
use crate::driver::{Driver, RuntimeProbe};
use crate::engine::EngineHandle;
use crate::error::{BootstrapStage, InitError, QueryError};
use crate::logger::EngineLogger;
use crate::query::QueryService;
use crate::worker;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    /// Bootstrap failed; carries the error text.
    Failed(String),
    /// Torn down by [`EngineManager::shutdown`].
    ShutDown,
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }
}

pub struct EngineManager<D: Driver> {
    driver: Arc<D>,
    config: EngineConfig,
    queries: QueryService,
    engine: OnceCell<Result<EngineHandle, InitError>>,
    state: watch::Sender<EngineState>,
    bootstraps: AtomicUsize,
}

impl<D: Driver> EngineManager<D> {
    pub fn new(driver: D, config: EngineConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        let queries = QueryService::new(config.query.clone());
        Self {
            driver: Arc::new(driver),
            config,
            queries,
            engine: OnceCell::new(),
            state,
            bootstraps: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Bootstrap sequences started so far; never exceeds one.
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    /// The engine, once it is ready and not shut down.
    pub fn handle(&self) -> Option<EngineHandle> {
        if !self.state().is_ready() {
            return None;
        }
        self.engine.get().and_then(|result| result.as_ref().ok().cloned())
    }

    /// Bootstrap the engine, or wait for and return the outcome of the one
    /// bootstrap already attempted. Failures are final.
    pub async fn initialize(&self) -> Result<EngineHandle, InitError> {
        self.engine
            .get_or_init(|| self.bootstrap())
            .await
            .clone()
    }

    async fn bootstrap(&self) -> Result<EngineHandle, InitError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(EngineState::Initializing);

        let span = info_span!("geosql.engine.bootstrap", driver = self.driver.name());
        let result = self.bootstrap_steps().instrument(span).await;

        match &result {
            Ok(engine) => {
                info!(
                    kind = ?engine.distribution().kind,
                    threads = engine.distribution().threads,
                    "Query engine ready"
                );
                self.state.send_replace(EngineState::Ready);
            }
            Err(err) => {
                error!("Query engine failed to start: {err}");
                self.state.send_replace(EngineState::Failed(err.to_string()));
            }
        }
        result
    }

    async fn bootstrap_steps(&self) -> Result<EngineHandle, InitError> {
        let probe = RuntimeProbe::detect();
        let distribution = self
            .driver
            .select_distribution(&self.config, &probe)
            .map_err(|err| InitError::new(BootstrapStage::SelectDistribution, err.message()))?;

        let (commands, inbox) = crossbeam_channel::unbounded();
        let open = Arc::new(AtomicUsize::new(0));
        let job = {
            let driver = self.driver.clone();
            let open = open.clone();
            Box::new(move || worker::run(driver, inbox, open))
        };
        let worker = self
            .driver
            .spawn_worker(format!("{}-engine", self.driver.name()), job)
            .map_err(|err| InitError::new(BootstrapStage::SpawnWorker, err.to_string()))?;

        let logger = EngineLogger::new(self.driver.name());
        let engine = EngineHandle::new(commands, worker, distribution.clone(), open);

        engine
            .instantiate(distribution, logger)
            .await
            .map_err(|err| InitError::new(BootstrapStage::Instantiate, err.to_string()))?;
        Ok(engine)
    }

    /// Run `sql` against the managed engine.
    ///
    /// A failed or shut-down engine rejects the call without opening a
    /// connection. Before the engine is ready the call is a no-op.
    pub async fn execute(&self, sql: &str) -> Result<Option<ColumnarResult>, QueryError> {
        match self.state() {
            EngineState::Failed(message) => Err(QueryError::EngineUnavailable(message)),
            EngineState::ShutDown => Err(QueryError::EngineUnavailable("engine shut down".into())),
            EngineState::Uninitialized | EngineState::Initializing => Ok(None),
            EngineState::Ready => self.queries.execute(self.handle().as_ref(), sql).await,
        }
    }

    /// Register a file with the ready engine.
    pub async fn register_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<std::path::PathBuf, QueryError> {
        match self.handle() {
            Some(engine) => engine.register_file(name, bytes).await,
            None => Err(QueryError::EngineUnavailable(format!(
                "cannot register {name:?} before the engine is ready"
            ))),
        }
    }

    /// Tear the engine down. Later calls to [`EngineManager::execute`] are rejected.
    pub async fn shutdown(&self) {
        let Some(engine) = self.handle() else {
            return;
        };
        self.state.send_replace(EngineState::ShutDown);
        if let Err(err) = engine.shutdown().await {
            error!("Query engine shutdown failed: {err}");
        }
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }
}
