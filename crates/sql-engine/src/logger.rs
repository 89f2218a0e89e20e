use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::Distribution;
use crate::engine::ConnectionId;

/// Logging sink handed to the engine worker. Every engine event is forwarded
/// to `tracing` under the `sql_engine::engine` target.
#[derive(Clone, Debug)]
pub struct EngineLogger {
    engine: &'static str,
}

impl EngineLogger {
    pub fn new(engine: &'static str) -> Self {
        Self { engine }
    }

    pub(crate) fn instantiated(&self, distribution: &Distribution) {
        info!(
            target: "sql_engine::engine",
            engine = self.engine,
            kind = ?distribution.kind,
            threads = distribution.threads,
            database = ?distribution.database,
            "engine instantiated"
        );
    }

    pub(crate) fn connected(&self, id: ConnectionId, open: usize) {
        debug!(target: "sql_engine::engine", engine = self.engine, %id, open, "connection opened");
    }

    pub(crate) fn statement(
        &self,
        id: ConnectionId,
        sql: &str,
        elapsed: Duration,
        rows: Option<usize>,
    ) {
        debug!(
            target: "sql_engine::engine",
            engine = self.engine,
            %id,
            sql,
            rows,
            elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
            "statement finished"
        );
    }

    pub(crate) fn statement_failed(&self, id: ConnectionId, sql: &str, error: &str) {
        warn!(target: "sql_engine::engine", engine = self.engine, %id, sql, error, "statement failed");
    }

    pub(crate) fn skipped(&self, id: ConnectionId, sql: &str) {
        debug!(target: "sql_engine::engine", engine = self.engine, %id, sql, "statement skipped");
    }

    pub(crate) fn closed(&self, id: ConnectionId, open: usize) {
        debug!(target: "sql_engine::engine", engine = self.engine, %id, open, "connection closed");
    }

    pub(crate) fn registered(&self, name: &str, bytes: usize) {
        info!(target: "sql_engine::engine", engine = self.engine, name, bytes, "file registered");
    }

    pub(crate) fn shutdown(&self, closed_sessions: usize) {
        info!(target: "sql_engine::engine", engine = self.engine, closed_sessions, "engine shut down");
    }
}
