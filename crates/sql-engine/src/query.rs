//! Query execution service.
//!
//! One call owns one connection: open, ensure capability extensions, run the
//! caller's SQL verbatim, close. The close happens on every path.

use std::time::Instant;

use geo_core::ColumnarResult;
use tracing::{Instrument, field, info, info_span, warn};

use crate::config::{ExtensionPolicy, QueryOptions};
use crate::engine::{Connection, EngineHandle};
use crate::error::QueryError;

/// `INSTALL` then `LOAD` for each extension, in order.
pub fn extension_directives(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .flat_map(|name| [format!("INSTALL {name}"), format!("LOAD {name}")])
        .collect()
}

#[derive(Clone, Debug)]
pub struct QueryService {
    options: QueryOptions,
    directives: Vec<String>,
}

impl QueryService {
    pub fn new(options: QueryOptions) -> Self {
        let directives = extension_directives(&options.extensions);
        Self {
            options,
            directives,
        }
    }

    /// Execute `sql` on its own connection.
    ///
    /// Returns `Ok(None)` without touching the engine when there is no engine
    /// or no SQL text. Engine errors come back as [`QueryError::Engine`] with
    /// the engine's message unchanged.
    pub async fn execute(
        &self,
        engine: Option<&EngineHandle>,
        sql: &str,
    ) -> Result<Option<ColumnarResult>, QueryError> {
        let Some(engine) = engine else {
            return Ok(None);
        };
        if sql.trim().is_empty() {
            return Ok(None);
        }

        let span = info_span!("geosql.query", connection = field::Empty, rows = field::Empty);
        let started = Instant::now();
        let result = self.execute_on(engine, sql).instrument(span.clone()).await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(rows) => {
                span.record("rows", rows.row_count());
                info!(
                    parent: &span,
                    rows = rows.row_count(),
                    columns = rows.columns().len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query finished"
                );
                "ok"
            }
            Err(QueryError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::counter!("geosql_queries_total", "outcome" => outcome).increment(1);
        metrics::histogram!("geosql_query_seconds").record(elapsed.as_secs_f64());

        result.map(Some)
    }

    async fn execute_on(
        &self,
        engine: &EngineHandle,
        sql: &str,
    ) -> Result<ColumnarResult, QueryError> {
        let mut opened: Option<Connection> = None;
        let work = self.open_and_run(engine, &mut opened, sql);
        let outcome = match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, work)
                .await
                .unwrap_or(Err(QueryError::Timeout { timeout })),
            None => work.await,
        };

        let Some(connection) = opened else {
            return outcome;
        };

        if outcome.as_ref().is_err_and(QueryError::is_timeout) {
            warn!(
                "Query exceeded {:?}; interrupting it and releasing connection {}",
                self.options.timeout,
                connection.id()
            );
            connection.interrupt();
            connection.close_detached();
            return outcome;
        }

        match (outcome, connection.close().await) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Err(close_err)) => {
                warn!("Failed to close connection after query error: {close_err}");
                Err(err)
            }
        }
    }

    /// Connecting counts against the timeout too; `opened` keeps the
    /// connection reachable if the bound cuts this future short.
    async fn open_and_run(
        &self,
        engine: &EngineHandle,
        opened: &mut Option<Connection>,
        sql: &str,
    ) -> Result<ColumnarResult, QueryError> {
        let connection = opened.insert(engine.connect().await?);
        tracing::Span::current().record("connection", field::display(connection.id()));
        self.run(engine, connection, sql).await
    }

    async fn run(
        &self,
        engine: &EngineHandle,
        connection: &Connection,
        sql: &str,
    ) -> Result<ColumnarResult, QueryError> {
        let cached = self.options.extension_policy == ExtensionPolicy::OncePerEngine
            && engine.capabilities_loaded();
        if !cached {
            for directive in &self.directives {
                connection.execute(directive).await?;
            }
            if self.options.extension_policy == ExtensionPolicy::OncePerEngine {
                engine.mark_capabilities_loaded();
            }
        }

        connection.query(sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_install_before_load_per_extension() {
        let directives = extension_directives(&["httpfs".into(), "spatial".into()]);
        assert_eq!(
            directives,
            ["INSTALL httpfs", "LOAD httpfs", "INSTALL spatial", "LOAD spatial"]
        );
    }

    #[tokio::test]
    async fn missing_engine_or_sql_is_a_no_op() {
        let service = QueryService::new(QueryOptions::default());
        assert_eq!(service.execute(None, "SELECT 1").await, Ok(None));
    }
}
