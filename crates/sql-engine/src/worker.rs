//! Command loop running on the engine worker thread.
//!
//! Commands are processed strictly in arrival order, so a `Close` enqueued
//! behind a running statement takes effect once that statement finishes.
//! Statements whose caller has already given up are skipped.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use crossbeam_channel::Receiver;
use geo_core::ColumnarResult;
use tokio::sync::oneshot;
use tracing::warn;

use crate::driver::{Database, Distribution, Driver, Interrupt, Session};
use crate::engine::ConnectionId;
use crate::error::BackendError;
use crate::logger::EngineLogger;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, BackendError>>;

pub(crate) enum Command {
    Instantiate {
        distribution: Distribution,
        logger: EngineLogger,
        reply: Reply<()>,
    },
    Connect {
        reply: Reply<(ConnectionId, Arc<dyn Interrupt>)>,
    },
    Execute {
        id: ConnectionId,
        sql: String,
        reply: Reply<()>,
    },
    Query {
        id: ConnectionId,
        sql: String,
        reply: Reply<ColumnarResult>,
    },
    /// `reply` is `None` for detached closes issued from drop or timeout paths.
    Close {
        id: ConnectionId,
        reply: Option<Reply<()>>,
    },
    RegisterFile {
        name: String,
        bytes: Vec<u8>,
        reply: Reply<PathBuf>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

struct WorkerState<B: Database> {
    database: Option<B>,
    sessions: HashMap<ConnectionId, B::Session>,
    next_id: u64,
    logger: EngineLogger,
    open: Arc<AtomicUsize>,
}

impl<B: Database> WorkerState<B> {
    fn database(&mut self) -> Result<&mut B, BackendError> {
        self.database
            .as_mut()
            .ok_or_else(|| BackendError::new("engine is not instantiated"))
    }

    fn session(&mut self, id: ConnectionId) -> Result<&mut B::Session, BackendError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| BackendError::new(format!("connection {id} is not open")))
    }

    fn publish_open(&self) -> usize {
        let open = self.sessions.len();
        self.open.store(open, Ordering::SeqCst);
        metrics::gauge!("geosql_connections_open").set(open as f64);
        open
    }

    fn connect(&mut self) -> Result<(ConnectionId, Arc<dyn Interrupt>), BackendError> {
        let session = self.database()?.connect()?;
        let interrupt = session.interrupt_handle();
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, session);
        let open = self.publish_open();
        self.logger.connected(id, open);
        Ok((id, interrupt))
    }

    fn execute(&mut self, id: ConnectionId, sql: &str) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.session(id)?.execute(sql);
        match &result {
            Ok(()) => self.logger.statement(id, sql, started.elapsed(), None),
            Err(err) => self.logger.statement_failed(id, sql, err.message()),
        }
        result
    }

    fn query(&mut self, id: ConnectionId, sql: &str) -> Result<ColumnarResult, BackendError> {
        let started = Instant::now();
        let result = self.session(id)?.query(sql);
        match &result {
            Ok(rows) => self
                .logger
                .statement(id, sql, started.elapsed(), Some(rows.row_count())),
            Err(err) => self.logger.statement_failed(id, sql, err.message()),
        }
        result
    }

    fn close(&mut self, id: ConnectionId) -> Result<(), BackendError> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or_else(|| BackendError::new(format!("connection {id} is not open")))?;
        let result = session.close();
        let open = self.publish_open();
        self.logger.closed(id, open);
        result
    }

    fn close_all(&mut self) -> usize {
        let ids: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        for id in &ids {
            if let Err(err) = self.close(*id) {
                warn!("Failed to close connection {id} during shutdown: {err}");
            }
        }
        ids.len()
    }
}

/// Serve commands until shutdown or until every sender is gone.
pub(crate) fn run<D: Driver>(driver: Arc<D>, inbox: Receiver<Command>, open: Arc<AtomicUsize>) {
    let mut state = WorkerState::<D::Database> {
        database: None,
        sessions: HashMap::new(),
        next_id: 1,
        logger: EngineLogger::new(driver.name()),
        open,
    };

    while let Ok(command) = inbox.recv() {
        match command {
            Command::Instantiate {
                distribution,
                logger,
                reply,
            } => {
                state.logger = logger;
                let result = driver.instantiate(&distribution).map(|database| {
                    state.database = Some(database);
                    state.logger.instantiated(&distribution);
                });
                let _ = reply.send(result);
            }
            Command::Connect { reply } => {
                // The caller timed out while this was queued; nobody will close it.
                if let Err(Ok((id, _))) = reply.send(state.connect()) {
                    if let Err(err) = state.close(id) {
                        warn!("Failed to close unclaimed connection {id}: {err}");
                    }
                }
            }
            Command::Execute { id, sql, reply } => {
                if reply.is_closed() {
                    state.logger.skipped(id, &sql);
                    continue;
                }
                let _ = reply.send(state.execute(id, &sql));
            }
            Command::Query { id, sql, reply } => {
                if reply.is_closed() {
                    state.logger.skipped(id, &sql);
                    continue;
                }
                let _ = reply.send(state.query(id, &sql));
            }
            Command::Close { id, reply } => {
                let result = state.close(id);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            warn!("Detached close of connection {id} failed: {err}");
                        }
                    }
                }
            }
            Command::RegisterFile { name, bytes, reply } => {
                let result = state
                    .database()
                    .and_then(|database| database.register_file(&name, &bytes));
                if result.is_ok() {
                    state.logger.registered(&name, bytes.len());
                }
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let closed = state.close_all();
                state.database = None;
                state.logger.shutdown(closed);
                let _ = reply.send(Ok(()));
                return;
            }
        }
    }

    state.close_all();
}
