//! Async side of the engine: a cloneable handle bound to the worker thread and
//! the per-query connection it hands out.

use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::Sender;
use geo_core::ColumnarResult;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::driver::{Distribution, Interrupt};
use crate::error::QueryError;
use crate::logger::EngineLogger;
use crate::worker::{Command, Reply};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct EngineInner {
    commands: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    distribution: Distribution,
    open_connections: Arc<AtomicUsize>,
    capabilities_loaded: AtomicBool,
}

#[derive(Clone)]
/// Handle to a running engine. Clones share the same worker.
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("distribution", &self.inner.distribution)
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

impl PartialEq for EngineHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl EngineHandle {
    pub(crate) fn new(
        commands: Sender<Command>,
        worker: JoinHandle<()>,
        distribution: Distribution,
        open_connections: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                commands,
                worker: Mutex::new(Some(worker)),
                distribution,
                open_connections,
                capabilities_loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn distribution(&self) -> &Distribution {
        &self.inner.distribution
    }

    /// Sessions currently open on the worker.
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    pub(crate) fn capabilities_loaded(&self) -> bool {
        self.inner.capabilities_loaded.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_capabilities_loaded(&self) {
        self.inner.capabilities_loaded.store(true, Ordering::SeqCst);
    }

    /// Send a command and wait for the worker's reply.
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, QueryError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(command(reply))
            .map_err(|_| QueryError::WorkerStopped)?;
        match response.await {
            Ok(result) => result.map_err(QueryError::from),
            Err(_) => Err(QueryError::WorkerStopped),
        }
    }

    fn send_detached(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!("engine worker already stopped; dropping detached command");
        }
    }

    pub(crate) async fn instantiate(
        &self,
        distribution: Distribution,
        logger: EngineLogger,
    ) -> Result<(), QueryError> {
        self.request(|reply| Command::Instantiate {
            distribution,
            logger,
            reply,
        })
        .await
    }

    /// Open a connection scoped to one query.
    pub async fn connect(&self) -> Result<Connection, QueryError> {
        let (id, interrupt) = self.request(|reply| Command::Connect { reply }).await?;
        Ok(Connection {
            id,
            engine: self.clone(),
            interrupt,
            closed: false,
        })
    }

    /// Place `bytes` where SQL can read them as the bare file `name`.
    pub async fn register_file(&self, name: &str, bytes: Vec<u8>) -> Result<PathBuf, QueryError> {
        let name = name.to_string();
        self.request(|reply| Command::RegisterFile { name, bytes, reply })
            .await
    }

    /// Close every session, drop the database and join the worker thread.
    pub(crate) async fn shutdown(&self) -> Result<(), QueryError> {
        let result = self.request(|reply| Command::Shutdown { reply }).await;
        let worker = match self.inner.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("engine worker panicked during shutdown");
            }
        }
        result
    }
}

/// A connection owned by exactly one query invocation.
///
/// [`Connection::close`] releases it; dropping an unclosed connection cancels
/// its running statement and enqueues the close on the worker instead. Either
/// way the worker closes it once.
pub struct Connection {
    id: ConnectionId,
    engine: EngineHandle,
    interrupt: Arc<dyn Interrupt>,
    closed: bool,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Cancel the statement running on this connection. Bypasses the worker
    /// queue, so it takes effect while the worker is busy with that statement.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Run a statement whose result is discarded.
    pub async fn execute(&self, sql: &str) -> Result<(), QueryError> {
        let (id, sql) = (self.id, sql.to_string());
        self.engine
            .request(|reply| Command::Execute { id, sql, reply })
            .await
    }

    pub async fn query(&self, sql: &str) -> Result<ColumnarResult, QueryError> {
        let (id, sql) = (self.id, sql.to_string());
        self.engine
            .request(|reply| Command::Query { id, sql, reply })
            .await
    }

    pub async fn close(mut self) -> Result<(), QueryError> {
        self.closed = true;
        let id = self.id;
        self.engine
            .request(|reply| Command::Close {
                id,
                reply: Some(reply),
            })
            .await
    }

    /// Enqueue the close without waiting; it runs after any statement already
    /// queued on this connection.
    pub fn close_detached(mut self) {
        self.closed = true;
        self.engine.send_detached(Command::Close {
            id: self.id,
            reply: None,
        });
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            debug!(id = %self.id, "connection dropped before close; closing on worker");
            self.interrupt.interrupt();
            self.engine.send_detached(Command::Close {
                id: self.id,
                reply: None,
            });
        }
    }
}
