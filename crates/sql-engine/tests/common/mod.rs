//! Scriptable in-process driver used by the engine integration tests.
//!
//! The driver records every statement it sees and counts instantiations,
//! connects and closes, so tests can assert on connection hygiene without a
//! real database.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use geo_core::{ColumnDescriptor, ColumnType, ColumnarResult, ScalarValue};
use sql_engine::{
    BackendError, Database, Distribution, Driver, EngineConfig, EngineManager, Interrupt,
    QueryOptions, Session, WorkerJob,
};

#[derive(Clone, Debug, Default)]
pub struct Recorder {
    instantiations: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    interrupts: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Statements cut short by an interrupt.
    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

#[derive(Clone, Debug)]
struct Behaviour {
    fail_statements: HashMap<String, String>,
    query_delay: Duration,
    result: ColumnarResult,
}

#[derive(Debug)]
pub struct MockDriver {
    recorder: Recorder,
    fail_spawn: bool,
    fail_instantiate: Option<String>,
    instantiate_delay: Duration,
    behaviour: Arc<Behaviour>,
}

impl MockDriver {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            fail_spawn: false,
            fail_instantiate: None,
            instantiate_delay: Duration::ZERO,
            behaviour: Arc::new(Behaviour {
                fail_statements: HashMap::new(),
                query_delay: Duration::ZERO,
                result: places(),
            }),
        }
    }

    pub fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub fn failing_instantiate(mut self, message: &str) -> Self {
        self.fail_instantiate = Some(message.to_string());
        self
    }

    pub fn slow_instantiate(mut self, delay: Duration) -> Self {
        self.instantiate_delay = delay;
        self
    }

    pub fn failing_statement(mut self, sql: &str, message: &str) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .fail_statements
            .insert(sql.to_string(), message.to_string());
        self
    }

    pub fn slow_queries(mut self, delay: Duration) -> Self {
        Arc::make_mut(&mut self.behaviour).query_delay = delay;
        self
    }

    pub fn returning(mut self, result: ColumnarResult) -> Self {
        Arc::make_mut(&mut self.behaviour).result = result;
        self
    }
}

impl Driver for MockDriver {
    type Database = MockDatabase;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn spawn_worker(&self, name: String, job: WorkerJob) -> io::Result<JoinHandle<()>> {
        if self.fail_spawn {
            return Err(io::Error::other("worker threads are unavailable"));
        }
        thread::Builder::new().name(name).spawn(job)
    }

    fn instantiate(&self, _distribution: &Distribution) -> Result<MockDatabase, BackendError> {
        self.recorder.instantiations.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.instantiate_delay);
        if let Some(message) = &self.fail_instantiate {
            return Err(BackendError::new(message.clone()));
        }
        Ok(MockDatabase {
            recorder: self.recorder.clone(),
            behaviour: self.behaviour.clone(),
            files: HashMap::new(),
        })
    }
}

pub struct MockDatabase {
    recorder: Recorder,
    behaviour: Arc<Behaviour>,
    files: HashMap<String, Vec<u8>>,
}

impl Database for MockDatabase {
    type Session = MockSession;

    fn connect(&mut self) -> Result<MockSession, BackendError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            recorder: self.recorder.clone(),
            behaviour: self.behaviour.clone(),
            interrupted: Arc::new(MockInterrupt::default()),
        })
    }

    fn register_file(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, BackendError> {
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(PathBuf::from("/mock").join(name))
    }
}

#[derive(Debug, Default)]
pub struct MockInterrupt(AtomicBool);

impl Interrupt for MockInterrupt {
    fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct MockSession {
    recorder: Recorder,
    behaviour: Arc<Behaviour>,
    interrupted: Arc<MockInterrupt>,
}

impl MockSession {
    /// Sleep for the configured query delay unless interrupted first.
    fn stall(&self) -> Result<(), BackendError> {
        let deadline = Instant::now() + self.behaviour.query_delay;
        while Instant::now() < deadline {
            if self.interrupted.0.swap(false, Ordering::SeqCst) {
                self.recorder.interrupts.fetch_add(1, Ordering::SeqCst);
                return Err(BackendError::new("INTERRUPT Error: Interrupted!"));
            }
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    fn run(&self, sql: &str) -> Result<(), BackendError> {
        self.recorder.record(sql);
        match self.behaviour.fail_statements.get(sql) {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(()),
        }
    }
}

impl Session for MockSession {
    fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        self.run(sql)
    }

    fn query(&mut self, sql: &str) -> Result<ColumnarResult, BackendError> {
        self.stall()?;
        self.run(sql)?;
        Ok(self.behaviour.result.clone())
    }

    fn interrupt_handle(&self) -> Arc<dyn Interrupt> {
        self.interrupted.clone()
    }

    fn close(self) -> Result<(), BackendError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Two named points with a GeoJSON geometry column.
pub fn places() -> ColumnarResult {
    let text = |s: &str| ScalarValue::Text(s.to_string());
    ColumnarResult::new(
        vec![
            ColumnDescriptor::new("name", ColumnType::Text),
            ColumnDescriptor::new("geojson", ColumnType::Text),
        ],
        vec![
            vec![
                text("Tokyo Station"),
                text(r#"{"type":"Point","coordinates":[139.767125,35.681236]}"#),
            ],
            vec![
                text("Shinjuku"),
                text(r#"{"type":"Point","coordinates":[139.700258,35.690921]}"#),
            ],
        ],
    )
    .unwrap()
}

pub fn config(query: QueryOptions) -> EngineConfig {
    EngineConfig {
        max_threads: Some(2),
        query,
        ..EngineConfig::default()
    }
}

pub fn manager(driver: MockDriver, query: QueryOptions) -> EngineManager<MockDriver> {
    EngineManager::new(driver, config(query))
}

/// Poll until `condition` holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
