//! Engine bootstrap and teardown through `EngineManager`.

mod common;

use std::time::Duration;

use common::{MockDriver, Recorder, eventually, manager};
use sql_engine::{
    BootstrapStage, EngineConfig, EngineManager, EngineState, QueryError, QueryOptions,
};

#[tokio::test]
async fn concurrent_initialize_bootstraps_once() {
    let recorder = Recorder::default();
    let driver = MockDriver::new(&recorder).slow_instantiate(Duration::from_millis(50));
    let manager = manager(driver, QueryOptions::offline());

    let (a, b, c) = tokio::join!(
        manager.initialize(),
        manager.initialize(),
        manager.initialize()
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(manager.bootstrap_count(), 1);
    assert_eq!(recorder.instantiations(), 1);
    assert_eq!(manager.state(), EngineState::Ready);

    // Later calls reuse the same instance.
    assert_eq!(manager.initialize().await.unwrap(), a);
    assert_eq!(recorder.instantiations(), 1);
}

#[tokio::test]
async fn subscribers_observe_loading_then_ready() {
    let recorder = Recorder::default();
    let driver = MockDriver::new(&recorder).slow_instantiate(Duration::from_millis(30));
    let manager = manager(driver, QueryOptions::offline());
    let mut states = manager.subscribe();
    assert_eq!(*states.borrow_and_update(), EngineState::Uninitialized);

    let (engine, ()) = tokio::join!(manager.initialize(), async {
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), EngineState::Initializing);
    });
    engine.unwrap();
    assert_eq!(*states.borrow(), EngineState::Ready);
}

#[tokio::test]
async fn worker_spawn_failure_is_final_and_rejects_queries() {
    let recorder = Recorder::default();
    let manager = manager(MockDriver::new(&recorder).failing_spawn(), QueryOptions::offline());

    let err = manager.initialize().await.unwrap_err();
    assert_eq!(err.stage, BootstrapStage::SpawnWorker);
    assert_eq!(err.message, "worker threads are unavailable");

    let EngineState::Failed(message) = manager.state() else {
        panic!("expected failed state, got {:?}", manager.state());
    };
    assert!(message.contains("worker threads are unavailable"));

    // Failures are not retried.
    assert_eq!(manager.initialize().await.unwrap_err(), err);
    assert_eq!(manager.bootstrap_count(), 1);

    let rejected = manager.execute("SELECT 1").await.unwrap_err();
    assert!(matches!(rejected, QueryError::EngineUnavailable(ref m) if m == &message));
    assert_eq!(recorder.connects(), 0);
    assert_eq!(recorder.instantiations(), 0);
}

#[tokio::test]
async fn instantiate_failure_keeps_engine_message_verbatim() {
    let recorder = Recorder::default();
    let driver = MockDriver::new(&recorder)
        .failing_instantiate("Out of Memory Error: could not allocate block");
    let manager = manager(driver, QueryOptions::offline());

    let err = manager.initialize().await.unwrap_err();
    assert_eq!(err.stage, BootstrapStage::Instantiate);
    assert_eq!(err.message, "Out of Memory Error: could not allocate block");
    assert!(manager.handle().is_none());
    assert!(matches!(manager.state(), EngineState::Failed(_)));
}

#[tokio::test]
async fn zero_thread_cap_fails_distribution_selection() {
    let recorder = Recorder::default();
    let config = EngineConfig {
        max_threads: Some(0),
        query: QueryOptions::offline(),
        ..EngineConfig::default()
    };
    let manager = EngineManager::new(MockDriver::new(&recorder), config);

    let err = manager.initialize().await.unwrap_err();
    assert_eq!(err.stage, BootstrapStage::SelectDistribution);
    assert_eq!(recorder.instantiations(), 0);
}

#[tokio::test]
async fn execute_before_initialize_is_a_no_op() {
    let recorder = Recorder::default();
    let manager = manager(MockDriver::new(&recorder), QueryOptions::offline());

    assert_eq!(manager.execute("SELECT 1").await, Ok(None));
    assert_eq!(manager.state(), EngineState::Uninitialized);
    assert_eq!(recorder.connects(), 0);
}

#[tokio::test]
async fn shutdown_closes_sessions_and_rejects_later_queries() {
    let recorder = Recorder::default();
    let manager = manager(MockDriver::new(&recorder), QueryOptions::offline());
    let engine = manager.initialize().await.unwrap();

    assert!(manager.execute("SELECT 1").await.unwrap().is_some());

    // An abandoned connection is still open when shutdown arrives.
    let leaked = engine.connect().await.unwrap();
    std::mem::forget(leaked);
    assert_eq!(engine.open_connections(), 1);

    manager.shutdown().await;
    assert_eq!(manager.state(), EngineState::ShutDown);
    assert!(manager.handle().is_none());
    assert_eq!(recorder.closes(), 2);
    eventually("open connections to drain", || engine.open_connections() == 0).await;

    let err = manager.execute("SELECT 1").await.unwrap_err();
    assert_eq!(err, QueryError::EngineUnavailable("engine shut down".into()));
}

#[tokio::test]
async fn register_file_requires_a_ready_engine() {
    let recorder = Recorder::default();
    let manager = manager(MockDriver::new(&recorder), QueryOptions::offline());

    let err = manager
        .register_file("places.csv", b"a,b\n".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::EngineUnavailable(_)));

    manager.initialize().await.unwrap();
    let path = manager
        .register_file("places.csv", b"a,b\n".to_vec())
        .await
        .unwrap();
    assert!(path.ends_with("places.csv"));
}
