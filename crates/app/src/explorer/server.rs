//! Actix Web explorer server: the embedded page, engine status (JSON and
//! Server-Sent Events), the query endpoint, and Prometheus metrics.

use std::sync::{Mutex, PoisonError};

use actix_web::{
    HttpResponse,
    http::{StatusCode, header},
    web::{self, Bytes},
};
use async_stream::stream;
use map_layers::{MapComposer, RenderLayer, ViewState};
use serde::{Deserialize, Serialize};
use sql_engine::{Distribution, DuckDbDriver, EngineManager, EngineState, QueryError};
use tracing::info;

use crate::explorer::session::{Outcome, QuerySession};
use crate::explorer::telemetry;

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) engine: &'static EngineManager<DuckDbDriver>,
    pub(crate) session: Mutex<QuerySession>,
    pub(crate) composer: MapComposer,
    pub(crate) view: ViewState,
}

impl ServerState {
    pub(crate) fn new(
        engine: &'static EngineManager<DuckDbDriver>,
        composer: MapComposer,
        view: ViewState,
    ) -> Self {
        Self {
            engine,
            session: Mutex::new(QuerySession::default()),
            composer,
            view,
        }
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
}

#[derive(Serialize)]
struct StatusResponse {
    engine: EngineState,
    bootstraps: usize,
    distribution: Option<Distribution>,
    open_connections: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse<'a> {
    outcome: Outcome,
    #[serde(flatten)]
    session: &'a QuerySession,
}

#[derive(Serialize)]
struct MapResponse {
    view: ViewState,
    layers: Vec<RenderLayer>,
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/api/status", web::get().to(status_handler))
        .route("/api/status/stream", web::get().to(status_stream_handler))
        .route("/api/query", web::post().to(query_handler))
        .route("/api/session", web::get().to(session_handler))
        .route("/api/map", web::get().to(map_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Serve the explorer page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(crate::html::explorer::EXPLORER_HTML)
}

/// Current engine state with distribution details once ready.
async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    let handle = state.engine.handle();
    HttpResponse::Ok().json(StatusResponse {
        engine: state.engine.state(),
        bootstraps: state.engine.bootstrap_count(),
        distribution: handle.as_ref().map(|engine| engine.distribution().clone()),
        open_connections: handle.as_ref().map(|engine| engine.open_connections()),
    })
}

/// Stream engine state transitions as Server-Sent Events.
async fn status_stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut states = state.engine.subscribe();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 500\n\n"));
        loop {
            let current = states.borrow_and_update().clone();
            match serde_json::to_string(&current) {
                Ok(json) => {
                    let chunk = format!("data: {json}\n\n");
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                }
                Err(err) => {
                    let error_chunk = format!("event: error\ndata: {err}\n\n");
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(error_chunk));
                }
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

fn error_status(err: &QueryError) -> StatusCode {
    match err {
        QueryError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
        QueryError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        QueryError::EngineUnavailable(_) | QueryError::WorkerStopped => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Run the posted SQL and return the updated session.
async fn query_handler(
    request: web::Json<QueryRequest>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    let sql = request.into_inner().sql;
    let result = state.engine.execute(&sql).await;
    let status = match &result {
        Ok(Some(_)) => StatusCode::OK,
        Ok(None) if state.engine.state().is_ready() => StatusCode::OK,
        Ok(None) => StatusCode::SERVICE_UNAVAILABLE,
        Err(err) => error_status(err),
    };

    let mut session = state.session.lock().unwrap_or_else(PoisonError::into_inner);
    let outcome = session.record(&sql, result, &state.composer);
    if let (Outcome::Updated, Some(snapshot)) = (outcome, session.snapshot()) {
        info!(
            rows = snapshot.table.rows.len(),
            dropped = snapshot.dropped_rows,
            "Session updated"
        );
    }
    HttpResponse::build(status).json(QueryResponse {
        outcome,
        session: &session,
    })
}

async fn session_handler(state: web::Data<ServerState>) -> HttpResponse {
    let session = state.session.lock().unwrap_or_else(PoisonError::into_inner);
    HttpResponse::Ok().json(&*session)
}

/// Initial camera and the render layers of the current snapshot.
async fn map_handler(state: web::Data<ServerState>) -> HttpResponse {
    let layers = state
        .session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .layers(&state.composer);
    HttpResponse::Ok().json(MapResponse {
        view: state.view,
        layers,
    })
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use sql_engine::{EngineConfig, QueryOptions};

    async fn ready_state(scratch: &tempfile::TempDir) -> web::Data<ServerState> {
        let config = EngineConfig {
            max_threads: Some(1),
            scratch_dir: Some(scratch.path().to_path_buf()),
            query: QueryOptions::offline(),
            ..EngineConfig::default()
        };
        let engine = Box::leak(Box::new(EngineManager::new(DuckDbDriver, config)));
        engine.initialize().await.unwrap();
        web::Data::new(ServerState::new(
            engine,
            MapComposer::default(),
            ViewState::INITIAL,
        ))
    }

    #[actix_web::test]
    async fn query_then_failure_keeps_previous_snapshot() {
        let scratch = tempfile::tempdir().unwrap();
        let state = ready_state(&scratch).await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let sql = r#"SELECT '{"type":"Point","coordinates":[139.76,35.68]}' AS geojson,
            'Station A' AS name"#;
        let request = test::TestRequest::post()
            .uri("/api/query")
            .set_json(json!({ "sql": sql }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["outcome"], "updated");
        let feature = &body["snapshot"]["features"]["features"][0];
        assert_eq!(feature["properties"]["name"], "Station A");
        assert_eq!(body["snapshot"]["layers"][1]["kind"], "geo_json");

        let request = test::TestRequest::post()
            .uri("/api/query")
            .set_json(json!({ "sql": "SELEC 1" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["outcome"], "failed");
        assert!(body["last_error"].as_str().unwrap().contains("Parser Error"));
        assert_eq!(body["snapshot"]["sql"], sql);
    }

    #[actix_web::test]
    async fn status_reports_ready_engine() {
        let scratch = tempfile::tempdir().unwrap();
        let state = ready_state(&scratch).await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let request = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["engine"]["state"], "ready");
        assert_eq!(body["bootstraps"], 1);
        assert_eq!(body["distribution"]["kind"], "single_threaded");
        assert_eq!(body["open_connections"], 0);
    }

    #[actix_web::test]
    async fn map_starts_with_empty_overlay() {
        let scratch = tempfile::tempdir().unwrap();
        let state = ready_state(&scratch).await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let request = test::TestRequest::get().uri("/api/map").to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["view"]["zoom"], 11.0);
        assert_eq!(body["layers"][0]["kind"], "tile");
        assert_eq!(body["layers"][1]["data"]["features"], json!([]));
    }
}
