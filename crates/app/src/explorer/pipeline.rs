//! Wiring of the process-wide engine into the `serve` and `query` commands.

use std::sync::OnceLock;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result, anyhow};
use geo_core::{GEOMETRY_COLUMN, TableView, to_feature_collection};
use map_layers::{MapComposer, OverlayStyle, TileLayer, ViewState};
use sql_engine::{DuckDbDriver, EngineConfig, EngineManager};
use tracing::{error, info};

use crate::explorer::config::{EngineSettings, ExplorerConfig, OutputFormat, QueryConfig};
use crate::explorer::loader;
use crate::explorer::server::{self, ServerState};
use crate::explorer::telemetry;

static ENGINE: OnceLock<EngineManager<DuckDbDriver>> = OnceLock::new();

/// The process-wide engine. The first caller's configuration wins.
fn global_engine(config: &EngineConfig) -> &'static EngineManager<DuckDbDriver> {
    ENGINE.get_or_init(|| EngineManager::new(DuckDbDriver, config.clone()))
}

/// Bootstrap the engine and register the configured files.
async fn prepare(
    engine: &'static EngineManager<DuckDbDriver>,
    settings: &EngineSettings,
) -> Result<()> {
    engine.initialize().await?;
    loader::register_all(engine, &settings.registrations).await
}

/// Run the explorer server until interrupted, then tear the engine down.
pub fn serve(config: ExplorerConfig) -> Result<()> {
    let _telemetry = telemetry::init(&config.settings.telemetry);
    telemetry::init_metrics_recorder()?;

    let engine = global_engine(&config.settings.engine);
    let view = ViewState::INITIAL;
    let centre = config.tiles.tile_for(&view);
    info!(
        tile = %config.tiles.tile_url(centre),
        zoom = view.zoom,
        "Initial view centred on ({}, {})",
        view.latitude,
        view.longitude
    );

    let composer = MapComposer::new(config.tiles.clone(), OverlayStyle::default());
    let state = web::Data::new(ServerState::new(engine, composer, view));
    let settings = config.settings.clone();
    let (bind, port) = (config.bind.clone(), config.port);

    actix_web::rt::System::new()
        .block_on(async move {
            // Bootstrap in the background so the status endpoints report progress.
            actix_web::rt::spawn(async move {
                if let Err(err) = prepare(engine, &settings).await {
                    error!("Engine preparation failed: {err:#}");
                }
            });

            let server = HttpServer::new(move || {
                App::new()
                    .app_data(state.clone())
                    .configure(server::routes)
            })
            .bind((bind.as_str(), port))
            .with_context(|| format!("Failed to bind {bind}:{port}"))?
            .run();
            info!("Explorer listening on http://{bind}:{port}/");

            let served = server.await.context("HTTP server error");
            engine.shutdown().await;
            served
        })
}

/// Run one query, print it in the requested format, and shut the engine down.
pub fn run_query(config: QueryConfig) -> Result<()> {
    let _telemetry = telemetry::init(&config.settings.telemetry);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let output = runtime.block_on(async {
        let engine = global_engine(&config.settings.engine);
        let outcome = async {
            prepare(engine, &config.settings).await?;
            let result = engine.execute(&config.sql).await?;
            result.ok_or_else(|| anyhow!("the engine returned no result"))
        }
        .await;
        engine.shutdown().await;
        let result = outcome?;

        let rendered = match config.format {
            OutputFormat::Table => TableView::from_result(&result).render_text(),
            OutputFormat::Geojson => {
                let collection = to_feature_collection(Some(&result)).ok_or_else(|| {
                    anyhow!("the result has no `{GEOMETRY_COLUMN}` column to build features from")
                })?;
                serde_json::to_string_pretty(&collection)?
            }
            OutputFormat::Layers => {
                let collection = to_feature_collection(Some(&result));
                let composer = MapComposer::new(TileLayer::default(), OverlayStyle::default());
                serde_json::to_string_pretty(&composer.compose(collection.as_ref()))?
            }
        };
        anyhow::Ok(rendered)
    })?;

    println!("{}", output.trim_end());
    Ok(())
}
