//! Last query outcome held by the explorer.
//!
//! A successful query replaces the snapshot wholesale: table, features and
//! layers are recomputed from the new result. A failed query only records the
//! error, leaving the previous snapshot on screen.

use geo_core::{ColumnarResult, FeatureCollection, GEOMETRY_COLUMN, TableView, transform};
use map_layers::{MapComposer, RenderLayer};
use serde::Serialize;
use sql_engine::QueryError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub sql: String,
    pub table: TableView,
    /// `None` when the result has no geometry column.
    pub features: Option<FeatureCollection>,
    pub dropped_rows: usize,
    pub layers: Vec<RenderLayer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Updated,
    /// The engine was not ready or the SQL was blank.
    Skipped,
    Failed,
}

#[derive(Debug, Default, Serialize)]
pub struct QuerySession {
    snapshot: Option<Snapshot>,
    last_error: Option<String>,
}

impl QuerySession {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Layers for the current snapshot, or an empty overlay before any result.
    pub fn layers(&self, composer: &MapComposer) -> Vec<RenderLayer> {
        match &self.snapshot {
            Some(snapshot) => snapshot.layers.clone(),
            None => composer.compose(None),
        }
    }

    pub fn record(
        &mut self,
        sql: &str,
        outcome: Result<Option<ColumnarResult>, QueryError>,
        composer: &MapComposer,
    ) -> Outcome {
        match outcome {
            Ok(Some(result)) => {
                self.snapshot = Some(build_snapshot(sql, &result, composer));
                self.last_error = None;
                Outcome::Updated
            }
            Ok(None) => Outcome::Skipped,
            Err(err) => {
                self.last_error = Some(err.to_string());
                Outcome::Failed
            }
        }
    }
}

fn build_snapshot(sql: &str, result: &ColumnarResult, composer: &MapComposer) -> Snapshot {
    let transformed = transform(result, GEOMETRY_COLUMN);
    let dropped_rows = transformed
        .as_ref()
        .map_or(0, |(_, report)| report.dropped.len());
    let features = transformed.map(|(collection, _)| collection);
    let layers = composer.compose(features.as_ref());
    Snapshot {
        sql: sql.to_string(),
        table: TableView::from_result(result),
        features,
        dropped_rows,
        layers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_core::{ColumnDescriptor, ColumnType, ScalarValue};

    fn stations() -> ColumnarResult {
        ColumnarResult::new(
            vec![
                ColumnDescriptor::new("geojson", ColumnType::Text),
                ColumnDescriptor::new("name", ColumnType::Text),
            ],
            vec![
                vec![
                    ScalarValue::Text(r#"{"type":"Point","coordinates":[139.76,35.68]}"#.into()),
                    ScalarValue::Text("Station A".into()),
                ],
                vec![ScalarValue::Null, ScalarValue::Text("Station B".into())],
            ],
        )
        .unwrap()
    }

    fn overlay(layers: &[RenderLayer]) -> &FeatureCollection {
        match &layers[1] {
            RenderLayer::GeoJson(layer) => &layer.data,
            other => panic!("expected overlay, got {other:?}"),
        }
    }

    #[test]
    fn successful_query_replaces_snapshot() {
        let composer = MapComposer::default();
        let mut session = QuerySession::default();

        let outcome = session.record("SELECT ...", Ok(Some(stations())), &composer);
        assert_eq!(outcome, Outcome::Updated);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.table.headers, ["geojson", "name"]);
        assert_eq!(snapshot.table.rows[1], ["null", "Station B"]);
        assert_eq!(snapshot.dropped_rows, 1);
        let features = snapshot.features.as_ref().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features.features[0].properties["name"], "Station A");
        assert_eq!(overlay(&snapshot.layers).len(), 1);
    }

    #[test]
    fn failed_query_keeps_prior_results() {
        let composer = MapComposer::default();
        let mut session = QuerySession::default();
        session.record("SELECT ...", Ok(Some(stations())), &composer);
        let before = session.snapshot().cloned();

        let message = "Parser Error: syntax error at or near \"SELEC\"";
        let outcome = session.record(
            "SELEC 1",
            Err(QueryError::Engine(message.into())),
            &composer,
        );

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(session.last_error(), Some(message));
        assert_eq!(session.snapshot().cloned(), before);

        session.record("SELECT ...", Ok(Some(stations())), &composer);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn results_without_geometry_render_an_empty_overlay() {
        let composer = MapComposer::default();
        let mut session = QuerySession::default();
        let plain = ColumnarResult::new(
            vec![ColumnDescriptor::new("n", ColumnType::Integer)],
            vec![vec![ScalarValue::Integer(1)]],
        )
        .unwrap();

        session.record("SELECT 1 AS n", Ok(Some(plain)), &composer);
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.features, None);
        assert!(overlay(&snapshot.layers).is_empty());
        assert_eq!(snapshot.table.rows, [["1"]]);
    }

    #[test]
    fn skipped_query_changes_nothing() {
        let composer = MapComposer::default();
        let mut session = QuerySession::default();
        assert_eq!(session.record("", Ok(None), &composer), Outcome::Skipped);
        assert!(session.snapshot().is_none());
        assert!(overlay(&session.layers(&composer)).is_empty());
    }
}
