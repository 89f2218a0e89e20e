//! Conversion of a columnar result into a GeoJSON feature collection.
//!
//! The geometry travels as GeoJSON text in a column named [`GEOMETRY_COLUMN`]
//! (typically `ST_AsGeoJSON(geometry) AS geojson`). Every other column becomes
//! a feature property. Rows whose geometry is missing or unparsable are dropped
//! and reported; they never fail the collection.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::geometry::Geometry;
use crate::model::{ColumnType, ColumnarResult, RowView};

/// Column carrying the GeoJSON geometry text.
pub const GEOMETRY_COLUMN: &str = "geojson";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DropReason {
    /// The geometry cell was NULL.
    Missing,
    /// The geometry cell held a non-text value.
    NotText(ColumnType),
    /// The text did not parse as a GeoJSON geometry.
    Invalid(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Missing => f.write_str("geometry is null"),
            DropReason::NotText(kind) => write!(f, "geometry is a {} value", kind.label()),
            DropReason::Invalid(detail) => write!(f, "{detail}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DroppedRow {
    /// Zero-based row index in the source result.
    pub row: usize,
    pub reason: DropReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
/// Bookkeeping of one transformation run.
pub struct TransformReport {
    pub rows: usize,
    pub features: usize,
    pub dropped: Vec<DroppedRow>,
}

/// Convert a result into features using [`GEOMETRY_COLUMN`].
///
/// Returns `None` when there is no result or the result lacks the geometry
/// column. A result with zero rows yields an empty collection.
pub fn to_feature_collection(result: Option<&ColumnarResult>) -> Option<FeatureCollection> {
    let (collection, _) = transform(result?, GEOMETRY_COLUMN)?;
    Some(collection)
}

/// Convert a result into features using `column` as the geometry source.
pub fn transform(
    result: &ColumnarResult,
    column: &str,
) -> Option<(FeatureCollection, TransformReport)> {
    let geometry_index = result.column_index(column)?;

    let mut report = TransformReport {
        rows: result.row_count(),
        ..TransformReport::default()
    };
    let mut features = Vec::with_capacity(result.row_count());

    for (index, row) in result.rows().enumerate() {
        match feature_from_row(row, geometry_index, column) {
            Ok(feature) => features.push(feature),
            Err(reason) => {
                debug!(row = index, %reason, "dropping row without usable geometry");
                report.dropped.push(DroppedRow { row: index, reason });
            }
        }
    }

    report.features = features.len();
    if !report.dropped.is_empty() {
        warn!(
            rows = report.rows,
            features = report.features,
            dropped = report.dropped.len(),
            "Dropped rows without a parseable `{column}` geometry"
        );
        metrics::counter!("geosql_dropped_rows_total").increment(report.dropped.len() as u64);
    }

    Some((FeatureCollection { features }, report))
}

/// The geometry comes from the first column named `column`; every column of
/// that name stays out of the properties.
fn feature_from_row(
    row: RowView<'_>,
    geometry_index: usize,
    column: &str,
) -> Result<Feature, DropReason> {
    let raw = &row.values()[geometry_index];
    let text = match raw.as_str() {
        Some(text) => text,
        None if raw.is_null() => return Err(DropReason::Missing),
        None => return Err(DropReason::NotText(raw.column_type())),
    };
    let geometry = Geometry::parse(text).map_err(|err| DropReason::Invalid(err.to_string()))?;

    let properties = row
        .iter()
        .filter(|(name, _)| *name != column)
        .map(|(name, value)| (name.to_string(), value.to_json()))
        .collect();

    Ok(Feature {
        geometry,
        properties,
    })
}
