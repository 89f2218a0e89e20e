//! GeoJSON geometry objects as produced by `ST_AsGeoJSON`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `[longitude, latitude]` with optional trailing elevation.
pub type Position = Vec<f64>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("invalid GeoJSON geometry: {0}")]
    Json(#[from] serde_json::Error),
    #[error("position must hold at least two finite numbers, got {0:?}")]
    Position(Vec<f64>),
    #[error("{kind} needs at least {min} positions, got {found}")]
    TooFewPositions {
        kind: &'static str,
        min: usize,
        found: usize,
    },
}

impl Geometry {
    /// Parse and validate a GeoJSON geometry object.
    pub fn parse(text: &str) -> Result<Self, GeometryError> {
        let geometry: Geometry = serde_json::from_str(text)?;
        geometry.validate()?;
        Ok(geometry)
    }

    /// GeoJSON `type` member.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point { coordinates } => check_position(coordinates),
            Geometry::MultiPoint { coordinates } => {
                coordinates.iter().try_for_each(|p| check_position(p))
            }
            Geometry::LineString { coordinates } => check_line("LineString", coordinates, 2),
            Geometry::MultiLineString { coordinates } => coordinates
                .iter()
                .try_for_each(|line| check_line("LineString", line, 2)),
            Geometry::Polygon { coordinates } => coordinates
                .iter()
                .try_for_each(|ring| check_line("LinearRing", ring, 4)),
            Geometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .flatten()
                .try_for_each(|ring| check_line("LinearRing", ring, 4)),
            Geometry::GeometryCollection { geometries } => {
                geometries.iter().try_for_each(Geometry::validate)
            }
        }
    }
}

fn check_position(position: &[f64]) -> Result<(), GeometryError> {
    if position.len() < 2 || position.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::Position(position.to_vec()));
    }
    Ok(())
}

fn check_line(kind: &'static str, line: &[Position], min: usize) -> Result<(), GeometryError> {
    if line.len() < min {
        return Err(GeometryError::TooFewPositions {
            kind,
            min,
            found: line.len(),
        });
    }
    line.iter().try_for_each(|p| check_position(p))
}
