//! Ordered render layers handed to the map front-end.

use geo_core::FeatureCollection;
use serde::Serialize;

use crate::tiles::TileLayer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Circle,
    Icon,
    Text,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Styling constants of the GeoJSON overlay.
pub struct OverlayStyle {
    pub pickable: bool,
    pub stroked: bool,
    pub filled: bool,
    pub point_type: PointType,
    pub point_radius: f64,
    pub point_radius_min_pixels: f64,
    pub fill_color: [u8; 3],
    pub line_color: [u8; 3],
    pub line_width_min_pixels: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            pickable: true,
            stroked: false,
            filled: true,
            point_type: PointType::Circle,
            point_radius: 10.0,
            point_radius_min_pixels: 5.0,
            fill_color: [255, 0, 0],
            line_color: [255, 0, 0],
            line_width_min_pixels: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeoJsonLayer {
    pub id: String,
    pub data: FeatureCollection,
    #[serde(flatten)]
    pub style: OverlayStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderLayer {
    Tile(TileLayer),
    GeoJson(GeoJsonLayer),
}

#[derive(Clone, Debug, Default)]
/// Base layer and overlay style shared by every composition.
pub struct MapComposer {
    pub base: TileLayer,
    pub style: OverlayStyle,
}

impl MapComposer {
    pub fn new(base: TileLayer, style: OverlayStyle) -> Self {
        Self { base, style }
    }

    /// Base tiles first, then the overlay. A missing collection renders an
    /// empty overlay.
    pub fn compose(&self, data: Option<&FeatureCollection>) -> Vec<RenderLayer> {
        vec![
            RenderLayer::Tile(self.base.clone()),
            RenderLayer::GeoJson(GeoJsonLayer {
                id: "geojson-layer".into(),
                data: data.cloned().unwrap_or_default(),
                style: self.style.clone(),
            }),
        ]
    }
}

/// Compose with the default base layer and overlay style.
pub fn build_layers(data: Option<&FeatureCollection>) -> Vec<RenderLayer> {
    MapComposer::default().compose(data)
}
