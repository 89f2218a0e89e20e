//! Raster base layer configuration and slippy-map tile addressing.

use serde::Serialize;
use thiserror::Error;

use crate::view::ViewState;

/// GSI pale map tiles.
pub const DEFAULT_TILE_URL: &str = "https://cyberjapandata.gsi.go.jp/xyz/pale/{z}/{x}/{y}.png";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileTemplateError {
    #[error("tile URL template {template:?} is missing the {placeholder} placeholder")]
    MissingPlaceholder {
        template: String,
        placeholder: &'static str,
    },
    #[error("tile zoom range {min}..={max} is empty")]
    ZoomRange { min: u8, max: u8 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Static configuration of the raster base layer.
pub struct TileLayer {
    pub id: String,
    pub url_template: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
}

impl Default for TileLayer {
    fn default() -> Self {
        Self {
            id: "base-tiles".into(),
            url_template: DEFAULT_TILE_URL.into(),
            min_zoom: 0,
            max_zoom: 19,
            tile_size: 256,
        }
    }
}

impl TileLayer {
    pub fn with_template(url_template: impl Into<String>) -> Result<Self, TileTemplateError> {
        let layer = Self {
            url_template: url_template.into(),
            ..Self::default()
        };
        layer.validate()?;
        Ok(layer)
    }

    pub fn validate(&self) -> Result<(), TileTemplateError> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(TileTemplateError::MissingPlaceholder {
                    template: self.url_template.clone(),
                    placeholder,
                });
            }
        }
        if self.min_zoom > self.max_zoom {
            return Err(TileTemplateError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        Ok(())
    }

    /// Tile containing the camera centre, zoom clamped to the layer's range.
    pub fn tile_for(&self, view: &ViewState) -> TileCoord {
        let zoom = (view.zoom.floor().max(0.0) as u8).clamp(self.min_zoom, self.max_zoom);
        TileCoord::containing(view.latitude, view.longitude, zoom)
    }

    /// Interpolate the template for one tile.
    pub fn tile_url(&self, tile: TileCoord) -> String {
        let retina_suffix = if self.tile_size >= 512 { "@2x" } else { "" };
        let subdomain = ["a", "b", "c"][((tile.x + tile.y) % 3) as usize];
        let values = [
            ("z", tile.z.to_string()),
            ("x", tile.x.to_string()),
            ("y", tile.y.to_string()),
            ("s", subdomain.to_string()),
            ("r", retina_suffix.to_string()),
        ];

        let mut url = self.url_template.clone();
        for (key, value) in &values {
            url = url.replace(&format!("{{{key}}}"), value);
        }
        url
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Web-mercator tile containing a coordinate.
    pub fn containing(latitude: f64, longitude: f64, zoom: u8) -> Self {
        let zoom = zoom.min(22);
        let n = 1_i64 << zoom;
        let x_raw = ((longitude + 180.0) / 360.0 * (n as f64)).floor() as i64;
        let lat_rad = latitude.to_radians();
        let y_raw = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI)
            / 2.0
            * (n as f64))
            .floor() as i64;

        let x = ((x_raw % n) + n) % n;
        let y = y_raw.clamp(0, n - 1);
        Self {
            z: zoom,
            x: x as u32,
            y: y as u32,
        }
    }
}
