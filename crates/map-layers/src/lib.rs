//! Map composition: a static raster base layer plus a GeoJSON overlay bound to
//! the latest query result, and the initial camera.

mod layers;
mod tiles;
mod view;

pub use layers::{GeoJsonLayer, MapComposer, OverlayStyle, PointType, RenderLayer, build_layers};
pub use tiles::{DEFAULT_TILE_URL, TileCoord, TileLayer, TileTemplateError};
pub use view::ViewState;
