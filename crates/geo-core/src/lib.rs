//! Columnar query results and the conversion of their GeoJSON text column into
//! feature collections that the map overlay can draw.

pub mod features;
pub mod geometry;
pub mod model;
pub mod table;

pub use features::{
    DropReason, DroppedRow, Feature, FeatureCollection, GEOMETRY_COLUMN, TransformReport,
    to_feature_collection, transform,
};
pub use geometry::{Geometry, GeometryError, Position};
pub use model::{ColumnDescriptor, ColumnType, ColumnarResult, RowView, ScalarValue, SchemaError};
pub use table::TableView;
