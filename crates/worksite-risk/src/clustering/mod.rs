//! Grid clustering of location points served as Web Mercator tiles.

mod index;
mod tile;

pub use index::{BatchSummary, ClusterIndex, TileFeature};
pub use tile::{cell_of, TileCoord, TileError, MAX_LATITUDE};
