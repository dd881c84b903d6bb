//! Tile layer: selects, fetches, draws and purges the tiles of an image
//! pyramid as the view moves
//!
//! - `layer`: the [`TileLayer`] orchestrator
//! - `selection`: ranges, wrapping and load ordering
//! - `coverage`: which drawn tiles hide which others
//! - `types`: options and the small value types shared by the above

pub mod coverage;
pub mod layer;
pub mod selection;
pub mod types;

pub use coverage::CoverageTree;
pub use layer::{TileLayer, TileOffsetFn, TilesAtZoomFn, TilesMaxBoundsFn};
pub use types::{
    LevelBounds, SortCenter, TileEvent, TileLayerOptions, TileOffset, TileOrigin, TileRange,
    TileRounding, UpdateOutcome,
};
