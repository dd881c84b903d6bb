//! Map layers
//!
//! Only tiled imagery is provided; drawing is left to a
//! [`TileRenderer`](crate::traits::TileRenderer).

pub mod tile;
