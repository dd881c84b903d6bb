//! Collaborator seams of the engine
//!
//! The engine decides which tiles exist, when they are fetched and when they
//! may be dropped. Projecting coordinates, retrieving bytes and putting pixels
//! on a surface are delegated to the implementations of these traits.

use crate::core::geo::Point;
use crate::tiles::{
    loader::{TileData, TileRequest},
    tile::Tile,
};
use crate::{FetchError, Result};
use async_trait::async_trait;

/// Converts points between named coordinate systems
pub trait CoordinateTransform: Send + Sync {
    /// Transform `points` in place from `source` to `target`.
    ///
    /// Implementations must leave the buffer untouched when they return an
    /// error.
    fn transform(&self, source: &str, target: &str, points: &mut [Point]) -> Result<()>;

    /// Convenience wrapper for a single point
    fn transform_point(&self, source: &str, target: &str, point: Point) -> Result<Point> {
        let mut buffer = [point];
        self.transform(source, target, &mut buffer)?;
        Ok(buffer[0])
    }
}

/// Retrieves the payload of a single tile
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, request: &TileRequest) -> std::result::Result<TileData, FetchError>;
}

/// Puts fetched tiles on screen.
///
/// Called synchronously by the tile layer; implementations must not panic.
pub trait TileRenderer: Send {
    /// Show a tile that is not currently displayed.
    fn draw_tile(&mut self, tile: &Tile);

    /// Raise an already displayed tile above the others.
    fn move_to_top(&mut self, tile: &Tile);

    /// Stop displaying a tile.
    fn remove_tile(&mut self, tile: &Tile);
}
