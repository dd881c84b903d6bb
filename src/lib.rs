//! # tilescape
//!
//! A tiled-imagery viewport engine.
//!
//! Given a viewport moving over a multi-resolution quadtree of image tiles,
//! the engine works out which tiles are needed, fetches them with bounded
//! concurrency, caches them, decides when stale or redundant tiles may be
//! discarded, and hands a sorted tile set to a rendering collaborator every
//! time the view changes.

pub mod core;
pub mod layers;
pub mod logging;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    bounds::Bounds,
    geo::{LatLng, Point},
    view::Viewport,
};

pub use layers::tile::{TileLayer, TileLayerOptions};

pub use tiles::{
    cache::TileCache,
    queue::{
        Admission, AdmissionTicket, Demand, Enqueued, EntryState, FetchQueue, ProcessingSlot,
        QueueOptions,
    },
    tile::{Tile, TileIndex},
};

pub use traits::{CoordinateTransform, TileFetcher, TileRenderer};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tile url: {0}")]
    Url(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transform error: {0}")]
    Transform(String),
}

/// Error type alias for convenience
pub type TilescapeError = Error;

/// Why a single tile could not be retrieved.
///
/// Cloneable so the same failure can be handed to every handler registered
/// on the tile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("discarded by the fetch queue before it started")]
    Discarded,

    #[error("removed from the fetch queue")]
    Removed,

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// True for failures caused by the queue dropping the tile, not the source.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Discarded | FetchError::Removed)
    }
}
