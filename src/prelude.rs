//! Prelude module for common tilescape types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilescape::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{LoadingOptions, LoadingProfile},
    geo::{LatLng, Point},
    transform::MercatorTransform,
    view::Viewport,
};

pub use crate::layers::tile::{
    LevelBounds, TileEvent, TileLayer, TileLayerOptions, TileOffset, TileRounding, UpdateOutcome,
};

pub use crate::runtime::{runtime, spawn, AsyncSpawner};

pub use crate::tiles::{
    cache::TileCache,
    loader::{FnFetcher, TileData, TileRequest},
    queue::{Admission, Demand, Enqueued, EntryState, FetchQueue, QueueOptions},
    source::{TileSource, TileUrl, UrlTemplate},
    tile::{Tile, TileEdges, TileIndex, TilePhase},
};

pub use crate::traits::{CoordinateTransform, TileFetcher, TileRenderer};

pub use crate::{Error as TilescapeError, FetchError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
