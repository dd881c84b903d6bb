//! Core data types for tile layer functionality

use crate::core::config::LoadingProfile;
use crate::core::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_CACHE_SIZE_KEEP_LOWER, DEFAULT_MAX_LEVEL, DEFAULT_SUBDOMAINS,
    OSM_URL_TEMPLATE, TILE_SIZE,
};
use crate::core::geo::Point;
use crate::tiles::queue::QueueOptions;
use crate::tiles::source::{parse_subdomains, TileUrl, UrlTemplate};
use crate::tiles::tile::Tile;
use crate::{Error, FetchError, Result};
use serde::{Deserialize, Serialize};

/// How a fractional map zoom maps onto a tile level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileRounding {
    #[default]
    Round,
    Floor,
    Ceil,
}

impl TileRounding {
    pub fn apply(&self, zoom: f64) -> f64 {
        match self {
            TileRounding::Round => zoom.round(),
            TileRounding::Floor => zoom.floor(),
            TileRounding::Ceil => zoom.ceil(),
        }
    }
}

/// Level-pixel offset added before dividing into tiles
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileOffset {
    #[default]
    Zero,
    /// Half the world at each level, for worlds centred on the origin
    HalfWorld,
    Fixed { x: f64, y: f64 },
}

impl TileOffset {
    pub fn at_level(&self, level: u32, tile_width: u32, tile_height: u32) -> Point {
        match self {
            TileOffset::Zero => Point::default(),
            TileOffset::HalfWorld => {
                let half = 2f64.powi(level as i32 - 1);
                Point::new(half * tile_width as f64, half * tile_height as f64)
            }
            TileOffset::Fixed { x, y } => Point::new(*x, *y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerOptions {
    pub min_level: u32,
    pub max_level: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Pixels shared with neighbouring tiles
    pub tile_overlap: u32,
    pub wrap_x: bool,
    pub wrap_y: bool,
    /// URL template, see [`UrlTemplate`]
    pub url: Option<String>,
    /// Old-style base url, takes precedence over `url`
    pub base_url: Option<String>,
    pub image_format: String,
    pub subdomains: Vec<String>,
    pub tile_offset: TileOffset,
    /// Level y grows with world y instead of against it
    pub top_down: bool,
    pub keep_lower: bool,
    /// `None` uses 600 in keep-lower mode and 200 otherwise
    pub cache_size: Option<usize>,
    pub queue_size: usize,
    pub initial_queue_size: Option<usize>,
    /// Backlog sweep threshold, the cache size when unset
    pub queue_track: Option<usize>,
    pub tile_rounding: TileRounding,
    /// Coordinate system of the tiles, the map's when unset
    pub gcs: Option<String>,
    pub visible: bool,
}

impl Default for TileLayerOptions {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: DEFAULT_MAX_LEVEL,
            tile_width: TILE_SIZE,
            tile_height: TILE_SIZE,
            tile_overlap: 0,
            wrap_x: true,
            wrap_y: false,
            url: None,
            base_url: None,
            image_format: "png".to_string(),
            subdomains: parse_subdomains(DEFAULT_SUBDOMAINS),
            tile_offset: TileOffset::Zero,
            top_down: false,
            keep_lower: true,
            cache_size: None,
            queue_size: QueueOptions::default().size,
            initial_queue_size: None,
            queue_track: None,
            tile_rounding: TileRounding::Round,
            gcs: None,
            visible: true,
        }
    }
}

/// Unified configuration presets for TileLayerOptions
impl TileLayerOptions {
    /// OpenStreetMap tiles over a Web Mercator map
    pub fn osm() -> Self {
        Self {
            url: Some(OSM_URL_TEMPLATE.to_string()),
            tile_offset: TileOffset::HalfWorld,
            ..Self::default()
        }
    }

    pub fn low_resource() -> Self {
        Self::osm().with_profile(&LoadingProfile::LowResource)
    }

    pub fn high_performance() -> Self {
        Self::osm().with_profile(&LoadingProfile::HighPerformance)
    }

    /// In-memory urls, small queue, no wrapping
    pub fn for_testing() -> Self {
        Self {
            url: Some("mem://{z}/{x}/{y}".to_string()),
            wrap_x: false,
            max_level: 8,
            queue_size: 2,
            ..Self::default()
        }
    }

    /// Apply a profile's cache and queue settings
    pub fn with_profile(mut self, profile: &LoadingProfile) -> Self {
        let loading = profile.resolve();
        self.cache_size = loading.cache_size;
        self.keep_lower = loading.keep_lower;
        self.queue_size = loading.queue.size;
        self.initial_queue_size = loading.queue.initial_size;
        self.queue_track = loading.cache_size.map(|_| loading.queue.track);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_level > self.max_level {
            return Err(Error::Config(format!(
                "min_level {} is above max_level {}",
                self.min_level, self.max_level
            )));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(Error::Config("tile size must be non-zero".to_string()));
        }
        if self.queue_size == 0 {
            return Err(Error::Config("queue_size must be at least 1".to_string()));
        }
        if self.max_level > 62 {
            return Err(Error::Config(format!(
                "max_level {} exceeds the addressable pyramid",
                self.max_level
            )));
        }
        Ok(())
    }

    pub fn effective_cache_size(&self) -> usize {
        self.cache_size.unwrap_or(if self.keep_lower {
            DEFAULT_CACHE_SIZE_KEEP_LOWER
        } else {
            DEFAULT_CACHE_SIZE
        })
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            size: self.queue_size,
            initial_size: self.initial_queue_size,
            track: self.queue_track.unwrap_or_else(|| self.effective_cache_size()),
        }
    }

    /// The url source described by `base_url` or `url`, if any
    pub fn tile_url(&self) -> Result<Option<TileUrl>> {
        if let Some(base_url) = &self.base_url {
            let template = UrlTemplate::from_base_url(base_url, &self.image_format)?;
            return Ok(Some(TileUrl::Template(template)));
        }
        self.url.as_deref().map(TileUrl::template).transpose()
    }
}

/// View rectangle in level-pixel space for a given level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelBounds {
    pub level: u32,
    /// Display scale of this level at the current map zoom
    pub scale: f64,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Tile that level-pixel offsets are measured from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileOrigin {
    pub index: (i64, i64),
    pub offset: (f64, f64),
}

/// Inclusive range of tile indices at one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub level: u32,
    pub start: (i64, i64),
    pub end: (i64, i64),
}

impl TileRange {
    pub fn count(&self) -> i64 {
        (self.end.0 - self.start.0 + 1).max(0) * (self.end.1 - self.start.1 + 1).max(0)
    }
}

/// Reference point for load ordering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SortCenter {
    pub level: u32,
    pub x: f64,
    pub y: f64,
    /// Levels at or above this load before the coarsest ones
    pub bottom_level: i64,
}

/// Fetch completion reported back to the layer
#[derive(Debug, Clone)]
pub enum TileEvent {
    Loaded(Tile),
    Failed(Tile, FetchError),
}

/// What a call to `TileLayer::update` did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The layer is hidden or has exited
    Skipped,
    /// The selection was the same as last time
    Unchanged,
    Selected {
        tiles: usize,
        drawn: usize,
        pending: usize,
    },
}
