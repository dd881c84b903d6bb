//! Core constants derived from common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Default finest level a tile layer will request.
pub const DEFAULT_MAX_LEVEL: u32 = 18;

/// Capacity of a bare `TileCache::default()`.
pub const DEFAULT_TILE_CACHE_SIZE: usize = 64;

/// Tile layer cache capacity when coarser levels are kept under finer ones.
pub const DEFAULT_CACHE_SIZE_KEEP_LOWER: usize = 600;

/// Tile layer cache capacity in replace mode.
pub const DEFAULT_CACHE_SIZE: usize = 200;

/// Concurrent fetches admitted by a fetch queue.
pub const DEFAULT_QUEUE_SIZE: usize = 6;

/// Backlog length above which a fetch queue sweeps out unneeded entries.
pub const DEFAULT_QUEUE_TRACK: usize = 600;

/// When a layer is reprojected, stop descending once a level needs more than
/// this many times the tiles that would cover the viewport unprojected.
pub const REPROJECTION_TILE_FACTOR: f64 = 16.0;

/// Half the width of the Web Mercator world in meters.
pub const WEB_MERCATOR_EXTENT: f64 = 20_037_508.342_789_244;

/// Map units per display pixel at zoom 0: the Mercator world spans one tile.
pub const BASE_UNITS_PER_PIXEL: f64 = 2.0 * WEB_MERCATOR_EXTENT / TILE_SIZE as f64;

/// Coordinate system of the map when none is given.
pub const DEFAULT_MAP_GCS: &str = "EPSG:3857";

/// Geographic coordinate system (longitude, latitude in degrees).
pub const GEOGRAPHIC_GCS: &str = "EPSG:4326";

/// OpenStreetMap tile server template.
pub const OSM_URL_TEMPLATE: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Subdomains substituted for `{s}` when a layer names none.
pub const DEFAULT_SUBDOMAINS: &str = "abc";
