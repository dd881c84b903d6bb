pub mod cache;
pub mod loader;
pub mod queue;
pub mod source;
pub mod tile;

// Re-exports for convenience
pub use cache::TileCache;
pub use loader::{FnFetcher, TileData, TileRequest};
pub use queue::{FetchQueue, QueueOptions};
pub use source::{TileSource, TileUrl, UrlTemplate};
pub use tile::{Tile, TileDescriptor, TileEdges, TileFootprint, TileIndex, TilePhase};
