//! Core TileLayer implementation

use super::coverage::CoverageTree;
use super::selection::{
    clamp_range, full_range, load_metric, pyramid_tiles_at, sort_center, source_index,
};
use super::types::{LevelBounds, TileEvent, TileLayerOptions, TileOrigin, TileRange, UpdateOutcome};
use crate::core::bounds::Bounds;
use crate::core::constants::REPROJECTION_TILE_FACTOR;
use crate::core::geo::Point;
use crate::core::transform::MercatorTransform;
use crate::core::view::Viewport;
use crate::prelude::{HashMap, HashSet};
use crate::tiles::cache::TileCache;
use crate::tiles::loader::TileData;
use crate::tiles::queue::{Demand, FetchQueue};
use crate::tiles::source::{parse_subdomains, TileUrl};
use crate::tiles::tile::{Tile, TileDescriptor, TileEdges, TileFootprint, TileIndex, TilePhase};
use crate::traits::{CoordinateTransform, TileFetcher, TileRenderer};
use crate::{Error, FetchError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::future::Future;
use std::sync::{Arc, Weak};

/// Tiles per axis at a level
pub type TilesAtZoomFn = Arc<dyn Fn(u32) -> (i64, i64) + Send + Sync>;
/// Level-pixel size of the image at a level, `None` for an unbounded world
pub type TilesMaxBoundsFn = Arc<dyn Fn(u32) -> Option<Point> + Send + Sync>;
/// Level-pixel offset at a level, replacing the configured [`TileOffset`](super::TileOffset)
pub type TileOffsetFn = Arc<dyn Fn(u32) -> Point + Send + Sync>;

/// Keeps queued tiles alive only while this layer's cache still holds them
struct CacheDemand {
    cache: TileCache,
}

impl Demand<Tile> for CacheDemand {
    fn is_needed(&self, tile: &Tile) -> bool {
        self.cache.peek(tile.hash()).map_or(false, |cached| cached == *tile)
    }
}

/// A pyramid of image tiles shown through a moving viewport.
///
/// Each [`update`](TileLayer::update) selects the tiles the view needs,
/// draws those already fetched and submits the rest to the fetch queue.
/// Completions come back on a channel and are applied by
/// [`process_tile_results`](TileLayer::process_tile_results).
pub struct TileLayer {
    pub(crate) options: TileLayerOptions,
    url: TileUrl,
    subdomains: Vec<String>,
    fetcher: Arc<dyn TileFetcher>,
    renderer: Box<dyn TileRenderer>,
    transform: Arc<dyn CoordinateTransform>,
    cache: TileCache,
    queue: FetchQueue<Tile>,
    demand: Option<Arc<CacheDemand>>,
    active: HashMap<String, Tile>,
    tile_tree: CoverageTree,
    last_tile_set: Vec<TileIndex>,
    /// Selections still waiting on tiles, purged once each empties
    pending_groups: Vec<HashSet<Tile>>,
    events_tx: Sender<TileEvent>,
    events_rx: Receiver<TileEvent>,
    view: Option<Viewport>,
    visible: bool,
    exited: bool,
    updating: bool,
    tiles_at_zoom_fn: Option<TilesAtZoomFn>,
    tiles_max_bounds_fn: Option<TilesMaxBoundsFn>,
    tile_offset_fn: Option<TileOffsetFn>,
}

impl TileLayer {
    /// Create a layer whose urls come from `options.url` or `options.base_url`
    pub fn new(
        options: TileLayerOptions,
        fetcher: Arc<dyn TileFetcher>,
        renderer: Box<dyn TileRenderer>,
    ) -> Result<Self> {
        let url = options
            .tile_url()?
            .ok_or_else(|| Error::Config("a tile layer needs a url or base_url".to_string()))?;
        Self::with_source(options, url, fetcher, renderer)
    }

    /// Create a layer with an explicit url source
    pub fn with_source(
        options: TileLayerOptions,
        url: TileUrl,
        fetcher: Arc<dyn TileFetcher>,
        renderer: Box<dyn TileRenderer>,
    ) -> Result<Self> {
        options.validate()?;

        let cache = TileCache::new(options.effective_cache_size());
        let queue = FetchQueue::new(options.queue_options());
        let demand = Arc::new(CacheDemand {
            cache: cache.clone(),
        });
        let weak: Weak<dyn Demand<Tile>> =
            Arc::downgrade(&(demand.clone() as Arc<dyn Demand<Tile>>));
        queue.register_demand(weak);

        let (events_tx, events_rx) = unbounded();
        let subdomains = options.subdomains.clone();
        let visible = options.visible;

        log::debug!(
            "Created tile layer {:?}, levels {}..={}, cache {}",
            url,
            options.min_level,
            options.max_level,
            cache.size()
        );

        Ok(Self {
            options,
            url,
            subdomains,
            fetcher,
            renderer,
            transform: Arc::new(MercatorTransform),
            cache,
            queue,
            demand: Some(demand),
            active: HashMap::default(),
            tile_tree: CoverageTree::new(),
            last_tile_set: Vec::new(),
            pending_groups: Vec::new(),
            events_tx,
            events_rx,
            view: None,
            visible,
            exited: false,
            updating: false,
            tiles_at_zoom_fn: None,
            tiles_max_bounds_fn: None,
            tile_offset_fn: None,
        })
    }

    /// Fetch through `queue`, shared with other layers. Tiles stay queued
    /// while any sharing layer still caches them.
    pub fn with_queue(mut self, queue: FetchQueue<Tile>) -> Self {
        if let Some(demand) = &self.demand {
            let weak: Weak<dyn Demand<Tile>> =
                Arc::downgrade(&(demand.clone() as Arc<dyn Demand<Tile>>));
            queue.register_demand(weak);
        }
        self.queue = queue;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn CoordinateTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_tiles_at_zoom(mut self, tiles_at_zoom: TilesAtZoomFn) -> Self {
        self.tiles_at_zoom_fn = Some(tiles_at_zoom);
        self
    }

    pub fn with_tiles_max_bounds(mut self, tiles_max_bounds: TilesMaxBoundsFn) -> Self {
        self.tiles_max_bounds_fn = Some(tiles_max_bounds);
        self
    }

    pub fn with_tile_offset_fn(mut self, tile_offset: TileOffsetFn) -> Self {
        self.tile_offset_fn = Some(tile_offset);
        self
    }

    pub fn options(&self) -> &TileLayerOptions {
        &self.options
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn queue(&self) -> &FetchQueue<Tile> {
        &self.queue
    }

    pub fn url(&self) -> &TileUrl {
        &self.url
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    pub fn renderer(&self) -> &dyn TileRenderer {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> &mut dyn TileRenderer {
        self.renderer.as_mut()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// The view passed to the last `update`
    pub fn view(&self) -> Option<&Viewport> {
        self.view.as_ref()
    }

    /// Tiles currently drawn, keyed by hash
    pub fn active_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, hash: &str) -> bool {
        self.active.contains_key(hash)
    }

    pub fn coverage(&self) -> &CoverageTree {
        &self.tile_tree
    }

    /// True while fetch completions are waiting to be processed
    pub fn has_pending_results(&self) -> bool {
        !self.events_rx.is_empty()
    }

    /// Number of selections whose tiles have not all settled yet
    pub fn pending_selections(&self) -> usize {
        self.pending_groups.len()
    }

    fn top_down(&self) -> f64 {
        if self.options.top_down {
            1.0
        } else {
            -1.0
        }
    }

    fn tile_size(&self) -> (f64, f64) {
        (self.options.tile_width as f64, self.options.tile_height as f64)
    }

    /// Tile level for a map zoom, rounded per `tile_rounding` and clamped to
    /// the layer's levels
    pub fn level_for_zoom(&self, zoom: f64) -> u32 {
        let level = self.options.tile_rounding.apply(zoom);
        let level = if level.is_finite() && level > 0.0 {
            level.min(self.options.max_level as f64) as u32
        } else {
            0
        };
        level.clamp(self.options.min_level, self.options.max_level)
    }

    /// Tiles per axis at `level`, a quadtree pyramid unless overridden
    pub fn tiles_at_zoom(&self, level: u32) -> (i64, i64) {
        match &self.tiles_at_zoom_fn {
            Some(tiles_at_zoom) => tiles_at_zoom(level),
            None => pyramid_tiles_at(level),
        }
    }

    /// Level-pixel size of the whole image, `None` when unbounded
    pub fn tiles_max_bounds(&self, level: u32) -> Option<Point> {
        self.tiles_max_bounds_fn
            .as_ref()
            .and_then(|tiles_max_bounds| tiles_max_bounds(level))
    }

    pub fn tile_offset(&self, level: u32) -> Point {
        match &self.tile_offset_fn {
            Some(tile_offset) => tile_offset(level),
            None => self.options.tile_offset.at_level(
                level,
                self.options.tile_width,
                self.options.tile_height,
            ),
        }
    }

    /// Visible part of a tile that runs past the image edge, `None` when
    /// the whole tile is inside
    pub fn tile_crop_from_bounds(&self, tile: &Tile, view: &Viewport) -> Option<Point> {
        let max = self.tiles_max_bounds(tile.index().level)?;
        let bounds = self.tile_bounds(tile, view);
        if bounds.right > max.x || bounds.bottom > max.y {
            return Some(Point::new(
                (max.x.min(bounds.right) - bounds.left).max(0.0),
                (max.y.min(bounds.bottom) - bounds.top).max(0.0),
            ));
        }
        None
    }

    /// Whether an index addresses a tile that exists
    pub fn is_valid(&self, index: &TileIndex) -> bool {
        if index.level < self.options.min_level || index.level > self.options.max_level {
            return false;
        }
        let (tiles_x, tiles_y) = self.tiles_at_zoom(index.level);
        if !self.options.wrap_x && (index.x < 0 || index.x >= tiles_x) {
            return false;
        }
        if !self.options.wrap_y && (index.y < 0 || index.y >= tiles_y) {
            return false;
        }
        true
    }

    /// Tile containing the map origin at `level`, and the origin's offset
    /// within it
    pub fn origin(&self, level: u32, view: &Viewport) -> TileOrigin {
        let local = self.to_local(&view.origin(), view, Some(0.0));
        let origin = Self::to_level(&local, level);
        let (width, height) = self.tile_size();
        let index = ((origin.x / width).floor(), (origin.y / height).floor());
        TileOrigin {
            index: (index.0 as i64, index.1 as i64),
            offset: (origin.x - index.0 * width, origin.y - index.1 * height),
        }
    }

    /// Tile edges relative to the origin tile of its level
    pub fn tile_bounds(&self, tile: &Tile, view: &Viewport) -> TileEdges {
        let origin = self.origin(tile.index().level, view);
        tile.bounds(origin.index, origin.offset)
    }

    /// Index of the tile under a map-coordinate point at `level`
    pub fn tile_at_point(&self, point: &Point, level: u32, view: &Viewport) -> (i64, i64) {
        let display = view.gcs_to_display(point);
        let mut level_point = self.display_to_level(&display, view, Some(level as f64));
        if level_point.x.is_nan() {
            level_point.x = 0.0;
        }
        if level_point.y.is_nan() {
            level_point.y = 0.0;
        }
        let offset = self.tile_offset(level);
        let (width, height) = self.tile_size();
        (
            ((level_point.x + offset.x) / width).floor() as i64,
            ((level_point.y + offset.y) / height).floor() as i64,
        )
    }

    /// Edges of a tile in `gcs`, the map's coordinate system when `None`
    pub fn gcs_tile_bounds(
        &self,
        index: &TileIndex,
        view: &Viewport,
        gcs: Option<&str>,
    ) -> Result<TileEdges> {
        let offset = self.tile_offset(index.level);
        let edges = self
            .footprint(*index)
            .bounds((0, 0), (offset.x, offset.y));
        let unit = view.units_per_pixel(Some(index.level as f64));
        let top_down = self.top_down();
        let mut corners = [
            Point::new(edges.left * unit, top_down * edges.top * unit),
            Point::new(edges.right * unit, top_down * edges.bottom * unit),
        ];
        if let Some(target) = gcs.filter(|target| !target.eq_ignore_ascii_case(view.gcs())) {
            self.transform.transform(view.gcs(), target, &mut corners)?;
        }
        Ok(TileEdges {
            left: corners[0].x,
            top: corners[0].y,
            right: corners[1].x,
            bottom: corners[1].y,
        })
    }

    pub fn tile_hash(&self, index: &TileIndex) -> String {
        index.hash_key()
    }

    /// Unclamped tile range covering map-coordinate `bounds` at `level`
    pub fn tile_range(&self, level: u32, bounds: &Bounds, view: &Viewport) -> TileRange {
        let corners = bounds
            .corners()
            .map(|corner| self.tile_at_point(&corner, level, view));
        let mut range = TileRange {
            level,
            start: corners[0],
            end: corners[0],
        };
        for (x, y) in &corners[1..] {
            range.start = (range.start.0.min(*x), range.start.1.min(*y));
            range.end = (range.end.0.max(*x), range.end.1.max(*y));
        }
        range
    }

    fn footprint(&self, index: TileIndex) -> TileFootprint {
        TileFootprint {
            index,
            width: self.options.tile_width,
            height: self.options.tile_height,
            overlap_x: self.options.tile_overlap,
            overlap_y: self.options.tile_overlap,
            wrap_x: self.options.wrap_x,
            wrap_y: self.options.wrap_y,
        }
    }

    fn make_tile(&self, index: TileIndex, source: TileIndex) -> Tile {
        let descriptor = TileDescriptor {
            footprint: self.footprint(index),
            source,
            url: self.url.resolve(&source, &self.subdomains),
        };
        Tile::queued(descriptor, self.fetcher.clone(), &self.queue)
    }

    /// Cached tile for `index`, created when missing. With `delay_purge`
    /// the cache may overflow until the next explicit purge.
    fn tile_cached(&mut self, index: TileIndex, source: TileIndex, delay_purge: bool) -> Tile {
        let hash = self.tile_hash(&index);
        if let Some(tile) = self.cache.get(&hash) {
            return tile;
        }
        let tile = self.make_tile(index, source);
        if delay_purge {
            self.cache.add(tile.clone(), None, true);
        } else {
            let cache = self.cache.clone();
            cache.add(
                tile.clone(),
                Some(&mut |evicted: &Tile| {
                    self.remove_instance(evicted);
                }),
                false,
            );
        }
        tile
    }

    /// Select the tiles needed to show map-coordinate `bounds` at `level`.
    ///
    /// In keep-lower mode every level from `min_level` up is included.
    /// With `sorted` the list is in load order and a new queue batch is
    /// started. Returns `None` when `only_if_changed` is set and the
    /// selection is the same as last time.
    pub fn select_tiles(
        &mut self,
        level: u32,
        bounds: &Bounds,
        view: &Viewport,
        sorted: bool,
        only_if_changed: bool,
    ) -> Option<Vec<Tile>> {
        let max_level = level.min(self.options.max_level).max(self.options.min_level);
        let min_level = if self.options.keep_lower {
            self.options.min_level
        } else {
            max_level
        };
        let (wrap_x, wrap_y) = (self.options.wrap_x, self.options.wrap_y);
        let reprojected = self
            .options
            .gcs
            .as_deref()
            .map_or(false, |gcs| !gcs.eq_ignore_ascii_case(view.gcs()));
        let (width, height) = self.tile_size();
        let covering = view.size.x * view.size.y / width / height * REPROJECTION_TILE_FACTOR;

        let mut candidates: Vec<(TileIndex, TileIndex)> = Vec::new();
        let mut last_range: Option<TileRange> = None;
        for lvl in min_level..=max_level {
            let tiles = self.tiles_at_zoom(lvl);
            let mut range = clamp_range(self.tile_range(lvl, bounds, view), tiles, wrap_x, wrap_y);
            if lvl == min_level && self.options.keep_lower {
                range = full_range(range, tiles, wrap_x, wrap_y);
            }
            if reprojected && lvl != min_level && range.count() as f64 > covering {
                log::debug!(
                    "Stopping tile selection at level {}: {} tiles exceed the reprojection limit",
                    lvl,
                    range.count()
                );
                break;
            }
            for x in range.start.0..=range.end.0 {
                for y in range.start.1..=range.end.1 {
                    let index = TileIndex::new(lvl, x, y);
                    let source = source_index(&index, tiles, wrap_x, wrap_y);
                    if self.is_valid(&source) {
                        candidates.push((index, source));
                    }
                }
            }
            last_range = Some(range);
        }

        if only_if_changed {
            let indices: Vec<TileIndex> = candidates.iter().map(|(index, _)| *index).collect();
            if indices == self.last_tile_set {
                return None;
            }
            self.last_tile_set = indices;
        }

        if sorted {
            if let Some(range) = last_range {
                let center = sort_center(&range, range.level);
                candidates.sort_by(|a, b| load_metric(&center, &a.0, &b.0));
            }
            self.queue.start_batch();
        }

        if self.cache.size() < candidates.len() {
            log::info!(
                "Increasing tile cache size from {} to {}",
                self.cache.size(),
                candidates.len()
            );
            self.cache.set_size(candidates.len());
        }

        let mut tiles = Vec::with_capacity(candidates.len());
        for (index, source) in candidates {
            tiles.push(self.tile_cached(index, source, true));
        }

        let cache = self.cache.clone();
        cache.purge(Some(&mut |evicted: &Tile| {
            self.remove_instance(evicted);
        }));
        Some(tiles)
    }

    /// Start fetching every tile needed for `bounds` at `level`, without
    /// drawing. The returned future resolves once they have all settled.
    pub fn prefetch(
        &mut self,
        level: u32,
        bounds: &Bounds,
        view: &Viewport,
    ) -> impl Future<Output = Vec<std::result::Result<TileData, FetchError>>> + Send + 'static {
        let tiles = self
            .select_tiles(level, bounds, view, true, false)
            .unwrap_or_default();
        let completions: Vec<_> = tiles
            .iter()
            .map(|tile| {
                tile.fetch();
                tile.completion()
            })
            .collect();
        futures::future::join_all(completions)
    }

    pub fn to_level(point: &Point, level: u32) -> Point {
        point.multiply(2f64.powi(level as i32))
    }

    pub fn from_level(point: &Point, level: u32) -> Point {
        point.multiply(2f64.powi(-(level as i32)))
    }

    /// Map coordinates to layer pixels at `zoom`, the view's zoom when `None`
    pub fn to_local(&self, point: &Point, view: &Viewport, zoom: Option<f64>) -> Point {
        let unit = view.units_per_pixel(zoom);
        Point::new(point.x / unit, self.top_down() * point.y / unit)
    }

    pub fn from_local(&self, point: &Point, view: &Viewport, zoom: Option<f64>) -> Point {
        let unit = view.units_per_pixel(zoom);
        Point::new(point.x * unit, self.top_down() * point.y * unit)
    }

    /// Display pixel to level pixels in the layer's coordinate system.
    /// A point the transform cannot handle maps to the origin.
    pub fn display_to_level(&self, point: &Point, view: &Viewport, zoom: Option<f64>) -> Point {
        let zoom = zoom.unwrap_or_else(|| self.level_for_zoom(view.zoom) as f64);
        let unit = view.units_per_pixel(Some(zoom));
        let mut world = view.display_to_gcs(point);
        if let Some(gcs) = self
            .options
            .gcs
            .as_deref()
            .filter(|gcs| !gcs.eq_ignore_ascii_case(view.gcs()))
        {
            world = self
                .transform
                .transform_point(view.gcs(), gcs, world)
                .unwrap_or_default();
        }
        Point::new(world.x / unit, self.top_down() * world.y / unit)
    }

    /// The visible rectangle in level pixels at the level for the view's zoom
    pub fn view_bounds(&self, view: &Viewport) -> LevelBounds {
        let level = self.level_for_zoom(view.zoom);
        let corners = view
            .display_corners()
            .map(|corner| self.display_to_level(&corner, view, None));
        let mut bounds = LevelBounds {
            level,
            scale: 2f64.powf(view.zoom - level as f64),
            left: corners[0].x,
            top: corners[0].y,
            right: corners[0].x,
            bottom: corners[0].y,
        };
        for corner in &corners[1..] {
            bounds.left = bounds.left.min(corner.x);
            bounds.right = bounds.right.max(corner.x);
            bounds.top = bounds.top.min(corner.y);
            bounds.bottom = bounds.bottom.max(corner.y);
        }
        bounds
    }

    /// Show a fetched tile, or raise it if it is already shown
    pub fn draw_tile(&mut self, tile: &Tile) {
        let hash = tile.hash().to_string();
        if self.active.contains_key(&hash) {
            self.renderer.move_to_top(tile);
        } else {
            self.renderer.draw_tile(tile);
        }
        self.active.insert(hash, tile.clone());
    }

    /// Stop showing the tile with `hash`
    pub fn remove(&mut self, hash: &str) -> Option<Tile> {
        let tile = self.active.remove(hash)?;
        self.renderer.remove_tile(&tile);
        Some(tile)
    }

    /// Stop showing `tile`, leaving a newer tile with the same hash alone
    fn remove_instance(&mut self, tile: &Tile) -> bool {
        if self.active.get(tile.hash()) == Some(tile) {
            self.remove(tile.hash());
            return true;
        }
        false
    }

    /// Remove every drawn tile and forget the last selection
    pub fn clear(&mut self) -> Vec<Tile> {
        let hashes: Vec<String> = self.active.keys().cloned().collect();
        let removed = hashes.iter().filter_map(|hash| self.remove(hash)).collect();
        self.tile_tree.clear();
        self.last_tile_set.clear();
        removed
    }

    /// [`clear`](TileLayer::clear) and empty the cache. Queued tiles are
    /// then no longer needed and get discarded when they come up.
    pub fn reset(&mut self) {
        self.clear();
        self.cache.clear();
    }

    /// Switch to another url source. Returns false when nothing changed.
    pub fn set_url(&mut self, url: TileUrl) -> bool {
        if self.url.same_as(&url) {
            return false;
        }
        self.options.url = url.as_template().map(str::to_string);
        self.options.base_url = None;
        self.url = url;
        self.reset();
        true
    }

    /// Replace the subdomains from a string such as `"abc"` or `"a,b,c"`
    pub fn set_subdomains(&mut self, subdomains: &str) -> bool {
        let parsed = parse_subdomains(subdomains);
        if parsed.is_empty() || parsed == self.subdomains {
            return false;
        }
        self.options.subdomains = parsed.clone();
        self.subdomains = parsed;
        self.reset();
        true
    }

    /// Show or hide the layer; showing it again updates with the last view
    pub fn set_visible(&mut self, visible: bool) -> Option<UpdateOutcome> {
        if self.visible == visible {
            return None;
        }
        self.visible = visible;
        self.options.visible = visible;
        if !visible {
            return None;
        }
        let view = self.view.clone()?;
        Some(self.update(&view))
    }

    /// Detach the layer: drop everything shown and cached and stop asking
    /// the queue for tiles
    pub fn exit(&mut self) {
        self.reset();
        self.pending_groups.clear();
        self.demand = None;
        self.exited = true;
        log::debug!("Tile layer {:?} exited", self.url);
    }

    /// Select, draw and queue the tiles for `view`
    pub fn update(&mut self, view: &Viewport) -> UpdateOutcome {
        self.view = Some(view.clone());
        self.process_tile_results();
        if !self.visible || self.exited {
            return UpdateOutcome::Skipped;
        }

        let zoom = self.level_for_zoom(view.zoom);
        let bounds = view.bounds();
        self.updating = true;
        let selected = self.select_tiles(zoom, &bounds, view, true, true);
        self.updating = false;
        let Some(tiles) = selected else {
            return UpdateOutcome::Unchanged;
        };

        self.tile_tree.clear();
        let mut pending: HashSet<Tile> = HashSet::default();
        let mut drawn = 0;
        for tile in &tiles {
            match tile.phase() {
                TilePhase::Fetched => {
                    self.draw_tile(tile);
                    self.set_tile_tree(tile);
                    drawn += 1;
                    continue;
                }
                TilePhase::Failed => continue,
                _ => {}
            }
            pending.insert(tile.clone());
            if tile.claim_watch() {
                let loaded = self.events_tx.clone();
                let failed = self.events_tx.clone();
                tile.then(
                    move |tile: &Tile| {
                        let _ = loaded.send(TileEvent::Loaded(tile.clone()));
                    },
                    move |tile: &Tile, error: &FetchError| {
                        let _ = failed.send(TileEvent::Failed(tile.clone(), error.clone()));
                    },
                );
            } else if self.queue.position(tile).is_some() {
                self.queue.add(tile.clone(), false);
            }
        }

        let outcome = UpdateOutcome::Selected {
            tiles: tiles.len(),
            drawn,
            pending: pending.len(),
        };
        log::debug!("Tile layer update at level {}: {:?}", zoom, outcome);
        if pending.is_empty() {
            self.purge(zoom, true, None);
        } else {
            self.pending_groups.push(pending);
        }
        outcome
    }

    /// Apply fetch completions reported since the last call. Returns how
    /// many were handled.
    pub fn process_tile_results(&mut self) -> usize {
        let events: Vec<TileEvent> = self.events_rx.try_iter().collect();
        if events.is_empty() {
            return 0;
        }

        for event in &events {
            let tile = match event {
                TileEvent::Loaded(tile) | TileEvent::Failed(tile, _) => tile,
            };
            for group in &mut self.pending_groups {
                group.remove(tile);
            }
            match event {
                TileEvent::Loaded(tile) => self.on_tile_loaded(tile),
                TileEvent::Failed(tile, error) => self.on_tile_failed(tile, error),
            }
        }

        let waiting = self.pending_groups.len();
        self.pending_groups.retain(|group| !group.is_empty());
        if self.pending_groups.len() < waiting && !self.exited {
            if let Some(zoom) = self.view.as_ref().map(|view| self.level_for_zoom(view.zoom)) {
                self.purge(zoom, true, None);
            }
        }
        events.len()
    }

    fn on_tile_loaded(&mut self, tile: &Tile) {
        if self.exited || self.cache.get(tile.hash()).as_ref() != Some(tile) {
            return;
        }
        if let Some(view) = &self.view {
            let zoom = self.level_for_zoom(view.zoom);
            let bounds = self.view_bounds(view);
            if self.can_purge(tile, Some(&bounds), zoom, false) {
                self.remove_instance(tile);
                return;
            }
        }
        self.draw_tile(tile);
        self.set_tile_tree(tile);
    }

    fn on_tile_failed(&mut self, tile: &Tile, error: &FetchError) {
        if error.is_cancellation() {
            log::debug!("Tile {} dropped before loading: {}", tile, error);
        } else {
            log::warn!("Could not load tile {} from {}: {}", tile, tile.url(), error);
        }
        self.remove_instance(tile);
    }

    /// Remove every drawn tile that [`can_purge`](TileLayer::can_purge)
    /// allows. Uses the current view when `bounds` is `None`.
    pub fn purge(&mut self, zoom: u32, done_loading: bool, bounds: Option<LevelBounds>) -> usize {
        if self.updating {
            return 0;
        }
        let bounds = match bounds {
            Some(bounds) => bounds,
            None => match &self.view {
                Some(view) => self.view_bounds(view),
                None => return 0,
            },
        };
        let doomed: Vec<Tile> = self
            .active
            .values()
            .filter(|tile| self.can_purge(tile, Some(&bounds), zoom, done_loading))
            .cloned()
            .collect();
        for tile in &doomed {
            self.remove_instance(tile);
        }
        if !doomed.is_empty() {
            log::debug!("Purged {} tiles at level {}", doomed.len(), zoom);
        }
        doomed.len()
    }

    /// Whether a drawn tile may be removed at level `zoom`
    pub fn can_purge(
        &self,
        tile: &Tile,
        bounds: Option<&LevelBounds>,
        zoom: u32,
        done_loading: bool,
    ) -> bool {
        let level = tile.index().level;
        if self.options.keep_lower {
            if zoom < level && level != self.options.min_level {
                return true;
            }
            if level == self.options.min_level && !self.options.wrap_x && !self.options.wrap_y {
                return false;
            }
        } else if (done_loading || self.is_covered(tile).is_some()) && zoom != level {
            return true;
        }
        bounds.map_or(false, |bounds| self.out_of_bounds(tile, bounds))
    }

    /// Whether a tile lies entirely outside `bounds`
    pub fn out_of_bounds(&self, tile: &Tile, bounds: &LevelBounds) -> bool {
        let level = tile.index().level;
        let offset = self.tile_offset(level);
        let scale = if level != bounds.level {
            2f64.powi(bounds.level as i32 - level as i32)
        } else {
            1.0
        };
        (tile.bottom() - offset.y) * scale < bounds.top
            || (tile.left() - offset.x) * scale > bounds.right
            || (tile.top() - offset.y) * scale > bounds.bottom
            || (tile.right() - offset.x) * scale < bounds.left
    }

    /// Drawn tiles that hide `tile`: its parent, or all four children
    pub fn is_covered(&self, tile: &Tile) -> Option<Vec<Tile>> {
        self.tile_tree.covering(&tile.index())
    }

    fn set_tile_tree(&mut self, tile: &Tile) {
        if self.options.keep_lower {
            return;
        }
        self.tile_tree.insert(tile.clone());
    }
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("url", &self.url)
            .field("active", &self.active.len())
            .field("cache", &self.cache)
            .field("queue", &self.queue)
            .field("visible", &self.visible)
            .finish()
    }
}
