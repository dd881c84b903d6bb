//! Shared helpers: a fetcher whose fetches the test completes by hand and a
//! renderer that records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::oneshot;
use fxhash::FxHashMap;
use std::sync::{Arc, Mutex};
use tilescape::tiles::{TileData, TileRequest};
use tilescape::{
    FetchError, Point, Tile, TileFetcher, TileLayer, TileLayerOptions, TileRenderer, Viewport,
};

type Reply = oneshot::Sender<Result<TileData, FetchError>>;

/// Fetches stay pending until `complete` or `fail` is called for their url
#[derive(Default)]
pub struct ManualFetcher {
    pending: Mutex<FxHashMap<String, Reply>>,
    requested: Mutex<Vec<String>>,
}

impl ManualFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every url fetched so far, in request order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    /// Urls currently being fetched, sorted
    pub fn in_flight(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.pending.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn complete(&self, url: &str) -> bool {
        self.reply(url, Ok(Arc::new(url.as_bytes().to_vec())))
    }

    pub fn fail(&self, url: &str, error: FetchError) -> bool {
        self.reply(url, Err(error))
    }

    /// Complete everything in flight, returns how many
    pub fn complete_all(&self) -> usize {
        let urls = self.in_flight();
        urls.iter().filter(|url| self.complete(url)).count()
    }

    fn reply(&self, url: &str, result: Result<TileData, FetchError>) -> bool {
        let reply = self.pending.lock().unwrap().remove(url);
        match reply {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl TileFetcher for ManualFetcher {
    async fn fetch(&self, request: &TileRequest) -> Result<TileData, FetchError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request.url.clone(), tx);
        self.requested.lock().unwrap().push(request.url.clone());
        rx.await
            .unwrap_or_else(|_| Err(FetchError::Other("fetch abandoned".to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    Draw(String),
    Top(String),
    Remove(String),
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub ops: Arc<Mutex<Vec<RenderOp>>>,
}

impl TileRenderer for RecordingRenderer {
    fn draw_tile(&mut self, tile: &Tile) {
        self.ops.lock().unwrap().push(RenderOp::Draw(tile.to_string()));
    }

    fn move_to_top(&mut self, tile: &Tile) {
        self.ops.lock().unwrap().push(RenderOp::Top(tile.to_string()));
    }

    fn remove_tile(&mut self, tile: &Tile) {
        self.ops.lock().unwrap().push(RenderOp::Remove(tile.to_string()));
    }
}

/// Replace mode without wrapping, in-memory urls `mem://{z}/{x}/{y}`
pub fn replace_options() -> TileLayerOptions {
    TileLayerOptions {
        keep_lower: false,
        wrap_x: false,
        ..TileLayerOptions::for_testing()
    }
}

/// A 510 pixel square view at one map unit per pixel at zoom 2, so level 2
/// covers level pixels 1..511 with the default y-up axis
pub fn view_at(zoom: f64) -> Viewport {
    Viewport::new(Point::new(256.0, -256.0), zoom, Point::new(510.0, 510.0))
        .with_units_per_pixel(4.0)
}

pub fn layer_with(
    options: TileLayerOptions,
    fetcher: Arc<ManualFetcher>,
) -> (TileLayer, Arc<Mutex<Vec<RenderOp>>>) {
    tilescape::logging::init_for_tests();
    let renderer = RecordingRenderer::default();
    let ops = renderer.ops.clone();
    let layer = TileLayer::new(options, fetcher, Box::new(renderer)).unwrap();
    (layer, ops)
}

/// Let spawned fetch tasks run
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Complete fetches until nothing more is requested, then apply the results
pub async fn load_everything(fetcher: &ManualFetcher, layer: &mut TileLayer) {
    loop {
        settle().await;
        if fetcher.complete_all() == 0 {
            break;
        }
    }
    settle().await;
    layer.process_tile_results();
}

/// Active tiles at `level`
pub fn active_at(layer: &TileLayer, level: u32) -> usize {
    layer
        .active_tiles()
        .filter(|tile| tile.index().level == level)
        .count()
}
