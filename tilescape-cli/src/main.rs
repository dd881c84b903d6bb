use futures::FutureExt;
use fxhash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tilescape::{
    layers::tile::UpdateOutcome,
    tiles::{FnFetcher, TileRequest},
    FetchError, LatLng, Point, Tile, TileFetcher, TileLayer, TileLayerOptions, TileRenderer,
    Viewport,
};

/// Logs what would be on screen, tile hash to level
#[derive(Default)]
struct ConsoleRenderer {
    shown: FxHashMap<String, u32>,
}

impl TileRenderer for ConsoleRenderer {
    fn draw_tile(&mut self, tile: &Tile) {
        self.shown.insert(tile.hash().to_string(), tile.index().level);
        log::debug!(
            "draw {} ({} bytes), {} on screen",
            tile,
            tile.data().map_or(0, |data| data.len()),
            self.shown.len()
        );
    }

    fn move_to_top(&mut self, tile: &Tile) {
        log::trace!("raise {}", tile);
    }

    fn remove_tile(&mut self, tile: &Tile) {
        self.shown.remove(tile.hash());
        log::debug!("remove {}, {} on screen", tile, self.shown.len());
    }
}

/// Serves generated bytes after a delay that grows with the level. Every
/// thirteenth column fails, so failure handling shows up in the log.
fn synthetic_fetcher() -> Arc<dyn TileFetcher> {
    Arc::new(FnFetcher::new(|request: TileRequest| {
        async move {
            let delay = 5 + 3 * u64::from(request.source.level);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if request.source.x.rem_euclid(13) == 12 {
                return Err(FetchError::Http {
                    status: 404,
                    url: request.url,
                });
            }
            Ok(Arc::new(request.url.into_bytes()))
        }
        .boxed()
    }))
}

fn load_options() -> Result<TileLayerOptions, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            log::info!("Loading layer options from {}", path);
            Ok(TileLayerOptions::from_json(&json)?)
        }
        None => Ok(TileLayerOptions {
            url: Some("synthetic://{s}/{z}/{x}/{y}.png".to_string()),
            ..TileLayerOptions::osm()
        }),
    }
}

/// Drain fetch results until the layer has nothing left in flight
async fn settle(layer: &mut TileLayer) {
    for _ in 0..400 {
        layer.process_tile_results();
        if layer.pending_selections() == 0
            && layer.queue().processing() == 0
            && layer.queue().is_empty()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    layer.process_tile_results();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tilescape::logging::init("info");

    let options = load_options()?;
    let mut layer = TileLayer::new(
        options,
        synthetic_fetcher(),
        Box::<ConsoleRenderer>::default(),
    )?;

    let mut view = Viewport::from_lat_lng(
        LatLng::new(48.8566, 2.3522),
        3.0,
        Point::new(1024.0, 768.0),
    );

    // zoom in, pan east, zoom back out
    let mut script: Vec<(f64, Point)> = (3..=7)
        .map(|zoom| (zoom as f64, Point::new(0.0, 0.0)))
        .collect();
    script.extend((0..4).map(|_| (7.0, Point::new(300.0, 0.0))));
    script.extend((4..=6).rev().map(|zoom| (zoom as f64, Point::new(0.0, 0.0))));

    for (step, (zoom, pan)) in script.into_iter().enumerate() {
        view.set_zoom(zoom);
        view.pan(pan);
        match layer.update(&view) {
            UpdateOutcome::Selected { tiles, drawn, pending } => log::info!(
                "step {}: zoom {:.1}, {} tiles selected, {} drawn from cache, {} loading",
                step,
                zoom,
                tiles,
                drawn,
                pending
            ),
            outcome => log::info!("step {}: zoom {:.1}, {:?}", step, zoom, outcome),
        }
        settle(&mut layer).await;
        log::info!(
            "step {}: {} tiles shown, {} cached, queue {:?}",
            step,
            layer.active_count(),
            layer.cache().len(),
            layer.queue()
        );
    }

    let mut levels: Vec<u32> = layer.active_tiles().map(|tile| tile.index().level).collect();
    levels.sort_unstable();
    levels.dedup();
    log::info!(
        "Finished with {} tiles shown across levels {:?}",
        layer.active_count(),
        levels
    );
    layer.exit();
    Ok(())
}
