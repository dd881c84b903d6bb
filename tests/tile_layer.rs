mod common;

use common::*;
use tilescape::layers::tile::UpdateOutcome;
use tilescape::tiles::{TilePhase, TileUrl};
use tilescape::{FetchError, FetchQueue, QueueOptions, TileLayerOptions};

/// Scenarios a viewer hits while panning and zooming over a tile layer
#[cfg(test)]
mod tile_layer_tests {
    use super::*;

    /// A 2x2 view at level 2 selects exactly those four tiles, fetched
    /// two at a time in load order
    #[tokio::test]
    async fn test_two_by_two_selection_at_level_two() {
        let fetcher = ManualFetcher::new();
        let (mut layer, ops) = layer_with(replace_options(), fetcher.clone());
        let view = view_at(2.0);

        let outcome = layer.update(&view);
        assert_eq!(
            outcome,
            UpdateOutcome::Selected {
                tiles: 4,
                drawn: 0,
                pending: 4
            }
        );
        settle().await;
        assert_eq!(fetcher.in_flight(), vec!["mem://2/0/0", "mem://2/0/1"]);
        assert_eq!(layer.queue().len(), 2);

        load_everything(&fetcher, &mut layer).await;
        let mut requested = fetcher.requested();
        requested.sort();
        assert_eq!(
            requested,
            vec!["mem://2/0/0", "mem://2/0/1", "mem://2/1/0", "mem://2/1/1"]
        );
        assert_eq!(active_at(&layer, 2), 4);
        assert_eq!(layer.active_count(), 4);
        assert_eq!(ops.lock().unwrap().len(), 4);
        assert_eq!(layer.pending_selections(), 0);
    }

    /// In keep-lower mode finer tiles stay until the coarser replacement
    /// has loaded, and the coarsest level is never purged
    #[tokio::test]
    async fn test_keep_lower_purges_finer_levels_after_zoom_out() {
        let fetcher = ManualFetcher::new();
        let options = TileLayerOptions {
            keep_lower: true,
            ..replace_options()
        };
        let (mut layer, ops) = layer_with(options, fetcher.clone());

        layer.update(&view_at(2.0));
        load_everything(&fetcher, &mut layer).await;
        assert_eq!(active_at(&layer, 0), 1);
        assert_eq!(active_at(&layer, 1), 1);
        assert_eq!(active_at(&layer, 2), 4);

        let outcome = layer.update(&view_at(1.0));
        assert_eq!(
            outcome,
            UpdateOutcome::Selected {
                tiles: 5,
                drawn: 2,
                pending: 3
            }
        );
        assert_eq!(active_at(&layer, 2), 4);
        assert!(ops.lock().unwrap().contains(&RenderOp::Top("0_0_0_0".to_string())));

        load_everything(&fetcher, &mut layer).await;
        assert_eq!(active_at(&layer, 0), 1);
        assert_eq!(active_at(&layer, 1), 4);
        assert_eq!(active_at(&layer, 2), 0);
        assert!(ops.lock().unwrap().contains(&RenderOp::Remove("2_1_1_0".to_string())));
    }

    /// In replace mode the old level is dropped only once the whole new
    /// selection has loaded
    #[tokio::test]
    async fn test_replace_mode_purges_after_loading() {
        let fetcher = ManualFetcher::new();
        let (mut layer, _) = layer_with(replace_options(), fetcher.clone());

        layer.update(&view_at(2.0));
        load_everything(&fetcher, &mut layer).await;
        assert_eq!(active_at(&layer, 2), 4);

        layer.update(&view_at(3.0));
        settle().await;
        assert_eq!(fetcher.in_flight(), vec!["mem://3/1/1", "mem://3/1/2"]);
        fetcher.complete("mem://3/1/1");
        fetcher.complete("mem://3/1/2");
        settle().await;
        layer.process_tile_results();
        assert_eq!(active_at(&layer, 3), 2);
        assert_eq!(active_at(&layer, 2), 4);
        assert_eq!(layer.pending_selections(), 1);

        load_everything(&fetcher, &mut layer).await;
        assert_eq!(active_at(&layer, 3), 4);
        assert_eq!(active_at(&layer, 2), 0);
        assert_eq!(layer.coverage().len(), 4);
    }

    /// A tile that fails to load is never shown and does not hold up the
    /// rest of the selection
    #[tokio::test]
    async fn test_failed_tile_is_removed() {
        let fetcher = ManualFetcher::new();
        let (mut layer, ops) = layer_with(replace_options(), fetcher.clone());
        layer.update(&view_at(2.0));
        settle().await;

        assert!(fetcher.fail(
            "mem://2/0/1",
            FetchError::Http {
                status: 404,
                url: "mem://2/0/1".to_string(),
            },
        ));
        load_everything(&fetcher, &mut layer).await;

        assert_eq!(layer.active_count(), 3);
        assert!(!layer.is_active("2_1_0_0"));
        assert!(!ops.lock().unwrap().contains(&RenderOp::Draw("2_1_0_0".to_string())));
        let failed = layer.cache().peek("2_1_0_0").unwrap();
        assert_eq!(failed.phase(), TilePhase::Failed);
        assert!(matches!(failed.error(), Some(FetchError::Http { status: 404, .. })));
        assert_eq!(layer.pending_selections(), 0);
    }

    /// Two layers sharing one queue: tiles a reset layer no longer caches
    /// are discarded instead of fetched
    #[tokio::test]
    async fn test_shared_queue_discards_unneeded_tiles() {
        let shared = FetchQueue::new(QueueOptions {
            size: 1,
            ..QueueOptions::default()
        });
        let fetch_a = ManualFetcher::new();
        let fetch_b = ManualFetcher::new();
        let (layer_a, _) = layer_with(replace_options(), fetch_a.clone());
        let mut layer_a = layer_a.with_queue(shared.clone());
        let options_b = TileLayerOptions {
            url: Some("b://{z}/{x}/{y}".to_string()),
            ..replace_options()
        };
        let (layer_b, _) = layer_with(options_b, fetch_b.clone());
        let mut layer_b = layer_b.with_queue(shared.clone());
        assert_eq!(shared.demand_count(), 2);

        let view = view_at(2.0);
        layer_a.update(&view);
        layer_b.update(&view);
        settle().await;
        assert_eq!(fetch_a.in_flight(), vec!["mem://2/0/0"]);
        assert!(fetch_b.in_flight().is_empty());
        assert_eq!(shared.len(), 7);

        layer_a.reset();
        loop {
            settle().await;
            if fetch_a.complete_all() + fetch_b.complete_all() == 0 {
                break;
            }
        }
        layer_a.process_tile_results();
        layer_b.process_tile_results();

        assert_eq!(fetch_a.requested(), vec!["mem://2/0/0"]);
        assert_eq!(fetch_b.requested().len(), 4);
        assert_eq!(layer_a.active_count(), 0);
        assert_eq!(layer_a.pending_selections(), 0);
        assert_eq!(layer_b.active_count(), 4);
        assert!(shared.is_empty());
        assert_eq!(shared.processing(), 0);
    }

    /// Prefetching loads without drawing; the next update draws straight
    /// from the cache
    #[tokio::test]
    async fn test_prefetch_then_update_draws_from_cache() {
        let fetcher = ManualFetcher::new();
        let (mut layer, _) = layer_with(replace_options(), fetcher.clone());
        let view = view_at(2.0);

        let prefetch = tokio::spawn(layer.prefetch(2, &view.bounds(), &view));
        loop {
            settle().await;
            if fetcher.complete_all() == 0 {
                break;
            }
        }
        let results = prefetch.await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(layer.active_count(), 0);
        assert_eq!(layer.cache().len(), 4);

        let outcome = layer.update(&view);
        assert_eq!(
            outcome,
            UpdateOutcome::Selected {
                tiles: 4,
                drawn: 4,
                pending: 0
            }
        );
        assert_eq!(fetcher.requested().len(), 4);
    }

    /// Changing the url drops everything and refetches from the new source
    #[tokio::test]
    async fn test_url_change_refetches() {
        let fetcher = ManualFetcher::new();
        let (mut layer, ops) = layer_with(replace_options(), fetcher.clone());
        let view = view_at(2.0);
        layer.update(&view);
        load_everything(&fetcher, &mut layer).await;

        assert!(layer.set_url(TileUrl::template("other://{z}/{x}/{y}").unwrap()));
        assert_eq!(layer.active_count(), 0);
        let removed = ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, RenderOp::Remove(_)))
            .count();
        assert_eq!(removed, 4);

        layer.update(&view);
        load_everything(&fetcher, &mut layer).await;
        assert_eq!(layer.active_count(), 4);
        assert!(fetcher.requested().contains(&"other://2/1/1".to_string()));
        assert!(layer.active_tiles().all(|tile| tile.url().starts_with("other://")));
    }

    /// Tiles still waiting in the queue when the layer exits are never
    /// fetched
    #[tokio::test]
    async fn test_exit_discards_queued_tiles() {
        let fetcher = ManualFetcher::new();
        let (mut layer, ops) = layer_with(replace_options(), fetcher.clone());
        layer.update(&view_at(2.0));
        settle().await;
        assert_eq!(fetcher.requested().len(), 2);
        assert_eq!(layer.queue().len(), 2);

        layer.exit();
        loop {
            settle().await;
            if fetcher.complete_all() == 0 {
                break;
            }
        }
        layer.process_tile_results();

        assert_eq!(fetcher.requested().len(), 2);
        assert!(layer.queue().is_empty());
        assert_eq!(layer.queue().processing(), 0);
        assert!(!ops
            .lock()
            .unwrap()
            .iter()
            .any(|op| matches!(op, RenderOp::Draw(_))));
    }

    /// An unchanged view neither reselects nor resubmits anything
    #[tokio::test]
    async fn test_same_view_is_unchanged() {
        let fetcher = ManualFetcher::new();
        let (mut layer, _) = layer_with(replace_options(), fetcher.clone());
        let view = view_at(2.0);
        layer.update(&view);
        assert_eq!(layer.update(&view), UpdateOutcome::Unchanged);
        load_everything(&fetcher, &mut layer).await;
        assert_eq!(fetcher.requested().len(), 4);
    }
}
