//! Pure pieces of tile selection: ranges, validity and load ordering.

use super::types::{SortCenter, TileRange};
use crate::tiles::tile::TileIndex;
use std::cmp::Ordering;

/// Tiles per axis at `level` for a standard quadtree pyramid
pub fn pyramid_tiles_at(level: u32) -> (i64, i64) {
    let n = 1i64 << level.min(62);
    (n, n)
}

/// Clamp both ends of a range into `[0, n-1]` on axes that do not wrap.
/// A view entirely off the world still keeps the nearest edge tile.
pub fn clamp_range(
    mut range: TileRange,
    tiles: (i64, i64),
    wrap_x: bool,
    wrap_y: bool,
) -> TileRange {
    let clamp = |value: i64, n: i64| value.max(0).min((n - 1).max(0));
    if !wrap_x {
        range.start.0 = clamp(range.start.0, tiles.0);
        range.end.0 = clamp(range.end.0, tiles.0);
    }
    if !wrap_y {
        range.start.1 = clamp(range.start.1, tiles.1);
        range.end.1 = clamp(range.end.1, tiles.1);
    }
    range
}

/// The whole level, used for the coarsest level in keep-lower mode.
/// Wrapped axes keep the visible range.
pub fn full_range(
    mut range: TileRange,
    tiles: (i64, i64),
    wrap_x: bool,
    wrap_y: bool,
) -> TileRange {
    if !wrap_x {
        range.start.0 = 0;
        range.end.0 = tiles.0 - 1;
    }
    if !wrap_y {
        range.start.1 = 0;
        range.end.1 = tiles.1 - 1;
    }
    range
}

/// Index the content comes from: the logical index wrapped into the world
/// on the axes that wrap
pub fn source_index(index: &TileIndex, tiles: (i64, i64), wrap_x: bool, wrap_y: bool) -> TileIndex {
    TileIndex {
        x: if wrap_x { index.x.rem_euclid(tiles.0.max(1)) } else { index.x },
        y: if wrap_y { index.y.rem_euclid(tiles.1.max(1)) } else { index.y },
        ..*index
    }
}

/// Ordering reference for the range selected at the finest level.
///
/// The bottom level is found by stepping down one level for every halving
/// of the larger range dimension, so very wide views treat more of the
/// coarse levels as low priority.
pub fn sort_center(range: &TileRange, max_level: u32) -> SortCenter {
    let mut tiles = ((range.end.0 - range.start.0).max(range.end.1 - range.start.1) + 1) as f64;
    let mut bottom_level = max_level as i64;
    while tiles >= 1.0 {
        bottom_level -= 1;
        tiles /= 2.0;
    }
    SortCenter {
        level: range.level,
        x: (range.start.0 + range.end.0) as f64 / 2.0,
        y: (range.start.1 + range.end.1) as f64 / 2.0,
        bottom_level,
    }
}

/// Load order between two tiles: levels at or above the bottom level come
/// before the coarsest ones, then ascending level, then distance from the
/// view centre.
pub fn load_metric(center: &SortCenter, a: &TileIndex, b: &TileIndex) -> Ordering {
    if a.level != b.level {
        let bottom = center.bottom_level;
        let a_above = a.level as i64 >= bottom;
        let b_above = b.level as i64 >= bottom;
        if bottom != 0 && a_above != b_above {
            return if a_above {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        return a.level.cmp(&b.level);
    }

    let scale = 2f64.powi(a.level as i32 - center.level as i32);
    let cx = (center.x + 0.5) * scale - 0.5;
    let cy = (center.y + 0.5) * scale - 0.5;
    let distance = |index: &TileIndex| {
        let dx = index.x as f64 - cx;
        let dy = index.y as f64 - cy;
        dx * dx + dy * dy
    };
    distance(a).partial_cmp(&distance(b)).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(level: u32, start: (i64, i64), end: (i64, i64)) -> TileRange {
        TileRange { level, start, end }
    }

    #[test]
    fn test_clamp_only_non_wrapping_axes() {
        let clamped = clamp_range(range(2, (-2, -1), (5, 6)), (4, 4), true, false);
        assert_eq!(clamped.start, (-2, 0));
        assert_eq!(clamped.end, (5, 3));

        let off_world = clamp_range(range(2, (6, 0), (9, 1)), (4, 4), false, false);
        assert_eq!((off_world.start.0, off_world.end.0), (3, 3));
    }

    #[test]
    fn test_source_index_wraps() {
        let source = source_index(&TileIndex::new(2, -1, 5), (4, 4), true, true);
        assert_eq!((source.x, source.y), (3, 1));
        let source = source_index(&TileIndex::new(2, -1, 5), (4, 4), true, false);
        assert_eq!((source.x, source.y), (3, 5));
    }

    #[test]
    fn test_sort_center_and_bottom_level() {
        let center = sort_center(&range(5, (2, 2), (5, 3)), 5);
        assert_eq!((center.x, center.y), (3.5, 2.5));
        // 4 tiles wide: 4, 2, 1 -> three halvings
        assert_eq!(center.bottom_level, 2);
    }

    #[test]
    fn test_metric_prefers_center_then_level() {
        let center = SortCenter {
            level: 3,
            x: 4.0,
            y: 4.0,
            bottom_level: 0,
        };
        let near = TileIndex::new(3, 4, 4);
        let far = TileIndex::new(3, 7, 1);
        assert_eq!(load_metric(&center, &near, &far), Ordering::Less);
        assert_eq!(
            load_metric(&center, &TileIndex::new(1, 0, 0), &near),
            Ordering::Less
        );
    }

    #[test]
    fn test_metric_bottom_level_threshold() {
        let center = SortCenter {
            level: 6,
            x: 0.0,
            y: 0.0,
            bottom_level: 4,
        };
        let coarse = TileIndex::new(2, 0, 0);
        let fine = TileIndex::new(5, 0, 0);
        assert_eq!(load_metric(&center, &fine, &coarse), Ordering::Less);
        assert_eq!(
            load_metric(&center, &TileIndex::new(4, 0, 0), &fine),
            Ordering::Less
        );
    }

    #[test]
    fn test_metric_scales_center_to_level() {
        let center = SortCenter {
            level: 4,
            x: 8.0,
            y: 8.0,
            bottom_level: 0,
        };
        // at level 3 the centre is near (3.75, 3.75)
        let a = TileIndex::new(3, 4, 4);
        let b = TileIndex::new(3, 2, 2);
        assert_eq!(load_metric(&center, &a, &b), Ordering::Less);
    }
}
