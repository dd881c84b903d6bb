use crate::prelude::HashMap;
use crate::tiles::tile::{Tile, TileIndex};

/// Sparse quadtree of drawn tiles, `level -> x -> y -> tile`
#[derive(Debug, Default)]
pub struct CoverageTree {
    levels: HashMap<u32, HashMap<i64, HashMap<i64, Tile>>>,
}

impl CoverageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile: Tile) {
        let index = tile.index();
        self.levels
            .entry(index.level)
            .or_default()
            .entry(index.x)
            .or_default()
            .insert(index.y, tile);
    }

    pub fn get(&self, index: &TileIndex) -> Option<&Tile> {
        self.levels.get(&index.level)?.get(&index.x)?.get(&index.y)
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels
            .values()
            .flat_map(|columns| columns.values())
            .map(|column| column.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles hiding `index`: its parent one level up, or all four children
    /// one level down. Only adjacent levels are checked.
    pub fn covering(&self, index: &TileIndex) -> Option<Vec<Tile>> {
        if let Some(parent) = index.parent().and_then(|parent| self.get(&parent)) {
            return Some(vec![parent.clone()]);
        }
        let children: Vec<Tile> = index
            .children()
            .iter()
            .filter_map(|child| self.get(child).cloned())
            .collect();
        (children.len() == 4).then_some(children)
    }
}
