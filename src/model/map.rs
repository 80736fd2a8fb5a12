//! Battle map state: bounds and blocked tiles.

use serde::{Deserialize, Serialize};

use crate::grid::{GridMap, Tile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapState {
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub blocked: Vec<Tile>,
}

impl GridMap for MapState {
    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    fn is_blocked(&self, x: i64, y: i64) -> bool {
        self.blocked.contains(&(x, y))
    }
}

impl MapState {
    pub fn is_occupied(&self, units: &std::collections::HashMap<String, super::unit::UnitState>, x: i64, y: i64) -> bool {
        units.values().any(|unit| unit.alive() && unit.x == x && unit.y == y)
    }
}
