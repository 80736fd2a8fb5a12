//! Top-level battle state: the single value threaded through every reducer
//! call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::effect::EffectState;
use crate::model::map::MapState;
use crate::model::unit::UnitState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub battle_id: String,
    pub seed: u64,
    pub round_number: i64,
    pub turn_index: usize,
    pub turn_order: Vec<String>,
    pub units: HashMap<String, UnitState>,
    pub battle_map: MapState,
    #[serde(default)]
    pub effects: HashMap<String, EffectState>,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
    #[serde(default)]
    pub event_sequence: i64,
}

impl BattleState {
    pub fn active_unit_id(&self) -> &str {
        &self.turn_order[self.turn_index]
    }

    pub fn active_unit(&self) -> &UnitState {
        &self.units[self.active_unit_id()]
    }

    pub fn active_unit_mut(&mut self) -> &mut UnitState {
        let id = self.active_unit_id().to_string();
        self.units.get_mut(&id).expect("active unit must exist")
    }
}
