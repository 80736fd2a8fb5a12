//! Battle unit state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub unit_id: String,
    pub team: String,
    pub hp: i64,
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub initiative: i64,
    #[serde(default)]
    pub attack_mod: i64,
    #[serde(default = "default_ac")]
    pub ac: i64,
    #[serde(default = "default_damage")]
    pub damage: String,
    #[serde(default)]
    pub temp_hp: i64,
    #[serde(default)]
    pub temp_hp_source: Option<String>,
    #[serde(default)]
    pub temp_hp_owner_effect_id: Option<String>,
    #[serde(default = "default_attack_damage_type")]
    pub attack_damage_type: String,
    #[serde(default)]
    pub attack_damage_bypass: Vec<String>,
    #[serde(default)]
    pub fortitude: i64,
    #[serde(default)]
    pub reflex: i64,
    #[serde(default)]
    pub will: i64,
    #[serde(default = "default_actions_remaining")]
    pub actions_remaining: i64,
    #[serde(default = "default_true")]
    pub reaction_available: bool,
    #[serde(default)]
    pub conditions: HashMap<String, i64>,
    #[serde(default)]
    pub condition_immunities: Vec<String>,
    #[serde(default)]
    pub resistances: HashMap<String, i64>,
    #[serde(default)]
    pub weaknesses: HashMap<String, i64>,
    #[serde(default)]
    pub immunities: Vec<String>,
}

fn default_ac() -> i64 {
    10
}

fn default_damage() -> String {
    "1d1".to_string()
}

fn default_attack_damage_type() -> String {
    "physical".to_string()
}

fn default_actions_remaining() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

impl UnitState {
    pub fn alive(&self) -> bool {
        self.hp > 0
    }

    /// Mirrors the defaulting a freshly spawned unit gets in the original
    /// dict-based spawn payload: `max_hp` falls back to `hp`, and the
    /// condition/resistance/weakness/immunity keys are lowercased.
    pub fn apply_spawn_defaults(&mut self) {
        if self.max_hp <= 0 {
            self.max_hp = self.hp;
        }
        self.condition_immunities = self.condition_immunities.iter().map(|s| s.to_lowercase()).collect();
        self.immunities = self.immunities.iter().map(|s| s.to_lowercase()).collect();
        self.resistances = self.resistances.iter().map(|(k, v)| (k.to_lowercase(), *v)).collect();
        self.weaknesses = self.weaknesses.iter().map(|(k, v)| (k.to_lowercase(), *v)).collect();
        self.attack_damage_type = self.attack_damage_type.to_lowercase();
        self.attack_damage_bypass = self.attack_damage_bypass.iter().map(|s| s.to_lowercase()).collect();
    }
}

impl crate::grid::loe::PositionedUnit for UnitState {
    fn is_alive(&self) -> bool {
        self.alive()
    }

    fn position(&self) -> (i64, i64) {
        (self.x, self.y)
    }
}
