//! The tagged-union command contract driving the reducer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::effect::TickTiming;
use crate::model::unit::UnitState;
use crate::rules::SaveType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    AsConfigured,
    Explicit,
    NearestEnemy,
    NearestEnemyAreaCenter,
    AllEnemies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    Exact,
    NearestOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Move {
        actor: String,
        x: i64,
        y: i64,
    },
    Strike {
        actor: String,
        target: String,
    },
    EndTurn {
        actor: String,
    },
    SaveDamage {
        actor: String,
        target: String,
        dc: i64,
        save_type: SaveType,
        damage: String,
        mode: Mode,
    },
    AreaSaveDamage {
        actor: String,
        center_x: i64,
        center_y: i64,
        radius_feet: i64,
        dc: i64,
        save_type: SaveType,
        damage: String,
        mode: Mode,
        include_actor: bool,
    },
    ApplyEffect {
        actor: String,
        target: String,
        effect_kind: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        duration_rounds: Option<i64>,
        #[serde(default)]
        tick_timing: Option<TickTiming>,
    },
    TriggerHazardSource {
        actor: String,
        hazard_id: String,
        source_name: String,
        source_type: String,
        #[serde(default)]
        center_x: Option<i64>,
        #[serde(default)]
        center_y: Option<i64>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        model_path: Option<String>,
    },
    RunHazardRoutine {
        actor: String,
        hazard_id: String,
        source_name: String,
        source_type: String,
        target_policy: TargetPolicy,
        #[serde(default)]
        center_x: Option<i64>,
        #[serde(default)]
        center_y: Option<i64>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        model_path: Option<String>,
    },
    SetFlag {
        actor: String,
        flag: String,
        value: bool,
    },
    SpawnUnit {
        actor: String,
        unit: UnitState,
        placement_policy: PlacementPolicy,
        spend_action: bool,
    },
    CastSpell {
        actor: String,
        spell_id: String,
        target: String,
        dc: i64,
        save_type: SaveType,
        damage: String,
        mode: Mode,
        action_cost: i64,
        damage_type: String,
        #[serde(default)]
        damage_bypass: Vec<String>,
        #[serde(default)]
        content_entry_id: Option<String>,
    },
    UseFeat {
        actor: String,
        feat_id: String,
        target: String,
        effect_kind: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        duration_rounds: Option<i64>,
        #[serde(default)]
        tick_timing: Option<TickTiming>,
        action_cost: i64,
        #[serde(default)]
        content_entry_id: Option<String>,
    },
    UseItem {
        actor: String,
        item_id: String,
        target: String,
        effect_kind: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        duration_rounds: Option<i64>,
        #[serde(default)]
        tick_timing: Option<TickTiming>,
        action_cost: i64,
        #[serde(default)]
        content_entry_id: Option<String>,
    },
    Interact {
        actor: String,
        interact_id: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        effect_kind: Option<String>,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        duration_rounds: Option<i64>,
        #[serde(default)]
        tick_timing: Option<TickTiming>,
        action_cost: i64,
        #[serde(default)]
        flag: Option<String>,
        #[serde(default)]
        value: bool,
        #[serde(default)]
        content_entry_id: Option<String>,
    },
}

impl Command {
    pub fn actor(&self) -> &str {
        match self {
            Command::Move { actor, .. }
            | Command::Strike { actor, .. }
            | Command::EndTurn { actor }
            | Command::SaveDamage { actor, .. }
            | Command::AreaSaveDamage { actor, .. }
            | Command::ApplyEffect { actor, .. }
            | Command::TriggerHazardSource { actor, .. }
            | Command::RunHazardRoutine { actor, .. }
            | Command::SetFlag { actor, .. }
            | Command::SpawnUnit { actor, .. }
            | Command::CastSpell { actor, .. }
            | Command::UseFeat { actor, .. }
            | Command::UseItem { actor, .. }
            | Command::Interact { actor, .. } => actor,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Strike { .. } => "strike",
            Command::EndTurn { .. } => "end_turn",
            Command::SaveDamage { .. } => "save_damage",
            Command::AreaSaveDamage { .. } => "area_save_damage",
            Command::ApplyEffect { .. } => "apply_effect",
            Command::TriggerHazardSource { .. } => "trigger_hazard_source",
            Command::RunHazardRoutine { .. } => "run_hazard_routine",
            Command::SetFlag { .. } => "set_flag",
            Command::SpawnUnit { .. } => "spawn_unit",
            Command::CastSpell { .. } => "cast_spell",
            Command::UseFeat { .. } => "use_feat",
            Command::UseItem { .. } => "use_item",
            Command::Interact { .. } => "interact",
        }
    }
}
