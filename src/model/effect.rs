//! Lifecycle-managed effects attached to units (conditions, persistent
//! damage, afflictions, temporary hit points).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTiming {
    TurnStart,
    TurnEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    pub effect_id: String,
    pub kind: String,
    pub source_unit_id: Option<String>,
    pub target_unit_id: Option<String>,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    #[serde(default)]
    pub duration_rounds: Option<i64>,
    #[serde(default)]
    pub tick_timing: Option<TickTiming>,
}
