//! Objective evaluation for scenario-driven encounters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::battle::BattleState;

fn obj_str(objective: &Value, key: &str, default: &str) -> String {
    objective.get(key).and_then(|v| v.as_str()).unwrap_or(default).to_string()
}

fn obj_int(objective: &Value, key: &str, default: i64) -> i64 {
    objective.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

fn objective_met(state: &BattleState, objective: &Value) -> bool {
    let kind = obj_str(objective, "type", "");
    match kind.as_str() {
        "team_eliminated" => {
            let team = obj_str(objective, "team", "");
            !team.is_empty() && !state.units.values().any(|u| u.alive() && u.team == team)
        }
        "unit_reach_tile" => {
            let unit_id = obj_str(objective, "unit_id", "");
            match state.units.get(&unit_id) {
                Some(unit) if unit.alive() => {
                    unit.x == obj_int(objective, "x", -99999) && unit.y == obj_int(objective, "y", -99999)
                }
                _ => false,
            }
        }
        "flag_set" => {
            let flag = obj_str(objective, "flag", "");
            let expected = objective.get("value").and_then(|v| v.as_bool()).unwrap_or(true);
            !flag.is_empty() && state.flags.get(&flag).copied().unwrap_or(false) == expected
        }
        "round_at_least" => state.round_number >= obj_int(objective, "round", 0),
        "unit_dead" => {
            let unit_id = obj_str(objective, "unit_id", "");
            matches!(state.units.get(&unit_id), Some(unit) if !unit.alive())
        }
        "unit_alive" => {
            let unit_id = obj_str(objective, "unit_id", "");
            matches!(state.units.get(&unit_id), Some(unit) if unit.alive())
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveEvaluation {
    pub statuses: HashMap<String, bool>,
    pub victory_met: bool,
    pub defeat_met: bool,
    pub victory_objectives: Vec<String>,
    pub defeat_objectives: Vec<String>,
}

/// Splits objectives into victory/defeat sets by `result` and checks them
/// against current state. Victory requires a non-empty victory set where
/// every objective is met; defeat fires if any defeat-tagged objective is met.
pub fn evaluate_objectives(state: &BattleState, objectives: &[Value]) -> ObjectiveEvaluation {
    let mut statuses = HashMap::new();
    let mut victory_ids = Vec::new();
    let mut defeat_ids = Vec::new();

    for (idx, objective) in objectives.iter().enumerate() {
        let objective_id = objective
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("objective_{}", idx + 1));
        let met = objective_met(state, objective);
        statuses.insert(objective_id.clone(), met);
        let result = obj_str(objective, "result", "victory").to_lowercase();
        if result == "defeat" {
            defeat_ids.push(objective_id);
        } else {
            victory_ids.push(objective_id);
        }
    }

    let victory_met = !victory_ids.is_empty() && victory_ids.iter().all(|id| *statuses.get(id).unwrap_or(&false));
    let defeat_met = defeat_ids.iter().any(|id| *statuses.get(id).unwrap_or(&false));

    ObjectiveEvaluation {
        statuses,
        victory_met,
        defeat_met,
        victory_objectives: victory_ids,
        defeat_objectives: defeat_ids,
    }
}

/// Synthesizes raw objectives from higher-level objective packs
/// (`eliminate_team`, `escape_unit`, `holdout`) and appends them to the
/// scenario's explicit objective list.
pub fn expand_objective_packs(objectives: &[Value], objective_packs: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = objectives.to_vec();

    for (idx, pack) in objective_packs.iter().enumerate() {
        let pack_id = pack.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_else(|| format!("pack_{}", idx + 1));
        let pack_type = obj_str(pack, "type", "");

        match pack_type.as_str() {
            "eliminate_team" => {
                out.push(serde_json::json!({
                    "id": format!("{pack_id}_eliminate_team"),
                    "type": "team_eliminated",
                    "team": obj_str(pack, "team", ""),
                    "result": obj_str(pack, "result", "victory"),
                }));
            }
            "escape_unit" => {
                let unit_id = obj_str(pack, "unit_id", "");
                out.push(serde_json::json!({
                    "id": format!("{pack_id}_escape"),
                    "type": "unit_reach_tile",
                    "unit_id": unit_id,
                    "x": obj_int(pack, "x", 0),
                    "y": obj_int(pack, "y", 0),
                    "result": "victory",
                }));
                let defeat_on_death = pack.get("defeat_on_death").and_then(|v| v.as_bool()).unwrap_or(true);
                if defeat_on_death {
                    out.push(serde_json::json!({
                        "id": format!("{pack_id}_unit_dead"),
                        "type": "unit_dead",
                        "unit_id": unit_id,
                        "result": "defeat",
                    }));
                }
            }
            "holdout" => {
                out.push(serde_json::json!({
                    "id": format!("{pack_id}_holdout_rounds"),
                    "type": "round_at_least",
                    "round": obj_int(pack, "round", 1),
                    "result": "victory",
                }));
                if let Some(protect_team) = pack.get("protect_team").and_then(|v| v.as_str()) {
                    if !protect_team.is_empty() {
                        out.push(serde_json::json!({
                            "id": format!("{pack_id}_protect_team"),
                            "type": "team_eliminated",
                            "team": protect_team,
                            "result": "defeat",
                        }));
                    }
                }
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::map::MapState;
    use crate::model::unit::UnitState;
    use serde_json::json;
    use std::collections::HashMap;

    fn unit(id: &str, team: &str, hp: i64) -> UnitState {
        UnitState {
            unit_id: id.to_string(),
            team: team.to_string(),
            hp,
            x: 0,
            y: 0,
            max_hp: 10,
            initiative: 0,
            attack_mod: 0,
            ac: 10,
            damage: "1d4".to_string(),
            temp_hp: 0,
            temp_hp_source: None,
            temp_hp_owner_effect_id: None,
            attack_damage_type: "physical".to_string(),
            attack_damage_bypass: Vec::new(),
            fortitude: 0,
            reflex: 0,
            will: 0,
            actions_remaining: 3,
            reaction_available: true,
            conditions: HashMap::new(),
            condition_immunities: Vec::new(),
            resistances: HashMap::new(),
            weaknesses: HashMap::new(),
            immunities: Vec::new(),
        }
    }

    fn state_with(units: Vec<UnitState>) -> BattleState {
        let mut map = HashMap::new();
        for unit in units {
            map.insert(unit.unit_id.clone(), unit);
        }
        BattleState {
            battle_id: "b1".to_string(),
            seed: 1,
            round_number: 1,
            turn_index: 0,
            turn_order: map.keys().cloned().collect(),
            units: map,
            battle_map: MapState { width: 5, height: 5, blocked: Vec::new() },
            effects: HashMap::new(),
            flags: HashMap::new(),
            event_sequence: 0,
        }
    }

    #[test]
    fn team_eliminated_requires_no_living_members() {
        let state = state_with(vec![unit("goblin", "enemy", 0)]);
        let objectives = vec![json!({"type": "team_eliminated", "team": "enemy", "result": "victory"})];
        let result = evaluate_objectives(&state, &objectives);
        assert!(result.victory_met);
        assert!(!result.defeat_met);
    }

    #[test]
    fn defeat_met_when_any_defeat_objective_true() {
        let state = state_with(vec![unit("hero", "party", 0)]);
        let objectives = vec![json!({"id": "hero_down", "type": "unit_dead", "unit_id": "hero", "result": "defeat"})];
        let result = evaluate_objectives(&state, &objectives);
        assert!(!result.victory_met);
        assert!(result.defeat_met);
    }

    #[test]
    fn expand_escape_unit_pack_adds_defeat_on_death() {
        let packs = vec![json!({"id": "p1", "type": "escape_unit", "unit_id": "vip", "x": 4, "y": 4})];
        let expanded = expand_objective_packs(&[], &packs);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0]["type"], "unit_reach_tile");
        assert_eq!(expanded[1]["type"], "unit_dead");
        assert_eq!(expanded[1]["result"], "defeat");
    }

    #[test]
    fn expand_holdout_pack_without_protect_team() {
        let packs = vec![json!({"id": "p1", "type": "holdout", "round": 3})];
        let expanded = expand_objective_packs(&[], &packs);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0]["type"], "round_at_least");
        assert_eq!(expanded[0]["round"], 3);
    }
}
