//! Scenario loading and structural validation.
//!
//! Validation runs against raw JSON, not the typed `Command` enum: scenario
//! files describe commands (and mission/wave/routine command blocks) before
//! `content_entry_id` templates are materialized, so the shape checks here
//! are deliberately looser than the reducer's own command contract.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::ScenarioError;
use crate::model::battle::BattleState;
use crate::model::map::MapState;
use crate::model::unit::UnitState;
use crate::turn_order::build_turn_order;

fn fail(message: impl Into<String>) -> ScenarioError {
    ScenarioError::Validation(message.into())
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        Err(fail(message))
    }
}

fn non_empty_str(value: &Value) -> bool {
    matches!(value.as_str(), Some(s) if !s.is_empty())
}

fn str_list(value: &Value) -> Option<&Vec<Value>> {
    value.as_array()
}

const SAVE_TYPES: [&str; 3] = ["Fortitude", "Reflex", "Will"];

fn validate_unit_shape(unit: &Value, context: &str) -> Result<(), ScenarioError> {
    let obj = unit.as_object().ok_or_else(|| fail(format!("{context} must be object")))?;
    for key in ["id", "team", "hp", "position", "initiative", "attack_mod", "ac", "damage"] {
        require(obj.contains_key(key), format!("{context} missing key: {key}"))?;
    }
    require(non_empty_str(&obj["id"]), format!("{context}.id must be non-empty string"))?;
    require(non_empty_str(&obj["team"]), format!("{context}.team must be non-empty string"))?;
    require(matches!(obj["hp"].as_i64(), Some(h) if h > 0), format!("{context}.hp must be positive int"))?;

    if let Some(temp_hp) = obj.get("temp_hp") {
        if !temp_hp.is_null() {
            require(matches!(temp_hp.as_i64(), Some(v) if v >= 0), format!("{context}.temp_hp must be non-negative int"))?;
        }
    }

    let pos = obj["position"].as_array();
    require(matches!(pos, Some(p) if p.len() == 2), format!("{context}.position must be [x, y]"))?;
    let pos = pos.unwrap();
    require(pos[0].is_i64() && pos[1].is_i64(), format!("{context}.position values must be ints"))?;

    if let Some(attack_damage_type) = obj.get("attack_damage_type") {
        if !attack_damage_type.is_null() {
            require(non_empty_str(attack_damage_type), format!("{context}.attack_damage_type must be non-empty string"))?;
        }
    }

    if let Some(bypass) = obj.get("attack_damage_bypass") {
        if !bypass.is_null() {
            let items = str_list(bypass).ok_or_else(|| fail(format!("{context}.attack_damage_bypass must be list")))?;
            for (idx, item) in items.iter().enumerate() {
                require(non_empty_str(item), format!("{context}.attack_damage_bypass[{idx}] must be non-empty string"))?;
            }
        }
    }

    for field_name in ["resistances", "weaknesses"] {
        if let Some(raw) = obj.get(field_name) {
            if raw.is_null() {
                continue;
            }
            let map = raw.as_object().ok_or_else(|| fail(format!("{context}.{field_name} must be object")))?;
            for (k, v) in map {
                require(!k.is_empty(), format!("{context}.{field_name} keys must be non-empty strings"))?;
                require(matches!(v.as_i64(), Some(n) if n >= 0), format!("{context}.{field_name}[{k}] must be non-negative int"))?;
            }
        }
    }

    if let Some(immunities) = obj.get("immunities") {
        if !immunities.is_null() {
            let items = str_list(immunities).ok_or_else(|| fail(format!("{context}.immunities must be list")))?;
            for (idx, item) in items.iter().enumerate() {
                require(non_empty_str(item), format!("{context}.immunities[{idx}] must be non-empty string"))?;
            }
        }
    }

    if let Some(condition_immunities) = obj.get("condition_immunities") {
        if !condition_immunities.is_null() {
            let items = str_list(condition_immunities).ok_or_else(|| fail(format!("{context}.condition_immunities must be list")))?;
            for (idx, item) in items.iter().enumerate() {
                require(non_empty_str(item), format!("{context}.condition_immunities[{idx}] must be non-empty string"))?;
            }
        }
    }

    Ok(())
}

fn validate_damage_bypass_field(cmd: &serde_json::Map<String, Value>, prefix: &str, context: &str) -> Result<(), ScenarioError> {
    if let Some(bypass) = cmd.get("damage_bypass") {
        let items = str_list(bypass).ok_or_else(|| fail(format!("{context} {prefix} damage_bypass must be list")))?;
        for (idx, item) in items.iter().enumerate() {
            require(non_empty_str(item), format!("{context} {prefix} damage_bypass[{idx}] must be non-empty string"))?;
        }
    }
    Ok(())
}

fn validate_command(cmd: &Value, known_unit_ids: &mut HashSet<String>, context: &str, actor_required: bool) -> Result<(), ScenarioError> {
    let obj = cmd.as_object().ok_or_else(|| fail(format!("{context} must be object")))?;
    require(obj.contains_key("type"), format!("{context} requires type"))?;
    let ctype = obj["type"].as_str().unwrap_or_default();
    const KNOWN_TYPES: [&str; 13] = [
        "move",
        "strike",
        "end_turn",
        "save_damage",
        "area_save_damage",
        "apply_effect",
        "trigger_hazard_source",
        "run_hazard_routine",
        "set_flag",
        "spawn_unit",
        "cast_spell",
        "use_feat",
        "use_item",
    ];
    require(KNOWN_TYPES.contains(&ctype), format!("{context} unsupported command type: {ctype}"))?;

    match obj.get("actor") {
        Some(actor) if actor.is_string() => {
            let actor = actor.as_str().unwrap();
            require(known_unit_ids.contains(actor), format!("{context} actor not found: {actor}"))?;
        }
        Some(actor) if !actor.is_null() => {
            return Err(fail(format!("{context}.actor must be string when present")));
        }
        _ => {
            require(!actor_required, format!("{context} requires actor"))?;
        }
    }

    if let Some(target) = obj.get("target") {
        if !target.is_null() {
            let target_id = target.as_str().unwrap_or_default();
            require(known_unit_ids.contains(target_id), format!("{context} target not found: {target_id}"))?;
        }
    }

    match ctype {
        "move" => {
            require(obj.contains_key("x") && obj.contains_key("y"), format!("{context} move requires x and y"))?;
        }
        "strike" => {
            require(matches!(obj.get("target"), Some(t) if t.is_string()), format!("{context} strike requires target"))?;
        }
        "save_damage" => {
            for key in ["target", "dc", "save_type", "damage"] {
                require(obj.contains_key(key), format!("{context} save_damage missing key: {key}"))?;
            }
            require(
                matches!(obj["save_type"].as_str(), Some(s) if SAVE_TYPES.contains(&s)),
                format!("{context} save_damage save_type invalid"),
            )?;
            if let Some(dt) = obj.get("damage_type") {
                require(non_empty_str(dt), format!("{context} save_damage damage_type must be non-empty string"))?;
            }
            validate_damage_bypass_field(obj, "save_damage", context)?;
            if let Some(mode) = obj.get("mode") {
                require(mode.as_str() == Some("basic"), format!("{context} save_damage mode must be basic"))?;
            }
        }
        "cast_spell" => {
            for key in ["spell_id", "target", "dc", "save_type", "damage"] {
                require(obj.contains_key(key), format!("{context} cast_spell missing key: {key}"))?;
            }
            require(non_empty_str(&obj["spell_id"]), format!("{context} cast_spell spell_id must be non-empty string"))?;
            require(
                matches!(obj["save_type"].as_str(), Some(s) if SAVE_TYPES.contains(&s)),
                format!("{context} cast_spell save_type invalid"),
            )?;
            if let Some(dt) = obj.get("damage_type") {
                require(non_empty_str(dt), format!("{context} cast_spell damage_type must be non-empty string"))?;
            }
            validate_damage_bypass_field(obj, "cast_spell", context)?;
            if let Some(mode) = obj.get("mode") {
                require(mode.as_str() == Some("basic"), format!("{context} cast_spell mode must be basic"))?;
            }
            if let Some(cost) = obj.get("action_cost") {
                require(matches!(cost.as_i64(), Some(c) if c > 0), format!("{context} cast_spell action_cost must be positive int"))?;
            }
        }
        "area_save_damage" => {
            for key in ["center_x", "center_y", "radius_feet", "dc", "save_type", "damage"] {
                require(obj.contains_key(key), format!("{context} area_save_damage missing key: {key}"))?;
            }
            require(
                matches!(obj["save_type"].as_str(), Some(s) if SAVE_TYPES.contains(&s)),
                format!("{context} area_save_damage save_type invalid"),
            )?;
            if let Some(dt) = obj.get("damage_type") {
                require(non_empty_str(dt), format!("{context} area_save_damage damage_type must be non-empty string"))?;
            }
            validate_damage_bypass_field(obj, "area_save_damage", context)?;
            if let Some(mode) = obj.get("mode") {
                require(mode.as_str() == Some("basic"), format!("{context} area_save_damage mode must be basic"))?;
            }
        }
        "apply_effect" => {
            for key in ["target", "effect_kind"] {
                require(obj.contains_key(key), format!("{context} apply_effect missing key: {key}"))?;
            }
        }
        "use_feat" => {
            for key in ["feat_id", "target", "effect_kind"] {
                require(obj.contains_key(key), format!("{context} use_feat missing key: {key}"))?;
            }
            require(non_empty_str(&obj["feat_id"]), format!("{context} use_feat feat_id must be non-empty string"))?;
            if let Some(payload) = obj.get("payload") {
                require(payload.is_object(), format!("{context} use_feat payload must be object"))?;
            }
            if let Some(duration) = obj.get("duration_rounds") {
                if !duration.is_null() {
                    require(matches!(duration.as_i64(), Some(d) if d >= 0), format!("{context} use_feat duration_rounds must be non-negative int or null"))?;
                }
            }
            if let Some(timing) = obj.get("tick_timing") {
                if !timing.is_null() {
                    require(matches!(timing.as_str(), Some(t) if t == "turn_start" || t == "turn_end"), format!("{context} use_feat tick_timing invalid"))?;
                }
            }
            if let Some(cost) = obj.get("action_cost") {
                require(matches!(cost.as_i64(), Some(c) if c > 0), format!("{context} use_feat action_cost must be positive int"))?;
            }
        }
        "use_item" => {
            for key in ["item_id", "target", "effect_kind"] {
                require(obj.contains_key(key), format!("{context} use_item missing key: {key}"))?;
            }
            require(non_empty_str(&obj["item_id"]), format!("{context} use_item item_id must be non-empty string"))?;
            if let Some(payload) = obj.get("payload") {
                require(payload.is_object(), format!("{context} use_item payload must be object"))?;
            }
            if let Some(duration) = obj.get("duration_rounds") {
                if !duration.is_null() {
                    require(matches!(duration.as_i64(), Some(d) if d >= 0), format!("{context} use_item duration_rounds must be non-negative int or null"))?;
                }
            }
            if let Some(timing) = obj.get("tick_timing") {
                if !timing.is_null() {
                    require(matches!(timing.as_str(), Some(t) if t == "turn_start" || t == "turn_end"), format!("{context} use_item tick_timing invalid"))?;
                }
            }
            if let Some(cost) = obj.get("action_cost") {
                require(matches!(cost.as_i64(), Some(c) if c > 0), format!("{context} use_item action_cost must be positive int"))?;
            }
        }
        "trigger_hazard_source" => {
            for key in ["hazard_id", "source_name"] {
                require(obj.contains_key(key), format!("{context} trigger_hazard_source missing key: {key}"))?;
            }
        }
        "run_hazard_routine" => {
            for key in ["hazard_id", "source_name"] {
                require(obj.contains_key(key), format!("{context} run_hazard_routine missing key: {key}"))?;
            }
            if let Some(policy) = obj.get("target_policy") {
                const POLICIES: [&str; 5] =
                    ["as_configured", "explicit", "nearest_enemy", "nearest_enemy_area_center", "all_enemies"];
                require(matches!(policy.as_str(), Some(p) if POLICIES.contains(&p)), format!("{context} run_hazard_routine target_policy invalid"))?;
            }
        }
        "set_flag" => {
            require(obj.contains_key("flag"), format!("{context} set_flag missing key: flag"))?;
            if let Some(value) = obj.get("value") {
                require(value.is_boolean(), format!("{context} set_flag value must be bool"))?;
            }
        }
        _ => {}
    }

    if ctype == "spawn_unit" {
        let unit = obj.get("unit").ok_or_else(|| fail(format!("{context} spawn_unit requires unit object")))?;
        require(unit.is_object(), format!("{context} spawn_unit requires unit object"))?;
        validate_unit_shape(unit, &format!("{context}.unit"))?;
        let unit_id = unit["id"].as_str().unwrap_or_default();
        require(!known_unit_ids.contains(unit_id), format!("{context} spawn unit id already exists: {unit_id}"))?;
        if let Some(policy) = obj.get("placement_policy") {
            require(matches!(policy.as_str(), Some(p) if p == "exact" || p == "nearest_open"), format!("{context} spawn_unit placement_policy invalid"))?;
        }
        if let Some(spend) = obj.get("spend_action") {
            require(spend.is_boolean(), format!("{context} spawn_unit spend_action must be bool"))?;
        }
        known_unit_ids.insert(unit_id.to_string());
    }

    Ok(())
}

fn validate_command_block(
    commands: &Value,
    known_unit_ids: &HashSet<String>,
    context: &str,
    actor_required: bool,
) -> Result<HashSet<String>, ScenarioError> {
    let list = commands.as_array().ok_or_else(|| fail(format!("{context} must be list")))?;
    let mut local_known_ids = known_unit_ids.clone();
    for (cidx, cmd) in list.iter().enumerate() {
        validate_command(cmd, &mut local_known_ids, &format!("{context}[{cidx}]"), actor_required)?;
    }
    Ok(local_known_ids)
}

/// Full structural pass over a scenario document before it's turned into a
/// `BattleState`: required top-level keys, unit shapes, every command
/// (top-level and nested in missions/waves/routines), and the known-unit-id
/// namespace growing as spawns/waves/mission branches are discovered.
pub fn validate_scenario(data: &Value) -> Result<(), ScenarioError> {
    let obj = data.as_object().ok_or_else(|| fail("scenario must be object"))?;
    for key in ["battle_id", "seed", "map", "units", "commands"] {
        require(obj.contains_key(key), format!("missing required keys: {key}"))?;
    }

    let map_data = obj["map"].as_object().ok_or_else(|| fail("map must be an object"))?;
    require(matches!(map_data.get("width").and_then(|v| v.as_i64()), Some(w) if w > 0), "map.width must be positive int")?;
    require(matches!(map_data.get("height").and_then(|v| v.as_i64()), Some(h) if h > 0), "map.height must be positive int")?;

    let units = obj["units"].as_array().filter(|u| !u.is_empty()).ok_or_else(|| fail("units must be a non-empty list"))?;
    let mut unit_ids = HashSet::new();
    for unit in units {
        validate_unit_shape(unit, "unit")?;
        let unit_id = unit["id"].as_str().unwrap_or_default();
        require(!unit_ids.contains(unit_id), format!("duplicate unit id: {unit_id}"))?;
        unit_ids.insert(unit_id.to_string());
    }

    let commands = obj["commands"].as_array().ok_or_else(|| fail("commands must be list"))?;
    let mut known_ids = unit_ids.clone();
    for cmd in commands {
        validate_command(cmd, &mut known_ids, "command", true)?;
    }

    if let Some(flags) = obj.get("flags") {
        let flags_obj = flags.as_object().ok_or_else(|| fail("flags must be object when present"))?;
        for (key, value) in flags_obj {
            require(value.is_boolean(), format!("flag {key} must be bool"))?;
        }
    }

    if let Some(objectives) = obj.get("objectives") {
        let list = objectives.as_array().ok_or_else(|| fail("objectives must be list when present"))?;
        for (idx, objective) in list.iter().enumerate() {
            let obj_map = objective.as_object().ok_or_else(|| fail(format!("objective[{idx}] must be object")))?;
            require(obj_map.contains_key("id") && obj_map.contains_key("type"), format!("objective[{idx}] requires id and type"))?;
            let otype = obj_map["type"].as_str().unwrap_or_default();
            if matches!(otype, "unit_reach_tile" | "unit_dead" | "unit_alive") {
                let unit_id = obj_map.get("unit_id").and_then(|v| v.as_str());
                require(matches!(unit_id, Some(id) if known_ids.contains(id)), format!("objective[{idx}] unit_id invalid: {unit_id:?}"))?;
            }
        }
    }

    if let Some(packs) = obj.get("objective_packs") {
        let list = packs.as_array().ok_or_else(|| fail("objective_packs must be list when present"))?;
        for (idx, pack) in list.iter().enumerate() {
            let pack_map = pack.as_object().ok_or_else(|| fail(format!("objective_pack[{idx}] must be object")))?;
            require(pack_map.contains_key("type"), format!("objective_pack[{idx}] requires type"))?;
            if pack_map["type"].as_str() == Some("escape_unit") {
                let unit_id = pack_map.get("unit_id").and_then(|v| v.as_str());
                require(matches!(unit_id, Some(id) if known_ids.contains(id)), format!("objective_pack[{idx}] unit_id invalid: {unit_id:?}"))?;
            }
        }
    }

    if let Some(enemy_policy) = obj.get("enemy_policy") {
        if !enemy_policy.is_null() {
            let policy = enemy_policy.as_object().ok_or_else(|| fail("enemy_policy must be object when present"))?;
            if let Some(enabled) = policy.get("enabled") {
                require(enabled.is_boolean(), "enemy_policy.enabled must be bool")?;
            }
            if let Some(teams) = policy.get("teams") {
                let list = teams.as_array().ok_or_else(|| fail("enemy_policy.teams must be list"))?;
                for (idx, team) in list.iter().enumerate() {
                    require(non_empty_str(team), format!("enemy_policy.teams[{idx}] must be non-empty string"))?;
                }
            }
            if let Some(action) = policy.get("action") {
                require(action.as_str() == Some("strike_nearest"), "enemy_policy.action invalid")?;
            }
            if let Some(auto_end_turn) = policy.get("auto_end_turn") {
                require(auto_end_turn.is_boolean(), "enemy_policy.auto_end_turn must be bool")?;
            }
        }
    }

    if let Some(mission_events) = obj.get("mission_events") {
        let list = mission_events.as_array().ok_or_else(|| fail("mission_events must be list when present"))?;
        for (idx, mission_event) in list.iter().enumerate() {
            let me = mission_event.as_object().ok_or_else(|| fail(format!("mission_event[{idx}] must be object")))?;
            let trigger = me.get("trigger").and_then(|v| v.as_str());
            if let Some(t) = trigger {
                require(
                    matches!(t, "turn_start" | "round_start" | "unit_dead" | "unit_alive" | "flag_set"),
                    format!("mission_event[{idx}] trigger invalid: {t}"),
                )?;
            }
            let trigger_name = trigger.unwrap_or("turn_start");
            if matches!(trigger_name, "unit_dead" | "unit_alive") {
                let unit_id = me.get("unit_id").and_then(|v| v.as_str());
                require(matches!(unit_id, Some(id) if known_ids.contains(id)), format!("mission_event[{idx}] unit_id invalid for {trigger_name}: {unit_id:?}"))?;
            }
            if trigger_name == "flag_set" {
                let flag_name = me.get("flag").and_then(|v| v.as_str());
                require(matches!(flag_name, Some(f) if !f.is_empty()), format!("mission_event[{idx}] flag is required for flag_set trigger"))?;
            }
            if let Some(active_unit) = me.get("active_unit") {
                if !active_unit.is_null() {
                    let id = active_unit.as_str();
                    require(matches!(id, Some(i) if known_ids.contains(i)), format!("mission_event[{idx}] active_unit invalid: {id:?}"))?;
                }
            }

            let mut branch_ids: Vec<HashSet<String>> = Vec::new();

            if let Some(commands) = me.get("commands") {
                branch_ids.push(validate_command_block(commands, &known_ids, &format!("mission_event[{idx}].commands"), false)?);
            }

            let then_commands = me.get("then_commands");
            let else_commands = me.get("else_commands");
            let has_branch = then_commands.is_some() || else_commands.is_some();
            if has_branch {
                let empty = Value::Array(Vec::new());
                branch_ids.push(validate_command_block(
                    then_commands.unwrap_or(&empty),
                    &known_ids,
                    &format!("mission_event[{idx}].then_commands"),
                    false,
                )?);
                branch_ids.push(validate_command_block(
                    else_commands.unwrap_or(&empty),
                    &known_ids,
                    &format!("mission_event[{idx}].else_commands"),
                    false,
                )?);
            }

            require(!branch_ids.is_empty(), format!("mission_event[{idx}] requires commands, then_commands, or else_commands"))?;
            let mut merged_ids = known_ids.clone();
            for branch_set in branch_ids {
                merged_ids.extend(branch_set);
            }
            known_ids = merged_ids;
        }
    }

    if let Some(waves) = obj.get("reinforcement_waves") {
        let list = waves.as_array().ok_or_else(|| fail("reinforcement_waves must be list when present"))?;
        for (idx, wave) in list.iter().enumerate() {
            let wave_obj = wave.as_object().ok_or_else(|| fail(format!("reinforcement_wave[{idx}] must be object")))?;
            if let Some(trigger) = wave_obj.get("trigger") {
                require(matches!(trigger.as_str(), Some(t) if t == "turn_start" || t == "round_start"), format!("reinforcement_wave[{idx}] trigger invalid"))?;
            }
            if let Some(policy) = wave_obj.get("placement_policy") {
                require(matches!(policy.as_str(), Some(p) if p == "exact" || p == "nearest_open"), format!("reinforcement_wave[{idx}] placement_policy invalid"))?;
            }
            if let Some(active_unit) = wave_obj.get("active_unit") {
                if !active_unit.is_null() {
                    let id = active_unit.as_str();
                    require(matches!(id, Some(i) if known_ids.contains(i)), format!("reinforcement_wave[{idx}] active_unit invalid"))?;
                }
            }
            let units = wave_obj.get("units").and_then(|v| v.as_array()).filter(|u| !u.is_empty());
            let units = units.ok_or_else(|| fail(format!("reinforcement_wave[{idx}] units must be non-empty list")))?;
            for (uidx, unit) in units.iter().enumerate() {
                validate_unit_shape(unit, &format!("reinforcement_wave[{idx}].units[{uidx}]"))?;
                let unit_id = unit["id"].as_str().unwrap_or_default();
                require(!known_ids.contains(unit_id), format!("reinforcement_wave[{idx}] duplicate spawned unit id: {unit_id}"))?;
                known_ids.insert(unit_id.to_string());
            }
        }
    }

    if let Some(routines) = obj.get("hazard_routines") {
        let list = routines.as_array().ok_or_else(|| fail("hazard_routines must be list when present"))?;
        for (idx, routine) in list.iter().enumerate() {
            let routine_obj = routine.as_object().ok_or_else(|| fail(format!("hazard_routine[{idx}] must be object")))?;
            for key in ["unit_id", "hazard_id", "source_name"] {
                require(routine_obj.contains_key(key), format!("hazard_routine[{idx}] missing key: {key}"))?;
            }
            let unit_id = routine_obj["unit_id"].as_str().unwrap_or_default();
            require(known_ids.contains(unit_id), format!("hazard_routine[{idx}] unit_id not found: {unit_id}"))?;
            if let Some(cadence) = routine_obj.get("cadence_rounds") {
                require(matches!(cadence.as_i64(), Some(c) if c > 0), format!("hazard_routine[{idx}] cadence_rounds must be positive int"))?;
            }
            if let Some(max_triggers) = routine_obj.get("max_triggers") {
                require(matches!(max_triggers.as_i64(), Some(m) if m > 0), format!("hazard_routine[{idx}] max_triggers must be positive int"))?;
            }
        }
    }

    Ok(())
}

pub fn load_scenario(path: &Path) -> Result<Value, ScenarioError> {
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io { path: path.display().to_string(), source })?;
    let data: Value = serde_json::from_str(&text).map_err(|source| ScenarioError::Json { path: path.display().to_string(), source })?;
    validate_scenario(&data)?;
    Ok(data)
}

/// Builds the initial `BattleState` from a validated scenario document,
/// applying the same defaulting/lowercasing rules a freshly spawned unit
/// gets mid-battle.
pub fn battle_state_from_scenario(data: &Value) -> Result<BattleState, ScenarioError> {
    let map_data = data["map"].as_object().ok_or_else(|| fail("map must be an object"))?;
    let blocked = map_data
        .get("blocked")
        .and_then(|v| v.as_array())
        .map(|cells| {
            cells
                .iter()
                .filter_map(|cell| {
                    let pair = cell.as_array()?;
                    Some((pair.first()?.as_i64()?, pair.get(1)?.as_i64()?))
                })
                .collect()
        })
        .unwrap_or_default();
    let battle_map = MapState {
        width: map_data["width"].as_i64().unwrap_or(0),
        height: map_data["height"].as_i64().unwrap_or(0),
        blocked,
    };

    let mut units = std::collections::HashMap::new();
    for raw in data["units"].as_array().ok_or_else(|| fail("units must be a list"))? {
        let unit_id = raw["id"].as_str().unwrap_or_default().to_string();
        let team = raw["team"].as_str().unwrap_or_default().to_string();
        let hp = raw["hp"].as_i64().unwrap_or(0);
        let position = raw["position"].as_array().ok_or_else(|| fail("unit.position must be [x, y]"))?;
        let x = position[0].as_i64().unwrap_or(0);
        let y = position[1].as_i64().unwrap_or(0);
        let temp_hp = raw.get("temp_hp").and_then(|v| v.as_i64()).unwrap_or(0);

        let mut unit = UnitState {
            unit_id: unit_id.clone(),
            team,
            hp,
            max_hp: hp,
            x,
            y,
            initiative: raw["initiative"].as_i64().unwrap_or(0),
            attack_mod: raw["attack_mod"].as_i64().unwrap_or(0),
            ac: raw["ac"].as_i64().unwrap_or(10),
            damage: raw["damage"].as_str().unwrap_or("1d1").to_string(),
            temp_hp,
            temp_hp_source: if temp_hp > 0 { Some("initial".to_string()) } else { None },
            temp_hp_owner_effect_id: None,
            attack_damage_type: raw.get("attack_damage_type").and_then(|v| v.as_str()).unwrap_or("physical").to_lowercase(),
            attack_damage_bypass: raw
                .get("attack_damage_bypass")
                .and_then(|v| v.as_array())
                .map(|list| list.iter().filter_map(|v| v.as_str().map(|s| s.to_lowercase())).collect())
                .unwrap_or_default(),
            fortitude: raw.get("fortitude").and_then(|v| v.as_i64()).unwrap_or(0),
            reflex: raw.get("reflex").and_then(|v| v.as_i64()).unwrap_or(0),
            will: raw.get("will").and_then(|v| v.as_i64()).unwrap_or(0),
            actions_remaining: 3,
            reaction_available: true,
            conditions: std::collections::HashMap::new(),
            condition_immunities: raw
                .get("condition_immunities")
                .and_then(|v| v.as_array())
                .map(|list| list.iter().filter_map(|v| v.as_str().map(|s| s.to_lowercase().replace(' ', "_"))).collect())
                .unwrap_or_default(),
            resistances: raw
                .get("resistances")
                .and_then(|v| v.as_object())
                .map(|m| m.iter().filter_map(|(k, v)| Some((k.to_lowercase(), v.as_i64()?))).collect())
                .unwrap_or_default(),
            weaknesses: raw
                .get("weaknesses")
                .and_then(|v| v.as_object())
                .map(|m| m.iter().filter_map(|(k, v)| Some((k.to_lowercase(), v.as_i64()?))).collect())
                .unwrap_or_default(),
            immunities: raw
                .get("immunities")
                .and_then(|v| v.as_array())
                .map(|list| list.iter().filter_map(|v| v.as_str().map(|s| s.to_lowercase())).collect())
                .unwrap_or_default(),
        };
        unit.apply_spawn_defaults();
        units.insert(unit_id, unit);
    }

    let turn_order = build_turn_order(&units);
    require(!turn_order.is_empty(), "no units available for turn order")?;

    let flags = data
        .get("flags")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().filter_map(|(k, v)| Some((k.clone(), v.as_bool()?))).collect())
        .unwrap_or_default();

    Ok(BattleState {
        battle_id: data["battle_id"].as_str().unwrap_or_default().to_string(),
        seed: data["seed"].as_u64().unwrap_or(0),
        round_number: 1,
        turn_index: 0,
        turn_order,
        units,
        battle_map,
        effects: std::collections::HashMap::new(),
        flags,
        event_sequence: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_scenario() -> Value {
        json!({
            "battle_id": "b1",
            "seed": 7,
            "map": {"width": 5, "height": 5},
            "units": [
                {"id": "hero", "team": "party", "hp": 10, "position": [0, 0], "initiative": 2, "attack_mod": 5, "ac": 15, "damage": "1d8"},
                {"id": "goblin", "team": "enemy", "hp": 6, "position": [3, 3], "initiative": 1, "attack_mod": 3, "ac": 13, "damage": "1d6"}
            ],
            "commands": []
        })
    }

    #[test]
    fn validates_minimal_scenario() {
        assert!(validate_scenario(&minimal_scenario()).is_ok());
    }

    #[test]
    fn rejects_duplicate_unit_ids() {
        let mut scenario = minimal_scenario();
        scenario["units"][1]["id"] = json!("hero");
        assert!(validate_scenario(&scenario).is_err());
    }

    #[test]
    fn rejects_unknown_command_type() {
        let mut scenario = minimal_scenario();
        scenario["commands"] = json!([{"type": "teleport_all", "actor": "hero"}]);
        assert!(validate_scenario(&scenario).is_err());
    }

    #[test]
    fn rejects_strike_without_target() {
        let mut scenario = minimal_scenario();
        scenario["commands"] = json!([{"type": "strike", "actor": "hero"}]);
        assert!(validate_scenario(&scenario).is_err());
    }

    #[test]
    fn battle_state_lowercases_resistance_keys_and_builds_turn_order() {
        let mut scenario = minimal_scenario();
        scenario["units"][0]["resistances"] = json!({"FIRE": 5});
        let data = scenario;
        let state = battle_state_from_scenario(&data).unwrap();
        assert_eq!(state.turn_order, vec!["hero".to_string(), "goblin".to_string()]);
        assert_eq!(state.units["hero"].resistances.get("fire"), Some(&5));
    }
}
