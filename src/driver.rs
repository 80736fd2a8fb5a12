//! Scenario driver: turns a validated scenario document into a full battle
//! run by interleaving scripted commands with mission events, hazard
//! routines, and an optional enemy auto-policy, halting on objectives,
//! team elimination, a reducer error, or a step budget.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::error::{ReductionError, ScenarioError};
use crate::io::content_pack::ContentContext;
use crate::io::{battle_state_from_scenario, load_scenario, resolve_scenario_content_context};
use crate::model::battle::BattleState;
use crate::model::command::Command;
use crate::model::event::Event;
use crate::objectives::{evaluate_objectives, expand_objective_packs};
use crate::reducer::apply_command;
use crate::rng::BattleRng;

const DEFAULT_ENGINE_PHASE: i64 = 7;

fn alive_teams(state: &BattleState) -> HashSet<String> {
    state.units.values().filter(|u| u.alive()).map(|u| u.team.clone()).collect()
}

fn state_snapshot(state: &BattleState) -> Value {
    let mut units = Map::new();
    let mut ids: Vec<&String> = state.units.keys().collect();
    ids.sort();
    for uid in ids {
        let u = &state.units[uid];
        units.insert(
            uid.clone(),
            json!({
                "team": u.team,
                "hp": u.hp,
                "max_hp": u.max_hp,
                "temp_hp": u.temp_hp,
                "temp_hp_source": u.temp_hp_source,
                "position": [u.x, u.y],
                "alive": u.alive(),
                "conditions": u.conditions,
                "attack_damage_type": u.attack_damage_type,
                "resistances": u.resistances,
                "weaknesses": u.weaknesses,
                "immunities": u.immunities,
            }),
        );
    }
    let mut flags = Map::new();
    let mut flag_keys: Vec<&String> = state.flags.keys().collect();
    flag_keys.sort();
    for key in flag_keys {
        flags.insert(key.clone(), json!(state.flags[key]));
    }
    json!({
        "battle_id": state.battle_id,
        "round": state.round_number,
        "active_unit": state.active_unit_id(),
        "units": units,
        "flags": flags,
    })
}

fn default_command_id_from_entry(entry_id: &str) -> String {
    match entry_id.split_once('.') {
        Some((_, rest)) => rest.to_string(),
        None => entry_id.to_string(),
    }
}

/// Resolves a `content_entry_id` template against the content-pack entry
/// lookup, merging the template payload with the command's own fields (the
/// command's fields win) and defaulting the `*_id` field from the entry
/// suffix when the command doesn't supply one.
fn materialize_content_entry_command(command: &Value, content_context: &ContentContext) -> Result<Value, ReductionError> {
    let mut out = command.as_object().cloned().unwrap_or_default();
    let entry_id = match out.get("content_entry_id").and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => return Ok(Value::Object(out)),
    };

    let entry = content_context.entry_lookup.get(&entry_id).ok_or_else(|| ReductionError::UnknownContentEntry(entry_id.clone()))?;

    let mut payload_template = entry.payload.as_object().cloned().unwrap_or_default();
    let template_type = payload_template.get("command_type").and_then(|v| v.as_str()).map(String::from);
    let command_type = out.get("type").and_then(|v| v.as_str()).unwrap_or("").to_string();
    if let Some(template_type) = &template_type {
        if template_type != &command_type {
            return Err(ReductionError::ContentEntryTypeMismatch {
                entry_id,
                expected: command_type,
                found: template_type.clone(),
            });
        }
    }

    if !matches!(command_type.as_str(), "cast_spell" | "use_feat" | "use_item" | "interact") {
        return Err(ReductionError::UnsupportedCommand(command_type));
    }

    payload_template.remove("command_type");
    let mut merged = payload_template;
    for (key, value) in out.drain() {
        merged.insert(key, value);
    }

    match command_type.as_str() {
        "cast_spell" if merged.get("spell_id").and_then(|v| v.as_str()).unwrap_or("").is_empty() => {
            merged.insert("spell_id".to_string(), json!(default_command_id_from_entry(&entry_id)));
        }
        "use_feat" if merged.get("feat_id").and_then(|v| v.as_str()).unwrap_or("").is_empty() => {
            merged.insert("feat_id".to_string(), json!(default_command_id_from_entry(&entry_id)));
        }
        "use_item" if merged.get("item_id").and_then(|v| v.as_str()).unwrap_or("").is_empty() => {
            merged.insert("item_id".to_string(), json!(default_command_id_from_entry(&entry_id)));
        }
        "interact" if merged.get("interact_id").and_then(|v| v.as_str()).unwrap_or("").is_empty() => {
            merged.insert("interact_id".to_string(), json!(default_command_id_from_entry(&entry_id)));
        }
        _ => {}
    }

    Ok(Value::Object(merged))
}

fn normalize_hazard_routines(scenario: &Value) -> HashMap<String, Vec<Value>> {
    let mut by_unit: HashMap<String, Vec<Value>> = HashMap::new();
    let raw_routines = scenario.get("hazard_routines").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for (idx, raw) in raw_routines.iter().enumerate() {
        let mut routine = raw.as_object().cloned().unwrap_or_default();
        routine.entry("id".to_string()).or_insert_with(|| json!(format!("routine_{}", idx + 1)));
        routine.entry("source_type".to_string()).or_insert_with(|| json!("trigger_action"));
        routine.entry("target_policy".to_string()).or_insert_with(|| json!("nearest_enemy"));
        routine.entry("start_round".to_string()).or_insert_with(|| json!(1));
        routine.entry("once".to_string()).or_insert_with(|| json!(false));
        routine.entry("auto_end_turn".to_string()).or_insert_with(|| json!(true));
        routine.entry("priority".to_string()).or_insert_with(|| json!(0));
        routine.entry("cadence_rounds".to_string()).or_insert_with(|| json!(1));
        let unit_id = routine.get("unit_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
        by_unit.entry(unit_id).or_default().push(Value::Object(routine));
    }
    for routines in by_unit.values_mut() {
        routines.sort_by(|a, b| {
            let pa = a.get("priority").and_then(|v| v.as_i64()).unwrap_or(0);
            let pb = b.get("priority").and_then(|v| v.as_i64()).unwrap_or(0);
            pa.cmp(&pb).then_with(|| {
                let ia = a.get("id").and_then(|v| v.as_str()).unwrap_or("");
                let ib = b.get("id").and_then(|v| v.as_str()).unwrap_or("");
                ia.cmp(ib)
            })
        });
    }
    by_unit
}

fn routine_eligible(state: &BattleState, routine: &Value, once_completed: &HashSet<String>, use_counts: &HashMap<String, i64>) -> bool {
    let routine_id = routine.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
    if routine.get("once").and_then(|v| v.as_bool()).unwrap_or(false) && once_completed.contains(&routine_id) {
        return false;
    }
    if let Some(max_triggers) = routine.get("max_triggers").and_then(|v| v.as_i64()) {
        if *use_counts.get(&routine_id).unwrap_or(&0) >= max_triggers {
            return false;
        }
    }
    let start_round = routine.get("start_round").and_then(|v| v.as_i64()).unwrap_or(1);
    if state.round_number < start_round {
        return false;
    }
    if let Some(end_round) = routine.get("end_round").and_then(|v| v.as_i64()) {
        if state.round_number > end_round {
            return false;
        }
    }
    let cadence = routine.get("cadence_rounds").and_then(|v| v.as_i64()).unwrap_or(1).max(1);
    if (state.round_number - start_round) % cadence != 0 {
        return false;
    }
    if let Some(enabled_flag) = routine.get("enabled_flag").and_then(|v| v.as_str()) {
        if !state.flags.get(enabled_flag).copied().unwrap_or(false) {
            return false;
        }
    }
    if let Some(disabled_flag) = routine.get("disabled_flag").and_then(|v| v.as_str()) {
        if state.flags.get(disabled_flag).copied().unwrap_or(false) {
            return false;
        }
    }
    true
}

fn routine_command(actor: &str, routine: &Value) -> Value {
    let mut command = Map::new();
    command.insert("type".to_string(), json!("run_hazard_routine"));
    command.insert("actor".to_string(), json!(actor));
    command.insert("hazard_id".to_string(), json!(routine.get("hazard_id").and_then(|v| v.as_str()).unwrap_or("")));
    command.insert("source_name".to_string(), json!(routine.get("source_name").and_then(|v| v.as_str()).unwrap_or("")));
    command.insert(
        "source_type".to_string(),
        json!(routine.get("source_type").and_then(|v| v.as_str()).unwrap_or("trigger_action")),
    );
    command.insert(
        "target_policy".to_string(),
        json!(routine.get("target_policy").and_then(|v| v.as_str()).unwrap_or("nearest_enemy")),
    );
    for key in ["center_x", "center_y", "target", "model_path"] {
        if let Some(value) = routine.get(key) {
            command.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(command)
}

fn normalize_mission_events(scenario: &Value) -> Vec<Value> {
    let mut out = Vec::new();

    let raw_events = scenario.get("mission_events").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for (idx, raw) in raw_events.iter().enumerate() {
        let mut event = raw.as_object().cloned().unwrap_or_default();
        event.entry("id".to_string()).or_insert_with(|| json!(format!("mission_event_{}", idx + 1)));
        event.entry("trigger".to_string()).or_insert_with(|| json!("turn_start"));
        event.entry("start_round".to_string()).or_insert_with(|| json!(1));
        event.entry("once".to_string()).or_insert_with(|| json!(true));
        event.entry("commands".to_string()).or_insert_with(|| json!([]));
        out.push(Value::Object(event));
    }

    let raw_waves = scenario.get("reinforcement_waves").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for (idx, raw) in raw_waves.iter().enumerate() {
        let wave = raw.as_object().cloned().unwrap_or_default();
        let placement_policy = wave.get("placement_policy").and_then(|v| v.as_str()).unwrap_or("exact").to_string();
        let spend_action = wave.get("spend_action").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut commands = Vec::new();
        for unit in wave.get("units").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
            commands.push(json!({
                "type": "spawn_unit",
                "placement_policy": placement_policy,
                "spend_action": spend_action,
                "unit": unit,
            }));
        }
        if let Some(set_flag) = wave.get("set_flag") {
            commands.push(json!({
                "type": "set_flag",
                "flag": set_flag.as_str().unwrap_or(""),
                "value": wave.get("set_flag_value").and_then(|v| v.as_bool()).unwrap_or(true),
            }));
        }
        let mut event = Map::new();
        event.insert("id".to_string(), json!(wave.get("id").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| format!("reinforcement_wave_{}", idx + 1))));
        event.insert("trigger".to_string(), json!(wave.get("trigger").and_then(|v| v.as_str()).unwrap_or("round_start")));
        event.insert("once".to_string(), json!(wave.get("once").and_then(|v| v.as_bool()).unwrap_or(true)));
        event.insert("commands".to_string(), Value::Array(commands));
        for key in ["round", "start_round", "end_round", "active_unit", "enabled_flag", "disabled_flag"] {
            if let Some(value) = wave.get(key) {
                event.insert(key.to_string(), value.clone());
            }
        }
        out.push(Value::Object(event));
    }

    out
}

fn mission_event_eligible(state: &BattleState, mission_event: &Value, once_completed: &HashSet<String>) -> bool {
    let mission_id = mission_event.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
    if mission_event.get("once").and_then(|v| v.as_bool()).unwrap_or(true) && once_completed.contains(&mission_id) {
        return false;
    }

    let trigger = mission_event.get("trigger").and_then(|v| v.as_str()).unwrap_or("turn_start");
    match trigger {
        "round_start" => {
            if state.turn_index != 0 {
                return false;
            }
        }
        "turn_start" => {}
        "unit_dead" => {
            let unit_id = mission_event.get("unit_id").and_then(|v| v.as_str()).unwrap_or("");
            match state.units.get(unit_id) {
                Some(unit) if !unit.alive() => {}
                _ => return false,
            }
        }
        "unit_alive" => {
            let unit_id = mission_event.get("unit_id").and_then(|v| v.as_str()).unwrap_or("");
            match state.units.get(unit_id) {
                Some(unit) if unit.alive() => {}
                _ => return false,
            }
        }
        "flag_set" => {
            let flag = mission_event.get("flag").and_then(|v| v.as_str()).unwrap_or("");
            let expected = mission_event.get("value").and_then(|v| v.as_bool()).unwrap_or(true);
            if flag.is_empty() || state.flags.get(flag).copied().unwrap_or(false) != expected {
                return false;
            }
        }
        _ => return false,
    }

    if let Some(round_exact) = mission_event.get("round").and_then(|v| v.as_i64()) {
        if state.round_number != round_exact {
            return false;
        }
    }
    let start_round = mission_event.get("start_round").and_then(|v| v.as_i64()).unwrap_or(1);
    if state.round_number < start_round {
        return false;
    }
    if let Some(end_round) = mission_event.get("end_round").and_then(|v| v.as_i64()) {
        if state.round_number > end_round {
            return false;
        }
    }

    if let Some(active_unit) = mission_event.get("active_unit").and_then(|v| v.as_str()) {
        if active_unit != state.active_unit_id() {
            return false;
        }
    }

    if let Some(enabled_flag) = mission_event.get("enabled_flag").and_then(|v| v.as_str()) {
        if !state.flags.get(enabled_flag).copied().unwrap_or(false) {
            return false;
        }
    }
    if let Some(disabled_flag) = mission_event.get("disabled_flag").and_then(|v| v.as_str()) {
        if state.flags.get(disabled_flag).copied().unwrap_or(false) {
            return false;
        }
    }
    true
}

fn mission_event_commands(state: &BattleState, mission_event: &Value) -> (Vec<Value>, &'static str) {
    let has_branch = mission_event.get("then_commands").is_some() || mission_event.get("else_commands").is_some();
    if !has_branch {
        let commands = mission_event.get("commands").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        return (commands, "default");
    }

    let mut condition_met = true;
    if let Some(if_flag) = mission_event.get("if_flag").and_then(|v| v.as_str()) {
        let expected = mission_event.get("if_flag_value").and_then(|v| v.as_bool()).unwrap_or(true);
        condition_met = state.flags.get(if_flag).copied().unwrap_or(false) == expected;
    }

    if condition_met {
        (mission_event.get("then_commands").and_then(|v| v.as_array()).cloned().unwrap_or_default(), "then")
    } else {
        (mission_event.get("else_commands").and_then(|v| v.as_array()).cloned().unwrap_or_default(), "else")
    }
}

fn mission_command(raw_command: &Value, active_unit_id: &str) -> Value {
    let mut command = raw_command.as_object().cloned().unwrap_or_default();
    command.entry("actor".to_string()).or_insert_with(|| json!(active_unit_id));
    Value::Object(command)
}

fn normalize_enemy_policy(scenario: &Value) -> Value {
    let raw = scenario.get("enemy_policy").and_then(|v| v.as_object()).cloned().unwrap_or_default();
    let enabled = raw.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
    let mut teams: Vec<String> = raw
        .get("teams")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    if teams.is_empty() {
        teams = vec!["enemy".to_string()];
    }
    json!({
        "enabled": enabled,
        "teams": teams,
        "action": raw.get("action").and_then(|v| v.as_str()).unwrap_or("strike_nearest"),
        "content_entry_id": raw.get("content_entry_id"),
        "dc": raw.get("dc"),
        "auto_end_turn": raw.get("auto_end_turn").and_then(|v| v.as_bool()).unwrap_or(true),
    })
}

fn nearest_enemy_for_actor(state: &BattleState, actor_id: &str) -> Option<String> {
    let actor = &state.units[actor_id];
    let mut enemies: Vec<&crate::model::unit::UnitState> =
        state.units.values().filter(|u| u.alive() && u.team != actor.team && u.unit_id != actor_id).collect();
    enemies.sort_by(|a, b| {
        let da = (a.x - actor.x).abs() + (a.y - actor.y).abs();
        let db = (b.x - actor.x).abs() + (b.y - actor.y).abs();
        da.cmp(&db).then_with(|| a.unit_id.cmp(&b.unit_id))
    });
    enemies.first().map(|u| u.unit_id.clone())
}

fn end_turn_command(actor: &str) -> Value {
    json!({"type": "end_turn", "actor": actor})
}

fn enemy_policy_command(state: &BattleState, policy: &Value) -> Value {
    let actor_id = state.active_unit_id().to_string();
    let actor = &state.units[&actor_id];
    if !actor.alive() || actor.actions_remaining <= 0 {
        return end_turn_command(&actor_id);
    }

    let teams: HashSet<String> = policy
        .get("teams")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    if !teams.contains(&actor.team) {
        return end_turn_command(&actor_id);
    }

    let action = policy.get("action").and_then(|v| v.as_str()).unwrap_or("strike_nearest");
    let content_entry_id = policy.get("content_entry_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
    match action {
        "strike_nearest" => match nearest_enemy_for_actor(state, &actor_id) {
            Some(target_id) => json!({"type": "strike", "actor": actor_id, "target": target_id}),
            None => end_turn_command(&actor_id),
        },
        "cast_spell_entry_nearest" => match nearest_enemy_for_actor(state, &actor_id) {
            Some(target_id) => json!({
                "type": "cast_spell",
                "actor": actor_id,
                "content_entry_id": content_entry_id,
                "target": target_id,
                "dc": policy.get("dc").and_then(|v| v.as_i64()).unwrap_or(0),
            }),
            None => end_turn_command(&actor_id),
        },
        "use_feat_entry_self" => json!({
            "type": "use_feat",
            "actor": actor_id,
            "content_entry_id": content_entry_id,
            "target": actor_id,
        }),
        "use_item_entry_self" => json!({
            "type": "use_item",
            "actor": actor_id,
            "content_entry_id": content_entry_id,
            "target": actor_id,
        }),
        "interact_entry_self" => json!({
            "type": "interact",
            "actor": actor_id,
            "content_entry_id": content_entry_id,
            "target": actor_id,
        }),
        _ => end_turn_command(&actor_id),
    }
}

fn command_error_event(state: &BattleState, step_counter: i64, command: &Value, error: impl std::fmt::Display) -> Event {
    Event {
        event_id: format!("ev_error_{step_counter:04}"),
        round: state.round_number,
        active_unit: state.active_unit_id().to_string(),
        event_type: "command_error".to_string(),
        payload: json!({"command": command, "error": error.to_string()}),
    }
}

/// Converts a raw JSON command dict into the typed `Command` the reducer
/// dispatches on, then applies it. A deserialization failure is reported as
/// an `InvalidCommand` `ReductionError`, matching the reducer's own error
/// surface for malformed commands.
fn apply_json_command(state: &BattleState, command: &Value, rng: &mut BattleRng) -> Result<(BattleState, Vec<Event>), ReductionError> {
    let typed: Command = serde_json::from_value(command.clone()).map_err(|e| ReductionError::InvalidCommand(e.to_string()))?;
    apply_command(state, &typed, rng)
}

fn check_battle_end(
    events: &mut Vec<Event>,
    state: &BattleState,
    objectives: &[Value],
    objective_statuses: &mut HashMap<String, bool>,
    step_counter: i64,
) -> bool {
    if !objectives.is_empty() {
        let objective_state = evaluate_objectives(state, objectives);
        if objective_state.statuses != *objective_statuses {
            events.push(Event {
                event_id: format!("ev_obj_{step_counter:04}"),
                round: state.round_number,
                active_unit: state.active_unit_id().to_string(),
                event_type: "objective_update".to_string(),
                payload: json!({
                    "statuses": objective_state.statuses,
                    "victory_met": objective_state.victory_met,
                    "defeat_met": objective_state.defeat_met,
                }),
            });
            *objective_statuses = objective_state.statuses.clone();
        }
        if objective_state.defeat_met || objective_state.victory_met {
            events.push(Event {
                event_id: format!("ev_done_{step_counter:04}"),
                round: state.round_number,
                active_unit: state.active_unit_id().to_string(),
                event_type: "battle_end".to_string(),
                payload: json!({
                    "reason": "objectives",
                    "outcome": if objective_state.defeat_met { "defeat" } else { "victory" },
                    "objective_statuses": objective_statuses,
                }),
            });
            return true;
        }
    }

    let teams = alive_teams(state);
    if teams.len() <= 1 {
        events.push(Event {
            event_id: format!("ev_done_{step_counter:04}"),
            round: state.round_number,
            active_unit: state.active_unit_id().to_string(),
            event_type: "battle_end".to_string(),
            payload: json!({"winner_team": teams.into_iter().next()}),
        });
        return true;
    }

    false
}

/// Loads, validates, and fully executes a scenario file, returning the same
/// result shape a browser client or test harness would persist: executed
/// command counts, the stop reason, the replay hash, the final state
/// snapshot, and the full event log.
pub fn run_scenario_file(path: &Path) -> Result<Value, ScenarioError> {
    let scenario = load_scenario(path)?;
    let engine_phase = scenario.get("engine_phase").and_then(|v| v.as_i64()).unwrap_or(DEFAULT_ENGINE_PHASE);
    let content_context = resolve_scenario_content_context(&scenario, path, engine_phase)?;
    let mut state = battle_state_from_scenario(&scenario)?;

    let objectives = expand_objective_packs(
        scenario.get("objectives").and_then(|v| v.as_array()).map(|v| v.as_slice()).unwrap_or(&[]),
        scenario.get("objective_packs").and_then(|v| v.as_array()).map(|v| v.as_slice()).unwrap_or(&[]),
    );
    let routines_by_unit = normalize_hazard_routines(&scenario);
    let mission_events = normalize_mission_events(&scenario);
    let enemy_policy = normalize_enemy_policy(&scenario);
    let mut rng = BattleRng::new(state.seed);
    let mut events: Vec<Event> = Vec::new();

    if !content_context.packs.is_empty() {
        log::info!(
            "battle {} resolved {} content pack(s), selected={:?}",
            state.battle_id,
            content_context.packs.len(),
            content_context.selected_pack_id
        );
        events.push(Event {
            event_id: "ev_pack_000000".to_string(),
            round: state.round_number,
            active_unit: state.active_unit_id().to_string(),
            event_type: "content_pack_resolved".to_string(),
            payload: json!({
                "engine_phase": engine_phase,
                "selected_pack_id": content_context.selected_pack_id,
                "pack_count": content_context.packs.len(),
                "entry_count": content_context.entry_lookup.len(),
            }),
        });
    }

    events.push(Event {
        event_id: "ev_000000".to_string(),
        round: state.round_number,
        active_unit: state.active_unit_id().to_string(),
        event_type: "turn_start".to_string(),
        payload: json!({"active_unit": state.active_unit_id(), "round": state.round_number}),
    });

    let mut scripted_executed: i64 = 0;
    let mut auto_executed: i64 = 0;
    let mut step_counter: i64 = 0;
    let commands = scenario.get("commands").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let max_steps = scenario.get("max_steps").and_then(|v| v.as_i64()).unwrap_or(commands.len() as i64 + 1000);
    let mut objective_statuses: HashMap<String, bool> = HashMap::new();
    let mut mission_turn_executed: HashSet<(i64, usize, String)> = HashSet::new();
    let mut mission_once_completed: HashSet<String> = HashSet::new();
    let mut routine_turn_executed: HashSet<(i64, usize, String)> = HashSet::new();
    let mut routine_once_completed: HashSet<String> = HashSet::new();
    let mut routine_use_counts: HashMap<String, i64> = HashMap::new();
    let mut command_index: usize = 0;
    let mut stop_reason = "script_exhausted".to_string();

    let mut ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
    if ended {
        stop_reason = "battle_end".to_string();
    }

    let mut last_logged_round = state.round_number;

    'outer: while step_counter < max_steps && !ended {
        if state.round_number != last_logged_round {
            log::debug!("battle {} advanced to round {}", state.battle_id, state.round_number);
            last_logged_round = state.round_number;
        }
        let active_unit_id = state.active_unit_id().to_string();
        let mut ran_mission_event = false;
        let mut ran_routine = false;

        for mission_event in &mission_events {
            let mission_id = mission_event.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let turn_key = (state.round_number, state.turn_index, mission_id.clone());
            if mission_turn_executed.contains(&turn_key) {
                continue;
            }
            if !mission_event_eligible(&state, mission_event, &mission_once_completed) {
                continue;
            }

            let (event_commands, branch) = mission_event_commands(&state, mission_event);
            if event_commands.is_empty() {
                mission_turn_executed.insert(turn_key);
                if mission_event.get("once").and_then(|v| v.as_bool()).unwrap_or(true) {
                    mission_once_completed.insert(mission_id.clone());
                }
                continue;
            }

            events.push(Event {
                event_id: format!("ev_mission_{step_counter:04}"),
                round: state.round_number,
                active_unit: state.active_unit_id().to_string(),
                event_type: "mission_event".to_string(),
                payload: json!({
                    "id": mission_id,
                    "trigger": mission_event.get("trigger").and_then(|v| v.as_str()).unwrap_or("turn_start"),
                    "branch": branch,
                    "command_count": event_commands.len(),
                }),
            });
            ran_mission_event = true;
            mission_turn_executed.insert(turn_key);
            if mission_event.get("once").and_then(|v| v.as_bool()).unwrap_or(true) {
                mission_once_completed.insert(mission_id.clone());
            }

            for raw_command in &event_commands {
                let mission_cmd = mission_command(raw_command, state.active_unit_id());
                let materialized = match materialize_content_entry_command(&mission_cmd, &content_context) {
                    Ok(m) => m,
                    Err(e) => {
                        events.push(command_error_event(&state, step_counter, &mission_cmd, e));
                        stop_reason = "command_error".to_string();
                        ended = true;
                        break;
                    }
                };
                match apply_json_command(&state, &materialized, &mut rng) {
                    Ok((next_state, new_events)) => {
                        state = next_state;
                        events.extend(new_events);
                    }
                    Err(e) => {
                        events.push(command_error_event(&state, step_counter, &materialized, e));
                        stop_reason = "command_error".to_string();
                        ended = true;
                        break;
                    }
                }
                step_counter += 1;
                auto_executed += 1;

                ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
                if ended {
                    stop_reason = "battle_end".to_string();
                    break;
                }
            }

            if ended {
                break;
            }
        }

        if ended {
            break;
        }
        if ran_mission_event {
            continue;
        }

        if let Some(routines) = routines_by_unit.get(&active_unit_id) {
            for routine in routines {
                let routine_id = routine.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let turn_key = (state.round_number, state.turn_index, routine_id.clone());
                if routine_turn_executed.contains(&turn_key) {
                    continue;
                }
                if !routine_eligible(&state, routine, &routine_once_completed, &routine_use_counts) {
                    continue;
                }

                let routine_cmd = routine_command(&active_unit_id, routine);
                match apply_json_command(&state, &routine_cmd, &mut rng) {
                    Ok((next_state, new_events)) => {
                        state = next_state;
                        events.extend(new_events);
                    }
                    Err(e) => {
                        events.push(command_error_event(&state, step_counter, &routine_cmd, e));
                        stop_reason = "command_error".to_string();
                        ended = true;
                        break;
                    }
                }
                step_counter += 1;
                auto_executed += 1;
                ran_routine = true;
                routine_turn_executed.insert(turn_key);
                *routine_use_counts.entry(routine_id.clone()).or_insert(0) += 1;
                if routine.get("once").and_then(|v| v.as_bool()).unwrap_or(false) {
                    routine_once_completed.insert(routine_id.clone());
                }

                ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
                if ended {
                    stop_reason = "battle_end".to_string();
                    break;
                }

                let auto_end_turn = routine.get("auto_end_turn").and_then(|v| v.as_bool()).unwrap_or(true);
                if auto_end_turn && state.active_unit_id() == active_unit_id && state.units[&active_unit_id].alive() {
                    let end_cmd = end_turn_command(&active_unit_id);
                    match apply_json_command(&state, &end_cmd, &mut rng) {
                        Ok((next_state, new_events)) => {
                            state = next_state;
                            events.extend(new_events);
                        }
                        Err(e) => {
                            events.push(command_error_event(&state, step_counter, &end_cmd, e));
                            stop_reason = "command_error".to_string();
                            ended = true;
                            break;
                        }
                    }
                    step_counter += 1;
                    auto_executed += 1;
                    ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
                    if ended {
                        stop_reason = "battle_end".to_string();
                        break;
                    }
                }
            }
        }

        if ended {
            break;
        }
        if ran_routine {
            continue;
        }

        if command_index >= commands.len() {
            if !enemy_policy.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false) {
                break;
            }

            let policy_actor_id = state.active_unit_id().to_string();
            let policy_cmd_raw = enemy_policy_command(&state, &enemy_policy);
            let policy_cmd = match materialize_content_entry_command(&policy_cmd_raw, &content_context) {
                Ok(c) => c,
                Err(e) => {
                    events.push(command_error_event(&state, step_counter, &policy_cmd_raw, e));
                    stop_reason = "command_error".to_string();
                    break 'outer;
                }
            };
            events.push(Event {
                event_id: format!("ev_policy_{step_counter:04}"),
                round: state.round_number,
                active_unit: state.active_unit_id().to_string(),
                event_type: "enemy_policy_decision".to_string(),
                payload: json!({"command": policy_cmd}),
            });

            let mut executed_cmd = policy_cmd.clone();
            match apply_json_command(&state, &policy_cmd, &mut rng) {
                Ok((next_state, new_events)) => {
                    state = next_state;
                    events.extend(new_events);
                }
                Err(_) => {
                    if policy_cmd.get("type").and_then(|v| v.as_str()) != Some("end_turn") {
                        let fallback = end_turn_command(&state.active_unit_id().to_string());
                        match apply_json_command(&state, &fallback, &mut rng) {
                            Ok((next_state, new_events)) => {
                                state = next_state;
                                events.extend(new_events);
                                executed_cmd = fallback;
                            }
                            Err(e) => {
                                events.push(command_error_event(&state, step_counter, &fallback, e));
                                stop_reason = "command_error".to_string();
                                break 'outer;
                            }
                        }
                    } else {
                        events.push(command_error_event(&state, step_counter, &policy_cmd, "enemy_policy_failed"));
                        stop_reason = "command_error".to_string();
                        break 'outer;
                    }
                }
            }

            auto_executed += 1;
            step_counter += 1;

            ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
            if ended {
                stop_reason = "battle_end".to_string();
                continue;
            }

            let auto_end_turn = enemy_policy.get("auto_end_turn").and_then(|v| v.as_bool()).unwrap_or(true);
            if auto_end_turn
                && executed_cmd.get("type").and_then(|v| v.as_str()) != Some("end_turn")
                && state.active_unit_id() == policy_actor_id
                && state.units[&policy_actor_id].alive()
            {
                let end_cmd = end_turn_command(&policy_actor_id);
                match apply_json_command(&state, &end_cmd, &mut rng) {
                    Ok((next_state, new_events)) => {
                        state = next_state;
                        events.extend(new_events);
                    }
                    Err(e) => {
                        events.push(command_error_event(&state, step_counter, &end_cmd, e));
                        stop_reason = "command_error".to_string();
                        break 'outer;
                    }
                }
                auto_executed += 1;
                step_counter += 1;

                ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
                if ended {
                    stop_reason = "battle_end".to_string();
                }
            }
            continue;
        }

        let cmd = &commands[command_index];
        let command_for_turn = match materialize_content_entry_command(cmd, &content_context) {
            Ok(c) => c,
            Err(e) => {
                events.push(command_error_event(&state, step_counter, cmd, e));
                stop_reason = "command_error".to_string();
                break;
            }
        };
        let command_actor = command_for_turn.get("actor").and_then(|v| v.as_str()).unwrap_or("");
        if command_actor != state.active_unit_id() {
            let message = format!("actor {command_actor} is not active unit {}", state.active_unit_id());
            events.push(command_error_event(&state, step_counter, &command_for_turn, message));
            stop_reason = "command_error".to_string();
            break;
        }

        match apply_json_command(&state, &command_for_turn, &mut rng) {
            Ok((next_state, new_events)) => {
                state = next_state;
                events.extend(new_events);
            }
            Err(e) => {
                events.push(command_error_event(&state, step_counter, &command_for_turn, e));
                stop_reason = "command_error".to_string();
                break;
            }
        }
        command_index += 1;
        scripted_executed += 1;
        step_counter += 1;

        ended = check_battle_end(&mut events, &state, &objectives, &mut objective_statuses, step_counter);
        if ended {
            stop_reason = "battle_end".to_string();
        }
    }

    if !ended && step_counter >= max_steps {
        stop_reason = "max_steps".to_string();
    }

    log::info!(
        "battle {} stopped: reason={stop_reason} steps={step_counter} scripted={scripted_executed} auto={auto_executed}",
        state.battle_id
    );

    let entry_lookup_json: Map<String, Value> = content_context
        .entry_lookup
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
        .collect();

    Ok(json!({
        "battle_id": state.battle_id,
        "seed": state.seed,
        "engine_phase": engine_phase,
        "executed_commands": scripted_executed,
        "auto_executed_commands": auto_executed,
        "stop_reason": stop_reason,
        "event_count": events.len(),
        "replay_hash": crate::io::replay_hash(&events).map_err(|e| ScenarioError::Validation(e.to_string()))?,
        "final_state": state_snapshot(&state),
        "content_pack_context": {
            "selected_pack_id": content_context.selected_pack_id,
            "packs": content_context.packs.iter().map(|p| serde_json::to_value(p).unwrap_or(Value::Null)).collect::<Vec<_>>(),
            "entry_lookup": entry_lookup_json,
        },
        "events": events,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_id_splits_on_first_dot() {
        assert_eq!(default_command_id_from_entry("spell.fireball"), "fireball");
        assert_eq!(default_command_id_from_entry("fireball"), "fireball");
        assert_eq!(default_command_id_from_entry("feat.rage.greater"), "rage.greater");
    }

    #[test]
    fn normalize_enemy_policy_defaults_team_to_enemy() {
        let policy = normalize_enemy_policy(&json!({}));
        assert_eq!(policy["teams"], json!(["enemy"]));
        assert_eq!(policy["enabled"], json!(false));
    }
}
