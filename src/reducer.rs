//! The deterministic battle reducer: `apply_command(state, command, rng) ->
//! (state', events)`.

use std::collections::{BTreeSet, HashMap};

use serde_json::{json, Value};

use crate::effects::{on_apply, process_timing};
use crate::error::ReductionError;
use crate::grid::{
    cone_points, cover_ac_bonus_for_units, cover_grade_for_units, feet_to_tiles, has_line_of_sight, has_tile_line_of_effect,
    line_points, radius_points, CoverGrade, GridMap,
};
use crate::io::effect_model::{lookup_hazard_source, DEFAULT_EFFECT_MODEL_PATH};
use crate::model::battle::BattleState;
use crate::model::command::{Command, Mode, PlacementPolicy, TargetPolicy};
use crate::model::effect::{EffectState, TickTiming};
use crate::model::event::Event;
use crate::model::unit::UnitState;
use crate::rng::BattleRng;
use crate::rules::checks::resolve_check;
use crate::rules::conditions::{apply_condition, condition_is_immune, normalize_condition_name};
use crate::rules::damage::{apply_damage_modifiers, apply_damage_to_pool, roll_damage};
use crate::rules::degrees::Degree;
use crate::rules::saves::{basic_save_multiplier, resolve_save, SaveProfile, SaveType};
use crate::turn_order::{build_turn_order, next_turn_index};

fn degree_tag(degree: Degree) -> &'static str {
    match degree {
        Degree::CriticalSuccess => "critical_success",
        Degree::Success => "success",
        Degree::Failure => "failure",
        Degree::CriticalFailure => "critical_failure",
    }
}

fn cover_grade_tag(grade: CoverGrade) -> &'static str {
    match grade {
        CoverGrade::None => "none",
        CoverGrade::Standard => "standard",
        CoverGrade::Greater => "greater",
        CoverGrade::Blocked => "blocked",
    }
}

fn save_profile(units: &HashMap<String, UnitState>, unit_id: &str) -> SaveProfile {
    let unit = &units[unit_id];
    SaveProfile { fortitude: unit.fortitude, reflex: unit.reflex, will: unit.will }
}

fn append_event(events: &mut Vec<Event>, state: &mut BattleState, event_type: &str, payload: Value) {
    let event_id = format!("ev_{:06}", state.event_sequence);
    state.event_sequence += 1;
    events.push(Event {
        event_id,
        round: state.round_number,
        active_unit: state.active_unit_id().to_string(),
        event_type: event_type.to_string(),
        payload,
    });
}

fn emit_lifecycle_events(events: &mut Vec<Event>, state: &mut BattleState, lifecycle_events: Vec<(String, Value)>) {
    for (event_type, payload) in lifecycle_events {
        append_event(events, state, &event_type, payload);
    }
}

fn assert_actor_turn(state: &BattleState, actor_id: &str) -> Result<(), ReductionError> {
    if state.active_unit_id() != actor_id {
        return Err(ReductionError::NotActiveUnit {
            actor: actor_id.to_string(),
            active: state.active_unit_id().to_string(),
        });
    }
    Ok(())
}

fn advance_turn(state: &mut BattleState) {
    let size = state.turn_order.len();
    if size == 0 {
        return;
    }
    let start = state.turn_index;
    loop {
        let nxt = next_turn_index(state.turn_index, size);
        if nxt <= state.turn_index {
            state.round_number += 1;
        }
        state.turn_index = nxt;
        let unit_id = state.active_unit_id().to_string();
        if state.units[&unit_id].alive() {
            let unit = state.units.get_mut(&unit_id).expect("unit exists");
            unit.actions_remaining = 3;
            unit.reaction_available = true;
            return;
        }
        if state.turn_index == start {
            return;
        }
    }
}

fn new_effect_id(state: &BattleState) -> String {
    format!("eff_{:04}", state.effects.len() + 1)
}

fn alive_unit_ids(state: &BattleState) -> Vec<String> {
    state.units.values().filter(|u| u.alive()).map(|u| u.unit_id.clone()).collect()
}

fn nearest_enemy_unit_id(state: &BattleState, actor_id: &str) -> Option<String> {
    let actor = &state.units[actor_id];
    state
        .units
        .values()
        .filter(|u| u.alive() && u.unit_id != actor_id && u.team != actor.team)
        .min_by_key(|u| ((u.x - actor.x).abs() + (u.y - actor.y).abs(), u.unit_id.clone()))
        .map(|u| u.unit_id.clone())
}

fn units_within_radius_feet(state: &BattleState, center_x: i64, center_y: i64, radius_feet: i64, include_actor_id: Option<&str>) -> Vec<String> {
    let radius_tiles = feet_to_tiles(radius_feet);
    let area = radius_points(center_x, center_y, radius_tiles);
    state
        .units
        .values()
        .filter(|u| u.alive())
        .filter(|u| include_actor_id != Some(u.unit_id.as_str()))
        .filter(|u| area.contains(&(u.x, u.y)))
        .map(|u| u.unit_id.clone())
        .collect()
}

fn nearest_open_tile(state: &BattleState, x: i64, y: i64) -> Option<(i64, i64)> {
    let mut tiles: Vec<(i64, i64)> = Vec::new();
    for tx in 0..state.battle_map.width {
        for ty in 0..state.battle_map.height {
            tiles.push((tx, ty));
        }
    }
    tiles.sort_by_key(|&(tx, ty)| ((tx - x).abs() + (ty - y).abs(), ty, tx));
    tiles.into_iter().find(|&(tx, ty)| {
        state.battle_map.in_bounds(tx, ty) && !state.battle_map.is_blocked(tx, ty) && !state.battle_map.is_occupied(&state.units, tx, ty)
    })
}

fn units_in_cone_feet(state: &BattleState, actor_id: &str, facing_x: i64, facing_y: i64, size_feet: i64) -> Vec<String> {
    let actor = &state.units[actor_id];
    let area = cone_points(actor.x, actor.y, facing_x, facing_y, feet_to_tiles(size_feet));
    state
        .units
        .values()
        .filter(|u| u.alive() && u.unit_id != actor_id && area.contains(&(u.x, u.y)))
        .map(|u| u.unit_id.clone())
        .collect()
}

fn choose_model_targets(
    state: &BattleState,
    actor_id: &str,
    effects: &[Value],
    explicit_target_id: Option<&str>,
    center_x: Option<i64>,
    center_y: Option<i64>,
) -> Vec<String> {
    let actor = &state.units[actor_id];

    if let Some(target_id) = explicit_target_id {
        return match state.units.get(target_id) {
            Some(target) if target.alive() && has_tile_line_of_effect(&state.battle_map, actor.x, actor.y, target.x, target.y) => {
                vec![target_id.to_string()]
            }
            _ => Vec::new(),
        };
    }

    let area_effect = effects.iter().find(|e| e.get("kind").and_then(|v| v.as_str()) == Some("area"));
    if let (Some(area), Some(cx), Some(cy)) = (area_effect, center_x, center_y) {
        if area.get("size_miles").map(|v| !v.is_null()).unwrap_or(false) {
            return alive_unit_ids(state).into_iter().filter(|id| id != actor_id).collect();
        }
        let size_feet = area.get("size_feet").and_then(|v| v.as_i64()).unwrap_or(5);
        let shape = area.get("shape").and_then(|v| v.as_str()).unwrap_or("within_radius");

        return match shape {
            "line" => {
                let mut pts = Vec::new();
                for (idx, &(x, y)) in line_points(actor.x, actor.y, cx, cy).iter().enumerate() {
                    if idx == 0 {
                        continue;
                    }
                    if state.battle_map.is_blocked(x, y) {
                        break;
                    }
                    pts.push((x, y));
                }
                state
                    .units
                    .values()
                    .filter(|u| u.alive() && u.unit_id != actor_id && pts.contains(&(u.x, u.y)))
                    .map(|u| u.unit_id.clone())
                    .collect()
            }
            "cone" => units_in_cone_feet(state, actor_id, cx, cy, size_feet)
                .into_iter()
                .filter(|uid| has_tile_line_of_effect(&state.battle_map, actor.x, actor.y, state.units[uid].x, state.units[uid].y))
                .collect(),
            _ => units_within_radius_feet(state, cx, cy, size_feet, Some(actor_id))
                .into_iter()
                .filter(|uid| has_tile_line_of_effect(&state.battle_map, cx, cy, state.units[uid].x, state.units[uid].y))
                .collect(),
        };
    }

    alive_unit_ids(state)
        .into_iter()
        .filter(|uid| uid != actor_id)
        .filter(|uid| has_tile_line_of_effect(&state.battle_map, actor.x, actor.y, state.units[uid].x, state.units[uid].y))
        .collect()
}

fn maximum_duration_to_rounds(duration: &Value) -> Option<i64> {
    if !duration.is_object() {
        return None;
    }
    let amount = duration.get("amount").and_then(|v| v.as_i64()).unwrap_or(0);
    let unit = duration.get("unit").and_then(|v| v.as_str()).unwrap_or("");
    if amount <= 0 {
        return None;
    }
    match unit {
        "round" => Some(amount),
        "minute" => Some(amount * 10),
        "hour" => Some(amount * 600),
        "day" => Some(amount * 14400),
        _ => None,
    }
}

/// Scans a raw effect-catalog fragment for `"Any <condition> condition ...
/// persists"` phrasing, the textual cue for afflictions that leave a
/// standing condition behind after the stage track resolves.
fn infer_persistent_affliction_conditions(raw_fragment: &str) -> Vec<String> {
    let lower = raw_fragment.to_lowercase();
    let mut out = BTreeSet::new();
    for sentence in lower.split(['.', ';']) {
        if !sentence.contains("persists") {
            continue;
        }
        if let Some(any_idx) = sentence.find("any ") {
            let after = &sentence[any_idx + 4..];
            if let Some(cond_idx) = after.find(" condition") {
                let name = after[..cond_idx].trim();
                if !name.is_empty() {
                    out.insert(name.replace(' ', "_"));
                }
            }
        }
    }
    out.into_iter().collect()
}

struct ModeledDamageDetail {
    value: Value,
}

#[allow(clippy::too_many_arguments)]
fn apply_modeled_damage(
    target: &mut UnitState,
    rng: &mut BattleRng,
    formula: &str,
    damage_type: Option<&str>,
    multiplier: f64,
) -> ModeledDamageDetail {
    let base_roll = roll_damage(rng, formula, 1).unwrap_or_else(|_| crate::rules::damage::DamageRoll {
        formula: formula.to_string(),
        total: 0,
        rolls: Vec::new(),
        flat_modifier: 0,
    });
    let raw_total = (base_roll.total as f64 * multiplier) as i64;
    let adjustment = apply_damage_modifiers(raw_total, damage_type, &target.resistances, &target.weaknesses, &target.immunities, &[]);
    let applied_damage = apply_damage_to_pool(target.hp, target.temp_hp, adjustment.applied_total);
    target.hp = applied_damage.new_hp;
    target.temp_hp = applied_damage.new_temp_hp;
    if target.temp_hp == 0 {
        target.temp_hp_source = None;
        target.temp_hp_owner_effect_id = None;
    }
    let mut detail = json!({
        "formula": formula,
        "damage_type": damage_type,
        "rolled_total": base_roll.total,
        "rolls": base_roll.rolls,
        "flat_modifier": base_roll.flat_modifier,
        "multiplier": multiplier,
        "raw_total": adjustment.raw_total,
        "immune": adjustment.immune,
        "resistance_total": adjustment.resistance_total,
        "weakness_total": adjustment.weakness_total,
        "applied_total": adjustment.applied_total,
    });
    if applied_damage.absorbed_by_temp_hp > 0 {
        detail["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
    }
    ModeledDamageDetail { value: detail }
}

#[allow(clippy::too_many_arguments)]
fn apply_modeled_effects_to_target(
    state: &mut BattleState,
    rng: &mut BattleRng,
    actor_id: &str,
    target_id: &str,
    effects: &[Value],
    source_label: Option<&str>,
) -> (Value, Vec<(String, Value)>) {
    let save_event = effects.iter().find(|e| e.get("kind").and_then(|v| v.as_str()) == Some("save_check"));
    let damage_event = effects
        .iter()
        .find(|e| e.get("kind").and_then(|v| v.as_str()) == Some("damage") && e.get("formula").is_some());
    let affliction_event = effects.iter().find(|e| e.get("kind").and_then(|v| v.as_str()) == Some("affliction"));
    let condition_events: Vec<&Value> = effects.iter().filter(|e| e.get("kind").and_then(|v| v.as_str()) == Some("apply_condition")).collect();
    let death_events: Vec<&Value> = effects
        .iter()
        .filter(|e| matches!(e.get("kind").and_then(|v| v.as_str()), Some("instant_death") | Some("special_lethality")))
        .collect();
    let transform_events: Vec<&Value> = effects.iter().filter(|e| e.get("kind").and_then(|v| v.as_str()) == Some("transform")).collect();
    let teleport_events: Vec<&Value> = effects.iter().filter(|e| e.get("kind").and_then(|v| v.as_str()) == Some("teleport")).collect();

    let mut lifecycle_events: Vec<(String, Value)> = Vec::new();

    if let Some(affliction_event) = affliction_event {
        let aff_save_cfg = affliction_event.get("save").cloned().unwrap_or(json!({}));
        let dc = aff_save_cfg
            .get("dc")
            .and_then(|v| v.as_i64())
            .or_else(|| save_event.and_then(|e| e.get("dc")).and_then(|v| v.as_i64()))
            .unwrap_or(0);
        let save_type_str = aff_save_cfg
            .get("save_type")
            .and_then(|v| v.as_str())
            .or_else(|| save_event.and_then(|e| e.get("save_type")).and_then(|v| v.as_str()))
            .unwrap_or("Fortitude")
            .to_string();

        let mut save_degree = Degree::Failure;
        let mut save_detail: Value = Value::Null;
        if dc > 0 {
            let save_type = match save_type_str.as_str() {
                "Reflex" => SaveType::Reflex,
                "Will" => SaveType::Will,
                _ => SaveType::Fortitude,
            };
            let check = resolve_save(rng, save_type, &save_profile(&state.units, target_id), dc);
            save_degree = check.degree;
            save_detail = json!({
                "dc": dc,
                "save_type": save_type_str,
                "mode": "affliction",
                "die": check.die,
                "modifier": check.modifier,
                "total": check.total,
                "degree": degree_tag(check.degree),
            });
        }

        let contracted = matches!(save_degree, Degree::Failure | Degree::CriticalFailure);
        let mut affliction_detail = json!({
            "contracted": contracted,
            "effect_id": Value::Null,
            "initial_stage": Value::Null,
            "maximum_duration_rounds": Value::Null,
        });

        if contracted {
            let stages = affliction_event.get("stages").and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let max_stage = stages.iter().filter_map(|s| s.get("stage").and_then(|v| v.as_i64())).max().unwrap_or(1);
            let initial_stage = if matches!(save_degree, Degree::CriticalFailure) { max_stage.min(2) } else { 1 };
            let duration_rounds = maximum_duration_to_rounds(&affliction_event.get("maximum_duration").cloned().unwrap_or(Value::Null));

            let raw_fragment = affliction_event.get("raw_fragment").and_then(|v| v.as_str()).unwrap_or("");
            let save_payload = if dc > 0 { json!({"dc": dc, "save_type": save_type_str}) } else { aff_save_cfg.clone() };

            let mut payload = HashMap::new();
            payload.insert("name".to_string(), json!(source_label.unwrap_or("modeled_affliction")));
            payload.insert("save".to_string(), save_payload);
            payload.insert("maximum_duration".to_string(), affliction_event.get("maximum_duration").cloned().unwrap_or(Value::Null));
            payload.insert("stages".to_string(), json!(stages));
            payload.insert("current_stage".to_string(), json!(initial_stage));
            payload.insert("persistent_conditions".to_string(), json!(infer_persistent_affliction_conditions(raw_fragment)));

            let effect_id = new_effect_id(state);
            let mut effect = EffectState {
                effect_id: effect_id.clone(),
                kind: "affliction".to_string(),
                source_unit_id: Some(actor_id.to_string()),
                target_unit_id: Some(target_id.to_string()),
                payload,
                duration_rounds,
                tick_timing: Some(TickTiming::TurnEnd),
            };
            lifecycle_events.extend(on_apply(&mut state.units, &mut effect, rng));
            state.effects.insert(effect_id.clone(), effect);

            affliction_detail["effect_id"] = json!(effect_id);
            affliction_detail["initial_stage"] = json!(initial_stage);
            affliction_detail["maximum_duration_rounds"] = json!(duration_rounds);
        }

        let target_hp = state.units[target_id].hp;
        return (
            json!({
                "actor": actor_id,
                "target": target_id,
                "save": save_detail,
                "damage": Value::Null,
                "applied_conditions": Value::Array(vec![]),
                "special_flags": Value::Array(vec![]),
                "affliction": affliction_detail,
                "target_hp": target_hp,
            }),
            lifecycle_events,
        );
    }

    let mut save_detail: Value = Value::Null;
    let mut damage_detail: Value = Value::Null;
    let mut should_apply_secondary = true;

    if let Some(save_event) = save_event {
        let dc = save_event.get("dc").and_then(|v| v.as_i64()).unwrap_or(0);
        let save_type_str = save_event.get("save_type").and_then(|v| v.as_str()).unwrap_or("Fortitude").to_string();
        let save_type = match save_type_str.as_str() {
            "Reflex" => SaveType::Reflex,
            "Will" => SaveType::Will,
            _ => SaveType::Fortitude,
        };
        let check = resolve_save(rng, save_type, &save_profile(&state.units, target_id), dc);
        let save_mode = save_event.get("mode").and_then(|v| v.as_str()).unwrap_or("standard").to_string();
        save_detail = json!({
            "dc": dc,
            "save_type": save_type_str,
            "mode": save_mode,
            "die": check.die,
            "modifier": check.modifier,
            "total": check.total,
            "degree": degree_tag(check.degree),
        });
        should_apply_secondary = matches!(check.degree, Degree::Failure | Degree::CriticalFailure);

        if let Some(damage_event) = damage_event {
            let formula = damage_event.get("formula").and_then(|v| v.as_str()).unwrap_or("0").to_string();
            let damage_type = damage_event.get("damage_type").and_then(|v| v.as_str()).map(|s| s.to_lowercase());
            let multiplier = match save_mode.as_str() {
                "basic" => basic_save_multiplier(check.degree),
                "negates" => {
                    if matches!(check.degree, Degree::Success | Degree::CriticalSuccess) {
                        0.0
                    } else {
                        1.0
                    }
                }
                _ => 1.0,
            };
            let target = state.units.get_mut(target_id).expect("target exists");
            damage_detail = apply_modeled_damage(target, rng, &formula, damage_type.as_deref(), multiplier).value;
        }
    } else if let Some(damage_event) = damage_event {
        let formula = damage_event.get("formula").and_then(|v| v.as_str()).unwrap_or("0").to_string();
        let damage_type = damage_event.get("damage_type").and_then(|v| v.as_str()).map(|s| s.to_lowercase());
        let target = state.units.get_mut(target_id).expect("target exists");
        damage_detail = apply_modeled_damage(target, rng, &formula, damage_type.as_deref(), 1.0).value;
    }

    let mut applied_conditions = Vec::new();
    let mut skipped_conditions = Vec::new();
    if should_apply_secondary {
        for cond in &condition_events {
            let name = normalize_condition_name(cond.get("condition").and_then(|v| v.as_str()).unwrap_or(""));
            let value = cond.get("value").and_then(|v| v.as_i64()).unwrap_or(1);
            if name.is_empty() {
                continue;
            }
            let target = state.units.get_mut(target_id).expect("target exists");
            if condition_is_immune(&name, &target.condition_immunities) {
                skipped_conditions.push(json!({"name": name, "value": value, "reason": "condition_immune"}));
            } else {
                apply_condition(&mut target.conditions, &name, value);
                applied_conditions.push(json!({"name": name, "value": value}));
            }
        }
    }

    let mut special_flags: Vec<String> = Vec::new();
    if !death_events.is_empty() && should_apply_secondary {
        let target = state.units.get_mut(target_id).expect("target exists");
        target.hp = 0;
        apply_condition(&mut target.conditions, "unconscious", 1);
        for evt in &death_events {
            special_flags.push(evt.get("kind").and_then(|v| v.as_str()).unwrap_or("").to_string());
        }
    }
    if state.units[target_id].hp == 0 {
        let target = state.units.get_mut(target_id).expect("target exists");
        apply_condition(&mut target.conditions, "unconscious", 1);
    }
    for evt in &transform_events {
        special_flags.push(format!("transform:{}", evt.get("transform_type").and_then(|v| v.as_str()).unwrap_or("unknown")));
    }
    for evt in &teleport_events {
        special_flags.push(format!("teleport:{}", evt.get("teleport_type").and_then(|v| v.as_str()).unwrap_or("unknown")));
    }

    let target_hp = state.units[target_id].hp;
    (
        json!({
            "actor": actor_id,
            "target": target_id,
            "save": save_detail,
            "damage": damage_detail,
            "applied_conditions": applied_conditions,
            "skipped_conditions": skipped_conditions,
            "special_flags": special_flags,
            "affliction": Value::Null,
            "target_hp": target_hp,
        }),
        lifecycle_events,
    )
}

pub fn apply_command(state: &BattleState, command: &Command, rng: &mut BattleRng) -> Result<(BattleState, Vec<Event>), ReductionError> {
    let mut next_state = state.clone();
    let mut events = Vec::new();

    let actor_id = command.actor().to_string();
    assert_actor_turn(&next_state, &actor_id)?;
    if !next_state.units[&actor_id].alive() {
        return Err(ReductionError::UnitNotAlive(actor_id));
    }

    match command {
        Command::Move { x, y, .. } => {
            let (x, y) = (*x, *y);
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let occupied = {
                let actor = &next_state.units[&actor_id];
                let map = &next_state.battle_map;
                let is_occupied = |px: i64, py: i64| next_state.units.values().any(|u| u.alive() && u.x == px && u.y == py);
                crate::grid::can_step_to(map, is_occupied, actor.x, actor.y, x, y)
            };
            if !occupied {
                return Err(ReductionError::IllegalMove { x, y });
            }
            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            let old = (actor.x, actor.y);
            actor.x = x;
            actor.y = y;
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "move",
                json!({"actor": actor_id, "from": old, "to": (x, y), "actions_remaining": actions_remaining}),
            );
            Ok((next_state, events))
        }

        Command::Strike { target, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
            if !target_unit.alive() {
                return Err(ReductionError::UnitNotAlive(target.clone()));
            }
            if !has_line_of_sight(&next_state.battle_map, &next_state.units[&actor_id], &next_state.units[target]) {
                return Err(ReductionError::NoLineOfEffect { from: actor_id.clone(), to: target.clone() });
            }

            let cover_grade = cover_grade_for_units(&next_state.battle_map, &next_state.units[&actor_id], &next_state.units[target]);
            let cover_bonus = cover_ac_bonus_for_units(&next_state.battle_map, &next_state.units[&actor_id], &next_state.units[target]);
            let effective_ac = next_state.units[target].ac + cover_bonus;
            let attack_mod = next_state.units[&actor_id].attack_mod;
            let check = resolve_check(rng, attack_mod, effective_ac);
            let multiplier = match check.degree {
                Degree::CriticalSuccess => 2,
                Degree::Success => 1,
                _ => 0,
            };

            let mut damage_total = 0;
            let mut damage_detail: Value = Value::Null;
            if multiplier > 0 {
                let (formula, damage_type, damage_bypass) = {
                    let actor = &next_state.units[&actor_id];
                    (actor.damage.clone(), actor.attack_damage_type.clone(), actor.attack_damage_bypass.clone())
                };
                let dmg = roll_damage(rng, &formula, multiplier)
                    .map_err(|_| ReductionError::InvalidCommand(format!("bad damage formula: {formula}")))?;
                let target_unit = next_state.units.get_mut(target).expect("target exists");
                let adjustment = apply_damage_modifiers(dmg.total, Some(&damage_type), &target_unit.resistances, &target_unit.weaknesses, &target_unit.immunities, &damage_bypass);
                damage_total = adjustment.applied_total;
                let applied_damage = apply_damage_to_pool(target_unit.hp, target_unit.temp_hp, damage_total);
                target_unit.hp = applied_damage.new_hp;
                target_unit.temp_hp = applied_damage.new_temp_hp;
                if target_unit.temp_hp == 0 {
                    target_unit.temp_hp_source = None;
                    target_unit.temp_hp_owner_effect_id = None;
                }
                let mut detail = json!({
                    "formula": formula,
                    "damage_type": damage_type,
                    "rolls": dmg.rolls,
                    "flat_modifier": dmg.flat_modifier,
                    "multiplier": multiplier,
                    "raw_total": adjustment.raw_total,
                    "immune": adjustment.immune,
                    "resistance_total": adjustment.resistance_total,
                    "weakness_total": adjustment.weakness_total,
                    "total": damage_total,
                });
                if applied_damage.absorbed_by_temp_hp > 0 {
                    detail["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
                }
                if target_unit.hp == 0 {
                    apply_condition(&mut target_unit.conditions, "unconscious", 1);
                }
                damage_detail = detail;
            }

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            let target_hp = next_state.units[target].hp;
            let target_ac = next_state.units[target].ac;
            append_event(
                &mut events,
                &mut next_state,
                "strike",
                json!({
                    "actor": actor_id,
                    "target": target,
                    "degree": degree_tag(check.degree),
                    "roll": {
                        "die": check.die,
                        "modifier": check.modifier,
                        "total": check.total,
                        "base_dc": target_ac,
                        "cover_grade": cover_grade_tag(cover_grade),
                        "cover_bonus": cover_bonus,
                        "dc": check.dc,
                    },
                    "damage": damage_detail,
                    "target_hp": target_hp,
                    "actions_remaining": actions_remaining,
                }),
            );
            Ok((next_state, events))
        }

        Command::EndTurn { .. } => {
            let actions_remaining = next_state.units[&actor_id].actions_remaining;
            append_event(&mut events, &mut next_state, "end_turn", json!({"actor": actor_id, "actions_remaining": actions_remaining}));
            let active = next_state.active_unit_id().to_string();
            let lifecycle = process_timing(&mut next_state.units, &mut next_state.effects, rng, &active, TickTiming::TurnEnd);
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle);
            advance_turn(&mut next_state);
            append_event(
                &mut events,
                &mut next_state,
                "turn_start",
                json!({"active_unit": next_state.active_unit_id(), "round": next_state.round_number}),
            );
            let active = next_state.active_unit_id().to_string();
            let lifecycle = process_timing(&mut next_state.units, &mut next_state.effects, rng, &active, TickTiming::TurnStart);
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle);
            Ok((next_state, events))
        }

        Command::SaveDamage { target, dc, save_type, damage, mode, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let Mode::Basic = mode;
            let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
            if !target_unit.alive() {
                return Err(ReductionError::UnitNotAlive(target.clone()));
            }

            let check = resolve_save(rng, *save_type, &save_profile(&next_state.units, target), *dc);
            let multiplier = basic_save_multiplier(check.degree);
            let roll = roll_damage(rng, damage, 1).map_err(|_| ReductionError::InvalidCommand(format!("bad damage formula: {damage}")))?;
            let raw_total = (roll.total as f64 * multiplier) as i64;

            let target_unit = next_state.units.get_mut(target).expect("target exists");
            let adjustment = apply_damage_modifiers(raw_total, None, &target_unit.resistances, &target_unit.weaknesses, &target_unit.immunities, &[]);
            let damage_total = adjustment.applied_total;
            let applied_damage = apply_damage_to_pool(target_unit.hp, target_unit.temp_hp, damage_total);
            target_unit.hp = applied_damage.new_hp;
            target_unit.temp_hp = applied_damage.new_temp_hp;
            if target_unit.temp_hp == 0 {
                target_unit.temp_hp_source = None;
                target_unit.temp_hp_owner_effect_id = None;
            }
            if target_unit.hp == 0 {
                apply_condition(&mut target_unit.conditions, "unconscious", 1);
            }

            let mut damage_payload = json!({
                "formula": damage,
                "rolled_total": roll.total,
                "rolls": roll.rolls,
                "flat_modifier": roll.flat_modifier,
                "multiplier": multiplier,
                "raw_total": adjustment.raw_total,
                "immune": adjustment.immune,
                "resistance_total": adjustment.resistance_total,
                "weakness_total": adjustment.weakness_total,
                "applied_total": damage_total,
            });
            if applied_damage.absorbed_by_temp_hp > 0 {
                damage_payload["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
            }

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            let target_hp = next_state.units[target].hp;
            append_event(
                &mut events,
                &mut next_state,
                "save_damage",
                json!({
                    "actor": actor_id,
                    "target": target,
                    "save_type": save_type,
                    "roll": {"die": check.die, "modifier": check.modifier, "total": check.total, "dc": check.dc, "degree": degree_tag(check.degree)},
                    "damage": damage_payload,
                    "target_hp": target_hp,
                    "actions_remaining": actions_remaining,
                }),
            );
            Ok((next_state, events))
        }

        Command::AreaSaveDamage { center_x, center_y, radius_feet, dc, save_type, damage, mode, include_actor, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let Mode::Basic = mode;
            let excluded = if *include_actor { None } else { Some(actor_id.as_str()) };
            let targets: Vec<String> = units_within_radius_feet(&next_state, *center_x, *center_y, *radius_feet, excluded)
                .into_iter()
                .filter(|uid| has_tile_line_of_effect(&next_state.battle_map, *center_x, *center_y, next_state.units[uid].x, next_state.units[uid].y))
                .collect();

            let mut resolutions = Vec::new();
            for target_id in &targets {
                let check = resolve_save(rng, *save_type, &save_profile(&next_state.units, target_id), *dc);
                let multiplier = basic_save_multiplier(check.degree);
                let roll = roll_damage(rng, damage, 1).map_err(|_| ReductionError::InvalidCommand(format!("bad damage formula: {damage}")))?;
                let raw_total = (roll.total as f64 * multiplier) as i64;

                let target_unit = next_state.units.get_mut(target_id).expect("target exists");
                let adjustment = apply_damage_modifiers(raw_total, None, &target_unit.resistances, &target_unit.weaknesses, &target_unit.immunities, &[]);
                let applied = adjustment.applied_total;
                let applied_damage = apply_damage_to_pool(target_unit.hp, target_unit.temp_hp, applied);
                target_unit.hp = applied_damage.new_hp;
                target_unit.temp_hp = applied_damage.new_temp_hp;
                if target_unit.temp_hp == 0 {
                    target_unit.temp_hp_source = None;
                    target_unit.temp_hp_owner_effect_id = None;
                }
                if target_unit.hp == 0 {
                    apply_condition(&mut target_unit.conditions, "unconscious", 1);
                }
                let mut damage_payload = json!({
                    "formula": damage,
                    "rolled_total": roll.total,
                    "rolls": roll.rolls,
                    "flat_modifier": roll.flat_modifier,
                    "multiplier": multiplier,
                    "raw_total": adjustment.raw_total,
                    "immune": adjustment.immune,
                    "resistance_total": adjustment.resistance_total,
                    "weakness_total": adjustment.weakness_total,
                    "applied_total": applied,
                });
                if applied_damage.absorbed_by_temp_hp > 0 {
                    damage_payload["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
                }
                resolutions.push(json!({
                    "target": target_id,
                    "save": {"dc": dc, "save_type": save_type, "die": check.die, "modifier": check.modifier, "total": check.total, "degree": degree_tag(check.degree)},
                    "damage": damage_payload,
                    "target_hp": target_unit.hp,
                }));
            }

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "area_save_damage",
                json!({
                    "actor": actor_id,
                    "center": [center_x, center_y],
                    "radius_feet": radius_feet,
                    "save_type": save_type,
                    "dc": dc,
                    "damage_formula": damage,
                    "targets": targets,
                    "resolutions": resolutions,
                    "actions_remaining": actions_remaining,
                }),
            );
            Ok((next_state, events))
        }

        Command::ApplyEffect { target, effect_kind, payload, duration_rounds, tick_timing, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
            if !target_unit.alive() {
                return Err(ReductionError::UnitNotAlive(target.clone()));
            }

            let effect_id = new_effect_id(&next_state);
            let payload_map: HashMap<String, Value> = payload.as_object().map(|o| o.clone().into_iter().collect()).unwrap_or_default();
            let mut effect = EffectState {
                effect_id: effect_id.clone(),
                kind: effect_kind.clone(),
                source_unit_id: Some(actor_id.clone()),
                target_unit_id: Some(target.clone()),
                payload: payload_map,
                duration_rounds: *duration_rounds,
                tick_timing: tick_timing.clone(),
            };

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "apply_effect_command",
                json!({
                    "actor": actor_id,
                    "target": target,
                    "effect_id": effect_id,
                    "kind": effect.kind,
                    "duration_rounds": effect.duration_rounds,
                    "actions_remaining": actions_remaining,
                }),
            );
            let lifecycle = on_apply(&mut next_state.units, &mut effect, rng);
            next_state.effects.insert(effect_id, effect);
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle);
            Ok((next_state, events))
        }

        Command::SetFlag { flag, value, .. } => {
            next_state.flags.insert(flag.clone(), *value);
            append_event(&mut events, &mut next_state, "set_flag", json!({"actor": actor_id, "flag": flag, "value": value}));
            Ok((next_state, events))
        }

        Command::SpawnUnit { unit, placement_policy, spend_action, .. } => {
            let unit_id = unit.unit_id.clone();
            if unit_id.is_empty() {
                return Err(ReductionError::InvalidCommand("spawn_unit requires unit.id".to_string()));
            }
            if next_state.units.contains_key(&unit_id) {
                return Err(ReductionError::DuplicateUnitId(unit_id));
            }
            if unit.team.is_empty() {
                return Err(ReductionError::InvalidCommand("spawn_unit unit.team is required".to_string()));
            }
            if unit.hp <= 0 {
                return Err(ReductionError::InvalidCommand("spawn_unit unit.hp must be > 0".to_string()));
            }

            let (spawn_x, spawn_y) = match placement_policy {
                PlacementPolicy::NearestOpen => nearest_open_tile(&next_state, unit.x, unit.y).ok_or(ReductionError::NoOpenTile)?,
                PlacementPolicy::Exact => {
                    if !next_state.battle_map.in_bounds(unit.x, unit.y)
                        || next_state.battle_map.is_blocked(unit.x, unit.y)
                        || next_state.battle_map.is_occupied(&next_state.units, unit.x, unit.y)
                    {
                        return Err(ReductionError::InvalidSpawnPosition { x: unit.x, y: unit.y });
                    }
                    (unit.x, unit.y)
                }
            };

            let mut spawned = unit.clone();
            spawned.apply_spawn_defaults();
            spawned.x = spawn_x;
            spawned.y = spawn_y;
            spawned.actions_remaining = 3;
            spawned.reaction_available = true;
            if spawned.temp_hp > 0 {
                spawned.temp_hp_source = Some(format!("spawn:{unit_id}"));
            }

            next_state.units.insert(unit_id.clone(), spawned.clone());
            let active_unit_id = next_state.active_unit_id().to_string();
            next_state.turn_order = build_turn_order(&next_state.units);
            next_state.turn_index = next_state.turn_order.iter().position(|id| id == &active_unit_id).unwrap_or(0);

            if *spend_action {
                let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
                actor.actions_remaining -= 1;
            }
            let actions_remaining = next_state.units[&actor_id].actions_remaining;

            append_event(
                &mut events,
                &mut next_state,
                "spawn_unit",
                json!({
                    "actor": actor_id,
                    "unit_id": unit_id,
                    "team": spawned.team,
                    "position": [spawned.x, spawned.y],
                    "spend_action": spend_action,
                    "actions_remaining": actions_remaining,
                }),
            );
            Ok((next_state, events))
        }

        Command::TriggerHazardSource { hazard_id, source_name, source_type, center_x, center_y, target, model_path, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let model_path = model_path.clone().unwrap_or_else(|| DEFAULT_EFFECT_MODEL_PATH.to_string());
            let source = lookup_hazard_source(hazard_id, source_name, source_type, &model_path)
                .map_err(|_| ReductionError::HazardSourceNotFound { hazard_id: hazard_id.clone(), source_type: source_type.clone(), source_name: source_name.clone() })?;

            let target_ids = choose_model_targets(&next_state, &actor_id, &source.effects, target.as_deref(), *center_x, *center_y);

            let mut per_target = Vec::new();
            let mut lifecycle_events = Vec::new();
            for target_id in &target_ids {
                if !next_state.units.get(target_id).map(|u| u.alive()).unwrap_or(false) {
                    continue;
                }
                let (result, target_events) =
                    apply_modeled_effects_to_target(&mut next_state, rng, &actor_id, target_id, &source.effects, Some(&format!("{hazard_id}:{source_name}")));
                per_target.push(result);
                lifecycle_events.extend(target_events);
            }

            let mut effect_kinds: BTreeSet<String> =
                source.effects.iter().filter_map(|e| e.get("kind").and_then(|v| v.as_str()).map(String::from)).collect();
            let effect_kinds: Vec<String> = effect_kinds.drain().collect();

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "trigger_hazard_source",
                json!({
                    "actor": actor_id,
                    "hazard_id": hazard_id,
                    "source_type": source_type,
                    "source_name": source_name,
                    "center": if center_x.is_some() && center_y.is_some() { json!([center_x, center_y]) } else { Value::Null },
                    "explicit_target": target,
                    "target_ids": target_ids,
                    "effect_kinds": effect_kinds,
                    "results": per_target,
                    "actions_remaining": actions_remaining,
                }),
            );
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle_events);
            Ok((next_state, events))
        }

        Command::RunHazardRoutine { hazard_id, source_name, source_type, target_policy, center_x, center_y, target, model_path, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining <= 0 {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let model_path = model_path.clone().unwrap_or_else(|| DEFAULT_EFFECT_MODEL_PATH.to_string());
            let mut center_x = *center_x;
            let mut center_y = *center_y;
            let mut explicit_target = target.clone();

            match target_policy {
                TargetPolicy::NearestEnemy => explicit_target = nearest_enemy_unit_id(&next_state, &actor_id),
                TargetPolicy::NearestEnemyAreaCenter => {
                    explicit_target = None;
                    if let Some(nearest_id) = nearest_enemy_unit_id(&next_state, &actor_id) {
                        let nearest = &next_state.units[&nearest_id];
                        center_x = Some(nearest.x);
                        center_y = Some(nearest.y);
                    }
                }
                TargetPolicy::Explicit | TargetPolicy::AsConfigured => {}
                TargetPolicy::AllEnemies => explicit_target = None,
            }

            let source = lookup_hazard_source(hazard_id, source_name, source_type, &model_path)
                .map_err(|_| ReductionError::HazardSourceNotFound { hazard_id: hazard_id.clone(), source_type: source_type.clone(), source_name: source_name.clone() })?;

            let mut target_ids = choose_model_targets(&next_state, &actor_id, &source.effects, explicit_target.as_deref(), center_x, center_y);
            if matches!(target_policy, TargetPolicy::AllEnemies) {
                let actor_team = next_state.units[&actor_id].team.clone();
                target_ids.retain(|uid| next_state.units[uid].team != actor_team);
            }

            let mut per_target = Vec::new();
            let mut lifecycle_events = Vec::new();
            for target_id in &target_ids {
                if !next_state.units.get(target_id).map(|u| u.alive()).unwrap_or(false) {
                    continue;
                }
                let (result, target_events) =
                    apply_modeled_effects_to_target(&mut next_state, rng, &actor_id, target_id, &source.effects, Some(&format!("{hazard_id}:{source_name}")));
                per_target.push(result);
                lifecycle_events.extend(target_events);
            }

            let mut effect_kinds: BTreeSet<String> =
                source.effects.iter().filter_map(|e| e.get("kind").and_then(|v| v.as_str()).map(String::from)).collect();
            let effect_kinds: Vec<String> = effect_kinds.drain().collect();

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= 1;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "run_hazard_routine",
                json!({
                    "actor": actor_id,
                    "hazard_id": hazard_id,
                    "source_type": source_type,
                    "source_name": source_name,
                    "target_policy": target_policy,
                    "center": if center_x.is_some() && center_y.is_some() { json!([center_x, center_y]) } else { Value::Null },
                    "explicit_target": explicit_target,
                    "target_ids": target_ids,
                    "effect_kinds": effect_kinds,
                    "results": per_target,
                    "actions_remaining": actions_remaining,
                }),
            );
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle_events);
            Ok((next_state, events))
        }

        Command::CastSpell { target, dc, save_type, damage, action_cost, damage_type, damage_bypass, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining < *action_cost {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
            if !target_unit.alive() {
                return Err(ReductionError::UnitNotAlive(target.clone()));
            }

            let check = resolve_save(rng, *save_type, &save_profile(&next_state.units, target), *dc);
            let multiplier = basic_save_multiplier(check.degree);
            let roll = roll_damage(rng, damage, 1).map_err(|_| ReductionError::InvalidCommand(format!("bad damage formula: {damage}")))?;
            let raw_total = (roll.total as f64 * multiplier) as i64;

            let target_unit = next_state.units.get_mut(target).expect("target exists");
            let adjustment =
                apply_damage_modifiers(raw_total, Some(damage_type), &target_unit.resistances, &target_unit.weaknesses, &target_unit.immunities, damage_bypass);
            let applied_damage = apply_damage_to_pool(target_unit.hp, target_unit.temp_hp, adjustment.applied_total);
            target_unit.hp = applied_damage.new_hp;
            target_unit.temp_hp = applied_damage.new_temp_hp;
            if target_unit.temp_hp == 0 {
                target_unit.temp_hp_source = None;
                target_unit.temp_hp_owner_effect_id = None;
            }
            if target_unit.hp == 0 {
                apply_condition(&mut target_unit.conditions, "unconscious", 1);
            }

            let mut damage_payload = json!({
                "formula": damage,
                "damage_type": damage_type,
                "rolled_total": roll.total,
                "rolls": roll.rolls,
                "flat_modifier": roll.flat_modifier,
                "multiplier": multiplier,
                "raw_total": adjustment.raw_total,
                "immune": adjustment.immune,
                "resistance_total": adjustment.resistance_total,
                "weakness_total": adjustment.weakness_total,
                "applied_total": adjustment.applied_total,
            });
            if applied_damage.absorbed_by_temp_hp > 0 {
                damage_payload["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
            }

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= action_cost;
            let actions_remaining = actor.actions_remaining;
            let target_hp = next_state.units[target].hp;
            append_event(
                &mut events,
                &mut next_state,
                "cast_spell",
                json!({
                    "actor": actor_id,
                    "target": target,
                    "save_type": save_type,
                    "roll": {"die": check.die, "modifier": check.modifier, "total": check.total, "dc": check.dc, "degree": degree_tag(check.degree)},
                    "damage": damage_payload,
                    "target_hp": target_hp,
                    "actions_remaining": actions_remaining,
                }),
            );
            Ok((next_state, events))
        }

        Command::UseFeat { target, effect_kind, payload, duration_rounds, tick_timing, action_cost, .. }
        | Command::UseItem { target, effect_kind, payload, duration_rounds, tick_timing, action_cost, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining < *action_cost {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }
            let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
            if !target_unit.alive() {
                return Err(ReductionError::UnitNotAlive(target.clone()));
            }

            let event_name = if matches!(command, Command::UseFeat { .. }) { "use_feat" } else { "use_item" };
            let effect_id = new_effect_id(&next_state);
            let payload_map: HashMap<String, Value> = payload.as_object().map(|o| o.clone().into_iter().collect()).unwrap_or_default();
            let mut effect = EffectState {
                effect_id: effect_id.clone(),
                kind: effect_kind.clone(),
                source_unit_id: Some(actor_id.clone()),
                target_unit_id: Some(target.clone()),
                payload: payload_map,
                duration_rounds: *duration_rounds,
                tick_timing: tick_timing.clone(),
            };

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= action_cost;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                event_name,
                json!({
                    "actor": actor_id,
                    "target": target,
                    "effect_id": effect_id,
                    "kind": effect.kind,
                    "duration_rounds": effect.duration_rounds,
                    "actions_remaining": actions_remaining,
                }),
            );
            let lifecycle = on_apply(&mut next_state.units, &mut effect, rng);
            next_state.effects.insert(effect_id, effect);
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle);
            Ok((next_state, events))
        }

        Command::Interact { interact_id, target, effect_kind, payload, duration_rounds, tick_timing, action_cost, flag, value, .. } => {
            {
                let actor = &next_state.units[&actor_id];
                if actor.actions_remaining < *action_cost {
                    return Err(ReductionError::NoActionsRemaining(actor_id));
                }
            }

            let mut effect_id: Option<String> = None;
            let mut lifecycle: Vec<(String, Value)> = Vec::new();
            if let (Some(target), Some(effect_kind)) = (target, effect_kind) {
                let target_unit = next_state.units.get(target).ok_or_else(|| ReductionError::UnitNotFound(target.clone()))?;
                if !target_unit.alive() {
                    return Err(ReductionError::UnitNotAlive(target.clone()));
                }
                let new_id = new_effect_id(&next_state);
                let payload_map: HashMap<String, Value> = payload.as_object().map(|o| o.clone().into_iter().collect()).unwrap_or_default();
                let mut effect = EffectState {
                    effect_id: new_id.clone(),
                    kind: effect_kind.clone(),
                    source_unit_id: Some(actor_id.clone()),
                    target_unit_id: Some(target.clone()),
                    payload: payload_map,
                    duration_rounds: *duration_rounds,
                    tick_timing: tick_timing.clone(),
                };
                lifecycle = on_apply(&mut next_state.units, &mut effect, rng);
                next_state.effects.insert(new_id.clone(), effect);
                effect_id = Some(new_id);
            }
            if let Some(flag) = flag {
                next_state.flags.insert(flag.clone(), *value);
            }

            let actor = next_state.units.get_mut(&actor_id).expect("actor exists");
            actor.actions_remaining -= action_cost;
            let actions_remaining = actor.actions_remaining;
            append_event(
                &mut events,
                &mut next_state,
                "interact",
                json!({
                    "actor": actor_id,
                    "interact_id": interact_id,
                    "target": target,
                    "effect_id": effect_id,
                    "flag": flag,
                    "value": value,
                    "actions_remaining": actions_remaining,
                }),
            );
            emit_lifecycle_events(&mut events, &mut next_state, lifecycle);
            Ok((next_state, events))
        }
    }
}
