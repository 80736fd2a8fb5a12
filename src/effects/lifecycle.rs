//! Apply / tick / expire hooks for the four effect kinds: `condition`,
//! `persistent_damage`, `affliction`, `temp_hp`.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::model::effect::{EffectState, TickTiming};
use crate::model::unit::UnitState;
use crate::rng::BattleRng;
use crate::rules::checks::resolve_check;
use crate::rules::conditions::{apply_condition, clear_condition, condition_is_immune, normalize_condition_name};
use crate::rules::damage::{apply_damage_modifiers, apply_damage_to_pool, roll_damage};
use crate::rules::degrees::Degree;
use crate::rules::saves::{resolve_save, SaveProfile, SaveType};

pub type LifecycleEvent = (String, Value);

fn unit_save_profile(units: &HashMap<String, UnitState>, unit_id: &str) -> SaveProfile {
    let unit = &units[unit_id];
    SaveProfile { fortitude: unit.fortitude, reflex: unit.reflex, will: unit.will }
}

fn degree_tag(degree: Degree) -> &'static str {
    match degree {
        Degree::CriticalSuccess => "critical_success",
        Degree::Success => "success",
        Degree::Failure => "failure",
        Degree::CriticalFailure => "critical_failure",
    }
}

fn parse_save_type(raw: &str) -> SaveType {
    match raw.to_lowercase().as_str() {
        "reflex" => SaveType::Reflex,
        "will" => SaveType::Will,
        _ => SaveType::Fortitude,
    }
}

fn get_array(payload: &HashMap<String, Value>, key: &str) -> Vec<Value> {
    payload.get(key).and_then(|v| v.as_array()).cloned().unwrap_or_default()
}

fn get_i64(payload: &HashMap<String, Value>, key: &str, default: i64) -> i64 {
    payload.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

fn get_str(payload: &HashMap<String, Value>, key: &str) -> String {
    payload.get(key).and_then(|v| v.as_str()).map(String::from).unwrap_or_default()
}

fn get_bool(payload: &HashMap<String, Value>, key: &str, default: bool) -> bool {
    payload.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn obj_get_i64(value: &Value, key: &str, default: i64) -> i64 {
    value.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

fn obj_get_str(value: &Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).map(String::from).unwrap_or_default()
}

fn stage_by_number(stages: &[Value], stage_number: i64) -> Option<Value> {
    stages.iter().find(|stage| obj_get_i64(stage, "stage", 0) == stage_number).cloned()
}

fn duration_to_rounds(duration: &Value, default_rounds: i64) -> i64 {
    if !duration.is_object() {
        return default_rounds;
    }
    let amount = obj_get_i64(duration, "amount", 0);
    let unit = obj_get_str(duration, "unit");
    if amount <= 0 {
        return default_rounds;
    }
    match unit.as_str() {
        "round" => amount,
        "minute" => amount * 10,
        "hour" => amount * 600,
        "day" => amount * 14400,
        _ => default_rounds,
    }
}

fn apply_affliction_stage(
    units: &mut HashMap<String, UnitState>,
    effect: &mut EffectState,
    rng: &mut BattleRng,
    stage_number: i64,
) -> Value {
    let target_id = match &effect.target_unit_id {
        Some(id) => id.clone(),
        None => return json!({"stage": stage_number, "applied": false, "reason": "target_missing_or_dead"}),
    };
    if !units.get(&target_id).map(|u| u.alive()).unwrap_or(false) {
        return json!({"stage": stage_number, "applied": false, "reason": "target_missing_or_dead"});
    }

    let stages = get_array(&effect.payload, "stages");
    let stage = match stage_by_number(&stages, stage_number) {
        Some(stage) => stage,
        None => {
            let target_hp = units[&target_id].hp;
            return json!({"stage": stage_number, "applied": false, "reason": "stage_not_found", "target_hp": target_hp});
        }
    };

    let persistent_conditions: Vec<String> = get_array(&effect.payload, "persistent_conditions")
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.replace(' ', "_"))
        .filter(|s| !s.is_empty())
        .collect();

    let old_applied: HashMap<String, i64> = effect
        .payload
        .get("applied_conditions")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    let mut damage_results = Vec::new();
    for dmg in stage.get("damage").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
        let formula = obj_get_str(&dmg, "formula");
        if formula.is_empty() {
            continue;
        }
        let roll = match roll_damage(rng, &formula, 1) {
            Ok(roll) => roll,
            Err(_) => continue,
        };
        let target = units.get_mut(&target_id).expect("target exists");
        let applied_damage = apply_damage_to_pool(target.hp, target.temp_hp, roll.total);
        target.hp = applied_damage.new_hp;
        target.temp_hp = applied_damage.new_temp_hp;
        if target.temp_hp == 0 {
            target.temp_hp_source = None;
            target.temp_hp_owner_effect_id = None;
        }
        let mut detail = json!({
            "formula": formula,
            "damage_type": dmg.get("damage_type").cloned().unwrap_or(Value::Null),
            "rolls": roll.rolls,
            "flat_modifier": roll.flat_modifier,
            "total": roll.total,
        });
        if applied_damage.absorbed_by_temp_hp > 0 {
            detail["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
        }
        damage_results.push(detail);
    }

    let mut stage_condition_values: HashMap<String, i64> = HashMap::new();
    let mut applied_conditions = Vec::new();
    let mut skipped_conditions = Vec::new();
    for cond in stage.get("conditions").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
        let name = normalize_condition_name(&obj_get_str(&cond, "condition"));
        if name.is_empty() {
            continue;
        }
        let value = cond.get("value").and_then(|v| v.as_i64()).unwrap_or(1);
        let target = units.get_mut(&target_id).expect("target exists");
        if condition_is_immune(&name, &target.condition_immunities) {
            skipped_conditions.push(json!({"name": name, "value": value, "reason": "condition_immune"}));
            continue;
        }
        let old_value = old_applied.get(&name).copied();
        let current = *target.conditions.get(&name).unwrap_or(&0);
        if old_value == Some(current) {
            target.conditions.insert(name.clone(), value);
        } else {
            apply_condition(&mut target.conditions, &name, value);
        }
        stage_condition_values.insert(name.clone(), value);
        applied_conditions.push(json!({"name": name, "value": value}));
    }

    let mut cleared_conditions = Vec::new();
    for (name, old_value) in &old_applied {
        if stage_condition_values.contains_key(name) {
            continue;
        }
        if persistent_conditions.contains(name) {
            continue;
        }
        let target = units.get_mut(&target_id).expect("target exists");
        if target.conditions.get(name).copied().unwrap_or(0) == *old_value {
            clear_condition(&mut target.conditions, name);
            cleared_conditions.push(name.clone());
        }
    }

    let mut tracked_applied: HashMap<String, i64> = stage_condition_values.clone();
    {
        let target = units.get(&target_id).expect("target exists");
        for name in &persistent_conditions {
            if let Some(old_value) = old_applied.get(name) {
                if target.conditions.get(name).copied().unwrap_or(0) == *old_value {
                    tracked_applied.insert(name.clone(), *old_value);
                }
            }
        }
    }

    effect.payload.insert("applied_conditions".to_string(), json!(tracked_applied));
    let stage_rounds = duration_to_rounds(&stage.get("duration").cloned().unwrap_or(Value::Null), 1);
    effect.payload.insert("stage_rounds_remaining".to_string(), json!(stage_rounds));

    let target = units.get_mut(&target_id).expect("target exists");
    if target.hp == 0 {
        apply_condition(&mut target.conditions, "unconscious", 1);
    }

    json!({
        "stage": stage_number,
        "applied": true,
        "damage": damage_results,
        "conditions": applied_conditions,
        "skipped_conditions": skipped_conditions,
        "cleared_conditions": cleared_conditions,
        "stage_rounds": stage_rounds,
        "target_hp": target.hp,
    })
}

fn affliction_delta(degree: Degree) -> i64 {
    match degree {
        Degree::CriticalSuccess => -2,
        Degree::Success => -1,
        Degree::Failure => 1,
        Degree::CriticalFailure => 2,
    }
}

fn on_affliction_tick(units: &mut HashMap<String, UnitState>, effect: &mut EffectState, rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    let target_id = match &effect.target_unit_id {
        Some(id) => id.clone(),
        None => return Vec::new(),
    };
    if !units.get(&target_id).map(|u| u.alive()).unwrap_or(false) {
        return Vec::new();
    }

    let current_stage = get_i64(&effect.payload, "current_stage", 1);
    let stages = get_array(&effect.payload, "stages");
    let max_stage = stages
        .iter()
        .map(|s| obj_get_i64(s, "stage", 0))
        .max()
        .unwrap_or(current_stage);
    let stage_rounds_remaining = get_i64(&effect.payload, "stage_rounds_remaining", 1);

    if stage_rounds_remaining > 1 {
        let remaining = stage_rounds_remaining - 1;
        effect.payload.insert("stage_rounds_remaining".to_string(), json!(remaining));
        let target_hp = units[&target_id].hp;
        return vec![(
            "effect_tick".to_string(),
            json!({
                "effect_id": effect.effect_id,
                "kind": effect.kind,
                "target": target_id,
                "stage_from": current_stage,
                "stage_to": current_stage,
                "waiting": true,
                "remaining_stage_rounds": remaining,
                "target_hp": target_hp,
            }),
        )];
    }

    let save_cfg = effect.payload.get("save").cloned().unwrap_or(Value::Null);
    let mut save_detail: Value = Value::Null;
    let mut next_stage = current_stage;
    if save_cfg.is_object() {
        let dc = obj_get_i64(&save_cfg, "dc", 0);
        let save_type_raw = obj_get_str(&save_cfg, "save_type");
        let save_type_raw = if save_type_raw.is_empty() { "Fortitude".to_string() } else { save_type_raw };
        if dc > 0 {
            let save_type = parse_save_type(&save_type_raw);
            let profile = unit_save_profile(units, &target_id);
            let check = resolve_save(rng, save_type, &profile, dc);
            next_stage = (current_stage + affliction_delta(check.degree)).clamp(0, max_stage);
            save_detail = json!({
                "dc": dc,
                "save_type": save_type_raw,
                "die": check.die,
                "modifier": check.modifier,
                "total": check.total,
                "degree": degree_tag(check.degree),
            });
        }
    }

    effect.payload.insert("current_stage".to_string(), json!(next_stage));
    if next_stage <= 0 {
        effect.duration_rounds = Some(0);
        let target_hp = units[&target_id].hp;
        return vec![(
            "effect_tick".to_string(),
            json!({
                "effect_id": effect.effect_id,
                "kind": effect.kind,
                "target": target_id,
                "stage_from": current_stage,
                "stage_to": next_stage,
                "save": save_detail,
                "cured": true,
                "target_hp": target_hp,
            }),
        )];
    }

    let stage_result = apply_affliction_stage(units, effect, rng, next_stage);
    vec![(
        "effect_tick".to_string(),
        json!({
            "effect_id": effect.effect_id,
            "kind": effect.kind,
            "target": target_id,
            "stage_from": current_stage,
            "stage_to": next_stage,
            "save": save_detail,
            "stage_result": stage_result,
        }),
    )]
}

pub fn on_apply(units: &mut HashMap<String, UnitState>, effect: &mut EffectState, rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    let target_id = match &effect.target_unit_id {
        Some(id) => id.clone(),
        None => return Vec::new(),
    };
    if !units.get(&target_id).map(|u| u.alive()).unwrap_or(false) {
        return Vec::new();
    }

    match effect.kind.as_str() {
        "condition" => {
            let name = normalize_condition_name(&get_str(&effect.payload, "name"));
            let value = effect.payload.get("value").and_then(|v| v.as_i64()).unwrap_or(1);
            if name.is_empty() {
                return Vec::new();
            }
            let target = units.get_mut(&target_id).expect("target exists");
            let applied = !condition_is_immune(&name, &target.condition_immunities);
            if applied {
                apply_condition(&mut target.conditions, &name, value);
            }
            vec![(
                "effect_apply".to_string(),
                json!({
                    "effect_id": effect.effect_id,
                    "kind": effect.kind,
                    "target": target_id,
                    "condition": name,
                    "value": value,
                    "applied": applied,
                    "reason": if applied { Value::Null } else { json!("condition_immune") },
                }),
            )]
        }
        "temp_hp" => {
            let amount = get_i64(&effect.payload, "amount", 0);
            let stack_mode_raw = get_str(&effect.payload, "stack_mode");
            let stack_mode = if stack_mode_raw.is_empty() { "max".to_string() } else { stack_mode_raw };
            let cross_source_raw = get_str(&effect.payload, "cross_source");
            let cross_source = if cross_source_raw.is_empty() { "higher_only".to_string() } else { cross_source_raw };
            let mut source_key = get_str(&effect.payload, "source_key");
            if source_key.is_empty() {
                source_key = match &effect.source_unit_id {
                    Some(id) => format!("unit:{id}"),
                    None => format!("effect:{}", effect.effect_id),
                };
            }

            let target = units.get_mut(&target_id).expect("target exists");
            let before = target.temp_hp;
            let before_source = target.temp_hp_source.clone();
            let before_owner = target.temp_hp_owner_effect_id.clone();
            let mut after = before;
            let mut after_source = before_source.clone();
            let mut after_owner = before_owner.clone();
            let mut reason: Option<&'static str> = None;
            let mut decision = "ignored";

            if amount <= 0 {
                reason = Some("invalid_amount");
            } else if stack_mode != "max" && stack_mode != "add" {
                reason = Some("invalid_stack_mode");
            } else if cross_source != "higher_only" && cross_source != "replace" && cross_source != "ignore" {
                reason = Some("invalid_cross_source_policy");
            } else {
                let same_source = before_source.as_deref() == Some(source_key.as_str())
                    || (before == 0 && before_source.is_none());
                if same_source {
                    decision = "same_source_refresh";
                    after = if stack_mode == "add" { before + amount } else { before.max(amount) };
                    after_source = if after > 0 { Some(source_key.clone()) } else { None };
                    after_owner = if after > 0 { Some(effect.effect_id.clone()) } else { None };
                } else if cross_source == "ignore" {
                    decision = "cross_source_ignored";
                    reason = Some("cross_source_policy_ignore");
                } else if cross_source == "replace" {
                    decision = "cross_source_replaced";
                    after = amount;
                    after_source = Some(source_key.clone());
                    after_owner = Some(effect.effect_id.clone());
                } else if amount > before {
                    decision = "cross_source_replaced";
                    after = amount;
                    after_source = Some(source_key.clone());
                    after_owner = Some(effect.effect_id.clone());
                } else {
                    decision = "cross_source_ignored";
                    reason = Some("lower_or_equal_than_current");
                }
            }

            target.temp_hp = after.max(0);
            target.temp_hp_source = if target.temp_hp > 0 { after_source.clone() } else { None };
            target.temp_hp_owner_effect_id = if target.temp_hp > 0 { after_owner.clone() } else { None };

            let granted = (target.temp_hp - before).max(0);
            let applied = target.temp_hp != before
                || target.temp_hp_source != before_source
                || target.temp_hp_owner_effect_id != before_owner;

            effect.payload.insert("applied_temp_hp".to_string(), json!(granted));
            effect.payload.insert("temp_hp_source_key".to_string(), json!(source_key));
            effect.payload.insert("stack_mode".to_string(), json!(stack_mode));
            effect.payload.insert("cross_source".to_string(), json!(cross_source));

            let temp_hp_after = target.temp_hp;
            let temp_hp_source_after = target.temp_hp_source.clone();

            vec![(
                "effect_apply".to_string(),
                json!({
                    "effect_id": effect.effect_id,
                    "kind": effect.kind,
                    "target": target_id,
                    "requested_amount": amount,
                    "stack_mode": effect.payload.get("stack_mode"),
                    "cross_source": effect.payload.get("cross_source"),
                    "source_key": source_key,
                    "temp_hp_before": before,
                    "temp_hp_after": temp_hp_after,
                    "temp_hp_source_before": before_source,
                    "temp_hp_source_after": temp_hp_source_after,
                    "granted": granted,
                    "applied": applied,
                    "decision": decision,
                    "reason": reason,
                }),
            )]
        }
        "affliction" => {
            let stage = get_i64(&effect.payload, "current_stage", 1);
            effect.payload.entry("applied_conditions".to_string()).or_insert_with(|| json!({}));
            effect.payload.entry("persistent_conditions".to_string()).or_insert_with(|| json!([]));
            let stage_result = apply_affliction_stage(units, effect, rng, stage);
            vec![(
                "effect_apply".to_string(),
                json!({
                    "effect_id": effect.effect_id,
                    "kind": effect.kind,
                    "target": target_id,
                    "stage": stage,
                    "stage_result": stage_result,
                }),
            )]
        }
        _ => vec![(
            "effect_apply".to_string(),
            json!({
                "effect_id": effect.effect_id,
                "kind": effect.kind,
                "target": target_id,
            }),
        )],
    }
}

fn apply_persistent_damage(units: &mut HashMap<String, UnitState>, effect: &mut EffectState, rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    let target_id = match &effect.target_unit_id {
        Some(id) => id.clone(),
        None => return Vec::new(),
    };
    if !units.get(&target_id).map(|u| u.alive()).unwrap_or(false) {
        return Vec::new();
    }

    let formula = get_str(&effect.payload, "formula");
    if formula.is_empty() {
        return Vec::new();
    }
    let damage_type_raw = get_str(&effect.payload, "damage_type").to_lowercase();
    let damage_type = if damage_type_raw.is_empty() { None } else { Some(damage_type_raw) };

    let roll = match roll_damage(rng, &formula, 1) {
        Ok(roll) => roll,
        Err(_) => return Vec::new(),
    };

    let target = units.get_mut(&target_id).expect("target exists");
    let adjustment = apply_damage_modifiers(
        roll.total,
        damage_type.as_deref(),
        &target.resistances,
        &target.weaknesses,
        &target.immunities,
        &[],
    );
    let applied_damage = apply_damage_to_pool(target.hp, target.temp_hp, adjustment.applied_total);
    target.hp = applied_damage.new_hp;
    target.temp_hp = applied_damage.new_temp_hp;
    if target.temp_hp == 0 {
        target.temp_hp_source = None;
        target.temp_hp_owner_effect_id = None;
    }
    if target.hp == 0 {
        apply_condition(&mut target.conditions, "unconscious", 1);
    }

    let mut recovery: Value = Value::Null;
    if get_bool(&effect.payload, "recovery_check", true) {
        let recovery_dc = get_i64(&effect.payload, "recovery_dc", 15);
        let recovery_mod = get_i64(&effect.payload, "recovery_modifier", 0);
        let check = resolve_check(rng, recovery_mod, recovery_dc);
        let recovered = matches!(check.degree, Degree::Success | Degree::CriticalSuccess);
        recovery = json!({
            "dc": recovery_dc,
            "modifier": recovery_mod,
            "die": check.die,
            "total": check.total,
            "degree": degree_tag(check.degree),
            "recovered": recovered,
        });
        if recovered {
            effect.payload.insert("_expire_now".to_string(), json!(true));
        }
    }

    let mut damage_payload = json!({
        "formula": formula,
        "rolls": roll.rolls,
        "flat_modifier": roll.flat_modifier,
        "raw_total": adjustment.raw_total,
        "total": adjustment.applied_total,
        "damage_type": adjustment.damage_type.clone().unwrap_or_else(|| "untyped".to_string()),
        "immune": adjustment.immune,
        "resistance_total": adjustment.resistance_total,
        "weakness_total": adjustment.weakness_total,
    });
    if applied_damage.absorbed_by_temp_hp > 0 {
        damage_payload["temp_hp_absorbed"] = json!(applied_damage.absorbed_by_temp_hp);
    }

    let target_hp = units[&target_id].hp;
    vec![(
        "effect_tick".to_string(),
        json!({
            "effect_id": effect.effect_id,
            "kind": effect.kind,
            "target": target_id,
            "damage": damage_payload,
            "recovery": recovery,
            "target_hp": target_hp,
        }),
    )]
}

pub fn on_turn_start(units: &mut HashMap<String, UnitState>, effect: &mut EffectState, rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    if effect.kind == "persistent_damage" {
        apply_persistent_damage(units, effect, rng)
    } else {
        Vec::new()
    }
}

pub fn on_turn_end(units: &mut HashMap<String, UnitState>, effect: &mut EffectState, rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    match effect.kind.as_str() {
        "persistent_damage" => apply_persistent_damage(units, effect, rng),
        "affliction" => on_affliction_tick(units, effect, rng),
        _ => Vec::new(),
    }
}

pub fn on_expire(units: &mut HashMap<String, UnitState>, effect: &EffectState, _rng: &mut BattleRng) -> Vec<LifecycleEvent> {
    if effect.kind == "condition" {
        if let Some(target_id) = &effect.target_unit_id {
            if units.contains_key(target_id) && get_bool(&effect.payload, "clear_on_expire", true) {
                let name = get_str(&effect.payload, "name");
                if !name.is_empty() {
                    let target = units.get_mut(target_id).expect("target exists");
                    clear_condition(&mut target.conditions, &name);
                    return vec![(
                        "effect_expire".to_string(),
                        json!({
                            "effect_id": effect.effect_id,
                            "kind": effect.kind,
                            "target": target_id,
                            "cleared_condition": name,
                        }),
                    )];
                }
            }
        }
    }

    if effect.kind == "affliction" {
        if let Some(target_id) = &effect.target_unit_id {
            if units.contains_key(target_id) {
                let persistent_conditions: Vec<String> = get_array(&effect.payload, "persistent_conditions")
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.replace(' ', "_"))
                    .filter(|s| !s.is_empty())
                    .collect();
                let applied_conditions: HashMap<String, i64> = effect
                    .payload
                    .get("applied_conditions")
                    .and_then(|v| v.as_object())
                    .map(|obj| obj.iter().filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n))).collect())
                    .unwrap_or_default();

                let mut cleared = Vec::new();
                for (name, value) in &applied_conditions {
                    if persistent_conditions.contains(name) {
                        continue;
                    }
                    let target = units.get_mut(target_id).expect("target exists");
                    if target.conditions.get(name).copied().unwrap_or(0) == *value {
                        clear_condition(&mut target.conditions, name);
                        cleared.push(name.clone());
                    }
                }
                cleared.sort();
                let mut persistent_sorted = persistent_conditions.clone();
                persistent_sorted.sort();
                return vec![(
                    "effect_expire".to_string(),
                    json!({
                        "effect_id": effect.effect_id,
                        "kind": effect.kind,
                        "target": target_id,
                        "cleared_conditions": cleared,
                        "persistent_conditions": persistent_sorted,
                    }),
                )];
            }
        }
    }

    if effect.kind == "temp_hp" {
        if let Some(target_id) = &effect.target_unit_id {
            if units.contains_key(target_id) {
                let remove_on_expire = get_bool(&effect.payload, "remove_on_expire", true);
                let source_key = get_str(&effect.payload, "temp_hp_source_key");
                let target = units.get_mut(target_id).expect("target exists");
                let owner_match = target.temp_hp_owner_effect_id.as_deref() == Some(effect.effect_id.as_str());
                let source_match = target.temp_hp_source.as_deref() == Some(source_key.as_str());
                let mut removed = 0;
                if remove_on_expire && owner_match && source_match && target.temp_hp > 0 {
                    removed = target.temp_hp;
                    target.temp_hp = 0;
                    target.temp_hp_source = None;
                    target.temp_hp_owner_effect_id = None;
                }
                let temp_hp_after = target.temp_hp;
                let stack_mode = get_str(&effect.payload, "stack_mode");
                let stack_mode = if stack_mode.is_empty() { "max".to_string() } else { stack_mode };
                let cross_source = get_str(&effect.payload, "cross_source");
                let cross_source = if cross_source.is_empty() { "higher_only".to_string() } else { cross_source };
                return vec![(
                    "effect_expire".to_string(),
                    json!({
                        "effect_id": effect.effect_id,
                        "kind": effect.kind,
                        "target": target_id,
                        "stack_mode": stack_mode,
                        "cross_source": cross_source,
                        "source_key": source_key,
                        "remove_on_expire": remove_on_expire,
                        "owner_match": owner_match,
                        "source_match": source_match,
                        "removed_temp_hp": removed,
                        "temp_hp_after": temp_hp_after,
                    }),
                )];
            }
        }
    }

    vec![(
        "effect_expire".to_string(),
        json!({
            "effect_id": effect.effect_id,
            "kind": effect.kind,
            "target": effect.target_unit_id,
        }),
    )]
}

pub fn process_timing(
    units: &mut HashMap<String, UnitState>,
    effects: &mut HashMap<String, EffectState>,
    rng: &mut BattleRng,
    active_unit_id: &str,
    timing: TickTiming,
) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    let mut to_expire = Vec::new();

    let ids: Vec<String> = effects
        .values()
        .filter(|effect| effect.target_unit_id.as_deref() == Some(active_unit_id))
        .map(|effect| effect.effect_id.clone())
        .collect();

    for effect_id in ids {
        let effect = effects.get_mut(&effect_id).expect("effect exists");

        if effect.tick_timing == Some(timing.clone()) {
            match timing {
                TickTiming::TurnStart => events.extend(on_turn_start(units, effect, rng)),
                TickTiming::TurnEnd => events.extend(on_turn_end(units, effect, rng)),
            }
        }

        if effect.payload.remove("_expire_now").and_then(|v| v.as_bool()).unwrap_or(false) {
            to_expire.push(effect_id);
            continue;
        }

        if timing == TickTiming::TurnEnd {
            if let Some(remaining) = effect.duration_rounds {
                let remaining = remaining - 1;
                effect.duration_rounds = Some(remaining);
                events.push((
                    "effect_duration".to_string(),
                    json!({
                        "effect_id": effect.effect_id,
                        "remaining_rounds": remaining,
                        "target": effect.target_unit_id,
                    }),
                ));
                if remaining <= 0 {
                    to_expire.push(effect_id);
                }
            }
        }
    }

    for effect_id in to_expire {
        if let Some(effect) = effects.get(&effect_id).cloned() {
            events.extend(on_expire(units, &effect, rng));
            effects.remove(&effect_id);
        }
    }

    events
}
