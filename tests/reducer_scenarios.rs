//! Integration coverage for the reducer's scripted scenarios: strike cover
//! bonuses, damage mitigation grouping, temp-HP stacking policy, and
//! affliction stage progression. Every assertion here is constructed to hold
//! regardless of the seeded RNG's actual die rolls, since the roll sequence
//! for a given seed isn't something this suite pins down by inspection.

use std::collections::HashMap;

use serde_json::{json, Value};

use tactical_engine::effects::on_apply;
use tactical_engine::model::{BattleState, Command, EffectState, MapState, TickTiming, UnitState};
use tactical_engine::reducer::apply_command;
use tactical_engine::rng::BattleRng;

fn unit(id: &str, team: &str, hp: i64, x: i64, y: i64) -> UnitState {
    UnitState {
        unit_id: id.to_string(),
        team: team.to_string(),
        hp,
        x,
        y,
        max_hp: hp,
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

fn state_with(turn_order: Vec<&str>, units: Vec<UnitState>, map: MapState) -> BattleState {
    let mut by_id = HashMap::new();
    for u in units {
        by_id.insert(u.unit_id.clone(), u);
    }
    BattleState {
        battle_id: "b1".to_string(),
        seed: 1,
        round_number: 1,
        turn_index: 0,
        turn_order: turn_order.into_iter().map(String::from).collect(),
        units: by_id,
        battle_map: map,
        effects: HashMap::new(),
        flags: HashMap::new(),
        event_sequence: 0,
    }
}

fn find_event<'a>(events: &'a [tactical_engine::model::Event], event_type: &str) -> &'a tactical_engine::model::Event {
    events.iter().find(|e| e.event_type == event_type).unwrap_or_else(|| panic!("no {event_type} event in {events:?}"))
}

/// A single block flanking the target tile on its perpendicular axis grants
/// standard cover, which adds +2 to the target's effective AC.
#[test]
fn strike_applies_standard_cover_bonus_on_a_flanked_line() {
    let mut attacker = unit("attacker", "party", 20, 1, 1);
    attacker.attack_mod = 100;
    let mut target = unit("target", "enemy", 20, 4, 1);
    target.ac = 16;

    let map = MapState { width: 6, height: 6, blocked: vec![(4, 2)] };
    let state = state_with(vec!["attacker", "target"], vec![attacker, target], map);

    let mut rng = BattleRng::new(1);
    let (next_state, events) = apply_command(&state, &Command::Strike { actor: "attacker".to_string(), target: "target".to_string() }, &mut rng).unwrap();

    let strike = find_event(&events, "strike");
    let roll = &strike.payload["roll"];
    assert_eq!(roll["cover_grade"], "standard");
    assert_eq!(roll["cover_bonus"], 2);
    assert_eq!(roll["base_dc"], 16);
    assert_eq!(roll["dc"], 18);

    // attack_mod 100 against dc 18 guarantees at least a success on every
    // possible die value, so a hit - and therefore non-null damage - is
    // certain no matter which die the seeded roll actually drew.
    assert!(!strike.payload["damage"].is_null());
    let degree = strike.payload["degree"].as_str().unwrap();
    assert!(degree == "success" || degree == "critical_success", "unexpected degree: {degree}");
    assert!(next_state.units["target"].hp <= 20);
}

/// Resistance mitigation picks the single highest-matching entry rather than
/// stacking every tag that applies, end to end through a strike.
#[test]
fn strike_damage_uses_highest_matching_resistance_not_stacked() {
    let mut attacker = unit("attacker", "party", 20, 0, 0);
    attacker.attack_mod = 100;
    attacker.damage = "20".to_string();
    attacker.attack_damage_type = "slashing".to_string();

    let mut target = unit("target", "enemy", 100, 3, 0);
    target.ac = 8;
    target.resistances.insert("slashing".to_string(), 5);
    target.resistances.insert("physical".to_string(), 3);
    target.resistances.insert("all".to_string(), 1);

    let map = MapState { width: 6, height: 6, blocked: Vec::new() };
    let state = state_with(vec!["attacker", "target"], vec![attacker, target], map);

    let mut rng = BattleRng::new(9);
    let (_next_state, events) = apply_command(&state, &Command::Strike { actor: "attacker".to_string(), target: "target".to_string() }, &mut rng).unwrap();

    let strike = find_event(&events, "strike");
    let damage = &strike.payload["damage"];
    assert!(!damage.is_null());

    let multiplier = damage["multiplier"].as_i64().unwrap();
    assert!(multiplier == 1 || multiplier == 2, "attack_mod 100 against dc 8 guarantees at least a hit");
    assert_eq!(damage["raw_total"], 20 * multiplier);
    assert_eq!(damage["resistance_total"], 5);
    assert_eq!(damage["total"], 20 * multiplier - 5);
}

/// Same-source temp HP refreshes by the configured stack mode; a lower
/// cross-source grant under `higher_only` is ignored, while `replace`
/// overwrites the pool regardless of amount.
#[test]
fn temp_hp_stacking_follows_source_and_policy() {
    let mut units = HashMap::new();
    units.insert("target".to_string(), unit("target", "party", 20, 0, 0));
    let mut rng = BattleRng::new(1);

    let mut effect = EffectState {
        effect_id: "eff_1".to_string(),
        kind: "temp_hp".to_string(),
        source_unit_id: Some("hero".to_string()),
        target_unit_id: Some("target".to_string()),
        payload: [
            ("amount".to_string(), json!(5)),
            ("stack_mode".to_string(), json!("add")),
            ("cross_source".to_string(), json!("higher_only")),
            ("source_key".to_string(), json!("hero_buff")),
        ]
        .into_iter()
        .collect(),
        duration_rounds: None,
        tick_timing: None,
    };
    on_apply(&mut units, &mut effect, &mut rng);
    assert_eq!(units["target"].temp_hp, 5);
    assert_eq!(units["target"].temp_hp_source.as_deref(), Some("hero_buff"));

    // Same source key again, stack_mode "add": refreshes by adding, not maxing.
    let mut effect_refresh = effect.clone();
    effect_refresh.payload.insert("amount".to_string(), json!(3));
    let lifecycle = on_apply(&mut units, &mut effect_refresh, &mut rng);
    assert_eq!(units["target"].temp_hp, 8);
    assert_eq!(lifecycle[0].1["decision"], "same_source_refresh");

    // Cross-source grant that doesn't beat the current pool is ignored under higher_only.
    let mut other_effect = EffectState {
        effect_id: "eff_2".to_string(),
        kind: "temp_hp".to_string(),
        source_unit_id: Some("ally".to_string()),
        target_unit_id: Some("target".to_string()),
        payload: [
            ("amount".to_string(), json!(5)),
            ("stack_mode".to_string(), json!("max")),
            ("cross_source".to_string(), json!("higher_only")),
            ("source_key".to_string(), json!("other_buff")),
        ]
        .into_iter()
        .collect(),
        duration_rounds: None,
        tick_timing: None,
    };
    let lifecycle = on_apply(&mut units, &mut other_effect, &mut rng);
    assert_eq!(units["target"].temp_hp, 8, "lower cross-source grant must not shrink the pool");
    assert_eq!(lifecycle[0].1["decision"], "cross_source_ignored");
    assert_eq!(lifecycle[0].1["reason"], "lower_or_equal_than_current");

    // A "replace" policy overwrites the pool even with a smaller amount.
    let mut boss_effect = EffectState {
        effect_id: "eff_3".to_string(),
        kind: "temp_hp".to_string(),
        source_unit_id: Some("boss".to_string()),
        target_unit_id: Some("target".to_string()),
        payload: [
            ("amount".to_string(), json!(3)),
            ("stack_mode".to_string(), json!("max")),
            ("cross_source".to_string(), json!("replace")),
            ("source_key".to_string(), json!("boss_buff")),
        ]
        .into_iter()
        .collect(),
        duration_rounds: None,
        tick_timing: None,
    };
    let lifecycle = on_apply(&mut units, &mut boss_effect, &mut rng);
    assert_eq!(units["target"].temp_hp, 3);
    assert_eq!(lifecycle[0].1["decision"], "cross_source_replaced");
}

/// An affliction ticks only on the turn end of the unit it targets, and
/// without a `save` key in its payload the stage holds deterministically -
/// no dice are rolled and the condition stays applied across the tick.
#[test]
fn affliction_ticks_only_on_targets_turn_end_and_holds_without_a_save() {
    let hero = unit("hero", "party", 10, 0, 0);
    let goblin = unit("goblin", "enemy", 8, 1, 0);
    let map = MapState { width: 5, height: 5, blocked: Vec::new() };
    let state = state_with(vec!["hero", "goblin"], vec![hero, goblin], map);

    let mut rng = BattleRng::new(4);

    let payload: Value = json!({
        "stages": [{"stage": 1, "conditions": [{"condition": "sickened", "value": 1}]}],
        "current_stage": 1,
    });
    let (state1, events1) = apply_command(
        &state,
        &Command::ApplyEffect {
            actor: "hero".to_string(),
            target: "goblin".to_string(),
            effect_kind: "affliction".to_string(),
            payload,
            duration_rounds: None,
            tick_timing: Some(TickTiming::TurnEnd),
        },
        &mut rng,
    )
    .unwrap();
    assert_eq!(state1.units["goblin"].conditions.get("sickened"), Some(&1));
    find_event(&events1, "apply_effect_command");
    find_event(&events1, "effect_apply");

    // Hero ends their own turn: the effect targets goblin, not hero, so it must not tick.
    let (state2, events2) = apply_command(&state1, &Command::EndTurn { actor: "hero".to_string() }, &mut rng).unwrap();
    assert!(events2.iter().all(|e| e.event_type != "effect_tick"));
    assert_eq!(state2.active_unit_id(), "goblin");
    assert_eq!(state2.units["goblin"].conditions.get("sickened"), Some(&1));

    // Goblin ends its own turn: the affliction now ticks.
    let (state3, events3) = apply_command(&state2, &Command::EndTurn { actor: "goblin".to_string() }, &mut rng).unwrap();
    let tick = find_event(&events3, "effect_tick");
    assert_eq!(tick.payload["stage_from"], 1);
    assert_eq!(tick.payload["stage_to"], 1);
    assert!(tick.payload["save"].is_null());
    assert_eq!(tick.payload["stage_result"]["applied"], true);
    assert_eq!(state3.round_number, 2);
    assert_eq!(state3.active_unit_id(), "hero");
    assert_eq!(state3.units["goblin"].conditions.get("sickened"), Some(&1));
}
