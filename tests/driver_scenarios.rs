//! Integration coverage for the scenario driver: objective-triggered battle
//! end and replay-hash stability across repeated runs of the same scenario.

use std::path::Path;

use tactical_engine::driver::run_scenario_file;

#[test]
fn flag_set_objective_ends_the_battle_in_victory() {
    let result = run_scenario_file(Path::new("tests/scenarios/objective_flag_victory.json")).unwrap();

    assert_eq!(result["stop_reason"], "battle_end");

    let events = result["events"].as_array().unwrap();
    let battle_end = events.iter().find(|e| e["type"] == "battle_end").expect("battle_end event");
    assert_eq!(battle_end["payload"]["reason"], "objectives");
    assert_eq!(battle_end["payload"]["outcome"], "victory");

    let last_objective_update = events.iter().filter(|e| e["type"] == "objective_update").last().expect("objective_update event");
    assert_eq!(last_objective_update["payload"]["victory_met"], true);
    assert_eq!(last_objective_update["payload"]["statuses"]["door_opened_objective"], true);
}

#[test]
fn replay_hash_is_stable_across_repeated_runs() {
    let path = Path::new("tests/scenarios/smoke/hidden_pit_basic.json");

    let first = run_scenario_file(path).unwrap();
    let second = run_scenario_file(path).unwrap();

    assert_eq!(first["stop_reason"], "script_exhausted");
    assert_eq!(first["replay_hash"], second["replay_hash"]);
    assert_eq!(first["events"], second["events"]);
    assert_eq!(first["event_count"], second["event_count"]);
}
