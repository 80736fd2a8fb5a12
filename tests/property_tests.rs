//! Property-based checks for the invariants the concrete scenario tests
//! can't sweep exhaustively: damage-pool conservation, degree-of-success
//! thresholds away from the nat-1/nat-20 bump, and ASCII-only canonical
//! event logging for arbitrary payload text.

use proptest::prelude::*;
use serde_json::json;

use tactical_engine::io::canonical_event_log;
use tactical_engine::model::Event;
use tactical_engine::rules::damage::apply_damage_to_pool;
use tactical_engine::rules::degrees::{degree_of_success, Degree};

proptest! {
    #[test]
    fn damage_pool_conserves_incoming_total(hp in 0i64..500, temp_hp in 0i64..200, damage in 0i64..500) {
        let applied = apply_damage_to_pool(hp, temp_hp, damage);
        prop_assert!(applied.new_hp >= 0);
        prop_assert!(applied.new_temp_hp >= 0);
        prop_assert!(applied.absorbed_by_temp_hp <= temp_hp);
        prop_assert_eq!(applied.absorbed_by_temp_hp + applied.hp_loss, applied.incoming_total);
        prop_assert_eq!(applied.new_hp, (hp - applied.hp_loss).max(0));
    }

    #[test]
    fn degree_without_a_nat_bump_matches_the_plain_threshold_rule(total in -50i64..150, dc in 1i64..40, die in 2i64..19) {
        let degree = degree_of_success(total, dc, die);
        let expected = if total >= dc + 10 {
            Degree::CriticalSuccess
        } else if total >= dc {
            Degree::Success
        } else if total <= dc - 10 {
            Degree::CriticalFailure
        } else {
            Degree::Failure
        };
        prop_assert_eq!(degree, expected);
    }

    #[test]
    fn canonical_event_log_is_always_ascii(text in ".{0,16}") {
        let event = Event {
            event_id: "ev_000000".to_string(),
            round: 1,
            active_unit: "hero".to_string(),
            event_type: "narration".to_string(),
            payload: json!({"text": text}),
        };
        let log = canonical_event_log(std::slice::from_ref(&event)).unwrap();
        prop_assert!(log.is_ascii());
    }
}
