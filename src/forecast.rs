//! Deterministic forecast helpers for command previews: given a modifier and
//! a DC, compute exact degree-of-success odds and expected damage without
//! rolling any dice.

use serde::{Deserialize, Serialize};

use crate::rules::damage::parse_formula;
use crate::rules::degrees::{degree_of_success, Degree};
use crate::rules::saves::basic_save_multiplier;

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegreeOdds {
    pub critical_success: f64,
    pub success: f64,
    pub failure: f64,
    pub critical_failure: f64,
}

/// Exhaustively evaluates all 20 die faces and buckets the fraction landing
/// in each degree of success.
pub fn degree_odds(modifier: i64, dc: i64) -> DegreeOdds {
    let mut critical_success = 0;
    let mut success = 0;
    let mut failure = 0;
    let mut critical_failure = 0;

    for die in 1..=20 {
        let total = die + modifier;
        match degree_of_success(total, dc, die) {
            Degree::CriticalSuccess => critical_success += 1,
            Degree::Success => success += 1,
            Degree::Failure => failure += 1,
            Degree::CriticalFailure => critical_failure += 1,
        }
    }

    DegreeOdds {
        critical_success: round6(critical_success as f64 / 20.0),
        success: round6(success as f64 / 20.0),
        failure: round6(failure as f64 / 20.0),
        critical_failure: round6(critical_failure as f64 / 20.0),
    }
}

/// Mean damage of a dice formula (`NdS+M`), ignoring crit multipliers,
/// floored at zero.
pub fn expected_damage_average(formula: &str) -> f64 {
    let Ok((dice_count, dice_size, modifier)) = parse_formula(formula) else {
        return 0.0;
    };
    if dice_count <= 0 {
        return round6(modifier.max(0) as f64);
    }
    let avg = (dice_count as f64 * ((dice_size as f64 + 1.0) / 2.0)) + modifier as f64;
    round6(avg.max(0.0))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedDamageRaw {
    pub on_success: f64,
    pub on_critical_success: f64,
    pub per_attack: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeForecast {
    pub kind: &'static str,
    pub attack_modifier: i64,
    pub dc: i64,
    pub damage_formula: String,
    pub degree_odds: DegreeOdds,
    pub expected_damage_raw: ExpectedDamageRaw,
}

pub fn strike_forecast(attack_modifier: i64, dc: i64, damage_formula: &str) -> StrikeForecast {
    let odds = degree_odds(attack_modifier, dc);
    let avg = expected_damage_average(damage_formula);
    let expected_per_attack = avg * odds.success + (avg * 2.0) * odds.critical_success;

    StrikeForecast {
        kind: "strike",
        attack_modifier,
        dc,
        damage_formula: damage_formula.to_string(),
        degree_odds: odds,
        expected_damage_raw: ExpectedDamageRaw {
            on_success: avg,
            on_critical_success: round6(avg * 2.0),
            per_attack: round6(expected_per_attack),
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastSpellForecast {
    pub kind: &'static str,
    pub save_modifier: i64,
    pub dc: i64,
    pub mode: String,
    pub damage_formula: String,
    pub degree_odds: DegreeOdds,
    pub expected_multiplier: f64,
    pub expected_damage_raw: f64,
}

/// `mode` of anything other than `"basic"` forecasts a flat, unmitigated
/// hit (multiplier 1.0) — matching saves modeled outside the basic
/// success/failure scaling (e.g. half-on-save handled elsewhere).
pub fn cast_spell_forecast(save_modifier: i64, dc: i64, damage_formula: &str, mode: &str) -> CastSpellForecast {
    let odds = degree_odds(save_modifier, dc);
    let avg = expected_damage_average(damage_formula);

    let expected_multiplier = if mode != "basic" {
        1.0
    } else {
        basic_save_multiplier(Degree::CriticalSuccess) * odds.critical_success
            + basic_save_multiplier(Degree::Success) * odds.success
            + basic_save_multiplier(Degree::Failure) * odds.failure
            + basic_save_multiplier(Degree::CriticalFailure) * odds.critical_failure
    };

    CastSpellForecast {
        kind: "cast_spell",
        save_modifier,
        dc,
        mode: mode.to_string(),
        damage_formula: damage_formula.to_string(),
        degree_odds: odds,
        expected_multiplier: round6(expected_multiplier),
        expected_damage_raw: round6(avg * expected_multiplier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_odds_sum_to_one() {
        let odds = degree_odds(5, 15);
        let total = odds.critical_success + odds.success + odds.failure + odds.critical_failure;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expected_damage_average_matches_hand_calc() {
        // 2d6+3 averages (2 * 3.5) + 3 = 10.0
        assert_eq!(expected_damage_average("2d6+3"), 10.0);
    }

    #[test]
    fn expected_damage_average_floors_at_zero() {
        assert_eq!(expected_damage_average("1d4-10"), 0.0);
    }

    #[test]
    fn strike_forecast_accounts_for_crit_doubling() {
        let forecast = strike_forecast(20, 15, "1d6");
        // +20 vs DC 15 always succeeds or better, so per-attack expectation
        // should exceed the plain average.
        assert!(forecast.expected_damage_raw.per_attack >= forecast.expected_damage_raw.on_success);
    }

    #[test]
    fn cast_spell_non_basic_mode_uses_flat_multiplier() {
        let forecast = cast_spell_forecast(0, 15, "2d8", "no-save");
        assert_eq!(forecast.expected_multiplier, 1.0);
    }

    #[test]
    fn cast_spell_basic_mode_scales_by_degree_odds() {
        let forecast = cast_spell_forecast(0, 30, "2d8", "basic");
        // Virtually guaranteed failure/critical failure against an
        // unreachable DC, so the multiplier should sit above 1.0.
        assert!(forecast.expected_multiplier > 1.0);
    }
}
