//! Core d20 check resolution.

use serde::{Deserialize, Serialize};

use crate::rng::BattleRng;
use crate::rules::degrees::{degree_of_success, Degree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub die: i64,
    pub modifier: i64,
    pub total: i64,
    pub dc: i64,
    pub degree: Degree,
}

pub fn resolve_check(rng: &mut BattleRng, modifier: i64, dc: i64) -> CheckResult {
    let roll = rng.d20();
    let total = roll.value + modifier;
    CheckResult {
        die: roll.value,
        modifier,
        total,
        dc,
        degree: degree_of_success(total, dc, roll.value),
    }
}
