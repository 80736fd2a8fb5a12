//! Saving throw resolution against a unit's fortitude/reflex/will profile.

use serde::{Deserialize, Serialize};

use crate::rng::BattleRng;
use crate::rules::checks::{resolve_check, CheckResult};
use crate::rules::degrees::Degree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SaveProfile {
    pub fortitude: i64,
    pub reflex: i64,
    pub will: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SaveType {
    Fortitude,
    Reflex,
    Will,
}

impl SaveProfile {
    fn modifier_for(&self, save_type: SaveType) -> i64 {
        match save_type {
            SaveType::Fortitude => self.fortitude,
            SaveType::Reflex => self.reflex,
            SaveType::Will => self.will,
        }
    }
}

pub fn resolve_save(
    rng: &mut BattleRng,
    save_type: SaveType,
    profile: &SaveProfile,
    dc: i64,
) -> CheckResult {
    resolve_check(rng, profile.modifier_for(save_type), dc)
}

/// Damage multiplier for a "basic" save: 0x crit-success, 0.5x success,
/// 1x failure, 2x crit-failure.
pub fn basic_save_multiplier(degree: Degree) -> f64 {
    match degree {
        Degree::CriticalSuccess => 0.0,
        Degree::Success => 0.5,
        Degree::Failure => 1.0,
        Degree::CriticalFailure => 2.0,
    }
}
