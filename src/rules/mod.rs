//! Core tabletop-style resolution rules: checks, saves, conditions, damage.

pub mod checks;
pub mod conditions;
pub mod damage;
pub mod degrees;
pub mod saves;

pub use checks::{resolve_check, CheckResult};
pub use conditions::{apply_condition, clear_condition, condition_is_immune, normalize_condition_name};
pub use damage::{apply_damage_modifiers, apply_damage_to_pool, roll_damage, DamageAdjustment, AppliedDamage, DamageRoll};
pub use degrees::{degree_of_success, Degree};
pub use saves::{basic_save_multiplier, resolve_save, SaveProfile, SaveType};
