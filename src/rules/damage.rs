//! Damage formula parsing, rolling, and mitigation (resistance / weakness /
//! immunity / bypass).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rng::BattleRng;

const PHYSICAL_TYPES: &[&str] = &["bludgeoning", "piercing", "slashing"];
const ENERGY_TYPES: &[&str] = &["acid", "cold", "electricity", "fire", "force", "sonic"];

fn alias(normalized: &str) -> &str {
    match normalized {
        "lightning" => "electricity",
        "pierce" => "piercing",
        "slash" => "slashing",
        "bludgeon" => "bludgeoning",
        other => other,
    }
}

fn normalized_damage_type(raw: Option<&str>) -> Option<String> {
    let trimmed = raw.unwrap_or("").trim().to_lowercase();
    if trimmed.is_empty() {
        None
    } else {
        Some(alias(&trimmed).to_string())
    }
}

fn damage_type_tags(damage_type: Option<&str>) -> Vec<String> {
    match normalized_damage_type(damage_type) {
        None => Vec::new(),
        Some(normalized) => {
            let mut tags = vec![normalized.clone()];
            if PHYSICAL_TYPES.contains(&normalized.as_str()) {
                tags.push("physical".to_string());
            }
            if ENERGY_TYPES.contains(&normalized.as_str()) {
                tags.push("energy".to_string());
            }
            tags
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    pub formula: String,
    pub total: i64,
    pub rolls: Vec<i64>,
    pub flat_modifier: i64,
}

/// `(dice_count, dice_size, flat_modifier)`.
pub fn parse_formula(formula: &str) -> Result<(i64, i64, i64), String> {
    let text = formula.trim();

    if let Some((count, rest)) = text.split_once('d') {
        if let Ok(dice_count) = count.parse::<i64>() {
            let (size_str, modifier) = match rest.find(['+', '-']) {
                Some(idx) => {
                    let (size, modifier_str) = rest.split_at(idx);
                    (size, modifier_str.parse::<i64>().unwrap_or(0))
                }
                None => (rest, 0),
            };
            if let Ok(dice_size) = size_str.parse::<i64>() {
                return Ok((dice_count, dice_size, modifier));
            }
        }
    }

    if let Ok(flat) = text.parse::<i64>() {
        return Ok((0, 1, flat));
    }

    Err(format!("unsupported damage formula: {formula}"))
}

pub fn roll_damage(rng: &mut BattleRng, formula: &str, multiplier: i64) -> Result<DamageRoll, String> {
    let (dice_count, dice_size, modifier) = parse_formula(formula)?;
    let rolls: Vec<i64> = (0..dice_count)
        .map(|_| rng.randint(1, dice_size).value)
        .collect();
    let total = (rolls.iter().sum::<i64>() + modifier) * multiplier;
    Ok(DamageRoll {
        formula: formula.to_string(),
        total: total.max(0),
        rolls,
        flat_modifier: modifier,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageAdjustment {
    pub raw_total: i64,
    pub applied_total: i64,
    pub damage_type: Option<String>,
    pub immune: bool,
    pub resistance_total: i64,
    pub weakness_total: i64,
}

fn highest_matching_modifier(modifiers: &HashMap<String, i64>, damage_tags: &[String]) -> i64 {
    let mut best = 0;
    for (key, value) in modifiers {
        let normalized_key = normalized_damage_type(Some(key)).unwrap_or_default();
        if normalized_key == "all" || damage_tags.iter().any(|tag| tag == &normalized_key) {
            best = best.max(*value);
        }
    }
    best.max(0)
}

/// Bypass tags remove matching entries from the working resistance/immunity
/// maps before the highest-matching computation runs (not from weaknesses).
fn apply_bypass(map: &HashMap<String, i64>, bypass_tags: &[String]) -> HashMap<String, i64> {
    if bypass_tags.is_empty() {
        return map.clone();
    }
    let normalized_bypass: Vec<String> = bypass_tags
        .iter()
        .map(|t| normalized_damage_type(Some(t)).unwrap_or_default())
        .collect();
    map.iter()
        .filter(|(key, _)| {
            let normalized_key = normalized_damage_type(Some(key)).unwrap_or_default();
            !normalized_bypass
                .iter()
                .any(|tag| tag == &normalized_key || tag == "all")
        })
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

fn apply_bypass_set(set: &[String], bypass_tags: &[String]) -> Vec<String> {
    if bypass_tags.is_empty() {
        return set.to_vec();
    }
    let normalized_bypass: Vec<String> = bypass_tags
        .iter()
        .map(|t| normalized_damage_type(Some(t)).unwrap_or_default())
        .collect();
    set.iter()
        .filter(|item| {
            let normalized_item = normalized_damage_type(Some(item)).unwrap_or_default();
            !normalized_bypass
                .iter()
                .any(|tag| tag == &normalized_item || tag == "all")
        })
        .cloned()
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub fn apply_damage_modifiers(
    raw_total: i64,
    damage_type: Option<&str>,
    resistances: &HashMap<String, i64>,
    weaknesses: &HashMap<String, i64>,
    immunities: &[String],
    bypass_tags: &[String],
) -> DamageAdjustment {
    let raw = raw_total.max(0);
    let normalized_type = normalized_damage_type(damage_type);
    let damage_tags = damage_type_tags(normalized_type.as_deref());

    if raw == 0 {
        return DamageAdjustment {
            raw_total: 0,
            applied_total: 0,
            damage_type: normalized_type,
            immune: false,
            resistance_total: 0,
            weakness_total: 0,
        };
    }

    let effective_immunities = apply_bypass_set(immunities, bypass_tags);
    let immune = effective_immunities
        .iter()
        .map(|x| normalized_damage_type(Some(x)).unwrap_or_default())
        .any(|tag| tag == "all" || damage_tags.contains(&tag));

    if immune {
        return DamageAdjustment {
            raw_total: raw,
            applied_total: 0,
            damage_type: normalized_type,
            immune: true,
            resistance_total: 0,
            weakness_total: 0,
        };
    }

    let effective_resistances = apply_bypass(resistances, bypass_tags);
    let resistance_total = highest_matching_modifier(&effective_resistances, &damage_tags);
    let weakness_total = highest_matching_modifier(weaknesses, &damage_tags);

    let applied = (raw - resistance_total + weakness_total).max(0);
    DamageAdjustment {
        raw_total: raw,
        applied_total: applied,
        damage_type: normalized_type,
        immune: false,
        resistance_total: resistance_total.max(0),
        weakness_total: weakness_total.max(0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDamage {
    pub incoming_total: i64,
    pub absorbed_by_temp_hp: i64,
    pub hp_loss: i64,
    pub new_hp: i64,
    pub new_temp_hp: i64,
}

pub fn apply_damage_to_pool(hp: i64, temp_hp: i64, damage_total: i64) -> AppliedDamage {
    let incoming = damage_total.max(0);
    let current_hp = hp.max(0);
    let current_temp = temp_hp.max(0);
    let absorbed = current_temp.min(incoming);
    let hp_loss = (incoming - absorbed).max(0);
    AppliedDamage {
        incoming_total: incoming,
        absorbed_by_temp_hp: absorbed,
        hp_loss,
        new_hp: (current_hp - hp_loss).max(0),
        new_temp_hp: (current_temp - absorbed).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dice_and_flat_formulas() {
        assert_eq!(parse_formula("2d6+3").unwrap(), (2, 6, 3));
        assert_eq!(parse_formula("1d4-1").unwrap(), (1, 4, -1));
        assert_eq!(parse_formula("10").unwrap(), (0, 1, 10));
        assert_eq!(parse_formula("-2").unwrap(), (0, 1, -2));
        assert!(parse_formula("nonsense").is_err());
    }

    #[test]
    fn highest_matching_wins_not_stacking() {
        let mut resistances = HashMap::new();
        resistances.insert("physical".to_string(), 4);
        resistances.insert("slashing".to_string(), 2);
        resistances.insert("all".to_string(), 1);
        let adjustment = apply_damage_modifiers(
            10,
            Some("slashing"),
            &resistances,
            &HashMap::new(),
            &[],
            &[],
        );
        assert_eq!(adjustment.resistance_total, 4);
        assert_eq!(adjustment.applied_total, 6);
    }

    #[test]
    fn bypass_removes_matching_resistance_not_weakness() {
        let mut resistances = HashMap::new();
        resistances.insert("fire".to_string(), 5);
        let mut weaknesses = HashMap::new();
        weaknesses.insert("fire".to_string(), 3);
        let adjustment = apply_damage_modifiers(
            10,
            Some("fire"),
            &resistances,
            &weaknesses,
            &[],
            &["fire".to_string()],
        );
        assert_eq!(adjustment.resistance_total, 0);
        assert_eq!(adjustment.weakness_total, 3);
        assert_eq!(adjustment.applied_total, 13);
    }

    #[test]
    fn bypass_strips_immunity() {
        let immunities = vec!["fire".to_string()];
        let adjustment = apply_damage_modifiers(
            10,
            Some("fire"),
            &HashMap::new(),
            &HashMap::new(),
            &immunities,
            &["fire".to_string()],
        );
        assert!(!adjustment.immune);
        assert_eq!(adjustment.applied_total, 10);
    }

    #[test]
    fn temp_hp_absorbs_first() {
        let applied = apply_damage_to_pool(10, 4, 6);
        assert_eq!(applied.absorbed_by_temp_hp, 4);
        assert_eq!(applied.hp_loss, 2);
        assert_eq!(applied.new_hp, 8);
        assert_eq!(applied.new_temp_hp, 0);
    }
}
