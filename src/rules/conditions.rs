//! Condition name normalization, immunity checks, and map mutation helpers.

use std::collections::HashMap;

pub fn normalize_condition_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

pub fn condition_is_immune(name: &str, condition_immunities: &[String]) -> bool {
    let normalized = normalize_condition_name(name);
    condition_immunities
        .iter()
        .map(|x| normalize_condition_name(x))
        .any(|x| x == normalized || x == "all_conditions")
}

/// Applies `value` to `name`, keeping the maximum severity seen so far.
pub fn apply_condition(conditions: &mut HashMap<String, i64>, name: &str, value: i64) {
    let key = normalize_condition_name(name);
    let current = *conditions.get(&key).unwrap_or(&0);
    conditions.insert(key, current.max(value));
}

pub fn clear_condition(conditions: &mut HashMap<String, i64>, name: &str) {
    let key = normalize_condition_name(name);
    conditions.remove(&key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spaces_and_case() {
        assert_eq!(normalize_condition_name("Flat Footed"), "flat_footed");
    }

    #[test]
    fn keeps_max_severity() {
        let mut conditions = HashMap::new();
        apply_condition(&mut conditions, "frightened", 2);
        apply_condition(&mut conditions, "frightened", 1);
        assert_eq!(conditions.get("frightened"), Some(&2));
    }

    #[test]
    fn all_conditions_wildcard() {
        let immunities = vec!["all_conditions".to_string()];
        assert!(condition_is_immune("prone", &immunities));
    }
}
