//! Initiative ordering.

use std::collections::HashMap;

use crate::model::unit::UnitState;

/// Sorted by descending initiative, ties broken by ascending unit id.
pub fn build_turn_order(units: &HashMap<String, UnitState>) -> Vec<String> {
    let mut order: Vec<&UnitState> = units.values().collect();
    order.sort_by(|a, b| b.initiative.cmp(&a.initiative).then_with(|| a.unit_id.cmp(&b.unit_id)));
    order.into_iter().map(|u| u.unit_id.clone()).collect()
}

pub fn next_turn_index(current: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        (current + 1) % size
    }
}
