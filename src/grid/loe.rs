//! Line-of-effect and cover grading between tiles.

use crate::grid::areas::line_points;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverGrade {
    None,
    Standard,
    Greater,
    Blocked,
}

/// Minimal view over a battle map's bounds and blocked tiles, so this module
/// does not need to depend on the full battle-state model.
pub trait GridMap {
    fn in_bounds(&self, x: i64, y: i64) -> bool;
    fn is_blocked(&self, x: i64, y: i64) -> bool;
}

fn sign(value: i64) -> i64 {
    value.signum()
}

pub fn has_tile_line_of_effect(map: &impl GridMap, source_x: i64, source_y: i64, target_x: i64, target_y: i64) -> bool {
    if !map.in_bounds(source_x, source_y) || !map.in_bounds(target_x, target_y) {
        return false;
    }

    let path = line_points(source_x, source_y, target_x, target_y);
    for (idx, &(x, y)) in path.iter().enumerate() {
        if idx == 0 {
            continue;
        }

        let (prev_x, prev_y) = path[idx - 1];
        let step_x = x - prev_x;
        let step_y = y - prev_y;
        if step_x.abs() == 1 && step_y.abs() == 1 {
            let side_a = (prev_x + step_x, prev_y);
            let side_b = (prev_x, prev_y + step_y);
            let side_a_blocked = map.in_bounds(side_a.0, side_a.1) && map.is_blocked(side_a.0, side_a.1);
            let side_b_blocked = map.in_bounds(side_b.0, side_b.1) && map.is_blocked(side_b.0, side_b.1);
            if side_a_blocked && side_b_blocked {
                return false;
            }
        }

        if idx == path.len() - 1 {
            return !map.is_blocked(x, y);
        }
        if map.is_blocked(x, y) {
            return false;
        }
    }
    true
}

pub fn cover_grade_between_tiles(map: &impl GridMap, source_x: i64, source_y: i64, target_x: i64, target_y: i64) -> CoverGrade {
    if !has_tile_line_of_effect(map, source_x, source_y, target_x, target_y) {
        return CoverGrade::Blocked;
    }

    let sx = sign(source_x - target_x);
    let sy = sign(source_y - target_y);
    if sx == 0 && sy == 0 {
        return CoverGrade::None;
    }

    let candidates: [(i64, i64); 2] = if sx == 0 {
        [(target_x - 1, target_y), (target_x + 1, target_y)]
    } else if sy == 0 {
        [(target_x, target_y - 1), (target_x, target_y + 1)]
    } else {
        [(target_x + sx, target_y), (target_x, target_y + sy)]
    };

    let blocked_count = candidates
        .iter()
        .filter(|&&(x, y)| map.in_bounds(x, y) && map.is_blocked(x, y))
        .count();

    match blocked_count {
        n if n >= 2 => CoverGrade::Greater,
        1 => CoverGrade::Standard,
        _ => CoverGrade::None,
    }
}

pub fn cover_ac_bonus_from_grade(grade: CoverGrade) -> i64 {
    match grade {
        CoverGrade::Standard => 2,
        CoverGrade::Greater => 4,
        CoverGrade::None | CoverGrade::Blocked => 0,
    }
}

pub fn cover_ac_bonus_between_tiles(map: &impl GridMap, source_x: i64, source_y: i64, target_x: i64, target_y: i64) -> i64 {
    cover_ac_bonus_from_grade(cover_grade_between_tiles(map, source_x, source_y, target_x, target_y))
}

/// Minimal view over a unit's position and liveness, mirroring [`GridMap`]'s
/// role for tile lookups — keeps this module decoupled from the unit model.
pub trait PositionedUnit {
    fn is_alive(&self) -> bool;
    fn position(&self) -> (i64, i64);
}

pub fn has_line_of_effect(map: &impl GridMap, source: &impl PositionedUnit, target: &impl PositionedUnit) -> bool {
    if !source.is_alive() || !target.is_alive() {
        return false;
    }
    let (sx, sy) = source.position();
    let (tx, ty) = target.position();
    has_tile_line_of_effect(map, sx, sy, tx, ty)
}

pub fn has_line_of_sight(map: &impl GridMap, source: &impl PositionedUnit, target: &impl PositionedUnit) -> bool {
    has_line_of_effect(map, source, target)
}

pub fn cover_grade_for_units(map: &impl GridMap, source: &impl PositionedUnit, target: &impl PositionedUnit) -> CoverGrade {
    if !source.is_alive() || !target.is_alive() {
        return CoverGrade::Blocked;
    }
    let (sx, sy) = source.position();
    let (tx, ty) = target.position();
    cover_grade_between_tiles(map, sx, sy, tx, ty)
}

pub fn cover_ac_bonus_for_units(map: &impl GridMap, source: &impl PositionedUnit, target: &impl PositionedUnit) -> i64 {
    if !source.is_alive() || !target.is_alive() {
        return 0;
    }
    cover_ac_bonus_from_grade(cover_grade_for_units(map, source, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMap {
        width: i64,
        height: i64,
        blocked: Vec<(i64, i64)>,
    }

    impl GridMap for TestMap {
        fn in_bounds(&self, x: i64, y: i64) -> bool {
            x >= 0 && x < self.width && y >= 0 && y < self.height
        }
        fn is_blocked(&self, x: i64, y: i64) -> bool {
            self.blocked.contains(&(x, y))
        }
    }

    #[test]
    fn clear_line_has_effect() {
        let map = TestMap { width: 10, height: 10, blocked: vec![] };
        assert!(has_tile_line_of_effect(&map, 0, 0, 5, 0));
    }

    #[test]
    fn wall_blocks_effect() {
        let map = TestMap { width: 10, height: 10, blocked: vec![(2, 0)] };
        assert!(!has_tile_line_of_effect(&map, 0, 0, 5, 0));
    }

    #[test]
    fn occupied_endpoint_is_targetable() {
        let map = TestMap { width: 10, height: 10, blocked: vec![(5, 0)] };
        assert!(!has_tile_line_of_effect(&map, 0, 0, 5, 0));
    }

    #[test]
    fn diagonal_corner_pinch_blocks() {
        let map = TestMap { width: 10, height: 10, blocked: vec![(1, 0), (0, 1)] };
        assert!(!has_tile_line_of_effect(&map, 0, 0, 1, 1));
    }

    #[test]
    fn two_sided_blockers_grant_greater_cover() {
        let map = TestMap { width: 10, height: 10, blocked: vec![(5, 4), (5, 6)] };
        assert_eq!(cover_grade_between_tiles(&map, 0, 5, 5, 5), CoverGrade::Greater);
    }
}
