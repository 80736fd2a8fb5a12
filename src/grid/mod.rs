//! Grid geometry: area targeting shapes, line-of-effect/cover grading, and
//! single-step movement legality.

pub mod areas;
pub mod loe;
pub mod movement;

pub use areas::{cone_points, feet_to_tiles, in_area, line_points, radius_points, Tile};
pub use loe::{
    cover_ac_bonus_between_tiles, cover_ac_bonus_for_units, cover_ac_bonus_from_grade, cover_grade_between_tiles,
    cover_grade_for_units, has_line_of_effect, has_line_of_sight, has_tile_line_of_effect, CoverGrade, GridMap,
    PositionedUnit,
};
pub use movement::{can_step_to, manhattan_distance};
