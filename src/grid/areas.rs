//! Area-targeting geometry: radius discs, Bresenham lines, 90-degree cones.

pub type Tile = (i64, i64);

pub fn radius_points(cx: i64, cy: i64, radius: i64) -> Vec<Tile> {
    let mut points = Vec::new();
    for x in (cx - radius)..=(cx + radius) {
        for y in (cy - radius)..=(cy + radius) {
            if (x - cx).abs() + (y - cy).abs() <= radius {
                points.push((x, y));
            }
        }
    }
    points
}

pub fn line_points(x0: i64, y0: i64, x1: i64, y1: i64) -> Vec<Tile> {
    let mut points = Vec::new();
    let dx = (x1 - x0).abs();
    let dy = -((y1 - y0).abs());
    let sx: i64 = if x0 < x1 { 1 } else { -1 };
    let sy: i64 = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        points.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// 90-degree cone from `origin` toward `facing`, out to `length_tiles`.
pub fn cone_points(origin_x: i64, origin_y: i64, facing_x: i64, facing_y: i64, length_tiles: i64) -> Vec<Tile> {
    let length = length_tiles.max(1);
    let dir_x = (facing_x - origin_x) as f64;
    let dir_y = (facing_y - origin_y) as f64;
    if dir_x == 0.0 && dir_y == 0.0 {
        return vec![(origin_x, origin_y)];
    }

    let norm = dir_x.hypot(dir_y);
    let unit_x = dir_x / norm;
    let unit_y = dir_y / norm;
    let min_dot = 45.0f64.to_radians().cos();

    let mut points = Vec::new();
    for x in (origin_x - length)..=(origin_x + length) {
        for y in (origin_y - length)..=(origin_y + length) {
            let vec_x = (x - origin_x) as f64;
            let vec_y = (y - origin_y) as f64;
            let dist = vec_x.hypot(vec_y);
            if dist == 0.0 {
                points.push((x, y));
                continue;
            }
            if dist > length as f64 {
                continue;
            }
            let dot = (vec_x * unit_x + vec_y * unit_y) / dist;
            if dot >= min_dot {
                points.push((x, y));
            }
        }
    }
    points
}

pub fn in_area(point: Tile, area: &[Tile]) -> bool {
    area.contains(&point)
}

/// `feet` converted to a tile count: `max(1, (feet + 4) / 5)`.
pub fn feet_to_tiles(feet: i64) -> i64 {
    ((feet + 4) / 5).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_points_is_manhattan_disc() {
        let points = radius_points(0, 0, 1);
        assert!(points.contains(&(0, 0)));
        assert!(points.contains(&(1, 0)));
        assert!(points.contains(&(0, 1)));
        assert!(!points.contains(&(1, 1)));
    }

    #[test]
    fn line_points_includes_both_endpoints() {
        let points = line_points(0, 0, 3, 0);
        assert_eq!(points.first(), Some(&(0, 0)));
        assert_eq!(points.last(), Some(&(3, 0)));
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn cone_points_includes_origin_and_facing_direction() {
        let points = cone_points(0, 0, 1, 0, 2);
        assert!(points.contains(&(0, 0)));
        assert!(points.contains(&(2, 0)));
        assert!(!points.contains(&(-2, 0)));
    }

    #[test]
    fn feet_to_tiles_rounds_and_floors() {
        assert_eq!(feet_to_tiles(5), 1);
        assert_eq!(feet_to_tiles(10), 2);
        assert_eq!(feet_to_tiles(1), 1);
        assert_eq!(feet_to_tiles(0), 1);
    }
}
