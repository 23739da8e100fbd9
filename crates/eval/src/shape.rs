//! Point-in-shape tests for `inside` and area mappings.
//!
//! Coordinates follow the image-map convention:
//! - `rect`: left, top, right, bottom
//! - `circle`: centre x, centre y, radius
//! - `ellipse`: centre x, centre y, horizontal radius, vertical radius
//! - `poly`: x1, y1, x2, y2, ... (the closing vertex may repeat the first)
//! - `default`: the whole area, no coordinates

use crate::types::Shape;

/// Whether `(x, y)` lies inside the shape. Edges count as inside.
/// `Err` describes a coordinate list that does not fit the shape.
pub fn contains(shape: Shape, coords: &[f64], x: f64, y: f64) -> Result<bool, String> {
    match shape {
        Shape::Default => Ok(true),
        Shape::Rect => {
            let [l, t, r, b] = expect_coords::<4>(shape, coords)?;
            let (x0, x1) = (l.min(r), l.max(r));
            let (y0, y1) = (t.min(b), t.max(b));
            Ok(x >= x0 && x <= x1 && y >= y0 && y <= y1)
        }
        Shape::Circle => {
            let [cx, cy, radius] = expect_coords::<3>(shape, coords)?;
            let (dx, dy) = (x - cx, y - cy);
            Ok(dx * dx + dy * dy <= radius * radius)
        }
        Shape::Ellipse => {
            let [cx, cy, hr, vr] = expect_coords::<4>(shape, coords)?;
            if hr <= 0.0 || vr <= 0.0 {
                return Err("ellipse radii must be positive".to_string());
            }
            let (dx, dy) = ((x - cx) / hr, (y - cy) / vr);
            Ok(dx * dx + dy * dy <= 1.0)
        }
        Shape::Poly => {
            if coords.len() < 6 || coords.len() % 2 != 0 {
                return Err(format!(
                    "poly needs an even number of at least 6 coordinates, got {}",
                    coords.len()
                ));
            }
            let vertices: Vec<(f64, f64)> = coords.chunks(2).map(|p| (p[0], p[1])).collect();
            Ok(in_polygon(&vertices, x, y))
        }
    }
}

fn expect_coords<const N: usize>(shape: Shape, coords: &[f64]) -> Result<[f64; N], String> {
    <[f64; N]>::try_from(coords)
        .map_err(|_| format!("{:?} needs {} coordinates, got {}", shape, N, coords.len()).to_lowercase())
}

/// Even-odd ray cast, with points on an edge counted as inside.
fn in_polygon(vertices: &[(f64, f64)], x: f64, y: f64) -> bool {
    let n = vertices.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if on_segment((xi, yi), (xj, yj), (x, y)) {
            return true;
        }
        if (yi > y) != (yj > y) {
            let cross_x = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > f64::EPSILON {
        return false;
    }
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}
