// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar helpers for quadrilateral detection: corner ordering, polygon area,
// convexity and closed-contour simplification.

use bubblescan_core::types::{Corners, Point};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point as PixelPoint;

// -- Corner ordering ----------------------------------------------------------

/// Sort four unordered points into `[top_left, top_right, bottom_right,
/// bottom_left]`.
///
/// Top-left minimises `x + y`, bottom-right maximises it, top-right maximises
/// `x - y` and bottom-left minimises it. When two roles land on the same
/// point (a sheet rotated close to 45 degrees) the points are first sorted by
/// angle around their centroid and the extremal rule is applied to that
/// cycle instead.
pub fn order_corners(points: [Point; 4]) -> Corners {
    if let Some(ordered) = extremal_order(&points) {
        return ordered;
    }

    let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;
    let mut cycle = points;
    cycle.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb)
    });

    // Image y grows downward, so increasing atan2 walks clockwise on screen.
    let start = (0..4)
        .min_by(|&i, &j| {
            let si = cycle[i].x + cycle[i].y;
            let sj = cycle[j].x + cycle[j].y;
            si.total_cmp(&sj)
        })
        .unwrap_or(0);
    Corners(std::array::from_fn(|k| cycle[(start + k) % 4]))
}

fn extremal_order(points: &[Point; 4]) -> Option<Corners> {
    let pick = |key: fn(&Point) -> f32, max: bool| {
        let cmp = |a: &usize, b: &usize| key(&points[*a]).total_cmp(&key(&points[*b]));
        if max {
            (0..4).max_by(cmp)
        } else {
            (0..4).min_by(cmp)
        }
    };

    let tl = pick(|p| p.x + p.y, false)?;
    let br = pick(|p| p.x + p.y, true)?;
    let tr = pick(|p| p.x - p.y, true)?;
    let bl = pick(|p| p.x - p.y, false)?;

    let idx = [tl, tr, br, bl];
    let distinct = (0..4).all(|i| (i + 1..4).all(|j| idx[i] != idx[j]));
    distinct.then(|| Corners(idx.map(|i| points[i])))
}

// -- Polygon measures ---------------------------------------------------------

/// Polygon area by the shoelace formula. Vertex order may be either winding.
pub fn shoelace_area(polygon: &[Point]) -> f32 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f32;
    for i in 0..n {
        let j = (i + 1) % n;
        area += polygon[i].x * polygon[j].y;
        area -= polygon[j].x * polygon[i].y;
    }
    area.abs() / 2.0
}

/// True when every turn of the closed polygon goes the same way.
/// Collinear vertices are ignored.
pub fn is_convex(polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let c = polygon[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() <= f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// Perimeter of a closed pixel contour.
pub fn contour_perimeter(contour: &[PixelPoint<i32>]) -> f64 {
    let n = contour.len();
    (0..n)
        .map(|i| {
            let a = contour[i];
            let b = contour[(i + 1) % n];
            (((b.x - a.x) as f64).powi(2) + ((b.y - a.y) as f64).powi(2)).sqrt()
        })
        .sum()
}

// -- Contour simplification ---------------------------------------------------

/// Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at its start point and the point farthest from it,
/// each half is simplified as an open curve, and vertices that end up lying
/// within `epsilon` of the line through their neighbours are pruned. The
/// result never repeats its first vertex.
pub fn approximate_closed_contour(contour: &[PixelPoint<i32>], epsilon: f64) -> Vec<Point> {
    if contour.len() < 3 || epsilon <= 0.0 {
        return contour.iter().map(to_point).collect();
    }

    let origin = contour[0];
    let split = contour
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| {
            let dx = (p.x - origin.x) as i64;
            let dy = (p.y - origin.y) as i64;
            dx * dx + dy * dy
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if split == 0 {
        return vec![to_point(&origin)];
    }

    let first = approximate_polygon_dp(&contour[..=split], epsilon, false);
    let mut second_half: Vec<PixelPoint<i32>> = contour[split..].to_vec();
    second_half.push(origin);
    let second = approximate_polygon_dp(&second_half, epsilon, false);

    let mut vertices: Vec<Point> = first.iter().map(to_point).collect();
    // Both halves share their end points with the other half.
    vertices.extend(second.iter().skip(1).take(second.len().saturating_sub(2)).map(to_point));
    vertices.dedup();

    prune_collinear(vertices, epsilon as f32)
}

fn prune_collinear(mut vertices: Vec<Point>, epsilon: f32) -> Vec<Point> {
    loop {
        let n = vertices.len();
        if n <= 3 {
            return vertices;
        }
        let flat = (0..n).find(|&i| {
            let prev = vertices[(i + n - 1) % n];
            let next = vertices[(i + 1) % n];
            perpendicular_distance(vertices[i], prev, next) <= epsilon
        });
        match flat {
            Some(i) => {
                vertices.remove(i);
            }
            None => return vertices,
        }
    }
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f32 {
    let len = a.distance(&b);
    if len <= f32::EPSILON {
        return p.distance(&a);
    }
    ((b.x - a.x) * (a.y - p.y) - (a.x - p.x) * (b.y - a.y)).abs() / len
}

fn to_point(p: &PixelPoint<i32>) -> Point {
    Point::new(p.x as f32, p.y as f32)
}

// -- Tests --------------------------------------------------------------------
