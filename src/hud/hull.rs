//! Monotone-chain convex hull.
//!
//! Feature landmark index order is not guaranteed to trace a simple
//! polygon, but the convex hull of a small, tightly clustered feature
//! subset approximates its outline well enough for a mask cutout.

/// 2D cross product of OA x OB; positive for a counter-clockwise turn.
fn cross(o: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull of an unordered point set, as a counter-clockwise ring
/// without a repeated endpoint.
///
/// Fewer than three distinct points come back in sorted order; collinear
/// inputs collapse to their two endpoints.
pub fn convex_hull(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let mut sorted: Vec<(f32, f32)> = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let mut lower: Vec<(f32, f32)> = Vec::with_capacity(sorted.len());
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f32, f32)> = Vec::with_capacity(sorted.len());
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    // Each chain's last point is the other chain's first
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}
