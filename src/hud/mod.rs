//! Diagnostic HUD overlay.
//!
//! Draws the raw or smoothed landmark set onto an RGBA surface in one of
//! three modes: point cloud, wireframe, or mask. Rendering is independent
//! of rig mapping: the HUD shows what the detector saw, not what the
//! puppet does. A zero-sized or not-yet-attached surface skips the frame
//! instead of failing.

pub mod hull;

use image::{Rgba, RgbaImage};

pub use crate::config::HudMode;
use crate::landmark::{LandmarkSet, TrackingChannel};
use crate::topology::{face, hand, pose};

use hull::convex_hull;

// Feature palette. Alpha below 255 blends over the frame.
const COLOR_BASE: Rgba<u8> = Rgba([160, 160, 160, 255]);
const COLOR_OUTLINE: Rgba<u8> = Rgba([90, 200, 250, 255]);
const COLOR_EYES: Rgba<u8> = Rgba([120, 255, 120, 255]);
const COLOR_LIPS: Rgba<u8> = Rgba([255, 110, 110, 255]);
const COLOR_BROWS: Rgba<u8> = Rgba([255, 210, 80, 255]);
const COLOR_NOSE: Rgba<u8> = Rgba([200, 140, 255, 255]);
const COLOR_MESH: Rgba<u8> = Rgba([255, 255, 255, 48]);
const COLOR_MASK: Rgba<u8> = Rgba([40, 44, 52, 230]);
const COLOR_SKELETON: Rgba<u8> = Rgba([90, 200, 250, 255]);

/// Renderer options beyond the mode itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct HudOptions {
    /// Dense low-opacity mesh overlay in wireframe mode
    pub mesh_overlay: bool,
}

/// Render `landmarks` onto `surface`.
///
/// `mirrored` applies a horizontal flip to point coordinates before any
/// drawing; landmark order and indices are untouched.
pub fn render(
    surface: &mut RgbaImage,
    landmarks: &LandmarkSet,
    mode: HudMode,
    mirrored: bool,
    options: HudOptions,
) {
    let (w, h) = (surface.width(), surface.height());
    if w == 0 || h == 0 {
        tracing::debug!("HUD surface not ready, skipping frame");
        return;
    }

    let points = project(landmarks, w, h, mirrored);

    match landmarks.channel() {
        TrackingChannel::Face => render_face(surface, &points, mode, options),
        TrackingChannel::Pose => render_skeleton(surface, &points, pose::EDGES),
        TrackingChannel::Hand => render_skeleton(surface, &points, hand::EDGES),
    }
}

/// Normalized landmark coordinates → pixel space, flipped when mirrored.
fn project(landmarks: &LandmarkSet, w: u32, h: u32, mirrored: bool) -> Vec<(f32, f32)> {
    let wf = (w - 1) as f32;
    let hf = (h - 1) as f32;
    landmarks
        .points()
        .iter()
        .map(|p| {
            let x = if mirrored { 1.0 - p.x } else { p.x };
            (x * wf, p.y * hf)
        })
        .collect()
}

fn render_face(surface: &mut RgbaImage, points: &[(f32, f32)], mode: HudMode, options: HudOptions) {
    match mode {
        HudMode::Points => {
            for &p in points {
                draw_marker(surface, p, 1, COLOR_BASE);
            }
            for (ring, color) in feature_rings() {
                for &i in ring {
                    draw_marker(surface, points[i], 2, color);
                }
            }
        }
        HudMode::Wireframe => {
            if options.mesh_overlay {
                draw_mesh_overlay(surface, points);
            }
            draw_feature_contours(surface, points);
        }
        HudMode::Mask => {
            // Silhouette with eye/mouth cutouts via even-odd composition
            // over the hull of each feature subset.
            let outline: Vec<(f32, f32)> = face::OUTLINE.iter().map(|&i| points[i]).collect();
            let left_eye = convex_hull(&collect(points, face::LEFT_EYE_RING));
            let right_eye = convex_hull(&collect(points, face::RIGHT_EYE_RING));
            let mouth = convex_hull(&collect(points, face::LIPS_OUTER));

            fill_even_odd(surface, &[outline, left_eye, right_eye, mouth], COLOR_MASK);
            draw_feature_contours(surface, points);
        }
    }
}

fn feature_rings() -> [(&'static [usize], Rgba<u8>); 7] {
    [
        (face::OUTLINE, COLOR_OUTLINE),
        (face::LEFT_EYE_RING, COLOR_EYES),
        (face::RIGHT_EYE_RING, COLOR_EYES),
        (face::LIPS_OUTER, COLOR_LIPS),
        (face::LIPS_INNER, COLOR_LIPS),
        (face::LEFT_BROW, COLOR_BROWS),
        (face::RIGHT_BROW, COLOR_BROWS),
    ]
}

fn draw_feature_contours(surface: &mut RgbaImage, points: &[(f32, f32)]) {
    draw_ring(surface, points, face::OUTLINE, COLOR_OUTLINE, true);
    draw_ring(surface, points, face::LEFT_EYE_RING, COLOR_EYES, true);
    draw_ring(surface, points, face::RIGHT_EYE_RING, COLOR_EYES, true);
    draw_ring(surface, points, face::LIPS_OUTER, COLOR_LIPS, true);
    draw_ring(surface, points, face::LIPS_INNER, COLOR_LIPS, true);
    draw_ring(surface, points, face::LEFT_BROW, COLOR_BROWS, false);
    draw_ring(surface, points, face::RIGHT_BROW, COLOR_BROWS, false);
    draw_ring(surface, points, face::NOSE_LINE, COLOR_NOSE, false);
}

/// Low-opacity mesh impression: link every landmark to its two nearest
/// neighbors. Computed from geometry at render time; the result reads
/// like the model's tessellation at a fraction of the cost of shipping it.
fn draw_mesh_overlay(surface: &mut RgbaImage, points: &[(f32, f32)]) {
    for (i, &p) in points.iter().enumerate() {
        let mut best = [(f32::MAX, usize::MAX); 2];
        for (j, &q) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            let dx = p.0 - q.0;
            let dy = p.1 - q.1;
            let d = dx * dx + dy * dy;
            if d < best[0].0 {
                best[1] = best[0];
                best[0] = (d, j);
            } else if d < best[1].0 {
                best[1] = (d, j);
            }
        }
        for (_, j) in best {
            if j != usize::MAX && j > i {
                draw_line(surface, p, points[j], COLOR_MESH);
            }
        }
    }
}

fn render_skeleton(surface: &mut RgbaImage, points: &[(f32, f32)], edges: &[[usize; 2]]) {
    for &[a, b] in edges {
        draw_line(surface, points[a], points[b], COLOR_SKELETON);
    }
    for &p in points {
        draw_marker(surface, p, 2, COLOR_EYES);
    }
}

fn collect(points: &[(f32, f32)], ring: &[usize]) -> Vec<(f32, f32)> {
    ring.iter().map(|&i| points[i]).collect()
}

fn draw_ring(
    surface: &mut RgbaImage,
    points: &[(f32, f32)],
    ring: &[usize],
    color: Rgba<u8>,
    closed: bool,
) {
    for pair in ring.windows(2) {
        draw_line(surface, points[pair[0]], points[pair[1]], color);
    }
    if closed && ring.len() > 2 {
        draw_line(surface, points[ring[ring.len() - 1]], points[ring[0]], color);
    }
}

/// Alpha-blend one pixel; out-of-bounds coordinates are dropped.
fn blend_pixel(surface: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(surface.width()) || y >= i64::from(surface.height()) {
        return;
    }
    let dst = surface.get_pixel_mut(x as u32, y as u32);
    let a = u32::from(color[3]);
    for c in 0..3 {
        let src = u32::from(color[c]);
        let cur = u32::from(dst[c]);
        dst[c] = ((src * a + cur * (255 - a)) / 255) as u8;
    }
    dst[3] = dst[3].max(color[3]);
}

fn draw_marker(surface: &mut RgbaImage, center: (f32, f32), radius: i64, color: Rgba<u8>) {
    let cx = center.0.round() as i64;
    let cy = center.1.round() as i64;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            blend_pixel(surface, cx + dx, cy + dy, color);
        }
    }
}

/// Bresenham line.
fn draw_line(surface: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
    let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        blend_pixel(surface, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Scanline fill of several closed polygons composed with the even-odd
/// rule: pixels inside an odd number of rings are painted. The outline is
/// one ring and each cutout another, so cutout interiors stay clear.
fn fill_even_odd(surface: &mut RgbaImage, polygons: &[Vec<(f32, f32)>], color: Rgba<u8>) {
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;
    for poly in polygons {
        for &(_, y) in poly {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y > max_y {
        return;
    }

    let y_start = min_y.floor().max(0.0) as i64;
    let y_end = (max_y.ceil() as i64).min(i64::from(surface.height()) - 1);

    let mut crossings: Vec<f32> = Vec::new();
    for y in y_start..=y_end {
        let scan = y as f32 + 0.5;
        crossings.clear();

        for poly in polygons {
            if poly.len() < 3 {
                continue;
            }
            for i in 0..poly.len() {
                let (x1, y1) = poly[i];
                let (x2, y2) = poly[(i + 1) % poly.len()];
                if (y1 <= scan && scan < y2) || (y2 <= scan && scan < y1) {
                    crossings.push(x1 + (scan - y1) * (x2 - x1) / (y2 - y1));
                }
            }
        }

        crossings.sort_by(f32::total_cmp);
        for pair in crossings.chunks_exact(2) {
            let x_from = pair[0].round() as i64;
            let x_to = pair[1].round() as i64;
            for x in x_from..=x_to {
                blend_pixel(surface, x, y, color);
            }
        }
    }
}
