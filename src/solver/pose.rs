//! Body solver: sparse skeleton geometry → torso lean angles.
//!
//! The puppet frames subjects from the waist up, so only the torso is
//! solved: shoulder roll, lateral lean, and a depth-based turn estimate.

use crate::landmark::LandmarkSet;
use crate::topology::pose as idx;

use super::{dist2d, midpoint, SolverContext, MIN_REFERENCE_LEN};

/// Torso angle clamp in degrees
const MAX_BODY_ANGLE_DEG: f32 = 20.0;

/// Degrees of lateral lean per one shoulder-width of offset
const LEAN_SCALE_DEG: f32 = 60.0;

/// Degrees of turn per unit of normalized shoulder depth difference
const TURN_SCALE_DEG: f32 = 45.0;

/// Solved body channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseSolve {
    /// Torso rotation in degrees: [x = turn, y = lean, z = roll]
    pub body_angle: Option<[f32; 3]>,
}

pub fn solve(landmarks: &LandmarkSet, _context: &SolverContext) -> PoseSolve {
    PoseSolve {
        body_angle: solve_torso(landmarks),
    }
}

fn solve_torso(landmarks: &LandmarkSet) -> Option<[f32; 3]> {
    let ls = landmarks.point(idx::LEFT_SHOULDER)?;
    let rs = landmarks.point(idx::RIGHT_SHOULDER)?;
    let lh = landmarks.point(idx::LEFT_HIP)?;
    let rh = landmarks.point(idx::RIGHT_HIP)?;

    let shoulder_width = dist2d(ls, rs);
    if shoulder_width < MIN_REFERENCE_LEN {
        return None;
    }

    // Roll: angle of the shoulder line
    let roll = (rs.y - ls.y).atan2(rs.x - ls.x).to_degrees();

    // Lean: shoulder midpoint drifting sideways off the hip midpoint
    let shoulder_mid = midpoint(ls, rs);
    let hip_mid = midpoint(lh, rh);
    let lean = (shoulder_mid.x - hip_mid.x) / shoulder_width * LEAN_SCALE_DEG;

    // Turn: one shoulder closer to the camera than the other
    let turn = (ls.z - rs.z) / shoulder_width * TURN_SCALE_DEG;

    Some([
        turn.clamp(-MAX_BODY_ANGLE_DEG, MAX_BODY_ANGLE_DEG),
        lean.clamp(-MAX_BODY_ANGLE_DEG, MAX_BODY_ANGLE_DEG),
        roll.clamp(-MAX_BODY_ANGLE_DEG, MAX_BODY_ANGLE_DEG),
    ])
}
