//! Synthetic landmark fixtures shared across module tests.
//!
//! The face builders place the anatomical reference indices of a centered,
//! symmetric subject in normalized [0,1] coordinates; every other mesh
//! point sits at the image center, which the solvers never read.

#![cfg(test)]

use crate::landmark::{Landmark, LandmarkSet, TrackingChannel, FACE_POINTS, HAND_POINTS, POSE_POINTS};
use crate::topology::{face, hand, pose};

pub fn face_from_points(points: Vec<Landmark>) -> LandmarkSet {
    LandmarkSet::new(TrackingChannel::Face, points, 0).expect("valid face cardinality")
}

/// Centered, symmetric, eyes-open neutral face (base 468-point mesh).
pub fn centered_face() -> LandmarkSet {
    let mut p = vec![Landmark::new(0.5, 0.5, 0.0); FACE_POINTS];

    fn set(p: &mut [Landmark], i: usize, x: f32, y: f32) {
        p[i] = Landmark::new(x, y, 0.0);
    }

    // Eyes: centers at (0.40, 0.42) and (0.60, 0.42), lids open
    set(&mut p, face::LEFT_EYE_OUTER, 0.35, 0.42);
    set(&mut p, face::LEFT_EYE_INNER, 0.45, 0.42);
    set(&mut p, face::RIGHT_EYE_INNER, 0.55, 0.42);
    set(&mut p, face::RIGHT_EYE_OUTER, 0.65, 0.42);
    set(&mut p, face::LEFT_EYE_UPPER, 0.40, 0.40);
    set(&mut p, face::LEFT_EYE_LOWER, 0.40, 0.435);
    set(&mut p, face::RIGHT_EYE_UPPER, 0.60, 0.40);
    set(&mut p, face::RIGHT_EYE_LOWER, 0.60, 0.435);

    // Nose and face extent
    p[face::NOSE_TIP] = Landmark::new(0.5, 0.555, -0.02);
    set(&mut p, face::NOSE_BRIDGE, 0.5, 0.45);
    set(&mut p, face::CHIN, 0.5, 0.72);
    set(&mut p, face::FOREHEAD_TOP, 0.5, 0.22);

    // Mouth: resting width 0.12, nearly closed
    set(&mut p, face::UPPER_LIP, 0.5, 0.60);
    set(&mut p, face::LOWER_LIP, 0.5, 0.645);
    set(&mut p, face::UPPER_LIP_INNER, 0.5, 0.615);
    set(&mut p, face::LOWER_LIP_INNER, 0.5, 0.625);
    set(&mut p, face::LEFT_MOUTH_CORNER, 0.44, 0.62);
    set(&mut p, face::RIGHT_MOUTH_CORNER, 0.56, 0.62);

    // Brows at resting height above the lids
    set(&mut p, face::LEFT_BROW_ARCH, 0.40, 0.365);
    set(&mut p, face::RIGHT_BROW_ARCH, 0.60, 0.365);
    set(&mut p, face::LEFT_BROW_INNER, 0.45, 0.37);
    set(&mut p, face::RIGHT_BROW_INNER, 0.55, 0.37);

    face_from_points(p)
}

/// The centered face with the refined iris ring appended, irises centered.
pub fn centered_face_with_iris() -> LandmarkSet {
    let mut p = centered_face().points().to_vec();
    p.resize(478, Landmark::new(0.5, 0.42, 0.0));
    p[face::LEFT_IRIS_CENTER] = Landmark::new(0.40, 0.42, 0.0);
    p[face::RIGHT_IRIS_CENTER] = Landmark::new(0.60, 0.42, 0.0);
    face_from_points(p)
}

/// Upright body skeleton, shoulders level, hips under shoulders.
pub fn centered_pose() -> LandmarkSet {
    let mut p = vec![Landmark::new(0.5, 0.5, 0.0); POSE_POINTS];
    p[pose::NOSE] = Landmark::new(0.5, 0.30, 0.0);
    p[pose::LEFT_SHOULDER] = Landmark::new(0.40, 0.55, 0.0);
    p[pose::RIGHT_SHOULDER] = Landmark::new(0.60, 0.55, 0.0);
    p[pose::LEFT_HIP] = Landmark::new(0.42, 0.85, 0.0);
    p[pose::RIGHT_HIP] = Landmark::new(0.58, 0.85, 0.0);
    LandmarkSet::new(TrackingChannel::Pose, p, 0).expect("valid pose cardinality")
}

pub fn pose_from_points(points: Vec<Landmark>) -> LandmarkSet {
    LandmarkSet::new(TrackingChannel::Pose, points, 0).expect("valid pose cardinality")
}

/// Fully open hand: fingertips extended well past the knuckles.
pub fn open_hand() -> LandmarkSet {
    let mut p = vec![Landmark::new(0.5, 0.7, 0.0); HAND_POINTS];
    p[hand::WRIST] = Landmark::new(0.5, 0.80, 0.0);
    for (i, (&knuckle, &tip)) in hand::KNUCKLES.iter().zip(hand::FINGERTIPS.iter()).enumerate() {
        let spread = (i as f32 - 2.0) * 0.03;
        p[knuckle] = Landmark::new(0.5 + spread, 0.62, 0.0);
        p[tip] = Landmark::new(0.5 + spread * 1.7, 0.40, 0.0);
    }
    LandmarkSet::new(TrackingChannel::Hand, p, 0).expect("valid hand cardinality")
}

/// Closed fist: fingertips curled back near the wrist.
pub fn closed_hand() -> LandmarkSet {
    let mut p = vec![Landmark::new(0.5, 0.7, 0.0); HAND_POINTS];
    p[hand::WRIST] = Landmark::new(0.5, 0.80, 0.0);
    for (i, (&knuckle, &tip)) in hand::KNUCKLES.iter().zip(hand::FINGERTIPS.iter()).enumerate() {
        let spread = (i as f32 - 2.0) * 0.03;
        p[knuckle] = Landmark::new(0.5 + spread, 0.62, 0.0);
        p[tip] = Landmark::new(0.5 + spread, 0.70, 0.0);
    }
    LandmarkSet::new(TrackingChannel::Hand, p, 0).expect("valid hand cardinality")
}
