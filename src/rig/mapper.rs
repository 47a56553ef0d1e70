//! Solved poses → rig parameter writes.
//!
//! Runs once per render tick against the bus's latest cached values, so
//! render cadence is decoupled from inference cadence. Per channel:
//! stage-1 EMA against the channel's own history (detector jitter), then
//! stage-2 lerp from the current parameter value toward the smoothed
//! target (output responsiveness). Channels whose input disappeared decay
//! toward their neutral baseline with the same lerp instead of snapping.

use std::collections::{HashMap, HashSet};

use kagami_filters::{lerp, ScalarEma};

use crate::config::MapperTuning;
use crate::solver::{FaceSolve, PoseSolve};

use super::{ParameterTable, RigParam};

/// Maps solved tracking channels onto a puppet's parameter table.
pub struct RigMapper {
    tuning: MapperTuning,
    /// Stage-1 smoothing state, lazily populated per parameter
    raw: HashMap<RigParam, ScalarEma>,
    /// Local cache of committed parameter values, avoiding a table
    /// round-trip per write
    cache: HashMap<RigParam, f32>,
    /// Parameters written this tick; later writers of the same id lose
    written: HashSet<RigParam>,
}

impl RigMapper {
    pub fn new(tuning: MapperTuning) -> Self {
        Self {
            tuning,
            raw: HashMap::new(),
            cache: HashMap::new(),
            written: HashSet::new(),
        }
    }

    pub fn tuning(&self) -> &MapperTuning {
        &self.tuning
    }

    pub fn set_tuning(&mut self, tuning: MapperTuning) {
        self.tuning = tuning;
    }

    /// Forget all smoothing state and cached values.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.cache.clear();
        self.written.clear();
    }

    /// One render tick: map the latest solved channels into `table`.
    ///
    /// `None` inputs drive the corresponding parameters toward neutral.
    pub fn apply(
        &mut self,
        face: Option<&FaceSolve>,
        pose: Option<&PoseSolve>,
        table: &mut dyn ParameterTable,
    ) {
        self.written.clear();

        // Pose channel first: a tracked torso beats face-derived sway
        // under first-write-wins.
        if let Some(pose) = pose {
            self.apply_pose(pose, table);
        }
        if let Some(face) = face {
            self.apply_face(face, table);
        }

        self.decay_untouched(table);
    }

    fn apply_pose(&mut self, pose: &PoseSolve, table: &mut dyn ParameterTable) {
        if let Some([turn, lean, roll]) = pose.body_angle {
            let alpha = self.tuning.raw_alpha;
            self.write(table, RigParam::BodyAngleX, turn, alpha);
            self.write(table, RigParam::BodyAngleY, lean, alpha);
            self.write(table, RigParam::BodyAngleZ, roll, alpha);
        }
    }

    fn apply_face(&mut self, face: &FaceSolve, table: &mut dyn ParameterTable) {
        let alpha = self.tuning.raw_alpha;
        let expressive = self.tuning.raw_alpha_expressive;

        if let Some([pitch, yaw, roll]) = face.head_rotation {
            // Puppet convention: AngleY positive looks up; image pitch
            // grows downward.
            self.write(table, RigParam::AngleX, yaw, alpha);
            self.write(table, RigParam::AngleY, -pitch, alpha);
            self.write(table, RigParam::AngleZ, roll, alpha);

            // Secondary motion: body sway follows the head at reduced
            // amplitude unless a tracked torso already wrote it.
            let sway = self.tuning.body_sway_factor;
            self.write(table, RigParam::BodyAngleX, yaw * sway, alpha);
            self.write(table, RigParam::BodyAngleY, -pitch * sway, alpha);
            self.write(table, RigParam::BodyAngleZ, roll * sway, alpha);
        }

        if let Some(open) = face.eye_open_left {
            self.write(table, RigParam::EyeOpenLeft, open, alpha);
        }
        if let Some(open) = face.eye_open_right {
            self.write(table, RigParam::EyeOpenRight, open, alpha);
        }
        if let Some([px, py]) = face.pupil_offset {
            self.write(table, RigParam::PupilX, px, alpha);
            self.write(table, RigParam::PupilY, py, alpha);
        }

        if let Some(open) = face.mouth_open {
            self.write(table, RigParam::MouthOpen, open, expressive);
        }
        if let Some(form) = self.blended_mouth_form(face) {
            self.write(table, RigParam::MouthForm, form, expressive);
        }

        if let Some(lift) = face.brow_left_y {
            self.write(table, RigParam::BrowLeftY, lift, expressive);
        }
        if let Some(lift) = face.brow_right_y {
            self.write(table, RigParam::BrowRightY, lift, expressive);
        }

        // Secondary motion: blush follows the smile classifier directly.
        if let Some(smile) = face.smile_score {
            let blush = smile * self.tuning.blush_intensity;
            self.write(table, RigParam::CheekBlush, blush, expressive);
        }
    }

    /// Blend the geometric mouth form with the expression classifier.
    ///
    /// Ratio 0 is geometry only and 1 is classifier only; between, the two
    /// are lerped, falling back to whichever signal is present.
    fn blended_mouth_form(&self, face: &FaceSolve) -> Option<f32> {
        let ratio = self.tuning.expression_blend;
        let geometric = face.mouth_form;
        // Classifier score [0,1] re-expressed in form space [-1,1]
        let classifier = face.smile_score.map(|s| s * 2.0 - 1.0);

        if ratio <= 0.0 {
            geometric
        } else if ratio >= 1.0 {
            classifier
        } else {
            match (geometric, classifier) {
                (Some(g), Some(c)) => Some(lerp(g, c, ratio)),
                (Some(g), None) => Some(g),
                (None, Some(c)) => Some(c),
                (None, None) => None,
            }
        }
    }

    /// Two-stage write: EMA the raw target, lerp the parameter toward the
    /// smoothed value, clamp, commit to cache and table together.
    fn write(&mut self, table: &mut dyn ParameterTable, param: RigParam, target: f32, alpha: f32) {
        // Capability query up front, so unsupported parameters accrue no
        // smoothing state either.
        if !table.supports(param) {
            return;
        }
        if !self.written.insert(param) {
            return;
        }

        let smoothed = self.raw.entry(param).or_default().update(target, alpha);

        let current = self.current_value(table, param);
        let next = param.clamp(lerp(current, smoothed, self.tuning.output_factor));

        self.cache.insert(param, next);
        table.set(param, next);
    }

    /// Ease a parameter toward neutral when its input is absent.
    fn decay_untouched(&mut self, table: &mut dyn ParameterTable) {
        for param in RigParam::ALL {
            if self.written.contains(&param) || !table.supports(param) {
                continue;
            }

            // Stale jitter history must not replay when the signal returns
            if let Some(filter) = self.raw.get_mut(&param) {
                filter.reset();
            }

            let current = self.current_value(table, param);
            let next = param.clamp(lerp(current, param.neutral(), self.tuning.decay_factor));
            if (next - current).abs() > f32::EPSILON {
                self.cache.insert(param, next);
                table.set(param, next);
            }
        }
    }

    fn current_value(&self, table: &dyn ParameterTable, param: RigParam) -> f32 {
        self.cache
            .get(&param)
            .copied()
            .or_else(|| table.get(param))
            .unwrap_or_else(|| param.neutral())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::MemoryParameterTable;

    fn face_with(form: Option<f32>, smile: Option<f32>) -> FaceSolve {
        FaceSolve {
            mouth_form: form,
            smile_score: smile,
            ..FaceSolve::default()
        }
    }

    fn tuning_with_blend(ratio: f32) -> MapperTuning {
        MapperTuning {
            expression_blend: ratio,
            ..MapperTuning::default()
        }
    }

    #[test]
    fn test_blend_zero_is_geometry_only() {
        let mut table_a = MemoryParameterTable::full();
        let mut table_b = MemoryParameterTable::full();
        let mut mapper_a = RigMapper::new(tuning_with_blend(0.0));
        let mut mapper_b = RigMapper::new(tuning_with_blend(0.0));

        // Same geometry, wildly different classifier scores
        mapper_a.apply(Some(&face_with(Some(0.5), Some(0.0))), None, &mut table_a);
        mapper_b.apply(Some(&face_with(Some(0.5), Some(1.0))), None, &mut table_b);

        assert_eq!(
            table_a.get(RigParam::MouthForm),
            table_b.get(RigParam::MouthForm)
        );
    }

    #[test]
    fn test_blend_one_is_classifier_only() {
        let mut table_a = MemoryParameterTable::full();
        let mut table_b = MemoryParameterTable::full();
        let mut mapper_a = RigMapper::new(tuning_with_blend(1.0));
        let mut mapper_b = RigMapper::new(tuning_with_blend(1.0));

        // Same classifier score, wildly different geometry
        mapper_a.apply(Some(&face_with(Some(-1.0), Some(0.8))), None, &mut table_a);
        mapper_b.apply(Some(&face_with(Some(1.0), Some(0.8))), None, &mut table_b);

        let a = table_a.get(RigParam::MouthForm).unwrap();
        assert_eq!(Some(a), table_b.get(RigParam::MouthForm));
        // Classifier 0.8 maps to +0.6 in form space; the write moves
        // toward it from neutral
        assert!(a > 0.0);
    }

    #[test]
    fn test_blend_midpoint_mixes_signals() {
        let tuning = tuning_with_blend(0.5);
        let mut mapper = RigMapper::new(tuning.clone());
        let mut table = MemoryParameterTable::full();

        // geometric -1.0, classifier 1.0 (smile 1.0) → blended target 0.0
        mapper.apply(Some(&face_with(Some(-1.0), Some(1.0))), None, &mut table);
        let form = table.get(RigParam::MouthForm).unwrap();
        assert!(form.abs() < 1e-6, "expected neutral blend, got {form}");
    }

    #[test]
    fn test_decay_toward_neutral_on_absence() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::full();

        let face = FaceSolve {
            mouth_open: Some(1.0),
            ..FaceSolve::default()
        };
        // Converge the mouth toward open
        for _ in 0..60 {
            mapper.apply(Some(&face), None, &mut table);
        }
        let opened = table.get(RigParam::MouthOpen).unwrap();
        assert!(opened > 0.8);

        // Face lost: decays smoothly, no snap
        mapper.apply(None, None, &mut table);
        let after_one = table.get(RigParam::MouthOpen).unwrap();
        assert!(after_one < opened);
        assert!(after_one > 0.5, "decay must not snap ({after_one})");

        for _ in 0..120 {
            mapper.apply(None, None, &mut table);
        }
        assert!(table.get(RigParam::MouthOpen).unwrap() < 0.05);
        // Eyes decay toward their open neutral, not zero
        assert!(table.get(RigParam::EyeOpenLeft).unwrap() > 0.9);
    }

    #[test]
    fn test_tracked_torso_beats_derived_sway() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::full();

        let face = FaceSolve {
            head_rotation: Some([0.0, 20.0, 0.0]),
            ..FaceSolve::default()
        };
        let pose = PoseSolve {
            body_angle: Some([10.0, 0.0, 0.0]),
        };

        for _ in 0..60 {
            mapper.apply(Some(&face), Some(&pose), &mut table);
        }

        // BodyAngleX converged to the tracked 10deg turn, not yaw * sway
        let body_x = table.get(RigParam::BodyAngleX).unwrap();
        assert!((body_x - 10.0).abs() < 0.5, "got {body_x}");
    }

    #[test]
    fn test_derived_sway_without_pose() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::full();

        let face = FaceSolve {
            head_rotation: Some([0.0, 20.0, 0.0]),
            ..FaceSolve::default()
        };
        for _ in 0..60 {
            mapper.apply(Some(&face), None, &mut table);
        }

        let body_x = table.get(RigParam::BodyAngleX).unwrap();
        let expected = 20.0 * MapperTuning::default().body_sway_factor;
        assert!((body_x - expected).abs() < 0.5, "got {body_x}");
    }

    #[test]
    fn test_writes_are_clamped() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::full();

        let face = FaceSolve {
            // Out-of-range input is clipped, never rejected
            mouth_open: Some(42.0),
            ..FaceSolve::default()
        };
        for _ in 0..60 {
            mapper.apply(Some(&face), None, &mut table);
        }
        assert_eq!(table.get(RigParam::MouthOpen), Some(1.0));
    }

    #[test]
    fn test_unsupported_parameters_do_not_block_others() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::with_supported(&[RigParam::MouthOpen]);

        let face = FaceSolve {
            mouth_open: Some(1.0),
            smile_score: Some(1.0),
            ..FaceSolve::default()
        };
        mapper.apply(Some(&face), None, &mut table);

        assert!(table.get(RigParam::MouthOpen).unwrap() > 0.0);
        assert_eq!(table.get(RigParam::CheekBlush), None);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut mapper = RigMapper::new(MapperTuning::default());
        let mut table = MemoryParameterTable::full();

        let face = FaceSolve {
            mouth_open: Some(1.0),
            ..FaceSolve::default()
        };
        mapper.apply(Some(&face), None, &mut table);
        mapper.reset();
        assert!(mapper.raw.is_empty());
        assert!(mapper.cache.is_empty());
    }
}
