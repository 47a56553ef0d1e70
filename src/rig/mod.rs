//! Rig parameter surface: the mapper's sole contract with the puppet
//! renderer.
//!
//! The identifier space is closed, so parameters are a typed enum rather
//! than free-form strings; `id()` yields the stable cross-model string the
//! renderer keys on. A given puppet model may not implement every
//! identifier; unsupported writes are silently ignored, never an error.

pub mod mapper;

pub use mapper::RigMapper;

use std::collections::HashMap;

/// A named numeric input consumed by the puppet renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigParam {
    AngleX,
    AngleY,
    AngleZ,
    EyeOpenLeft,
    EyeOpenRight,
    PupilX,
    PupilY,
    MouthForm,
    MouthOpen,
    BrowLeftY,
    BrowRightY,
    BodyAngleX,
    BodyAngleY,
    BodyAngleZ,
    CheekBlush,
}

impl RigParam {
    pub const ALL: [RigParam; 15] = [
        Self::AngleX,
        Self::AngleY,
        Self::AngleZ,
        Self::EyeOpenLeft,
        Self::EyeOpenRight,
        Self::PupilX,
        Self::PupilY,
        Self::MouthForm,
        Self::MouthOpen,
        Self::BrowLeftY,
        Self::BrowRightY,
        Self::BodyAngleX,
        Self::BodyAngleY,
        Self::BodyAngleZ,
        Self::CheekBlush,
    ];

    /// Stable cross-model identifier string
    pub fn id(&self) -> &'static str {
        match self {
            Self::AngleX => "ParamAngleX",
            Self::AngleY => "ParamAngleY",
            Self::AngleZ => "ParamAngleZ",
            Self::EyeOpenLeft => "ParamEyeLOpen",
            Self::EyeOpenRight => "ParamEyeROpen",
            Self::PupilX => "ParamEyeBallX",
            Self::PupilY => "ParamEyeBallY",
            Self::MouthForm => "ParamMouthForm",
            Self::MouthOpen => "ParamMouthOpenY",
            Self::BrowLeftY => "ParamBrowLY",
            Self::BrowRightY => "ParamBrowRY",
            Self::BodyAngleX => "ParamBodyAngleX",
            Self::BodyAngleY => "ParamBodyAngleY",
            Self::BodyAngleZ => "ParamBodyAngleZ",
            Self::CheekBlush => "ParamCheek",
        }
    }

    /// Declared valid range
    pub fn range(&self) -> (f32, f32) {
        match self {
            Self::AngleX | Self::AngleY | Self::AngleZ => (-30.0, 30.0),
            Self::BodyAngleX | Self::BodyAngleY | Self::BodyAngleZ => (-10.0, 10.0),
            Self::EyeOpenLeft | Self::EyeOpenRight => (0.0, 1.0),
            Self::MouthOpen | Self::CheekBlush => (0.0, 1.0),
            Self::PupilX | Self::PupilY => (-1.0, 1.0),
            Self::MouthForm | Self::BrowLeftY | Self::BrowRightY => (-1.0, 1.0),
        }
    }

    /// Resting value the parameter decays toward when its input disappears
    pub fn neutral(&self) -> f32 {
        match self {
            Self::EyeOpenLeft | Self::EyeOpenRight => 1.0,
            _ => 0.0,
        }
    }

    /// Clip a value into the declared range
    pub fn clamp(&self, value: f32) -> f32 {
        let (min, max) = self.range();
        value.clamp(min, max)
    }
}

/// Flat string-keyed numeric table surface exposed by a puppet renderer.
pub trait ParameterTable: Send {
    fn get(&self, param: RigParam) -> Option<f32>;

    /// Write a value. Implementations ignore unsupported parameters.
    fn set(&mut self, param: RigParam, value: f32);

    /// Capability query; preferred over speculative writes.
    fn supports(&self, param: RigParam) -> bool;
}

/// In-memory table backing tests and the built-in debug puppet. Supports a
/// configurable subset of identifiers; every supported parameter starts at
/// its neutral value.
pub struct MemoryParameterTable {
    values: HashMap<RigParam, f32>,
}

impl MemoryParameterTable {
    /// Table supporting the full parameter set
    pub fn full() -> Self {
        Self::with_supported(&RigParam::ALL)
    }

    /// Table supporting only the given parameters, the way a minimal
    /// puppet model would
    pub fn with_supported(params: &[RigParam]) -> Self {
        let values = params.iter().map(|p| (*p, p.neutral())).collect();
        Self { values }
    }
}

impl ParameterTable for MemoryParameterTable {
    fn get(&self, param: RigParam) -> Option<f32> {
        self.values.get(&param).copied()
    }

    fn set(&mut self, param: RigParam, value: f32) {
        if let Some(slot) = self.values.get_mut(&param) {
            *slot = value;
        }
    }

    fn supports(&self, param: RigParam) -> bool {
        self.values.contains_key(&param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for p in RigParam::ALL {
            assert!(seen.insert(p.id()), "duplicate id {}", p.id());
        }
    }

    #[test]
    fn test_neutral_inside_range() {
        for p in RigParam::ALL {
            let (min, max) = p.range();
            let n = p.neutral();
            assert!(n >= min && n <= max);
            assert_eq!(p.clamp(n), n);
        }
    }

    #[test]
    fn test_clamp() {
        assert_eq!(RigParam::MouthOpen.clamp(1.7), 1.0);
        assert_eq!(RigParam::MouthOpen.clamp(-0.2), 0.0);
        assert_eq!(RigParam::AngleX.clamp(-45.0), -30.0);
    }

    #[test]
    fn test_unsupported_writes_are_ignored() {
        let mut table = MemoryParameterTable::with_supported(&[RigParam::MouthOpen]);
        assert!(table.supports(RigParam::MouthOpen));
        assert!(!table.supports(RigParam::CheekBlush));

        table.set(RigParam::CheekBlush, 0.9);
        assert_eq!(table.get(RigParam::CheekBlush), None);

        table.set(RigParam::MouthOpen, 0.5);
        assert_eq!(table.get(RigParam::MouthOpen), Some(0.5));
    }

    #[test]
    fn test_eyes_start_open() {
        let table = MemoryParameterTable::full();
        assert_eq!(table.get(RigParam::EyeOpenLeft), Some(1.0));
        assert_eq!(table.get(RigParam::MouthOpen), Some(0.0));
    }
}
