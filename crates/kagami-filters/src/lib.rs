//! Scalar smoothing primitives for the kagami tracking pipeline.
//!
//! Everything in here is a first-order building block: exponential moving
//! averages, linear interpolation, and deadzones. Multi-channel smoothing
//! policy (which alpha applies to which signal) lives with the caller.

/// Single exponential smoothing step: move `prev` toward `cur` by `alpha`.
///
/// `alpha` is the blend weight of the new sample; 1.0 passes the sample
/// through, values near 0.0 smooth heavily at the cost of lag.
#[inline]
pub fn ema(prev: f32, cur: f32, alpha: f32) -> f32 {
    prev + (cur - prev) * alpha
}

/// Linear interpolation from `a` toward `b` by `t`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Zero out values whose magnitude is below `threshold`.
///
/// Used to suppress sensor noise around a resting position before it is
/// fed into a smoother, so the output settles instead of wandering.
#[inline]
pub fn apply_deadzone(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Stateful scalar EMA with an explicit cold-start.
///
/// The first sample passes through unchanged; subsequent samples are
/// blended against the stored state. `reset()` returns the filter to the
/// cold-start condition.
#[derive(Debug, Clone, Default)]
pub struct ScalarEma {
    state: Option<f32>,
}

impl ScalarEma {
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Feed one sample and return the smoothed value.
    pub fn update(&mut self, sample: f32, alpha: f32) -> f32 {
        let next = match self.state {
            Some(prev) => ema(prev, sample, alpha),
            None => sample,
        };
        self.state = Some(next);
        next
    }

    /// Current smoothed value, if any sample has been seen.
    pub fn value(&self) -> Option<f32> {
        self.state
    }

    /// Forget all history; the next sample passes through unchanged.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_step() {
        // p += (c - p) * alpha
        assert_eq!(ema(10.0, 20.0, 0.5), 15.0);
        assert_eq!(ema(10.0, 20.0, 1.0), 20.0);
        assert_eq!(ema(10.0, 20.0, 0.0), 10.0);
    }

    #[test]
    fn test_ema_converges_monotonically() {
        for alpha in [0.1f32, 0.25, 0.5, 0.9] {
            let target = 1.0f32;
            let mut p = 0.0f32;
            let mut last_dist = target - p;
            for _ in 0..20 {
                p = ema(p, target, alpha);
                let dist = (target - p).abs();
                assert!(dist < last_dist, "alpha={alpha} did not converge");
                last_dist = dist;
            }
        }
    }

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0.0, 10.0, 0.3), 3.0);
        assert_eq!(lerp(5.0, 5.0, 0.7), 5.0);
    }

    #[test]
    fn test_deadzone() {
        assert_eq!(apply_deadzone(0.01, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.01, 0.05), 0.0);
        assert_eq!(apply_deadzone(0.2, 0.05), 0.2);
        assert_eq!(apply_deadzone(-0.2, 0.05), -0.2);
    }

    #[test]
    fn test_scalar_ema_cold_start() {
        let mut f = ScalarEma::new();
        assert_eq!(f.value(), None);
        // First sample passes through for any alpha
        assert_eq!(f.update(3.5, 0.1), 3.5);
        assert_eq!(f.value(), Some(3.5));
    }

    #[test]
    fn test_scalar_ema_reset() {
        let mut f = ScalarEma::new();
        f.update(10.0, 0.5);
        f.update(20.0, 0.5);
        f.reset();
        assert_eq!(f.update(100.0, 0.5), 100.0);
    }
}
