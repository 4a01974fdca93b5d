//! Motion helpers shared by the walker and the tween runner:
//! critically damped smoothing and easing curves.

use bevy::math::curve::{Curve, EaseFunction, EasingCurve};
use serde::{Deserialize, Serialize};

/// Critically damped spring toward `target`.
///
/// `rate` carries the rate of change between calls. A non-positive
/// `smooth_time` snaps straight to the target.
pub fn smooth_damp(current: f32, target: f32, rate: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if smooth_time <= 0.0 || dt <= 0.0 {
        if smooth_time <= 0.0 {
            *rate = 0.0;
            return target;
        }
        return current;
    }

    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*rate + omega * change) * dt;
    *rate = (*rate - omega * temp) * decay;
    let mut output = target + (change + temp) * decay;

    // Never overshoot the target
    if (target - current > 0.0) == (output > target) {
        output = target;
        *rate = (output - target) / dt;
    }
    output
}

/// Easing curve names as authored in chunk JSON.
///
/// Evaluation is delegated to bevy's [`EaseFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ease {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    OutCubic,
    #[default]
    InOutQuart,
    InOutSine,
    InBack,
    OutElastic,
}

impl From<Ease> for EaseFunction {
    fn from(ease: Ease) -> Self {
        match ease {
            Ease::Linear => EaseFunction::Linear,
            Ease::InQuad => EaseFunction::QuadraticIn,
            Ease::OutQuad => EaseFunction::QuadraticOut,
            Ease::InOutQuad => EaseFunction::QuadraticInOut,
            Ease::OutCubic => EaseFunction::CubicOut,
            Ease::InOutQuart => EaseFunction::QuarticInOut,
            Ease::InOutSine => EaseFunction::SineInOut,
            Ease::InBack => EaseFunction::BackIn,
            Ease::OutElastic => EaseFunction::ElasticOut,
        }
    }
}

impl Ease {
    pub fn curve(self) -> EasingCurve<f32> {
        EasingCurve::new(0.0, 1.0, self.into())
    }

    /// Eased progress for normalized time `t`, clamped to [0, 1].
    /// `InBack` and `OutElastic` leave [0, 1] on the way.
    pub fn apply(self, t: f32) -> f32 {
        self.curve().sample_clamped(t)
    }
}
