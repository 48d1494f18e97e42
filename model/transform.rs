//! Scalar post-transforms applied to a raw linear score.
//!
//! Every published clock reports its coefficients against some internal
//! scale; the transform maps the weighted sum back onto the advertised
//! output unit (years, years/year, kilobases, ...). Transforms are pure
//! scalar functions and are part of a model's catalog entry, so they are
//! (de)serialisable alongside it.

use serde::{Deserialize, Serialize};

/// The adult-age pivot of the piecewise log-linear age scale.
pub const DEFAULT_ADULT_AGE: f64 = 20.0;

fn default_adult_age() -> f64 {
    DEFAULT_ADULT_AGE
}

/// A scalar function from raw score to final predicted value.
///
/// An absent transform in a catalog entry deserialises to `Identity`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreTransform {
    /// The raw weighted sum is already on the output scale.
    #[default]
    Identity,
    /// Add a constant calibration offset to the raw sum.
    Offset(f64),
    /// The piecewise "anti-log" age scale used by the Horvath-family
    /// clocks: scores below zero map exponentially into childhood ages,
    /// scores at or above zero map linearly into adult ages. The two
    /// branches agree at zero.
    AntiLogAge {
        offset: f64,
        #[serde(default = "default_adult_age")]
        adult_age: f64,
    },
}

impl ScoreTransform {
    /// An anti-log age transform with the conventional adult-age pivot.
    pub fn anti_log_age(offset: f64) -> Self {
        ScoreTransform::AntiLogAge {
            offset,
            adult_age: DEFAULT_ADULT_AGE,
        }
    }

    /// Applies the transform to one raw score.
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            ScoreTransform::Identity => raw,
            ScoreTransform::Offset(shift) => raw + shift,
            ScoreTransform::AntiLogAge { offset, adult_age } => {
                let x = raw + offset;
                if x < 0.0 {
                    (1.0 + adult_age) * x.exp() - 1.0
                } else {
                    (1.0 + adult_age) * x + adult_age
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_returns_input() {
        assert_abs_diff_eq!(ScoreTransform::Identity.apply(1.25), 1.25);
        assert_abs_diff_eq!(ScoreTransform::Identity.apply(-3.0), -3.0);
    }

    #[test]
    fn offset_shifts_by_constant() {
        let transform = ScoreTransform::Offset(60.664);
        assert_abs_diff_eq!(transform.apply(0.0), 60.664);
        assert_abs_diff_eq!(transform.apply(-60.664), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn anti_log_age_uses_linear_branch_for_adult_scores() {
        let transform = ScoreTransform::anti_log_age(0.0);
        // x >= 0: (1 + 20) * x + 20
        assert_abs_diff_eq!(transform.apply(0.0), 20.0);
        assert_abs_diff_eq!(transform.apply(1.0), 41.0);
        assert_abs_diff_eq!(transform.apply(2.0), 62.0);
    }

    #[test]
    fn anti_log_age_uses_exponential_branch_for_child_scores() {
        let transform = ScoreTransform::anti_log_age(0.0);
        // x < 0: (1 + 20) * e^x - 1
        assert_abs_diff_eq!(transform.apply(-1.0), 21.0 * (-1.0f64).exp() - 1.0);
        // A deeply negative score approaches -1, never below.
        assert!(transform.apply(-50.0) > -1.0);
    }

    #[test]
    fn anti_log_age_branches_agree_at_zero() {
        let transform = ScoreTransform::anti_log_age(0.696);
        let below = transform.apply(-0.696 - 1e-9);
        let at = transform.apply(-0.696);
        assert_abs_diff_eq!(below, at, epsilon = 1e-6);
        assert_abs_diff_eq!(at, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn anti_log_age_applies_offset_before_branching() {
        let transform = ScoreTransform::anti_log_age(-2.1);
        // raw = 2.1 lands exactly on the branch point.
        assert_abs_diff_eq!(transform.apply(2.1), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn transform_round_trips_through_toml() {
        let transform = ScoreTransform::anti_log_age(0.696);
        let text = toml::to_string(&TransformHolder { transform }).unwrap();
        let back: TransformHolder = toml::from_str(&text).unwrap();
        assert_eq!(back.transform, transform);
    }

    #[test]
    fn missing_transform_defaults_to_identity() {
        let back: TransformHolder = toml::from_str("").unwrap();
        assert_eq!(back.transform, ScoreTransform::Identity);
    }

    #[derive(Serialize, Deserialize)]
    struct TransformHolder {
        #[serde(default)]
        transform: ScoreTransform,
    }
}
