//! Track score
//!
//! Sequential negative log-likelihood ratio of the hypothesis "this track is
//! a real object" against "it is clutter". Lower is more confident. Every hit
//! adds the negative log of the measurement likelihood ratio, every miss adds
//! `-ln(1 - PD)`. A score above the delete threshold means confidence
//! collapsed and the track is dropped.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_SCORE_DETECTION_PROBABILITY, DEFAULT_SCORE_FALSE_TARGET_DENSITY, SCORE_ALPHA,
    SCORE_BETA, SCORE_INIT,
};
use crate::errors::ConfigError;

/// Parameters of the track score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Probability of detecting a real object
    pub detection_probability: f64,
    /// Density of false targets in measurement space
    pub false_target_density: f64,
    /// Ratio of false confirmations to false alarms
    pub alpha: f64,
    /// Probability of deleting a true track
    pub beta: f64,
    /// Delete tracks whose score exceeds [`ScoreConfig::delete_threshold`]
    pub delete_on_collapse: bool,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            detection_probability: DEFAULT_SCORE_DETECTION_PROBABILITY,
            false_target_density: DEFAULT_SCORE_FALSE_TARGET_DENSITY,
            alpha: SCORE_ALPHA,
            beta: SCORE_BETA,
            delete_on_collapse: true,
        }
    }
}

impl ScoreConfig {
    /// Score of a newborn track
    #[inline]
    pub fn initial(&self) -> f64 {
        SCORE_INIT
    }

    /// Score change for a missed detection
    #[inline]
    pub fn miss_increment(&self) -> f64 {
        -(1.0 - self.detection_probability).ln()
    }

    /// Score change for an associated detection.
    ///
    /// `-[ln(PD / ((2π)^{m/2} √|S| β_FT)) - d²/2]`
    pub fn hit_increment(&self, mahalanobis_squared: f64, innovation_covariance: &DMatrix<f64>) -> f64 {
        let m = innovation_covariance.nrows() as f64;
        let log_det: f64 = match innovation_covariance.clone().cholesky() {
            Some(chol) => chol.l_dirty().diagonal().iter().map(|d| 2.0 * d.ln()).sum(),
            None => innovation_covariance.determinant().abs().ln(),
        };
        let log_ratio = self.detection_probability.ln()
            - 0.5 * m * (2.0 * PI).ln()
            - 0.5 * log_det
            - self.false_target_density.ln();
        -(log_ratio - 0.5 * mahalanobis_squared)
    }

    /// Scores above this mean the track is likely clutter
    pub fn delete_threshold(&self) -> f64 {
        -(self.beta / (1.0 - self.alpha)).ln()
    }

    /// Scores below this would confirm a track in a sequential test
    pub fn confirm_threshold(&self) -> f64 {
        -((1.0 - self.beta) / self.alpha).ln() + SCORE_INIT
    }

    /// True if deletion on collapse is enabled and `score` crossed the threshold
    pub fn is_collapsed(&self, score: f64) -> bool {
        self.delete_on_collapse && score > self.delete_threshold()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let unit = |field: &'static str, value: f64| {
            if value > 0.0 && value < 1.0 {
                Ok(())
            } else {
                Err(ConfigError::invalid(field, format!("must be in (0, 1), got {value}")))
            }
        };
        unit("score.detection_probability", self.detection_probability)?;
        unit("score.alpha", self.alpha)?;
        unit("score.beta", self.beta)?;
        if !(self.false_target_density > 0.0 && self.false_target_density.is_finite()) {
            return Err(ConfigError::invalid(
                "score.false_target_density",
                format!("must be positive, got {}", self.false_target_density),
            ));
        }
        Ok(())
    }
}

/// Probability that a track with this score is a real object
pub fn existence_probability(score: f64) -> f64 {
    if score < -500.0 {
        return 1.0;
    }
    let odds = (-score).exp();
    odds / (1.0 + odds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let score = ScoreConfig::default();
        assert!((score.delete_threshold() - 4.605_070_186).abs() < 1e-6);
        assert!((score.miss_increment() - 10.0_f64.ln()).abs() < 1e-12);
        assert!(score.confirm_threshold() < score.initial());
    }

    #[test]
    fn test_good_hit_lowers_score() {
        let score = ScoreConfig::default();
        let s = DMatrix::identity(2, 2);
        assert!(score.hit_increment(0.5, &s) < 0.0);
        // A distant hit is penalized relative to a close one
        assert!(score.hit_increment(8.0, &s) > score.hit_increment(0.5, &s));
    }

    #[test]
    fn test_hit_increment_value() {
        let score = ScoreConfig::default();
        let s = DMatrix::identity(2, 2) * 4.0;
        let expected = -((0.9_f64).ln() - (2.0 * PI).ln() - 0.5 * 16.0_f64.ln() - 1e-7_f64.ln() - 1.0);
        assert!((score.hit_increment(2.0, &s) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_collapse() {
        let mut score = ScoreConfig::default();
        let mut value = score.initial();
        for _ in 0..4 {
            value += score.miss_increment();
        }
        assert!(score.is_collapsed(value));
        score.delete_on_collapse = false;
        assert!(!score.is_collapsed(value));
    }

    #[test]
    fn test_existence_probability() {
        assert!((existence_probability(0.0) - 0.5).abs() < 1e-12);
        assert!(existence_probability(-10.0) > 0.99);
        assert_eq!(existence_probability(-1000.0), 1.0);
    }

    #[test]
    fn test_validation() {
        let bad = ScoreConfig {
            detection_probability: 1.0,
            ..ScoreConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(ScoreConfig::default().validate().is_ok());
    }
}
