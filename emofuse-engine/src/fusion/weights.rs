//! Dynamic channel weighting
//!
//! The channel that is more confident than the other gains weight at the
//! other's expense. Base weights slightly favour audio. Both weights stay
//! inside `[min_weight, max_weight]` and are renormalized to sum 1.

use emofuse_common::params::{FusionConfig, WeightMode};
use emofuse_common::Weights;

/// Largest shift the linear and exponential modes may apply
const MAX_CONTINUOUS_ADJUSTMENT: f64 = 0.15;
const LINEAR_GAIN: f64 = 0.3;
const EXPONENTIAL_GAIN: f64 = 0.2;
const EXPONENTIAL_POWER: f64 = 1.5;

/// (upper bound on |diff|, adjustment) bands for threshold mode
const THRESHOLD_BANDS: [(f64, f64); 4] = [(0.10, 0.0), (0.20, 0.08), (0.35, 0.15), (0.50, 0.20)];
const THRESHOLD_MAX_ADJUSTMENT: f64 = 0.25;

/// Compute the face/audio weight pair for two channel confidences
///
/// Pure: identical inputs always produce bit-identical outputs.
pub fn compute_weights(conf_face: f64, conf_audio: f64, config: &FusionConfig) -> Weights {
    let diff = conf_face - conf_audio;
    let adjustment = weight_adjustment(diff, config.weight_adjustment_mode);

    let face = (config.base_face_weight + adjustment).clamp(config.min_weight, config.max_weight);
    let audio = (config.base_audio_weight - adjustment).clamp(config.min_weight, config.max_weight);

    let total = face + audio;
    if !total.is_finite() || total <= 0.0 {
        return Weights { face: 0.5, audio: 0.5 };
    }
    Weights {
        face: face / total,
        audio: audio / total,
    }
}

/// Signed shift toward the face channel (negative favours audio)
pub fn weight_adjustment(diff: f64, mode: WeightMode) -> f64 {
    match mode {
        WeightMode::Threshold => {
            let magnitude = THRESHOLD_BANDS
                .iter()
                .find(|(bound, _)| diff.abs() < *bound)
                .map(|(_, adj)| *adj)
                .unwrap_or(THRESHOLD_MAX_ADJUSTMENT);
            if diff > 0.0 {
                magnitude
            } else {
                -magnitude
            }
        }
        WeightMode::Linear => {
            (diff * LINEAR_GAIN).clamp(-MAX_CONTINUOUS_ADJUSTMENT, MAX_CONTINUOUS_ADJUSTMENT)
        }
        WeightMode::Exponential => {
            let shaped = diff.signum() * diff.abs().powf(EXPONENTIAL_POWER) * EXPONENTIAL_GAIN;
            shaped.clamp(-MAX_CONTINUOUS_ADJUSTMENT, MAX_CONTINUOUS_ADJUSTMENT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_equal_confidence_keeps_base_weights() {
        let w = compute_weights(0.7, 0.7, &FusionConfig::default());
        assert!(approx(w.face, 0.45));
        assert!(approx(w.audio, 0.55));
    }

    #[test]
    fn test_threshold_bands() {
        let mode = WeightMode::Threshold;
        assert_eq!(weight_adjustment(0.05, mode), 0.0);
        assert_eq!(weight_adjustment(0.15, mode), 0.08);
        assert_eq!(weight_adjustment(-0.15, mode), -0.08);
        assert_eq!(weight_adjustment(0.30, mode), 0.15);
        assert_eq!(weight_adjustment(0.40, mode), 0.20);
        assert_eq!(weight_adjustment(-0.90, mode), -0.25);
    }

    #[test]
    fn test_confident_face_gains_weight() {
        let w = compute_weights(0.8, 0.6, &FusionConfig::default());
        assert!(approx(w.face, 0.60), "face weight {}", w.face);
        assert!(approx(w.audio, 0.40), "audio weight {}", w.audio);
    }

    #[test]
    fn test_large_gap_hits_weight_bounds() {
        let w = compute_weights(0.0, 1.0, &FusionConfig::default());
        assert!(approx(w.face, 0.25));
        assert!(approx(w.audio, 0.75));
    }

    #[test]
    fn test_linear_mode_is_capped() {
        assert!(approx(weight_adjustment(0.2, WeightMode::Linear), 0.06));
        assert!(approx(weight_adjustment(0.9, WeightMode::Linear), 0.15));
        assert!(approx(weight_adjustment(-0.9, WeightMode::Linear), -0.15));
    }

    #[test]
    fn test_exponential_mode() {
        let adj = weight_adjustment(0.25, WeightMode::Exponential);
        assert!(approx(adj, 0.125 * 0.2));
        assert!(approx(weight_adjustment(1.0, WeightMode::Exponential), 0.15));
        assert_eq!(weight_adjustment(0.0, WeightMode::Exponential), 0.0);
    }

    #[test]
    fn test_weights_are_deterministic() {
        let config = FusionConfig::default();
        let a = compute_weights(0.63, 0.41, &config);
        let b = compute_weights(0.63, 0.41, &config);
        assert_eq!(a.face.to_bits(), b.face.to_bits());
        assert_eq!(a.audio.to_bits(), b.audio.to_bits());
    }
}
