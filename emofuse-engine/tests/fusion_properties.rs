//! Property tests for the pure fusion stages

use emofuse_common::params::{FusionConfig, PersistenceConfig, TemporalConfig, WeightMode};
use emofuse_common::{Category, Channel};
use emofuse_engine::fusion::{combine, compute_weights, smooth, FusionHistory, Observation, PersistenceTracker};
use proptest::prelude::*;
use tokio::time::Instant;

fn mode() -> impl Strategy<Value = WeightMode> {
    prop_oneof![
        Just(WeightMode::Threshold),
        Just(WeightMode::Linear),
        Just(WeightMode::Exponential),
    ]
}

fn category() -> impl Strategy<Value = Category> {
    (0..Category::COUNT).prop_map(|i| Category::ALL[i])
}

proptest! {
    #[test]
    fn weights_sum_to_one_within_bounds(
        face in 0.0f64..=1.0,
        audio in 0.0f64..=1.0,
        mode in mode()
    ) {
        let config = FusionConfig { weight_adjustment_mode: mode, ..Default::default() };
        let w = compute_weights(face, audio, &config);
        prop_assert!((w.face + w.audio - 1.0).abs() < 1e-6);
        prop_assert!(w.face >= config.min_weight - 1e-9 && w.face <= config.max_weight + 1e-9);
        prop_assert!(w.audio >= config.min_weight - 1e-9 && w.audio <= config.max_weight + 1e-9);
    }

    #[test]
    fn more_confident_face_never_loses_weight(
        face in 0.0f64..=1.0,
        audio in 0.0f64..=1.0,
        mode in mode()
    ) {
        prop_assume!(face > audio);
        let config = FusionConfig { weight_adjustment_mode: mode, ..Default::default() };
        let w = compute_weights(face, audio, &config);
        prop_assert!(w.face >= config.base_face_weight - 1e-9);
    }

    #[test]
    fn combined_confidence_stays_in_unit_interval(
        face_label in category(),
        face_conf in 0.0f64..=1.0,
        audio_label in category(),
        audio_conf in 0.0f64..=1.0
    ) {
        let now = Instant::now();
        let face = Observation::new(Channel::Face, face_label, face_conf, None, now);
        let audio = Observation::new(Channel::Audio, audio_label, audio_conf, None, now);
        let out = combine(Some(&face), Some(&audio), &FusionConfig::default(), now)
            .expect("finite inputs combine");
        prop_assert!((0.0..=1.0).contains(&out.result.confidence));
        let w = out.result.weights;
        prop_assert!(w.face + w.audio == 0.0 || (w.face + w.audio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn history_never_exceeds_capacity(
        labels in proptest::collection::vec((category(), 0.3f64..=1.0), 1..40)
    ) {
        let config = TemporalConfig::default();
        let mut history = FusionHistory::new();
        let now = Instant::now();
        for (label, conf) in labels {
            let face = Observation::new(Channel::Face, label, conf, None, now);
            let raw = combine(Some(&face), None, &FusionConfig::default(), now)
                .expect("finite inputs combine")
                .result;
            let smoothed = smooth(raw, &mut history, &config, now);
            prop_assert!((0.0..=1.0).contains(&smoothed.result.confidence));
            prop_assert!(history.len() <= config.max_history_size);
        }
    }

    #[test]
    fn persisted_confidence_respects_floor(
        readings in proptest::collection::vec((category(), 0.0f64..=1.0), 1..60)
    ) {
        let config = PersistenceConfig::default();
        let now = Instant::now();
        let mut tracker = PersistenceTracker::new(now);
        for (label, conf) in readings {
            let out = tracker.update(label, conf, &config, now);
            if out.used {
                prop_assert!(out.confidence >= config.min_persistence);
                prop_assert!(conf < config.weak_threshold);
            } else {
                prop_assert_eq!(out.emotion, label);
            }
        }
    }
}
