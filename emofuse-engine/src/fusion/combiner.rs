//! Single-shot decision combiner
//!
//! Turns the latest face and audio observations into one raw fusion result:
//! - Both channels too weak: neutral fallback
//! - One usable channel: that channel verbatim
//! - Agreement: weighted confidence, optionally boosted
//! - Disagreement: weighted per-category scores, argmax, optional penalty,
//!   with neutral suppressed unless it wins clearly

use super::observation::Observation;
use super::weights::compute_weights;
use emofuse_common::params::FusionConfig;
use emofuse_common::{Category, Error, FusionResult, Result, ScoreVector, Strategy, Weights};
use tokio::time::Instant;

/// Raw combiner output plus intermediate values kept for diagnostics
#[derive(Debug, Clone)]
pub struct Combination {
    pub result: FusionResult,
    pub detail: CombinationDetail,
}

#[derive(Debug, Clone, Default)]
pub struct CombinationDetail {
    /// Weighted per-category scores (conflict path only)
    pub fused_scores: Option<ScoreVector>,
    /// Confidence before consensus boost or conflict penalty
    pub unadjusted_confidence: Option<f64>,
    /// Neutral won the argmax but was replaced
    pub neutral_suppressed: bool,
}

/// Combine the available observations into a raw result
///
/// Fails only on non-finite intermediate values; callers degrade such a
/// failure to the neutral fallback.
pub fn combine(
    face: Option<&Observation>,
    audio: Option<&Observation>,
    config: &FusionConfig,
    decided_at: Instant,
) -> Result<Combination> {
    let face = face.filter(|o| o.confidence >= config.min_confidence);
    let audio = audio.filter(|o| o.confidence >= config.min_confidence);

    let combination = match (face, audio) {
        (None, None) => Combination {
            result: FusionResult::fallback_neutral(decided_at),
            detail: CombinationDetail::default(),
        },
        (Some(face), None) => single_channel(face, Strategy::FaceOnly, Weights::FACE_ONLY, decided_at),
        (None, Some(audio)) => {
            single_channel(audio, Strategy::AudioOnly, Weights::AUDIO_ONLY, decided_at)
        }
        (Some(face), Some(audio)) if face.label == audio.label => {
            consensus(face, audio, config, decided_at)?
        }
        (Some(face), Some(audio)) => conflict(face, audio, config, decided_at)?,
    };
    Ok(combination)
}

fn single_channel(
    obs: &Observation,
    strategy: Strategy,
    weights: Weights,
    decided_at: Instant,
) -> Combination {
    Combination {
        result: FusionResult::new(obs.label, obs.confidence, strategy, weights, decided_at),
        detail: CombinationDetail::default(),
    }
}

fn consensus(
    face: &Observation,
    audio: &Observation,
    config: &FusionConfig,
    decided_at: Instant,
) -> Result<Combination> {
    let weights = checked_weights(face, audio, config)?;
    let weighted = weights.face * face.confidence + weights.audio * audio.confidence;
    let confidence = if config.boost_consensus {
        (weighted * config.consensus_boost).min(1.0)
    } else {
        weighted
    };
    ensure_finite("consensus confidence", confidence)?;

    Ok(Combination {
        result: FusionResult::new(
            face.label,
            confidence,
            Strategy::ConsensusWeighted,
            weights,
            decided_at,
        ),
        detail: CombinationDetail {
            fused_scores: None,
            unadjusted_confidence: Some(weighted),
            neutral_suppressed: false,
        },
    })
}

fn conflict(
    face: &Observation,
    audio: &Observation,
    config: &FusionConfig,
    decided_at: Instant,
) -> Result<Combination> {
    let weights = checked_weights(face, audio, config)?;
    let fused = ScoreVector::blend(&face.scores(), weights.face, &audio.scores(), weights.audio);
    if !fused.is_finite() {
        return Err(Error::Internal("non-finite fused scores".to_string()));
    }

    let (mut winner, mut score) = fused.argmax();
    let mut neutral_suppressed = false;
    if config.suppress_neutral && winner.is_neutral() {
        let (runner_up, runner_up_score) = fused.best_excluding(Category::Neutral);
        let weak = score < config.neutral_threshold;
        let narrow = score - runner_up_score < config.neutral_min_gap;
        if weak || narrow {
            winner = runner_up;
            score = runner_up_score;
            neutral_suppressed = true;
        }
    }

    let confidence = if config.penalize_conflict {
        score * config.conflict_penalty
    } else {
        score
    };
    ensure_finite("conflict confidence", confidence)?;

    Ok(Combination {
        result: FusionResult::new(
            winner,
            confidence,
            Strategy::WeightedFusion,
            weights,
            decided_at,
        ),
        detail: CombinationDetail {
            fused_scores: Some(fused),
            unadjusted_confidence: Some(score),
            neutral_suppressed,
        },
    })
}

fn checked_weights(
    face: &Observation,
    audio: &Observation,
    config: &FusionConfig,
) -> Result<Weights> {
    let weights = compute_weights(face.confidence, audio.confidence, config);
    ensure_finite("face weight", weights.face)?;
    ensure_finite("audio weight", weights.audio)?;
    Ok(weights)
}

fn ensure_finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::Internal(format!("{} is not finite", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emofuse_common::Channel;

    fn obs(channel: Channel, label: Category, confidence: f64) -> Observation {
        Observation::new(channel, label, confidence, None, Instant::now())
    }

    fn run(face: Option<Observation>, audio: Option<Observation>) -> Combination {
        combine(
            face.as_ref(),
            audio.as_ref(),
            &FusionConfig::default(),
            Instant::now(),
        )
        .expect("finite inputs")
    }

    #[test]
    fn test_both_weak_falls_back_to_neutral() {
        let out = run(
            Some(obs(Channel::Face, Category::Happy, 0.2)),
            Some(obs(Channel::Audio, Category::Sad, 0.1)),
        );
        assert_eq!(out.result.emotion, Category::Neutral);
        assert_eq!(out.result.confidence, 0.5);
        assert_eq!(out.result.strategy, Strategy::FallbackNeutral);
        assert_eq!(out.result.weights, Weights::NONE);
    }

    #[test]
    fn test_nothing_available_falls_back_to_neutral() {
        let out = run(None, None);
        assert_eq!(out.result.strategy, Strategy::FallbackNeutral);
    }

    #[test]
    fn test_single_valid_channel_passes_through() {
        let out = run(
            Some(obs(Channel::Face, Category::Angry, 0.72)),
            Some(obs(Channel::Audio, Category::Sad, 0.1)),
        );
        assert_eq!(out.result.emotion, Category::Angry);
        assert_eq!(out.result.confidence, 0.72);
        assert_eq!(out.result.strategy, Strategy::FaceOnly);
        assert_eq!(out.result.weights, Weights::FACE_ONLY);

        let out = run(None, Some(obs(Channel::Audio, Category::Fearful, 0.31)));
        assert_eq!(out.result.strategy, Strategy::AudioOnly);
        assert_eq!(out.result.weights, Weights::AUDIO_ONLY);
    }

    #[test]
    fn test_consensus_boost() {
        let out = run(
            Some(obs(Channel::Face, Category::Happy, 0.80)),
            Some(obs(Channel::Audio, Category::Happy, 0.60)),
        );
        assert_eq!(out.result.emotion, Category::Happy);
        assert_eq!(out.result.strategy, Strategy::ConsensusWeighted);
        assert!((out.result.weights.face - 0.60).abs() < 1e-9);
        assert!((out.result.weights.audio - 0.40).abs() < 1e-9);
        assert!((out.result.confidence - 0.828).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_boost_caps_at_one() {
        let out = run(
            Some(obs(Channel::Face, Category::Sad, 0.95)),
            Some(obs(Channel::Audio, Category::Sad, 0.95)),
        );
        assert_eq!(out.result.confidence, 1.0);
    }

    #[test]
    fn test_neutral_suppressed_in_conflict() {
        let out = run(
            Some(obs(Channel::Face, Category::Neutral, 0.65)),
            Some(obs(Channel::Audio, Category::Sad, 0.55)),
        );
        assert_eq!(out.result.emotion, Category::Sad);
        assert_eq!(out.result.strategy, Strategy::WeightedFusion);
        assert!(out.detail.neutral_suppressed);
        let fused = out.detail.fused_scores.expect("conflict keeps scores");
        assert!((fused.get(Category::Neutral) - 0.37975).abs() < 1e-9);
        let expected = fused.get(Category::Sad) * 0.90;
        assert!((out.result.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_clear_neutral_survives_suppression() {
        let mut config = FusionConfig::default();
        config.penalize_conflict = false;
        let face = obs(Channel::Face, Category::Neutral, 0.95);
        let audio = obs(Channel::Audio, Category::Happy, 0.35);
        let out = combine(Some(&face), Some(&audio), &config, Instant::now()).expect("finite");
        assert_eq!(out.result.emotion, Category::Neutral);
        assert!(!out.detail.neutral_suppressed);
    }

    #[test]
    fn test_conflict_uses_supplied_distributions() {
        let face = Observation::new(
            Channel::Face,
            Category::Happy,
            0.5,
            ScoreVector::from_labeled([("happy", 0.5), ("surprise", 0.45), ("sad", 0.05)]),
            Instant::now(),
        );
        let audio = Observation::new(
            Channel::Audio,
            Category::Angry,
            0.5,
            ScoreVector::from_labeled([("angry", 0.5), ("surprised", 0.5)]),
            Instant::now(),
        );
        let out = combine(Some(&face), Some(&audio), &FusionConfig::default(), Instant::now())
            .expect("finite");
        assert_eq!(out.result.emotion, Category::Surprised);
    }
}
