//! History-based temporal smoothing
//!
//! Each raw result is judged against the room's recent decisions. Rules are
//! checked in precedence order and the first match wins:
//!
//! 1. Too little history: pass through
//! 2. Emotion changed too soon after the last decision: reject
//! 3. Emotion changed with too little confidence: reject
//! 4. Same emotion across the strong-consistency window: large boost
//! 5. Same emotion as the last two decisions: boost
//! 6. Differs from each of the last three decisions: heavy penalty, reject if weak
//! 7. Emotion changed: penalty
//!
//! A rejection re-emits the last accepted decision. Only accepted results
//! enter the history, so every gate measures against the last accepted one.

use emofuse_common::params::TemporalConfig;
use emofuse_common::time::secs_f64_to_duration;
use emofuse_common::{FusionResult, TemporalAdjustment};
use std::collections::VecDeque;
use tokio::time::Instant;

const CONSISTENCY_WINDOW: usize = 2;
const OUTLIER_WINDOW: usize = 3;

/// Bounded record of accepted decisions, oldest first
#[derive(Debug, Clone, Default)]
pub struct FusionHistory {
    entries: VecDeque<FusionResult>,
}

impl FusionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&FusionResult> {
        self.entries.back()
    }

    /// Append, evicting the oldest entries beyond `max_len`
    pub fn push(&mut self, result: FusionResult, max_len: usize) {
        self.entries.push_back(result);
        while self.entries.len() > max_len.max(1) {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_vec(&self) -> Vec<FusionResult> {
        self.entries.iter().cloned().collect()
    }

    /// The newest `n` entries, or `None` when fewer exist
    fn newest(&self, n: usize) -> Option<impl Iterator<Item = &FusionResult>> {
        if self.entries.len() < n {
            return None;
        }
        Some(self.entries.iter().skip(self.entries.len() - n))
    }
}

/// Result of one smoothing step
#[derive(Debug, Clone)]
pub struct Smoothed {
    pub result: FusionResult,
    /// Short diagnostic label for logs
    pub reason: &'static str,
    /// Whether the result was appended to the history
    pub recorded: bool,
}

/// Apply the smoothing rules to `raw`, updating `history` on acceptance
pub fn smooth(
    raw: FusionResult,
    history: &mut FusionHistory,
    config: &TemporalConfig,
    now: Instant,
) -> Smoothed {
    if !config.enable_smoothing {
        return Smoothed {
            result: raw.with_adjustment(TemporalAdjustment::None),
            reason: "smoothing_disabled",
            recorded: false,
        };
    }

    let last = match history.last() {
        Some(last) if history.len() >= config.min_history_for_smoothing => last.clone(),
        _ => {
            let result = raw.with_adjustment(TemporalAdjustment::None);
            history.push(result.clone(), config.max_history_size);
            return Smoothed {
                result,
                reason: "insufficient_history",
                recorded: true,
            };
        }
    };

    let emotion = raw.emotion;
    let changed = emotion != last.emotion;

    if changed {
        let since_last = now.saturating_duration_since(last.decided_at());
        let min_duration = secs_f64_to_duration(config.min_emotion_duration_sec);
        let neutral_exempt = config.allow_change_to_neutral && emotion.is_neutral();
        if since_last < min_duration && !neutral_exempt {
            return reject(last, TemporalAdjustment::RejectedChangeTooFast, "change_too_fast");
        }
        if raw.confidence < config.min_confidence_for_change {
            return reject(
                last,
                TemporalAdjustment::RejectedLowConfidence,
                "low_confidence_for_change",
            );
        }
    }

    let all_match = |n: usize| {
        history
            .newest(n)
            .map(|mut it| it.all(|r| r.emotion == emotion))
            .unwrap_or(false)
    };
    let none_match = |n: usize| {
        history
            .newest(n)
            .map(|mut it| it.all(|r| r.emotion != emotion))
            .unwrap_or(false)
    };

    let confidence = raw.confidence;
    let (result, reason) = if all_match(config.strong_consistency_window) {
        (
            raw.with_confidence(confidence * config.strong_consistency_boost)
                .with_adjustment(TemporalAdjustment::StrongConsistencyBoost),
            "strong_consistency",
        )
    } else if all_match(CONSISTENCY_WINDOW) {
        (
            raw.with_confidence(confidence * config.consistency_boost)
                .with_adjustment(TemporalAdjustment::ConsistencyBoost),
            "consistency",
        )
    } else if none_match(OUTLIER_WINDOW) {
        let penalized = confidence * config.outlier_penalty;
        if config.weak_outlier_reject && penalized < config.weak_outlier_floor {
            return reject(last, TemporalAdjustment::RejectedWeakOutlier, "weak_outlier");
        }
        (
            raw.with_confidence(penalized)
                .with_adjustment(TemporalAdjustment::OutlierPenalty),
            "outlier",
        )
    } else if changed {
        (
            raw.with_confidence(confidence * config.sudden_change_penalty)
                .with_adjustment(TemporalAdjustment::SuddenChange),
            "sudden_change",
        )
    } else {
        (
            raw.with_adjustment(TemporalAdjustment::None),
            "normal_progression",
        )
    };

    history.push(result.clone(), config.max_history_size);
    Smoothed {
        result,
        reason,
        recorded: true,
    }
}

fn reject(last: FusionResult, tag: TemporalAdjustment, reason: &'static str) -> Smoothed {
    Smoothed {
        result: last.with_adjustment(tag),
        reason,
        recorded: false,
    }
}
