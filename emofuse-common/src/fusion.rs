//! Fusion result model shared between the engine and its consumers

use crate::emotion::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Source of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Face,
    Audio,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Face, Channel::Audio];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Face => "face",
            Channel::Audio => "audio",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which channels currently hold fresh enough data to fuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPlan {
    Both,
    FaceOnly,
    AudioOnly,
    None,
}

impl FusionPlan {
    pub fn includes(self, channel: Channel) -> bool {
        matches!(
            (self, channel),
            (FusionPlan::Both, _)
                | (FusionPlan::FaceOnly, Channel::Face)
                | (FusionPlan::AudioOnly, Channel::Audio)
        )
    }
}

/// Per-channel weight pair applied by the combiner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub face: f64,
    pub audio: f64,
}

impl Weights {
    pub const NONE: Weights = Weights { face: 0.0, audio: 0.0 };
    pub const FACE_ONLY: Weights = Weights { face: 1.0, audio: 0.0 };
    pub const AUDIO_ONLY: Weights = Weights { face: 0.0, audio: 1.0 };
}

/// How the combiner reached its decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ConsensusWeighted,
    WeightedFusion,
    FaceOnly,
    AudioOnly,
    FallbackNeutral,
}

/// What the temporal smoother did to a raw result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalAdjustment {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "strong_consistency_boost")]
    StrongConsistencyBoost,
    #[serde(rename = "consistency_boost")]
    ConsistencyBoost,
    #[serde(rename = "outlier_penalty")]
    OutlierPenalty,
    #[serde(rename = "sudden_change")]
    SuddenChange,
    #[serde(rename = "rejected/change_too_fast")]
    RejectedChangeTooFast,
    #[serde(rename = "rejected/low_confidence_for_change")]
    RejectedLowConfidence,
    #[serde(rename = "rejected/weak_outlier")]
    RejectedWeakOutlier,
}

impl TemporalAdjustment {
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            TemporalAdjustment::RejectedChangeTooFast
                | TemporalAdjustment::RejectedLowConfidence
                | TemporalAdjustment::RejectedWeakOutlier
        )
    }
}

/// One fused emotion decision for a room
///
/// `decided_at` is the monotonic instant of the decision and is used by the
/// duration gate; `timestamp` is its wall-clock rendering for consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionResult {
    pub emotion: Category,
    pub confidence: f64,
    pub strategy: Strategy,
    pub weights: Weights,
    pub temporal_adjustment: TemporalAdjustment,
    pub persistence_used: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    decided_at: Instant,
}

impl FusionResult {
    /// Create an untagged result decided at `decided_at`
    pub fn new(
        emotion: Category,
        confidence: f64,
        strategy: Strategy,
        weights: Weights,
        decided_at: Instant,
    ) -> Self {
        Self {
            emotion,
            confidence: confidence.clamp(0.0, 1.0),
            strategy,
            weights,
            temporal_adjustment: TemporalAdjustment::None,
            persistence_used: false,
            timestamp: crate::time::now(),
            decided_at,
        }
    }

    /// Neutral at 0.5 with zero weights; the answer when nothing usable exists
    pub fn fallback_neutral(decided_at: Instant) -> Self {
        Self::new(
            Category::Neutral,
            0.5,
            Strategy::FallbackNeutral,
            Weights::NONE,
            decided_at,
        )
    }

    pub fn decided_at(&self) -> Instant {
        self.decided_at
    }

    /// Replace the confidence, keeping it inside [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_adjustment(mut self, adjustment: TemporalAdjustment) -> Self {
        self.temporal_adjustment = adjustment;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_includes_channels() {
        assert!(FusionPlan::Both.includes(Channel::Face));
        assert!(FusionPlan::Both.includes(Channel::Audio));
        assert!(FusionPlan::FaceOnly.includes(Channel::Face));
        assert!(!FusionPlan::FaceOnly.includes(Channel::Audio));
        assert!(!FusionPlan::None.includes(Channel::Audio));
    }

    #[test]
    fn test_result_wire_format() {
        let result = FusionResult::new(
            Category::Happy,
            0.8,
            Strategy::ConsensusWeighted,
            Weights { face: 0.6, audio: 0.4 },
            Instant::now(),
        )
        .with_adjustment(TemporalAdjustment::RejectedChangeTooFast);

        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["strategy"], "consensus_weighted");
        assert_eq!(json["temporal_adjustment"], "rejected/change_too_fast");
        assert_eq!(json["persistence_used"], false);
        assert_eq!(json["weights"]["face"], 0.6);
        assert!(json["timestamp"].is_string());
        assert!(json.get("decided_at").is_none());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = FusionResult::fallback_neutral(Instant::now()).with_confidence(1.7);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.with_confidence(-0.2).confidence, 0.0);
    }

    #[test]
    fn test_rejection_tags() {
        assert!(TemporalAdjustment::RejectedWeakOutlier.is_rejection());
        assert!(!TemporalAdjustment::OutlierPenalty.is_rejection());
    }
}
