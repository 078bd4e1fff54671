//! Classifier observations as held by the store

use emofuse_common::time::duration_to_millis;
use emofuse_common::{Category, Channel, ScoreVector};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// One classifier output for one channel
///
/// Confidence is always within [0, 1]; an attached distribution always sums
/// to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub channel: Channel,
    pub label: Category,
    pub confidence: f64,
    pub distribution: Option<ScoreVector>,
    pub received_at: Instant,
}

impl Observation {
    pub fn new(
        channel: Channel,
        label: Category,
        confidence: f64,
        distribution: Option<ScoreVector>,
        received_at: Instant,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            channel,
            label,
            confidence,
            distribution: distribution.and_then(ScoreVector::normalized),
            received_at,
        }
    }

    /// Per-category scores, synthesized from the label when none were given
    pub fn scores(&self) -> ScoreVector {
        self.distribution
            .unwrap_or_else(|| ScoreVector::synthesize(self.label, self.confidence))
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }

    pub fn snapshot(&self, now: Instant) -> ObservationSnapshot {
        ObservationSnapshot {
            channel: self.channel,
            emotion: self.label,
            confidence: self.confidence,
            distribution: self.distribution,
            age_ms: duration_to_millis(self.age(now)),
        }
    }
}

/// Read-only view of a buffered observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSnapshot {
    pub channel: Channel,
    pub emotion: Category,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<ScoreVector>,
    pub age_ms: u64,
}
