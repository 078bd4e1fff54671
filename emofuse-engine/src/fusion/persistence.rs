//! Emotion persistence across weak readings
//!
//! A strong reading is remembered. While later readings stay weak, the
//! remembered emotion is re-emitted with a geometrically decaying confidence
//! until it falls below the persistence floor.

use emofuse_common::params::PersistenceConfig;
use emofuse_common::time::duration_to_millis;
use emofuse_common::Category;
use serde::Serialize;
use tokio::time::Instant;

/// Per-room memory of the last strong reading
#[derive(Debug, Clone)]
pub struct PersistenceTracker {
    last_strong_emotion: Category,
    last_strong_confidence: f64,
    last_strong_at: Instant,
}

/// Emotion and confidence after persistence, and whether it bridged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Persisted {
    pub emotion: Category,
    pub confidence: f64,
    pub used: bool,
}

impl PersistenceTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            last_strong_emotion: Category::Neutral,
            last_strong_confidence: 0.5,
            last_strong_at: now,
        }
    }

    pub fn update(
        &mut self,
        emotion: Category,
        confidence: f64,
        config: &PersistenceConfig,
        now: Instant,
    ) -> Persisted {
        if confidence >= config.strong_threshold {
            self.last_strong_emotion = emotion;
            self.last_strong_confidence = confidence;
            self.last_strong_at = now;
            return Persisted {
                emotion,
                confidence,
                used: false,
            };
        }

        if confidence < config.weak_threshold {
            let decayed = self.last_strong_confidence * config.decay_rate;
            if decayed >= config.min_persistence {
                self.last_strong_confidence = decayed;
                return Persisted {
                    emotion: self.last_strong_emotion,
                    confidence: decayed,
                    used: true,
                };
            }
        }

        Persisted {
            emotion,
            confidence,
            used: false,
        }
    }

    pub fn snapshot(&self, now: Instant) -> PersistenceSnapshot {
        PersistenceSnapshot {
            last_strong_emotion: self.last_strong_emotion,
            last_strong_confidence: self.last_strong_confidence,
            age_ms: duration_to_millis(now.saturating_duration_since(self.last_strong_at)),
        }
    }
}

/// Read-only view of a room's persistence memory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceSnapshot {
    pub last_strong_emotion: Category,
    pub last_strong_confidence: f64,
    pub age_ms: u64,
}
