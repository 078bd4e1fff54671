//! Hot-swappable fusion parameters
//!
//! Two parameter groups can be read and patched while the engine runs:
//! - [`FusionConfig`]: channel weighting and single-shot combination rules
//! - [`TemporalConfig`]: history smoothing and emotion persistence
//!
//! Patches carry only the fields a caller wants to change. A patch is applied
//! to a copy of the active parameters and validated as a whole before the
//! copy replaces the original, so a rejected patch leaves nothing half-applied.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the confidence difference between channels shifts the weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Stepped bands on |diff|
    #[default]
    Threshold,
    /// Proportional to diff, capped
    Linear,
    /// Grows with |diff|^1.5, capped
    Exponential,
}

/// Weighting and combination parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub base_face_weight: f64,
    pub base_audio_weight: f64,
    pub weight_adjustment_mode: WeightMode,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Channels below this confidence are ignored by the combiner
    pub min_confidence: f64,
    pub boost_consensus: bool,
    pub consensus_boost: f64,
    pub penalize_conflict: bool,
    pub conflict_penalty: f64,
    pub suppress_neutral: bool,
    pub neutral_threshold: f64,
    pub neutral_min_gap: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            base_face_weight: 0.45,
            base_audio_weight: 0.55,
            weight_adjustment_mode: WeightMode::Threshold,
            min_weight: 0.25,
            max_weight: 0.75,
            min_confidence: 0.30,
            boost_consensus: true,
            consensus_boost: 1.15,
            penalize_conflict: true,
            conflict_penalty: 0.90,
            suppress_neutral: true,
            neutral_threshold: 0.60,
            neutral_min_gap: 0.15,
        }
    }
}

impl FusionConfig {
    /// Check every field; returns the first violation found
    pub fn validate(&self) -> Result<()> {
        unit_interval("base_face_weight", self.base_face_weight)?;
        unit_interval("base_audio_weight", self.base_audio_weight)?;
        if self.base_face_weight + self.base_audio_weight <= 0.0 {
            return Err(Error::InvalidInput(
                "base_face_weight + base_audio_weight must be positive".to_string(),
            ));
        }
        unit_interval("min_weight", self.min_weight)?;
        unit_interval("max_weight", self.max_weight)?;
        if self.min_weight > 0.5 || self.max_weight < 0.5 {
            return Err(Error::InvalidInput(format!(
                "weight bounds [{}, {}] must contain 0.5",
                self.min_weight, self.max_weight
            )));
        }
        unit_interval("min_confidence", self.min_confidence)?;
        positive("consensus_boost", self.consensus_boost)?;
        unit_interval("conflict_penalty", self.conflict_penalty)?;
        unit_interval("neutral_threshold", self.neutral_threshold)?;
        unit_interval("neutral_min_gap", self.neutral_min_gap)?;
        Ok(())
    }

    /// Apply `patch` to a copy and validate the result
    pub fn patched(&self, patch: &FusionConfigPatch) -> Result<Self> {
        let mut next = self.clone();
        merge(&mut next.base_face_weight, patch.base_face_weight);
        merge(&mut next.base_audio_weight, patch.base_audio_weight);
        merge(&mut next.weight_adjustment_mode, patch.weight_adjustment_mode);
        merge(&mut next.min_weight, patch.min_weight);
        merge(&mut next.max_weight, patch.max_weight);
        merge(&mut next.min_confidence, patch.min_confidence);
        merge(&mut next.boost_consensus, patch.boost_consensus);
        merge(&mut next.consensus_boost, patch.consensus_boost);
        merge(&mut next.penalize_conflict, patch.penalize_conflict);
        merge(&mut next.conflict_penalty, patch.conflict_penalty);
        merge(&mut next.suppress_neutral, patch.suppress_neutral);
        merge(&mut next.neutral_threshold, patch.neutral_threshold);
        merge(&mut next.neutral_min_gap, patch.neutral_min_gap);
        next.validate()?;
        Ok(next)
    }
}

/// Partial update for [`FusionConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FusionConfigPatch {
    pub base_face_weight: Option<f64>,
    pub base_audio_weight: Option<f64>,
    pub weight_adjustment_mode: Option<WeightMode>,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub min_confidence: Option<f64>,
    pub boost_consensus: Option<bool>,
    pub consensus_boost: Option<f64>,
    pub penalize_conflict: Option<bool>,
    pub conflict_penalty: Option<f64>,
    pub suppress_neutral: Option<bool>,
    pub neutral_threshold: Option<f64>,
    pub neutral_min_gap: Option<f64>,
}

/// Smoothing and persistence parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub enable_smoothing: bool,
    pub enable_persistence: bool,
    pub max_history_size: usize,
    pub min_history_for_smoothing: usize,
    pub strong_consistency_window: usize,
    pub consistency_boost: f64,
    pub strong_consistency_boost: f64,
    pub sudden_change_penalty: f64,
    pub outlier_penalty: f64,
    pub weak_outlier_reject: bool,
    /// Penalized outliers below this confidence are rejected
    pub weak_outlier_floor: f64,
    pub min_emotion_duration_sec: f64,
    pub allow_change_to_neutral: bool,
    pub min_confidence_for_change: f64,
    pub persistence: PersistenceConfig,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enable_smoothing: true,
            enable_persistence: true,
            max_history_size: 8,
            min_history_for_smoothing: 2,
            strong_consistency_window: 4,
            consistency_boost: 1.15,
            strong_consistency_boost: 1.25,
            sudden_change_penalty: 0.75,
            outlier_penalty: 0.50,
            weak_outlier_reject: true,
            weak_outlier_floor: 0.50,
            min_emotion_duration_sec: 1.5,
            allow_change_to_neutral: true,
            min_confidence_for_change: 0.42,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl TemporalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_history_size == 0 {
            return Err(Error::InvalidInput(
                "max_history_size must be at least 1".to_string(),
            ));
        }
        if self.min_history_for_smoothing == 0 {
            return Err(Error::InvalidInput(
                "min_history_for_smoothing must be at least 1".to_string(),
            ));
        }
        if self.strong_consistency_window < 2 {
            return Err(Error::InvalidInput(
                "strong_consistency_window must be at least 2".to_string(),
            ));
        }
        positive("consistency_boost", self.consistency_boost)?;
        positive("strong_consistency_boost", self.strong_consistency_boost)?;
        unit_interval("sudden_change_penalty", self.sudden_change_penalty)?;
        unit_interval("outlier_penalty", self.outlier_penalty)?;
        unit_interval("weak_outlier_floor", self.weak_outlier_floor)?;
        if !self.min_emotion_duration_sec.is_finite() || self.min_emotion_duration_sec < 0.0 {
            return Err(Error::InvalidInput(format!(
                "min_emotion_duration_sec must be a non-negative number, got {}",
                self.min_emotion_duration_sec
            )));
        }
        unit_interval("min_confidence_for_change", self.min_confidence_for_change)?;
        self.persistence.validate()
    }

    pub fn patched(&self, patch: &TemporalConfigPatch) -> Result<Self> {
        let mut next = self.clone();
        merge(&mut next.enable_smoothing, patch.enable_smoothing);
        merge(&mut next.enable_persistence, patch.enable_persistence);
        merge(&mut next.max_history_size, patch.max_history_size);
        merge(&mut next.min_history_for_smoothing, patch.min_history_for_smoothing);
        merge(&mut next.strong_consistency_window, patch.strong_consistency_window);
        merge(&mut next.consistency_boost, patch.consistency_boost);
        merge(&mut next.strong_consistency_boost, patch.strong_consistency_boost);
        merge(&mut next.sudden_change_penalty, patch.sudden_change_penalty);
        merge(&mut next.outlier_penalty, patch.outlier_penalty);
        merge(&mut next.weak_outlier_reject, patch.weak_outlier_reject);
        merge(&mut next.weak_outlier_floor, patch.weak_outlier_floor);
        merge(&mut next.min_emotion_duration_sec, patch.min_emotion_duration_sec);
        merge(&mut next.allow_change_to_neutral, patch.allow_change_to_neutral);
        merge(&mut next.min_confidence_for_change, patch.min_confidence_for_change);
        if let Some(p) = &patch.persistence {
            merge(&mut next.persistence.strong_threshold, p.strong_threshold);
            merge(&mut next.persistence.weak_threshold, p.weak_threshold);
            merge(&mut next.persistence.decay_rate, p.decay_rate);
            merge(&mut next.persistence.min_persistence, p.min_persistence);
        }
        next.validate()?;
        Ok(next)
    }
}

/// Thresholds for bridging weak readings with the last strong one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub strong_threshold: f64,
    pub weak_threshold: f64,
    pub decay_rate: f64,
    pub min_persistence: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 0.70,
            weak_threshold: 0.40,
            decay_rate: 0.97,
            min_persistence: 0.35,
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("persistence.strong_threshold", self.strong_threshold)?;
        unit_interval("persistence.weak_threshold", self.weak_threshold)?;
        unit_interval("persistence.decay_rate", self.decay_rate)?;
        unit_interval("persistence.min_persistence", self.min_persistence)?;
        if self.weak_threshold > self.strong_threshold {
            return Err(Error::InvalidInput(format!(
                "persistence.weak_threshold ({}) exceeds strong_threshold ({})",
                self.weak_threshold, self.strong_threshold
            )));
        }
        Ok(())
    }
}

/// Partial update for [`TemporalConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemporalConfigPatch {
    pub enable_smoothing: Option<bool>,
    pub enable_persistence: Option<bool>,
    pub max_history_size: Option<usize>,
    pub min_history_for_smoothing: Option<usize>,
    pub strong_consistency_window: Option<usize>,
    pub consistency_boost: Option<f64>,
    pub strong_consistency_boost: Option<f64>,
    pub sudden_change_penalty: Option<f64>,
    pub outlier_penalty: Option<f64>,
    pub weak_outlier_reject: Option<bool>,
    pub weak_outlier_floor: Option<f64>,
    pub min_emotion_duration_sec: Option<f64>,
    pub allow_change_to_neutral: Option<bool>,
    pub min_confidence_for_change: Option<f64>,
    pub persistence: Option<PersistenceConfigPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfigPatch {
    pub strong_threshold: Option<f64>,
    pub weak_threshold: Option<f64>,
    pub decay_rate: Option<f64>,
    pub min_persistence: Option<f64>,
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}
