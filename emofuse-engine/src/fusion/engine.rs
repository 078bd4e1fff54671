//! Fusion engine
//!
//! Owns the room registry, the observation store, the hot-swappable
//! parameters and the result notifier, and composes the fusion pipeline:
//!
//! ```text
//! plan -> latest observations -> weights + combine -> smooth -> persist -> publish
//! ```
//!
//! One fusion runs entirely under its room's mutex. Parameters are read as an
//! `Arc` snapshot taken when the fusion starts, so a concurrent update applies
//! from the next fusion on. Publishing happens after the room lock is
//! released and never blocks.

use super::combiner::combine;
use super::observation::{Observation, ObservationSnapshot};
use super::persistence::PersistenceSnapshot;
use super::room::{RoomRegistry, RoomState};
use super::smoother::smooth;
use super::store::{ObservationStore, PlanReport, SweepReport, TimeoutStats};
use crate::notify::{NotifierStats, ResultNotifier, Subscription};
use emofuse_common::config::{NotifyConfig, StoreConfig, TomlConfig, TriggerPolicy};
use emofuse_common::events::{ConfigScope, FusionEvent};
use emofuse_common::params::{FusionConfig, FusionConfigPatch, TemporalConfig, TemporalConfigPatch};
use emofuse_common::time::{duration_to_millis, now as wall_clock};
use emofuse_common::{Category, Channel, Error, FusionPlan, FusionResult, Result, ScoreVector};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Everything needed to build an engine
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub fusion: FusionConfig,
    pub temporal: TemporalConfig,
}

impl From<&TomlConfig> for EngineSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            store: config.store.clone(),
            notify: config.notify.clone(),
            fusion: config.fusion.clone(),
            temporal: config.temporal.clone(),
        }
    }
}

/// Outcome of submitting one observation
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub room: String,
    pub channel: Channel,
    /// Canonical category the label normalized to
    pub emotion: Category,
    /// Confidence after clamping
    pub confidence: f64,
    /// Present when the trigger policy ran a fusion
    pub fusion: Option<FusionResult>,
}

/// Accepted decisions of a room, newest last
#[derive(Debug, Clone, Serialize)]
pub struct RoomHistory {
    pub room: String,
    pub entries: Vec<FusionResult>,
    pub persistence: Option<PersistenceSnapshot>,
}

/// Buffer and decision counters of one room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomStats {
    pub room: String,
    pub face_count: usize,
    pub audio_count: usize,
    pub has_both: bool,
    pub face_latest_age_ms: Option<u64>,
    pub audio_latest_age_ms: Option<u64>,
    pub timeout_threshold_ms: u64,
    pub max_age_ms: u64,
    pub timeout_stats: TimeoutStats,
    pub history_size: usize,
    pub fusions: u64,
    pub rejections: u64,
}

/// Engine-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total_rooms: usize,
    pub rooms: Vec<String>,
    pub global_timeout_stats: TimeoutStats,
    pub total_fusions: u64,
    pub total_rejections: u64,
    pub subscribers: NotifierStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineStats {
    Room(RoomStats),
    Global(GlobalStats),
}

/// Confidence-weighted temporal fusion over independent rooms
pub struct FusionEngine {
    rooms: Arc<RoomRegistry>,
    store: ObservationStore,
    trigger_policy: TriggerPolicy,
    fusion_config: RwLock<Arc<FusionConfig>>,
    temporal_config: RwLock<Arc<TemporalConfig>>,
    notifier: ResultNotifier,
}

impl FusionEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let rooms = Arc::new(RoomRegistry::new());
        Self {
            store: ObservationStore::new(Arc::clone(&rooms), settings.store.clone()),
            rooms,
            trigger_policy: settings.store.trigger_policy,
            fusion_config: RwLock::new(Arc::new(settings.fusion)),
            temporal_config: RwLock::new(Arc::new(settings.temporal)),
            notifier: ResultNotifier::new(&settings.notify),
        }
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn notifier(&self) -> &ResultNotifier {
        &self.notifier
    }

    // ========================================================================
    // Observations
    // ========================================================================

    /// Normalize and buffer a classifier output, fusing per the trigger policy
    ///
    /// Unknown labels become neutral and out-of-range confidences are
    /// clamped; only an empty room id is refused.
    pub async fn submit_observation(
        &self,
        room: &str,
        channel: Channel,
        label: &str,
        confidence: f64,
        distribution: Option<HashMap<String, f64>>,
    ) -> Result<Submission> {
        let room = room.trim();
        if room.is_empty() {
            return Err(Error::InvalidInput("room id must not be empty".to_string()));
        }

        let emotion = Category::lookup(label).unwrap_or_else(|| {
            debug!("Unrecognized label '{}' mapped to neutral", label);
            Category::Neutral
        });
        let confidence = sanitize_confidence(room, channel, confidence);
        let distribution = distribution.and_then(|scores| {
            let normalized = ScoreVector::from_labeled(scores);
            if normalized.is_none() {
                warn!(
                    "Room {}: discarded {} distribution without positive mass",
                    room, channel
                );
            }
            normalized
        });

        let obs = Observation::new(channel, emotion, confidence, distribution, Instant::now());
        self.store.add(room, obs).await;
        debug!(
            "Room {}: buffered {} observation {} ({:.2})",
            room, channel, emotion, confidence
        );
        self.notifier.publish(FusionEvent::ObservationReceived {
            room: room.to_string(),
            channel,
            emotion,
            confidence,
            timestamp: wall_clock(),
        });

        let fusion = if self.triggers_fusion(channel) {
            Some(self.fuse(room).await)
        } else {
            None
        };

        Ok(Submission {
            room: room.to_string(),
            channel,
            emotion,
            confidence,
            fusion,
        })
    }

    fn triggers_fusion(&self, channel: Channel) -> bool {
        match self.trigger_policy {
            TriggerPolicy::AudioArrival => channel == Channel::Audio,
            TriggerPolicy::AnyArrival => true,
            TriggerPolicy::Manual => false,
        }
    }

    /// Newest fresh observation of a channel
    pub async fn latest(&self, room: &str, channel: Channel) -> Option<ObservationSnapshot> {
        self.store.latest(room, channel).await
    }

    /// Which channels a fusion would use right now
    pub async fn fusion_strategy(&self, room: &str) -> PlanReport {
        self.store.fusion_strategy(room).await
    }

    /// Drop observations older than `max_age` across all rooms
    pub async fn gc_sweep(&self, max_age: Duration) -> SweepReport {
        self.store.gc_sweep(max_age).await
    }

    // ========================================================================
    // Fusion
    // ========================================================================

    /// Fuse the room's freshest observations into one decision
    ///
    /// Never fails: with nothing fresh to fuse, or on an internal
    /// inconsistency, the result is the neutral fallback.
    pub async fn fuse(&self, room: &str) -> FusionResult {
        let fusion_config = self.fusion_snapshot().await;
        let temporal_config = self.temporal_snapshot().await;
        let result = {
            let mut state = self.rooms.lock_or_create(room).await;
            self.fuse_locked(room, &mut state, &fusion_config, &temporal_config)
        };

        self.notifier.publish(FusionEvent::FusionCompleted {
            room: room.to_string(),
            result: result.clone(),
        });
        result
    }

    fn fuse_locked(
        &self,
        room: &str,
        state: &mut RoomState,
        fusion_config: &FusionConfig,
        temporal_config: &TemporalConfig,
    ) -> FusionResult {
        let now = Instant::now();
        let window = self.store.config().freshness_window();
        let plan = state.buffer.plan(window, now);

        if plan.plan == FusionPlan::None {
            debug!("Room {}: nothing fresh to fuse ({})", room, plan.reason);
            return FusionResult::fallback_neutral(now);
        }
        if plan.plan != FusionPlan::Both {
            state.buffer.record_partial_fusion();
            debug!("Room {}: partial fusion ({})", room, plan.reason);
        }

        let face = plan
            .plan
            .includes(Channel::Face)
            .then(|| state.buffer.latest(Channel::Face, window, now).cloned())
            .flatten();
        let audio = plan
            .plan
            .includes(Channel::Audio)
            .then(|| state.buffer.latest(Channel::Audio, window, now).cloned())
            .flatten();

        let combination = match combine(face.as_ref(), audio.as_ref(), fusion_config, now) {
            Ok(combination) => combination,
            Err(e) => {
                warn!("Room {}: fusion degraded to neutral fallback: {}", room, e);
                return FusionResult::fallback_neutral(now);
            }
        };
        debug!(
            "Room {}: raw {} ({:.3}) via {:?}, weights {:.2}/{:.2}, unadjusted {:?}, neutral suppressed: {}",
            room,
            combination.result.emotion,
            combination.result.confidence,
            combination.result.strategy,
            combination.result.weights.face,
            combination.result.weights.audio,
            combination.detail.unadjusted_confidence,
            combination.detail.neutral_suppressed
        );

        let smoothed = smooth(combination.result, &mut state.history, temporal_config, now);
        state.fusions += 1;
        if smoothed.result.temporal_adjustment.is_rejection() {
            state.rejections += 1;
        }

        let mut result = smoothed.result;
        if temporal_config.enable_persistence {
            let persisted = state.persistence.update(
                result.emotion,
                result.confidence,
                &temporal_config.persistence,
                now,
            );
            if persisted.used {
                result.emotion = persisted.emotion;
                result = result.with_confidence(persisted.confidence);
                result.persistence_used = true;
            }
        }

        debug!(
            "Room {}: {} ({:.2}) [{:?}, {}{}]",
            room,
            result.emotion,
            result.confidence,
            result.strategy,
            smoothed.reason,
            if result.persistence_used { ", persisted" } else { "" }
        );
        result
    }

    /// Accepted decisions of a room; empty for unknown rooms
    pub async fn history(&self, room: &str) -> RoomHistory {
        let Some(handle) = self.rooms.get(room).await else {
            return RoomHistory {
                room: room.to_string(),
                entries: Vec::new(),
                persistence: None,
            };
        };
        let state = handle.lock().await;
        RoomHistory {
            room: room.to_string(),
            entries: state.history.to_vec(),
            persistence: Some(state.persistence.snapshot(Instant::now())),
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Room stats for `Some(room)`, engine-wide stats for `None`
    pub async fn stats(&self, room: Option<&str>) -> EngineStats {
        match room {
            Some(room) => EngineStats::Room(self.room_stats(room).await),
            None => EngineStats::Global(self.global_stats().await),
        }
    }

    /// Unknown rooms report zeroed counters
    pub async fn room_stats(&self, room: &str) -> RoomStats {
        let config = self.store.config();
        let mut stats = RoomStats {
            room: room.to_string(),
            face_count: 0,
            audio_count: 0,
            has_both: false,
            face_latest_age_ms: None,
            audio_latest_age_ms: None,
            timeout_threshold_ms: config.freshness_window_ms,
            max_age_ms: config.max_age_ms,
            timeout_stats: TimeoutStats::default(),
            history_size: 0,
            fusions: 0,
            rejections: 0,
        };

        if let Some(handle) = self.rooms.get(room).await {
            let now = Instant::now();
            let window = config.freshness_window();
            let state = handle.lock().await;
            let face_age = state.buffer.newest_age(Channel::Face, now);
            let audio_age = state.buffer.newest_age(Channel::Audio, now);
            let fresh = |age: Option<Duration>| age.map(|a| a <= window).unwrap_or(false);

            stats.face_count = state.buffer.len(Channel::Face);
            stats.audio_count = state.buffer.len(Channel::Audio);
            stats.has_both = fresh(face_age) && fresh(audio_age);
            stats.face_latest_age_ms = face_age.map(duration_to_millis);
            stats.audio_latest_age_ms = audio_age.map(duration_to_millis);
            stats.timeout_stats = state.buffer.timeouts();
            stats.history_size = state.history.len();
            stats.fusions = state.fusions;
            stats.rejections = state.rejections;
        }
        stats
    }

    pub async fn global_stats(&self) -> GlobalStats {
        let mut stats = GlobalStats {
            total_rooms: 0,
            rooms: Vec::new(),
            global_timeout_stats: TimeoutStats::default(),
            total_fusions: 0,
            total_rejections: 0,
            subscribers: self.notifier.stats(),
        };
        for (room, handle) in self.rooms.snapshot().await {
            let state = handle.lock().await;
            stats.global_timeout_stats.accumulate(&state.buffer.timeouts());
            stats.total_fusions += state.fusions;
            stats.total_rejections += state.rejections;
            stats.rooms.push(room);
        }
        stats.total_rooms = stats.rooms.len();
        stats
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    async fn fusion_snapshot(&self) -> Arc<FusionConfig> {
        Arc::clone(&*self.fusion_config.read().await)
    }

    async fn temporal_snapshot(&self) -> Arc<TemporalConfig> {
        Arc::clone(&*self.temporal_config.read().await)
    }

    pub async fn config(&self) -> FusionConfig {
        self.fusion_snapshot().await.as_ref().clone()
    }

    /// Atomically apply a weighting patch; invalid patches change nothing
    pub async fn update_config(&self, patch: &FusionConfigPatch) -> Result<FusionConfig> {
        let updated = {
            let mut active = self.fusion_config.write().await;
            let updated = active.patched(patch)?;
            *active = Arc::new(updated.clone());
            updated
        };
        info!("Fusion parameters updated: {:?}", patch);
        self.notifier.publish(FusionEvent::ConfigUpdated {
            scope: ConfigScope::Fusion,
            timestamp: wall_clock(),
        });
        Ok(updated)
    }

    pub async fn temporal_config(&self) -> TemporalConfig {
        self.temporal_snapshot().await.as_ref().clone()
    }

    /// Atomically apply a smoothing/persistence patch; history is kept as is
    pub async fn update_temporal_config(
        &self,
        patch: &TemporalConfigPatch,
    ) -> Result<TemporalConfig> {
        let updated = {
            let mut active = self.temporal_config.write().await;
            let updated = active.patched(patch)?;
            *active = Arc::new(updated.clone());
            updated
        };
        info!("Temporal parameters updated: {:?}", patch);
        self.notifier.publish(FusionEvent::ConfigUpdated {
            scope: ConfigScope::Temporal,
            timestamp: wall_clock(),
        });
        Ok(updated)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Forget a room's buffers, history, persistence and counters
    ///
    /// Waits for in-flight work on the room. A submission racing the reset
    /// lands in a fresh room rather than the discarded one.
    pub async fn reset_room(&self, room: &str) -> bool {
        let existed = self.rooms.remove(room).await;
        if existed {
            info!("Reset room {}", room);
            self.notifier.publish(FusionEvent::RoomReset {
                room: room.to_string(),
                timestamp: wall_clock(),
            });
        }
        existed
    }

    /// Forget every room; returns how many were cleared
    pub async fn reset_all(&self) -> usize {
        let cleared = self.rooms.clear().await;
        info!("Reset all rooms ({} cleared)", cleared);
        self.notifier.publish(FusionEvent::AllRoomsReset {
            rooms_cleared: cleared,
            timestamp: wall_clock(),
        });
        cleared
    }

    /// Subscribe to live results for one room, or all rooms with `None`
    pub fn subscribe(&self, room: Option<String>) -> Subscription {
        self.notifier.subscribe(room)
    }
}

/// Run [`FusionEngine::gc_sweep`] every `interval` until the task is aborted
pub fn spawn_gc_task(
    engine: Arc<FusionEngine>,
    interval: Duration,
    max_age: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = engine.gc_sweep(max_age).await;
            if report.rooms_cleaned > 0 {
                debug!(
                    "Sweep removed {} face and {} audio observations",
                    report.face_removed, report.audio_removed
                );
            }
        }
    })
}

fn sanitize_confidence(room: &str, channel: Channel, confidence: f64) -> f64 {
    if !confidence.is_finite() {
        warn!(
            "Room {}: non-finite {} confidence treated as 0",
            room, channel
        );
        return 0.0;
    }
    if !(0.0..=1.0).contains(&confidence) {
        let clamped = confidence.clamp(0.0, 1.0);
        warn!(
            "Room {}: {} confidence {} clamped to {}",
            room, channel, confidence, clamped
        );
        return clamped;
    }
    confidence
}
