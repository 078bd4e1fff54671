//! Observation store
//!
//! Keeps the most recent classifier outputs per room and channel, decides
//! which channels are fresh enough to fuse, and sweeps stale data.
//!
//! Each room's buffers live inside its `RoomState`, behind the room's own
//! mutex, so adding an observation and fusing the same room never interleave.

use super::observation::{Observation, ObservationSnapshot};
use super::room::RoomRegistry;
use emofuse_common::config::StoreConfig;
use emofuse_common::time::duration_to_millis;
use emofuse_common::{Channel, FusionPlan};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Per-room bounded buffers, one per channel, oldest first
#[derive(Debug, Default)]
pub struct ObservationBuffer {
    face: VecDeque<Observation>,
    audio: VecDeque<Observation>,
    timeouts: TimeoutStats,
}

/// Counters of fusions that had to proceed without one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeoutStats {
    pub face_timeouts: u64,
    pub audio_timeouts: u64,
    pub partial_fusions: u64,
}

impl TimeoutStats {
    pub fn accumulate(&mut self, other: &TimeoutStats) {
        self.face_timeouts += other.face_timeouts;
        self.audio_timeouts += other.audio_timeouts;
        self.partial_fusions += other.partial_fusions;
    }
}

/// Which channels to fuse, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub plan: FusionPlan,
    pub reason: &'static str,
    pub face_age_ms: Option<u64>,
    pub audio_age_ms: Option<u64>,
}

/// Outcome of a stale-data sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub face_removed: usize,
    pub audio_removed: usize,
    pub rooms_cleaned: usize,
}

impl ObservationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, channel: Channel) -> &VecDeque<Observation> {
        match channel {
            Channel::Face => &self.face,
            Channel::Audio => &self.audio,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut VecDeque<Observation> {
        match channel {
            Channel::Face => &mut self.face,
            Channel::Audio => &mut self.audio,
        }
    }

    /// Append an observation, evicting the oldest beyond `max_per_channel`
    pub fn add(&mut self, obs: Observation, max_per_channel: usize) {
        let buffer = self.channel_mut(obs.channel);
        buffer.push_back(obs);
        while buffer.len() > max_per_channel.max(1) {
            buffer.pop_front();
        }
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.channel(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        self.face.is_empty() && self.audio.is_empty()
    }

    /// Age of the newest entry on `channel`, fresh or not
    pub fn newest_age(&self, channel: Channel, now: Instant) -> Option<Duration> {
        self.channel(channel).back().map(|obs| obs.age(now))
    }

    /// Newest observation no older than `window`
    ///
    /// Entries older than the window are discarded on the way.
    pub fn latest(&mut self, channel: Channel, window: Duration, now: Instant) -> Option<&Observation> {
        let removed = purge(self.channel_mut(channel), window, now);
        if removed > 0 {
            debug!("Discarded {} expired {} observations", removed, channel);
        }
        self.channel(channel).back()
    }

    /// Decide which channels are fresh enough to fuse
    ///
    /// A single-channel plan counts as a timeout of the missing channel.
    pub fn plan(&mut self, window: Duration, now: Instant) -> PlanReport {
        let face_age = self.newest_age(Channel::Face, now);
        let audio_age = self.newest_age(Channel::Audio, now);
        let fresh = |age: Option<Duration>| age.map(|a| a <= window).unwrap_or(false);

        let (plan, reason) = match (fresh(face_age), fresh(audio_age)) {
            (true, true) => (FusionPlan::Both, "both_fresh"),
            (true, false) => {
                self.timeouts.audio_timeouts += 1;
                (FusionPlan::FaceOnly, "audio_timeout")
            }
            (false, true) => {
                self.timeouts.face_timeouts += 1;
                (FusionPlan::AudioOnly, "face_timeout")
            }
            (false, false) => (FusionPlan::None, "both_timeout_or_missing"),
        };

        PlanReport {
            plan,
            reason,
            face_age_ms: face_age.map(duration_to_millis),
            audio_age_ms: audio_age.map(duration_to_millis),
        }
    }

    /// Drop every buffered observation, keeping the timeout counters
    pub fn clear(&mut self) {
        self.face.clear();
        self.audio.clear();
    }

    pub fn record_partial_fusion(&mut self) {
        self.timeouts.partial_fusions += 1;
    }

    pub fn timeouts(&self) -> TimeoutStats {
        self.timeouts
    }

    /// Drop entries older than `max_age` on both channels
    pub fn purge_older_than(&mut self, max_age: Duration, now: Instant) -> (usize, usize) {
        let face = purge(&mut self.face, max_age, now);
        let audio = purge(&mut self.audio, max_age, now);
        (face, audio)
    }
}

fn purge(buffer: &mut VecDeque<Observation>, max_age: Duration, now: Instant) -> usize {
    let before = buffer.len();
    buffer.retain(|obs| obs.age(now) <= max_age);
    before - buffer.len()
}

/// Room-scoped view over the shared room registry
pub struct ObservationStore {
    rooms: Arc<RoomRegistry>,
    config: StoreConfig,
}

impl ObservationStore {
    pub fn new(rooms: Arc<RoomRegistry>, config: StoreConfig) -> Self {
        Self { rooms, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append to a room's buffer, creating the room on first use
    pub async fn add(&self, room: &str, obs: Observation) {
        let mut state = self.rooms.lock_or_create(room).await;
        state.buffer.add(obs, self.config.max_per_channel);
    }

    /// Newest fresh observation for a channel; `None` for unknown rooms
    pub async fn latest(&self, room: &str, channel: Channel) -> Option<ObservationSnapshot> {
        let state = self.rooms.get(room).await?;
        let now = Instant::now();
        let mut state = state.lock().await;
        let snapshot = state
            .buffer
            .latest(channel, self.config.freshness_window(), now)
            .map(|obs| obs.snapshot(now));
        snapshot
    }

    /// Fusion plan for a room, counting timeouts as a side effect
    pub async fn fusion_strategy(&self, room: &str) -> PlanReport {
        let Some(state) = self.rooms.get(room).await else {
            return PlanReport {
                plan: FusionPlan::None,
                reason: "room_not_initialized",
                face_age_ms: None,
                audio_age_ms: None,
            };
        };
        let mut state = state.lock().await;
        let report = state.buffer.plan(self.config.freshness_window(), Instant::now());
        report
    }

    /// Empty one room's buffers; history and persistence are untouched
    pub async fn clear(&self, room: &str) {
        if let Some(state) = self.rooms.get(room).await {
            state.lock().await.buffer.clear();
            debug!("Cleared observation buffers for room {}", room);
        }
    }

    /// Empty every room's buffers
    pub async fn clear_all(&self) {
        for (_, state) in self.rooms.snapshot().await {
            state.lock().await.buffer.clear();
        }
        debug!("Cleared all observation buffers");
    }

    /// Drop observations older than `max_age` in every room
    pub async fn gc_sweep(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Instant::now();

        for (room, state) in self.rooms.snapshot().await {
            let (face, audio) = state.lock().await.buffer.purge_older_than(max_age, now);
            if face > 0 || audio > 0 {
                report.face_removed += face;
                report.audio_removed += audio;
                report.rooms_cleaned += 1;
                info!(
                    "Swept room {}: removed {} face, {} audio observations older than {:?}",
                    room, face, audio, max_age
                );
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emofuse_common::Category;

    fn obs(channel: Channel, at: Instant) -> Observation {
        Observation::new(channel, Category::Happy, 0.8, None, at)
    }

    #[test]
    fn test_buffer_is_bounded() {
        let now = Instant::now();
        let mut buffer = ObservationBuffer::new();
        for i in 0..9 {
            buffer.add(
                Observation::new(Channel::Face, Category::Sad, i as f64 / 10.0, None, now),
                5,
            );
        }
        assert_eq!(buffer.len(Channel::Face), 5);
        let newest = buffer
            .latest(Channel::Face, Duration::from_secs(10), now)
            .expect("fresh entry");
        assert!((newest.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_latest_purges_expired() {
        let t0 = Instant::now();
        let mut buffer = ObservationBuffer::new();
        buffer.add(obs(Channel::Audio, t0), 5);
        let later = t0 + Duration::from_secs(11);
        assert!(buffer
            .latest(Channel::Audio, Duration::from_secs(10), later)
            .is_none());
        assert_eq!(buffer.len(Channel::Audio), 0);
    }

    #[test]
    fn test_plan_counts_timeouts() {
        let t0 = Instant::now();
        let window = Duration::from_secs(10);
        let mut buffer = ObservationBuffer::new();

        assert_eq!(buffer.plan(window, t0).plan, FusionPlan::None);

        buffer.add(obs(Channel::Face, t0), 5);
        let report = buffer.plan(window, t0 + Duration::from_secs(1));
        assert_eq!(report.plan, FusionPlan::FaceOnly);
        assert_eq!(report.reason, "audio_timeout");
        assert_eq!(report.face_age_ms, Some(1000));
        assert_eq!(report.audio_age_ms, None);

        buffer.add(obs(Channel::Audio, t0 + Duration::from_secs(2)), 5);
        assert_eq!(buffer.plan(window, t0 + Duration::from_secs(3)).plan, FusionPlan::Both);

        let report = buffer.plan(window, t0 + Duration::from_secs(11));
        assert_eq!(report.plan, FusionPlan::AudioOnly);

        let stats = buffer.timeouts();
        assert_eq!(stats.audio_timeouts, 1);
        assert_eq!(stats.face_timeouts, 1);
        assert_eq!(stats.partial_fusions, 0);
    }

    #[test]
    fn test_purge_older_than() {
        let t0 = Instant::now();
        let mut buffer = ObservationBuffer::new();
        buffer.add(obs(Channel::Face, t0), 5);
        buffer.add(obs(Channel::Face, t0 + Duration::from_secs(10)), 5);
        buffer.add(obs(Channel::Audio, t0), 5);

        let removed = buffer.purge_older_than(Duration::from_secs(15), t0 + Duration::from_secs(16));
        assert_eq!(removed, (1, 1));
        assert_eq!(buffer.len(Channel::Face), 1);
        assert!(!buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_gc_sweep_across_rooms() {
        let rooms = Arc::new(RoomRegistry::new());
        let store = ObservationStore::new(rooms, StoreConfig::default());

        store.add("a", obs(Channel::Face, Instant::now())).await;
        store.add("b", obs(Channel::Audio, Instant::now())).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        store.add("b", obs(Channel::Face, Instant::now())).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        let report = store.gc_sweep(Duration::from_secs(15)).await;
        assert_eq!(report.face_removed, 1);
        assert_eq!(report.audio_removed, 1);
        assert_eq!(report.rooms_cleaned, 2);

        assert!(store.latest("b", Channel::Face).await.is_some());
        assert!(store.latest("a", Channel::Face).await.is_none());
        assert!(store.latest("missing", Channel::Face).await.is_none());
    }

    #[tokio::test]
    async fn test_store_clear() {
        let rooms = Arc::new(RoomRegistry::new());
        let store = ObservationStore::new(Arc::clone(&rooms), StoreConfig::default());
        store.add("a", obs(Channel::Face, Instant::now())).await;
        store.add("b", obs(Channel::Face, Instant::now())).await;

        store.clear("a").await;
        assert!(store.latest("a", Channel::Face).await.is_none());
        assert!(store.latest("b", Channel::Face).await.is_some());

        store.clear_all().await;
        assert!(store.latest("b", Channel::Face).await.is_none());
        assert_eq!(store.fusion_strategy("b").await.plan, FusionPlan::None);
    }
}
