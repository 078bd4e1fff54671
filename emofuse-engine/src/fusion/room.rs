//! Per-room state and the room registry
//!
//! The registry lock is held only to find, insert or remove a room. All work
//! on a room happens under that room's own mutex, so rooms never contend.
//!
//! Removing a room retires its state under the room mutex. A writer that
//! fetched the handle before the removal finds it retired once it gets the
//! lock, and retries against the room's replacement.

use super::persistence::PersistenceTracker;
use super::smoother::FusionHistory;
use super::store::ObservationBuffer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Everything the engine remembers about one room
#[derive(Debug)]
pub struct RoomState {
    pub buffer: ObservationBuffer,
    pub history: FusionHistory,
    pub persistence: PersistenceTracker,
    /// Completed fusions, rejected ones included
    pub fusions: u64,
    /// Fusions whose raw result the smoother rejected
    pub rejections: u64,
    /// Set once the room has been removed from the registry
    retired: bool,
}

impl RoomState {
    pub fn new(now: Instant) -> Self {
        Self {
            buffer: ObservationBuffer::new(),
            history: FusionHistory::new(),
            persistence: PersistenceTracker::new(now),
            fusions: 0,
            rejections: 0,
            retired: false,
        }
    }
}

/// Shared handle to one room's state
pub type RoomHandle = Arc<Mutex<RoomState>>;

/// Map of room id to room state
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing room, if any
    pub async fn get(&self, room: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room).cloned()
    }

    /// Existing room, or a freshly created one
    pub async fn get_or_create(&self, room: &str) -> RoomHandle {
        if let Some(handle) = self.get(room).await {
            return handle;
        }

        let mut rooms = self.rooms.write().await;
        let handle = rooms.entry(room.to_string()).or_insert_with(|| {
            info!("Created room {}", room);
            Arc::new(Mutex::new(RoomState::new(Instant::now())))
        });
        Arc::clone(handle)
    }

    /// Lock a room for writing, creating it on first use
    pub async fn lock_or_create(&self, room: &str) -> OwnedMutexGuard<RoomState> {
        loop {
            let state = self.get_or_create(room).await.lock_owned().await;
            if !state.retired {
                return state;
            }
            debug!("Room {} was removed while waiting, retrying", room);
        }
    }

    /// Forget a room; returns whether it existed
    pub async fn remove(&self, room: &str) -> bool {
        loop {
            let Some(handle) = self.get(room).await else {
                return false;
            };
            if self.retire(room, &handle).await {
                return true;
            }
        }
    }

    /// Forget every room; returns how many were removed
    pub async fn clear(&self) -> usize {
        let mut removed = 0;
        for (room, handle) in self.snapshot().await {
            if self.retire(&room, &handle).await {
                removed += 1;
            }
        }
        removed
    }

    /// Unlink `handle` if it is still the registered state for `room`
    async fn retire(&self, room: &str, handle: &RoomHandle) -> bool {
        let mut state = handle.lock().await;
        let mut rooms = self.rooms.write().await;
        match rooms.get(room) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                rooms.remove(room);
                state.retired = true;
                true
            }
            _ => false,
        }
    }

    /// Handles to every room, taken without holding the registry lock afterwards
    pub async fn snapshot(&self) -> Vec<(String, RoomHandle)> {
        let rooms = self.rooms.read().await;
        let mut entries: Vec<(String, RoomHandle)> = rooms
            .iter()
            .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
