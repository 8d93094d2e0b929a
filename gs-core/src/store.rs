// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persistence contracts for the relational store (spec §1/§6: "Out of
//! scope... the relational store"). Only the two tables the tracker and
//! scheduler need to drive the pipeline are modeled; everything else
//! (users, satellites, TLEs, transmitters, ...) is an external collaborator
//! whose contract is out of scope per spec.md §1.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{ScheduledObservation, TrackingState};

/// Storage contract for `tracking_state` rows.
#[async_trait::async_trait]
pub trait TrackingStateStore: Send + Sync {
    async fn get(&self, norad_id: u32) -> Option<TrackingState>;
    async fn put(&self, state: TrackingState);
    async fn all(&self) -> Vec<TrackingState>;
}

/// Storage contract for `scheduled_observations` rows.
#[async_trait::async_trait]
pub trait ScheduledObservationStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<ScheduledObservation>;
    async fn put(&self, obs: ScheduledObservation);
    async fn all(&self) -> Vec<ScheduledObservation>;
    async fn delete(&self, id: &str);
}

/// In-memory implementation used by tests and as the default store when no
/// real database is configured.
#[derive(Default)]
pub struct MemoryStore {
    tracking: Mutex<HashMap<u32, TrackingState>>,
    observations: Mutex<HashMap<String, ScheduledObservation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TrackingStateStore for MemoryStore {
    async fn get(&self, norad_id: u32) -> Option<TrackingState> {
        self.tracking.lock().unwrap().get(&norad_id).cloned()
    }

    async fn put(&self, state: TrackingState) {
        self.tracking.lock().unwrap().insert(state.norad_id, state);
    }

    async fn all(&self) -> Vec<TrackingState> {
        self.tracking.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ScheduledObservationStore for MemoryStore {
    async fn get(&self, id: &str) -> Option<ScheduledObservation> {
        self.observations.lock().unwrap().get(id).cloned()
    }

    async fn put(&self, obs: ScheduledObservation) {
        self.observations.lock().unwrap().insert(obs.id.clone(), obs);
    }

    async fn all(&self) -> Vec<ScheduledObservation> {
        self.observations.lock().unwrap().values().cloned().collect()
    }

    async fn delete(&self, id: &str) {
        self.observations.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservationStatus;
    use chrono::Utc;

    fn sample_observation(id: &str) -> ScheduledObservation {
        let now = Utc::now();
        ScheduledObservation {
            id: id.to_string(),
            norad_id: 25544,
            monitored_satellite_id: None,
            event_start_utc: now,
            event_end_utc: now,
            task_start_utc: now,
            task_end_utc: now,
            peak_elevation_deg: 45.0,
            status: ObservationStatus::Scheduled,
            error_message: None,
            error_count: 0,
            actual_start_utc: None,
            actual_end_utc: None,
            sessions: vec![],
            generated_at: now,
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_observations() {
        let store = MemoryStore::new();
        store.put(sample_observation("obs-1")).await;
        assert!(store.get("obs-1").await.is_some());
        store.delete("obs-1").await;
        assert!(store.get("obs-1").await.is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trips_tracking_state() {
        let store = MemoryStore::new();
        store.put(TrackingState::new(25544)).await;
        assert_eq!(store.get(25544).await.unwrap().norad_id, 25544);
        assert_eq!(store.all().await.len(), 1);
    }
}
