// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared application state handed to every WS connection (spec §4.10).
//! Grounded on `trx-frontend-http/src/server.rs`'s `FrontendRuntimeContext`:
//! one `Arc<...>` of shared handles stashed in `web::Data`, built once at
//! startup and cloned per request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use gs_core::store::{ScheduledObservationStore, TrackingStateStore};
use gs_core::{Modulation, SessionId, VfoNumber};
use gs_session::{ProcessManager, VfoManager};
use gs_tracker::{SatellitePropagator, StationLocation, TrackingRegistry};

/// Links a tracked satellite to the rig VFO that should receive
/// Doppler-corrected retuning while it is above the horizon (spec §4.6
/// "called when the tracker publishes Doppler-corrected frequency").
/// Populated optionally by `register_satellite`; a satellite with no link
/// is tracked (its `TrackingState` row is still kept up to date) but never
/// drives a VFO.
#[derive(Debug, Clone)]
pub struct RigTrackingLink {
    pub session: SessionId,
    pub vfo: VfoNumber,
    pub downlink_freq_hz: f64,
    pub modulation: Modulation,
    pub bandwidth_hz: u32,
}

/// A registered satellite's propagator plus the station it is tracked from,
/// for the periodic `satellite-tracking` push (spec §6). Populated by the
/// `register_satellite` `data_submission` command since TLE management
/// itself is an external collaborator (spec §1).
pub struct RegisteredSatellite {
    pub propagator: SatellitePropagator,
    pub station: StationLocation,
    pub rig_link: Option<RigTrackingLink>,
}

pub struct AppState {
    pub process_manager: Arc<ProcessManager>,
    pub vfo_manager: Mutex<VfoManager>,
    pub tracking_registry: Mutex<TrackingRegistry>,
    pub tracked_satellites: Mutex<HashMap<u32, RegisteredSatellite>>,
    pub observation_store: Arc<dyn ScheduledObservationStore>,
    pub tracking_state_store: Arc<dyn TrackingStateStore>,
    pub recordings_dir: PathBuf,
    pub server_version: String,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        process_manager: Arc<ProcessManager>,
        observation_store: Arc<dyn ScheduledObservationStore>,
        tracking_state_store: Arc<dyn TrackingStateStore>,
        recordings_dir: PathBuf,
        server_version: String,
    ) -> Self {
        Self {
            process_manager,
            vfo_manager: Mutex::new(VfoManager::new()),
            tracking_registry: Mutex::new(TrackingRegistry::new()),
            tracked_satellites: Mutex::new(HashMap::new()),
            observation_store,
            tracking_state_store,
            recordings_dir,
            server_version,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
