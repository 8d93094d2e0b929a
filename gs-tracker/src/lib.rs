// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Satellite tracking (spec C9): SGP4 propagation, topocentric az/el and
//! subpoint, Doppler-corrected frequency, and the `TrackingState`
//! poll-and-react loop.

mod poller;
mod propagator;

pub use poller::{TrackedSlot, TrackingRegistry};
pub use propagator::{SatellitePropagator, StationLocation, TrackPoint};
