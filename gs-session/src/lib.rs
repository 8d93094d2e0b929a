// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! VFO/Session state (spec §4.6) and the per-SDR process table (spec
//! §4.8). Grounded on
//! `original_source/backend/sdr/demodulatormanager.py`.

pub mod process_manager;
pub mod vfo_manager;

pub use process_manager::{ProcessManager, RuntimeSnapshot, SdrSnapshot, SNAPSHOT_INTERVAL};
pub use vfo_manager::{AudioRoomPayload, VfoManager};
