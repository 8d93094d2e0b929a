// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Observation Scheduler & Executor (spec §4.7): generate pass windows
//! from TLEs, resolve them against conflicting observations, and run the
//! accepted ones through an internal session. Grounded on
//! `original_source/backend/observations/` (`conflicts.py`, `validation.py`,
//! `constants.py`, `helpers.py`).

pub mod conflicts;
pub mod executor;
pub mod generator;
pub mod validation;

pub use conflicts::{resolve, PassCandidate, Resolution, DEFAULT_CONFLICT_STRATEGY, PASS_OVERLAP_TOLERANCE_MINUTES};
pub use executor::{start_observation, stop_observation, sweep_overdue, MISSED_GRACE_SECONDS};
pub use generator::{find_passes, generate_observations, PassWindow, DEFAULT_REGENERATION_INTERVAL};
pub use validation::{validate_transmitter_frequencies, InvalidFrequency};
