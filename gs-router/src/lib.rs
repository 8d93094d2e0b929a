// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Event Router (spec §4.10): the single `/events` WebSocket surface that
//! multiplexes every client-facing event and both command buses onto one
//! session. Grounded on `trx-client/trx-frontend/trx-frontend-http/src/
//! server.rs`'s `pub fn configure(cfg: &mut web::ServiceConfig)`
//! composition pattern.

pub mod commands;
pub mod events;
pub mod state;
pub mod ws;

pub use state::{AppState, RegisteredSatellite, RigTrackingLink, SharedState};

/// Registers this crate's services on an `actix_web::App`. Mirrors the
/// teacher's `trx-frontend-http::configure`, which does the same for its
/// REST routes.
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(ws::events_ws);
}
