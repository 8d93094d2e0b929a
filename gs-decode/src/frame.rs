// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Output types for the `frames_out`/`status_out` ports (spec §4.5).

use serde::{Deserialize, Serialize};

/// One decoded frame: opaque bytes plus whatever structured metadata the
/// decoder was able to extract from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub payload: Vec<u8>,
    pub metadata: serde_json::Value,
    pub timestamp_ns: u64,
}

/// Current liveness of a decoder, published on `status_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderStatus {
    Running,
    Stopped,
    /// The decoder's underlying process or task died; the Process Manager
    /// emits `decoder-stopped` and the health check may restart it.
    Crashed,
}
