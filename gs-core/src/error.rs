// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy (spec §7).

use thiserror::Error;

/// A pipeline error, classified by the propagation rule that applies to it.
///
/// Matches spec §7's five categories: component failures never tear down a
/// sibling; only `Configuration` failures block the operation that raised
/// them; `Capacity` never reaches the caller at all (it is a drop-counter
/// increment, not a returned error — see `gs-broadcaster`).
#[derive(Debug, Error)]
pub enum GsError {
    /// Device read, network, or decoder IPC hiccup. Retried within the
    /// component with exponential backoff up to a small cap.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// Invalid modulation, frequency out of SDR range, missing hardware.
    /// Fails fast: the pipeline is not started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Device unplugged, decoder crash loop. Stops the affected subtree only.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// An observation failed to execute; carries its own `error_count`.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl GsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }
}
