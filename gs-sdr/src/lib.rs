// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SDR Worker (spec §4.2): device/playback IQ capture on a dedicated
//! thread, publishing into an IQ broadcaster. Grounded on the teacher's
//! `trx-backend-soapysdr` crate.

pub mod source;
pub mod worker;

pub use source::{IqSource, SigmfPlaybackSource, SilenceSource};
pub use worker::{SdrWorker, WorkerState, IQ_BLOCK_SIZE};

#[cfg(feature = "soapysdr")]
pub use source::soapy::SoapySdrSource;
