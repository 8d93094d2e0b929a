// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Decoder contract and built-in decoders (spec §4.5). In-process
//! decoders ([`AfskAx25Decoder`], [`CwToneDecoder`]) and out-of-process
//! ones ([`ExternalDecoder`]) all implement [`Decoder`], so the Process
//! Manager drives every decoder the same way regardless of where it runs.

mod ax25;
mod config;
mod cw;
mod decoder;
mod external;
mod frame;

pub use ax25::{AfskAx25Decoder, Ax25PacketInfo};
pub use config::{
    resolve_decoder_config, ConfigSource, DecoderConfig, DecoderOverrides, Framing, SatelliteDecoderEntry,
    TransmitterMetadata,
};
pub use cw::{CwEventInfo, CwToneDecoder};
pub use decoder::Decoder;
pub use external::ExternalDecoder;
pub use frame::{DecodedFrame, DecoderStatus};
