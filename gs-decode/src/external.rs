// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Out-of-process decoder black box (spec §4.5, §1 Non-goals: "no
//! arbitrary decoder plugin ABI beyond the §4.5 contract"). Models a
//! weather-image pipeline or a LoRa/FSK framer as a long-running child
//! process: raw samples go to its stdin, newline-delimited JSON frames
//! come back on its stdout. Grounded on the external-binary-wrapper shape
//! of `trx-wspr`'s `wsprd_wrapper.rs`, generalized from one-shot
//! `Command::output()` calls to a persistent streaming child.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;

use gs_core::{Complex32, GsError};

use crate::decoder::Decoder;
use crate::frame::{DecodedFrame, DecoderStatus};

/// Spawns `binary` once and keeps it alive for the lifetime of the
/// decoder. Each line of JSON the child writes to stdout is parsed into a
/// [`DecodedFrame`]; anything else on stdout is ignored as log noise.
pub struct ExternalDecoder {
    binary: String,
    child: Child,
    stdin: ChildStdin,
    frames_rx: mpsc::Receiver<DecodedFrame>,
    reader: Option<JoinHandle<()>>,
    status: DecoderStatus,
}

impl ExternalDecoder {
    pub fn spawn(binary: &str, args: &[String]) -> Result<Self, GsError> {
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GsError::transient(format!("spawning decoder {binary}: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| GsError::fatal("decoder child has no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| GsError::fatal("decoder child has no stdout"))?;

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if let Ok(frame) = serde_json::from_str::<DecodedFrame>(&line) {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Self { binary: binary.to_string(), child, stdin, frames_rx: rx, reader: Some(reader), status: DecoderStatus::Running })
    }

    fn write_samples(&mut self, bytes: &[u8]) {
        if self.stdin.write_all(bytes).is_err() {
            tracing::warn!(binary = %self.binary, "external decoder stdin closed");
            self.status = DecoderStatus::Crashed;
        }
    }

    fn drain_frames(&mut self) -> Vec<DecodedFrame> {
        self.frames_rx.try_iter().collect()
    }

    fn refresh_status(&mut self) {
        if self.status == DecoderStatus::Crashed {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(_exit_status)) => {
                tracing::warn!(binary = %self.binary, "external decoder process exited");
                self.status = DecoderStatus::Crashed;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(binary = %self.binary, error = %e, "failed polling decoder process");
            }
        }
    }
}

impl Decoder for ExternalDecoder {
    fn feed_iq(&mut self, samples: &[Complex32]) -> Vec<DecodedFrame> {
        let mut bytes = Vec::with_capacity(samples.len() * 8);
        for s in samples {
            bytes.extend_from_slice(&s.re.to_le_bytes());
            bytes.extend_from_slice(&s.im.to_le_bytes());
        }
        self.write_samples(&bytes);
        self.refresh_status();
        self.drain_frames()
    }

    fn feed_audio(&mut self, samples: &[f32]) -> Vec<DecodedFrame> {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.write_samples(&bytes);
        self.refresh_status();
        self.drain_frames()
    }

    fn status(&self) -> DecoderStatus {
        self.status
    }

    /// Black box: there is no internal state to clear. Config changes that
    /// require a reset are handled by the Process Manager killing and
    /// respawning the child instead.
    fn reset(&mut self) {}
}

impl Drop for ExternalDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawning_a_missing_binary_fails() {
        let result = ExternalDecoder::spawn("definitely-not-a-real-decoder-binary", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn a_process_that_echoes_frames_is_readable() {
        // `cat` is a stand-in external decoder: whatever valid-JSON lines
        // it receives on stdin, it reflects back on stdout unchanged.
        let Ok(mut decoder) = ExternalDecoder::spawn("cat", &[]) else {
            return; // environment without /bin/cat; skip rather than fail spuriously
        };
        let frame = DecodedFrame { payload: vec![1, 2, 3], metadata: serde_json::json!({"k": "v"}), timestamp_ns: 42 };
        let mut line = serde_json::to_string(&frame).unwrap();
        line.push('\n');
        decoder.write_samples(line.as_bytes());

        std::thread::sleep(std::time::Duration::from_millis(200));
        let frames = decoder.drain_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp_ns, 42);
    }
}
