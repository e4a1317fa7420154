//! Resynchronising stream-to-frame reassembly.
//!
//! Modbus RTU frames are delimited by inter-character silence on the bus,
//! which a serial driver delivering byte chunks does not preserve. The
//! parser therefore keeps a rolling buffer, validates structure and CRC at
//! the current cursor, and on any failure shifts one byte and retries. The
//! CRC is the sole framing oracle.

use crate::constants;
use crate::protocol::{self, FunctionCode, Request};

/// Frames and diagnostics produced by one [`FrameParser::push`] call.
#[derive(Debug, Default)]
pub struct PushResult {
    /// Complete, CRC-valid requests, in stream order.
    pub frames: Vec<Request>,
    /// Set when the rolling buffer exceeded its bound and was flushed.
    pub overflowed: bool,
}

/// Incremental frame reassembler over an undelimited byte stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently retained while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discard any partially assembled frame, e.g. when the port closes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a chunk from the serial driver and extract every complete
    /// frame it unlocks.
    pub fn push(&mut self, chunk: &[u8]) -> PushResult {
        self.buf.extend_from_slice(chunk);
        let mut result = PushResult::default();
        let mut p = 0usize;

        loop {
            let avail = self.buf.len() - p;
            if avail < 2 {
                break;
            }
            let fc = self.buf[p + 1];
            if FunctionCode::from_u8(fc).is_none() {
                // Not our traffic; shift and retry.
                p += 1;
                continue;
            }
            let frame_len = if fc == FunctionCode::WriteMultipleRegisters as u8 {
                if avail < 7 {
                    break;
                }
                9 + self.buf[p + 6] as usize
            } else {
                8
            };
            if avail < frame_len {
                break;
            }
            let body = &self.buf[p..p + frame_len - 2];
            let wire_crc = u16::from_le_bytes([
                self.buf[p + frame_len - 2],
                self.buf[p + frame_len - 1],
            ]);
            if protocol::crc16(body) != wire_crc {
                p += 1;
                continue;
            }
            match protocol::decode(body) {
                Some(request) => {
                    result.frames.push(request);
                    p += frame_len;
                }
                None => p += 1,
            }
        }

        self.buf.drain(..p);
        if self.buf.len() > constants::parser::MAX_PENDING_BYTES {
            self.buf.clear();
            result.overflowed = true;
        }
        result
    }
}
