//! Dynamixel protocol 2.0 packet codec.
//!
//! Wire format:
//! ```text
//! ┌─────────────┬────┬──────────┬──────┬──────────────┬──────────┐
//! │ FF FF FD 00 │ ID │ LEN (LE) │ INST │ params (N B) │ CRC (LE) │
//! └─────────────┴────┴──────────┴──────┴──────────────┴──────────┘
//!                      LEN = 1 (INST) + N + 2 (CRC), counted after stuffing
//! ```
//!
//! Any `FF FF FD` run inside INST/params is stuffed to `FF FF FD FD` so the
//! header can never appear in a packet body.  The CRC covers every byte from
//! the header through the (stuffed) parameters.
//!
//! Status packets use INST = `0x55` followed by an error byte.  The decoder
//! is streaming: a single `Transport::read` may return part of a packet,
//! line noise before the header, or a whole packet.

use crc::{Crc, CRC_16_UMTS};

use crate::error::CommFailure;

/// CRC-16 with polynomial 0x8005, zero init, no reflection.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_UMTS);

pub const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// Broadcast id; every servo on the bus executes, none answers.
pub const BROADCAST_ID: u8 = 0xFE;

/// Largest body (INST + params + CRC) accepted by the decoder.
const MAX_BODY_LEN: usize = 64;

/// Largest unstuffed parameter block carried by a status packet.
pub const MAX_STATUS_PARAMS: usize = 32;

/// Upper bound for an encoded instruction packet.
pub const MAX_PACKET_LEN: usize = HEADER.len() + 3 + MAX_BODY_LEN;

/// Status error byte bit 7: hardware alert, not a transaction failure.
const ALERT_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    Status = 0x55,
}

/// Decoded status packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    /// Raw error byte.  Bit 7 is the hardware alert flag.
    pub error: u8,
    pub params: heapless::Vec<u8, MAX_STATUS_PARAMS>,
}

impl StatusPacket {
    /// Error number with the alert flag masked off.
    pub fn error_code(&self) -> u8 {
        self.error & !ALERT_BIT
    }

    pub fn hardware_alert(&self) -> bool {
        self.error & ALERT_BIT != 0
    }

    /// Little-endian value of the first `width` parameter bytes.
    pub fn value(&self, width: u8) -> Option<u32> {
        let width = width as usize;
        if width == 0 || width > 4 || self.params.len() != width {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes[..width].copy_from_slice(&self.params[..width]);
        Some(u32::from_le_bytes(bytes))
    }
}

// ── Encoding ──

/// Encode an instruction packet into `out_buf`.
///
/// Returns the total number of bytes written, or `None` when the packet
/// would not fit.
pub fn encode_instruction(
    id: u8,
    instruction: Instruction,
    params: &[u8],
    out_buf: &mut [u8],
) -> Option<usize> {
    let body_start = HEADER.len() + 3;
    if out_buf.len() < body_start {
        return None;
    }
    out_buf[..HEADER.len()].copy_from_slice(&HEADER);
    out_buf[HEADER.len()] = id;

    let mut pos = body_start;
    for &byte in core::iter::once(&(instruction as u8)).chain(params) {
        push(out_buf, &mut pos, byte)?;
        if pos - body_start >= 3 && out_buf[pos - 3..pos] == [0xFF, 0xFF, 0xFD] {
            push(out_buf, &mut pos, 0xFD)?;
        }
    }

    let len = (pos - body_start + 2) as u16;
    out_buf[HEADER.len() + 1..body_start].copy_from_slice(&len.to_le_bytes());

    let crc = CRC16.checksum(&out_buf[..pos]);
    for byte in crc.to_le_bytes() {
        push(out_buf, &mut pos, byte)?;
    }
    Some(pos)
}

fn push(buf: &mut [u8], pos: &mut usize, byte: u8) -> Option<()> {
    *buf.get_mut(*pos)? = byte;
    *pos += 1;
    Some(())
}

/// Parameters of a READ instruction: start address and byte count.
pub fn read_params(address: u16, width: u8) -> [u8; 4] {
    let a = address.to_le_bytes();
    let w = (width as u16).to_le_bytes();
    [a[0], a[1], w[0], w[1]]
}

/// Parameters of a WRITE instruction: start address then `width` LE bytes.
pub fn write_params(address: u16, width: u8, value: u32) -> heapless::Vec<u8, 6> {
    let mut out = heapless::Vec::new();
    let a = address.to_le_bytes();
    let v = value.to_le_bytes();
    for &b in a.iter().chain(&v[..(width as usize).min(4)]) {
        // Six bytes at most.
        let _ = out.push(b);
    }
    out
}

// ── Decoding ──

/// Decoder state machine.
enum DecoderState {
    /// Sliding over input until the last four bytes equal [`HEADER`].
    Sync,
    /// Header found, collecting ID and LEN.
    ReadingPrefix { collected: usize },
    /// Collecting `expected` body bytes (INST .. CRC).
    ReadingBody { expected: usize, collected: usize },
}

/// Streaming status-packet decoder.
pub struct StatusDecoder {
    state: DecoderState,
    window: [u8; 4],
    prefix: [u8; 3],
    body: [u8; MAX_BODY_LEN],
}

impl Default for StatusDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Sync,
            window: [0; 4],
            prefix: [0; 3],
            body: [0; MAX_BODY_LEN],
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Some` when a complete packet has been framed: the decoded
    /// status, or the reason it was rejected.  The decoder is ready for the
    /// next packet either way.
    pub fn push(&mut self, byte: u8) -> Option<Result<StatusPacket, CommFailure>> {
        match &mut self.state {
            DecoderState::Sync => {
                self.window.rotate_left(1);
                self.window[3] = byte;
                if self.window == HEADER {
                    self.window = [0; 4];
                    self.state = DecoderState::ReadingPrefix { collected: 0 };
                }
                None
            }
            DecoderState::ReadingPrefix { collected } => {
                self.prefix[*collected] = byte;
                *collected += 1;
                if *collected < self.prefix.len() {
                    return None;
                }
                let expected = u16::from_le_bytes([self.prefix[1], self.prefix[2]]) as usize;
                // INST + error + CRC at minimum.
                if !(4..=MAX_BODY_LEN).contains(&expected) {
                    self.state = DecoderState::Sync;
                    return Some(Err(CommFailure::Malformed));
                }
                self.state = DecoderState::ReadingBody {
                    expected,
                    collected: 0,
                };
                None
            }
            DecoderState::ReadingBody { expected, collected } => {
                self.body[*collected] = byte;
                *collected += 1;
                if *collected < *expected {
                    return None;
                }
                let len = *expected;
                self.state = DecoderState::Sync;
                Some(self.finish(len))
            }
        }
    }

    /// Feed a chunk, stopping at the first framed packet.
    ///
    /// Returns the number of bytes consumed alongside the result.
    pub fn feed(&mut self, data: &[u8]) -> (usize, Option<Result<StatusPacket, CommFailure>>) {
        for (i, &byte) in data.iter().enumerate() {
            if let Some(result) = self.push(byte) {
                return (i + 1, Some(result));
            }
        }
        (data.len(), None)
    }

    /// Drop any partially framed packet.
    pub fn reset(&mut self) {
        self.state = DecoderState::Sync;
        self.window = [0; 4];
    }

    fn finish(&self, len: usize) -> Result<StatusPacket, CommFailure> {
        let payload = &self.body[..len - 2];
        let received = u16::from_le_bytes([self.body[len - 2], self.body[len - 1]]);

        let mut digest = CRC16.digest();
        digest.update(&HEADER);
        digest.update(&self.prefix);
        digest.update(payload);
        if digest.finalize() != received {
            return Err(CommFailure::Checksum);
        }

        let unstuffed = unstuff(payload);
        let (&inst, rest) = unstuffed.split_first().ok_or(CommFailure::Malformed)?;
        if inst != Instruction::Status as u8 {
            return Err(CommFailure::Malformed);
        }
        let (&error, params) = rest.split_first().ok_or(CommFailure::Malformed)?;
        let params = heapless::Vec::from_slice(params).map_err(|()| CommFailure::Malformed)?;

        Ok(StatusPacket {
            id: self.prefix[0],
            error,
            params,
        })
    }
}

/// Remove the `FD` inserted after every `FF FF FD` run.
fn unstuff(stuffed: &[u8]) -> heapless::Vec<u8, MAX_BODY_LEN> {
    let mut out: heapless::Vec<u8, MAX_BODY_LEN> = heapless::Vec::new();
    let mut i = 0;
    while i < stuffed.len() {
        // Input is never longer than the output capacity.
        let _ = out.push(stuffed[i]);
        let n = out.len();
        if n >= 3 && out[n - 3..] == [0xFF, 0xFF, 0xFD] && stuffed.get(i + 1) == Some(&0xFD) {
            i += 1;
        }
        i += 1;
    }
    out
}
