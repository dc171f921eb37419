//! Magnetic-encoder pose over a line-oriented serial link.
//!
//! Wire protocol (ASCII, newline-terminated):
//! ```text
//!   host → MCU   "<command>,<params...>\n"     0 = GET_YAW, 1 = OFFSET
//!   MCU  → host  "<TAG>,<payload>\n"           TAG echoes the command
//! ```
//!
//! The microcontroller is slow and noisy: replies can belong to an earlier
//! command, arrive garbled, or not at all.  Any reply that does not carry
//! the expected tag with a parseable payload is transient and the command is
//! re-sent.  The exchange is bounded by an attempt budget; exhausting it
//! surfaces [`PoseError::SensingUnavailable`].  Only a failing port raises
//! anything else.

use std::str;

use log::{debug, info};

use super::{PoseSourceKind, wrap_degrees};
use crate::app::ports::{Transport, write_all};
use crate::error::PoseError;

/// Longest line accepted from the MCU before it is discarded as noise.
pub const MAX_LINE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GetYaw = 0,
    Offset = 1,
}

impl Command {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::GetYaw => "YAW",
            Self::Offset => "OFFSET",
        }
    }
}

/// Outcome of parsing one reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<'a> {
    /// Expected tag; payload is the second field (trimmed).
    Matched(&'a str),
    /// Tag belongs to some other command.
    Mismatched,
    /// Not UTF-8 or fewer than two fields.
    Garbled,
}

/// Classify a raw reply line against the tag of `command`.
pub fn parse_reply(line: &[u8], command: Command) -> Reply<'_> {
    let Ok(text) = str::from_utf8(line) else {
        return Reply::Garbled;
    };
    let mut fields = text.trim_end_matches(['\r', '\n']).split(',');
    let tag = fields.next().unwrap_or_default().trim();
    if tag != command.tag() {
        return Reply::Mismatched;
    }
    match fields.next() {
        Some(payload) => Reply::Matched(payload.trim()),
        None => Reply::Garbled,
    }
}

/// Parse a boolean-like acknowledgement payload.
pub fn parse_flag(payload: &str) -> Option<bool> {
    match payload {
        "1" | "true" | "True" | "ok" | "OK" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub struct MagneticSensorPose {
    line: Box<dyn Transport>,
    pending: heapless::Vec<u8, MAX_LINE_LEN>,
    /// Skipping the tail of an overlong line up to its newline.
    discarding: bool,
    requests_sent: u64,
}

impl MagneticSensorPose {
    pub fn new(line: Box<dyn Transport>) -> Self {
        Self {
            line,
            pending: heapless::Vec::new(),
            discarding: false,
            requests_sent: 0,
        }
    }

    /// Open the sensor, optionally calibrating it against a reference yaw.
    pub fn open(
        line: Box<dyn Transport>,
        calibration_yaw: Option<f64>,
        max_attempts: u32,
    ) -> Result<Self, PoseError> {
        let mut sensor = Self::new(line);
        if let Some(yaw) = calibration_yaw {
            info!("Calibrating magnet to reference reading {yaw:.1}...");
            let ok = sensor.offset(yaw, max_attempts)?;
            info!("Magnet calibration acknowledged: {ok}");
        }
        Ok(sensor)
    }

    /// Commands written since construction (including re-sends).
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn get_yaw(&mut self, max_attempts: u32) -> Result<f64, PoseError> {
        self.exchange(Command::GetYaw, "", max_attempts, |p| {
            p.parse::<f64>().ok().filter(|y| y.is_finite()).map(wrap_degrees)
        })
    }

    /// Tell the sensor that its current reading corresponds to `yaw`.
    pub fn offset(&mut self, yaw: f64, max_attempts: u32) -> Result<bool, PoseError> {
        self.exchange(Command::Offset, &yaw.to_string(), max_attempts, parse_flag)
    }

    fn exchange<T>(
        &mut self,
        command: Command,
        params: &str,
        max_attempts: u32,
        decode: impl Fn(&str) -> Option<T>,
    ) -> Result<T, PoseError> {
        let request = format!("{},{params}\n", command as u8);
        for attempt in 1..=max_attempts {
            write_all(self.line.as_mut(), request.as_bytes()).map_err(io)?;
            self.requests_sent += 1;

            let Some(line) = self.read_line()? else {
                debug!("{}: no reply (attempt {attempt}), retrying...", command.tag());
                continue;
            };
            match parse_reply(&line, command) {
                Reply::Matched(payload) => {
                    if let Some(value) = decode(payload) {
                        return Ok(value);
                    }
                    info!("{}: error reading from serial port, retrying...", command.tag());
                }
                Reply::Mismatched => {
                    debug!("{}: reply for another command, re-sending", command.tag());
                }
                Reply::Garbled => {
                    info!("{}: error reading from serial port, retrying...", command.tag());
                }
            }
        }
        Err(PoseError::SensingUnavailable {
            source_kind: PoseSourceKind::Magnetic,
            attempts: max_attempts,
        })
    }

    /// Next newline-terminated line, or `None` on read timeout.
    ///
    /// Reads never exceed the free space in `pending`.  A line that fills
    /// it without a newline is dropped up to its terminator; whatever
    /// follows is kept.
    fn read_line(&mut self) -> Result<Option<heapless::Vec<u8, MAX_LINE_LEN>>, PoseError> {
        let mut buf = [0u8; MAX_LINE_LEN];
        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let line = heapless::Vec::from_slice(&self.pending[..=end]).unwrap_or_default();
                let rest = heapless::Vec::from_slice(&self.pending[end + 1..]).unwrap_or_default();
                self.pending = rest;
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                return Ok(Some(line));
            }
            if self.pending.is_full() {
                debug!("Discarding line longer than {MAX_LINE_LEN} bytes");
                self.pending.clear();
                self.discarding = true;
            }

            let free = MAX_LINE_LEN - self.pending.len();
            let n = self.line.read(&mut buf[..free]).map_err(io)?;
            if n == 0 {
                self.discarding = false;
                return Ok(None);
            }
            // Fits: at most `free` bytes were read.
            let _ = self.pending.extend_from_slice(&buf[..n]);
        }
    }
}

fn io(e: std::io::Error) -> PoseError {
    PoseError::Io(e.to_string())
}
