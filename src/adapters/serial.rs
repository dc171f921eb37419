//! Serial tty transport.
//!
//! Opens a tty device in raw mode at a fixed baud rate with a read
//! timeout, and implements [`Transport`] for the servo bus and the
//! magnetic-sensor line.
//!
//! The timeout is the termios `VMIN = 0, VTIME = n` mode: `read` returns
//! whatever arrived within `n` deciseconds, or 0 bytes on timeout.  That
//! zero-length read is what the protocol layers treat as "no reply".

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use log::info;
use nix::sys::termios::{
    self, BaudRate, FlushArg, SetArg, SpecialCharacterIndices,
};

use crate::app::ports::Transport;

pub struct TtyTransport {
    file: File,
}

impl TtyTransport {
    pub fn open(path: impl AsRef<Path>, baudrate: u32, read_timeout: Duration) -> io::Result<Self> {
        let path = path.as_ref();
        let speed = baud_rate(baudrate)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(path)?;

        let mut tty = termios::tcgetattr(&file)?;
        termios::cfmakeraw(&mut tty);
        termios::cfsetspeed(&mut tty, speed)?;
        tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tty.control_chars[SpecialCharacterIndices::VTIME as usize] = deciseconds(read_timeout);
        termios::tcsetattr(&file, SetArg::TCSANOW, &tty)?;
        termios::tcflush(&file, FlushArg::TCIOFLUSH)?;

        info!(
            "Opened {} at {baudrate} baud, read timeout {} ms",
            path.display(),
            read_timeout.as_millis()
        );
        Ok(Self { file })
    }
}

impl Transport for TtyTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        termios::tcdrain(&self.file)?;
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        termios::tcflush(&self.file, FlushArg::TCIFLUSH)?;
        Ok(())
    }
}

fn baud_rate(baudrate: u32) -> io::Result<BaudRate> {
    Ok(match baudrate {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {other}"),
            ));
        }
    })
}

/// termios VTIME: deciseconds, 1..=255.
fn deciseconds(timeout: Duration) -> u8 {
    timeout.as_millis().div_ceil(100).clamp(1, 255) as u8
}
