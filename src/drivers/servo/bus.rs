//! Packet bus: [`ServoChannel`] over a byte [`Transport`].
//!
//! One transaction is exactly one instruction packet followed by one status
//! packet.  Stale input is discarded before sending so a late reply from a
//! previous, timed-out transaction cannot be mistaken for the current one.
//! A read that returns no bytes within the transport's timeout fails the
//! transaction with [`CommFailure::Timeout`]; nothing is retried here.

use log::{debug, warn};

use super::protocol::{
    MAX_PACKET_LEN, Instruction, StatusDecoder, StatusPacket, encode_instruction, read_params,
    write_params,
};
use super::registers::{Register, RegisterEntry};
use crate::app::ports::{ServoChannel, Transport, write_all};
use crate::error::{CommError, CommFailure};

const READ_CHUNK: usize = 64;

pub struct PacketBus<T> {
    transport: T,
    decoder: StatusDecoder,
}

impl<T: Transport> PacketBus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: StatusDecoder::new(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn transact(
        &mut self,
        motor_id: u8,
        register: Register,
        instruction: Instruction,
        params: &[u8],
    ) -> Result<StatusPacket, CommError> {
        let fail = |reason| CommError::new(motor_id, register, reason);
        let io = |e: std::io::Error| fail(CommFailure::Io(e.to_string()));

        let mut packet = [0u8; MAX_PACKET_LEN];
        let len = encode_instruction(motor_id, instruction, params, &mut packet)
            .ok_or_else(|| fail(CommFailure::Malformed))?;

        self.transport.clear_input().map_err(io)?;
        write_all(&mut self.transport, &packet[..len]).map_err(io)?;
        self.decoder.reset();

        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = self.transport.read(&mut buf).map_err(io)?;
            if n == 0 {
                return Err(fail(CommFailure::Timeout));
            }
            let mut offset = 0;
            while offset < n {
                let (used, framed) = self.decoder.feed(&buf[offset..n]);
                offset += used;
                let Some(result) = framed else { continue };
                let status = result.map_err(fail)?;
                if status.id != motor_id {
                    return Err(fail(CommFailure::WrongResponder {
                        expected: motor_id,
                        got: status.id,
                    }));
                }
                if status.error_code() != 0 {
                    return Err(fail(CommFailure::Nack(status.error_code())));
                }
                if status.hardware_alert() {
                    warn!("Dynamixel#{motor_id}: hardware alert flag set");
                }
                return Ok(status);
            }
        }
    }
}

impl<T: Transport> ServoChannel for PacketBus<T> {
    fn read(&mut self, motor_id: u8, entry: RegisterEntry) -> Result<u32, CommError> {
        let status = self.transact(
            motor_id,
            entry.register,
            Instruction::Read,
            &read_params(entry.address, entry.width),
        )?;
        status
            .value(entry.width)
            .ok_or_else(|| CommError::new(motor_id, entry.register, CommFailure::Malformed))
    }

    fn write(&mut self, motor_id: u8, entry: RegisterEntry, value: u32) -> Result<(), CommError> {
        if entry.register.is_read_only() {
            return Err(CommError::new(motor_id, entry.register, CommFailure::ReadOnly));
        }
        debug!(
            "Dynamixel#{motor_id}: write {}@{} = {value}",
            entry.register, entry.address
        );
        let params = write_params(entry.address, entry.width, value & entry.max_value());
        self.transact(motor_id, entry.register, Instruction::Write, &params)
            .map(|_| ())
    }
}
