//! Persistent fault log.
//!
//! Stores the last 8 [`FaultRecord`]s in a ring under the "faults"
//! namespace of a [`StoragePort`], postcard-encoded, one key per slot plus
//! a write index.  Every fault the orchestrator sees is appended, recovered
//! or not, so the log survives the process and explains a fatal exit.

use core::fmt::Write as _;

use log::warn;

use crate::app::ports::{StorageError, StoragePort};
use crate::error::FaultRecord;

pub const FAULT_RING_SLOTS: usize = 8;
const FAULT_NAMESPACE: &str = "faults";
const FAULT_INDEX_KEY: &str = "fault_idx";
const MAX_ENCODED_LEN: usize = 512;

#[derive(Debug, Default)]
pub struct FaultLog {
    write_index: usize,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after the slot written last by a previous run.
    pub fn init(&mut self, storage: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = storage.read(FAULT_NAMESPACE, FAULT_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % FAULT_RING_SLOTS;
        }
    }

    pub fn append(
        &mut self,
        storage: &mut dyn StoragePort,
        record: &FaultRecord,
    ) -> Result<(), StorageError> {
        let bytes =
            postcard::to_allocvec(record).map_err(|e| StorageError::Encoding(e.to_string()))?;
        storage.write(FAULT_NAMESPACE, &Self::slot_key(self.write_index), &bytes)?;

        self.write_index = (self.write_index + 1) % FAULT_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        storage.write(FAULT_NAMESPACE, FAULT_INDEX_KEY, &idx_bytes)
    }

    /// Stored records, oldest first.  Undecodable slots are skipped.
    pub fn read_all(&self, storage: &dyn StoragePort) -> Vec<FaultRecord> {
        let mut records = Vec::new();
        for offset in 0..FAULT_RING_SLOTS {
            let slot = (self.write_index + offset) % FAULT_RING_SLOTS;
            let mut buf = [0u8; MAX_ENCODED_LEN];
            let Ok(len) = storage.read(FAULT_NAMESPACE, &Self::slot_key(slot), &mut buf) else {
                continue;
            };
            match postcard::from_bytes::<FaultRecord>(&buf[..len]) {
                Ok(record) => records.push(record),
                Err(e) => warn!("fault log slot {slot} unreadable: {e}"),
            }
        }
        records
    }

    pub fn clear(&mut self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        for i in 0..FAULT_RING_SLOTS {
            storage.delete(FAULT_NAMESPACE, &Self::slot_key(i))?;
        }
        storage.delete(FAULT_NAMESPACE, FAULT_INDEX_KEY)?;
        self.write_index = 0;
        Ok(())
    }

    pub fn count(&self, storage: &dyn StoragePort) -> usize {
        (0..FAULT_RING_SLOTS)
            .filter(|i| storage.exists(FAULT_NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    fn slot_key(index: usize) -> heapless::String<16> {
        let mut s = heapless::String::new();
        let _ = write!(s, "f{index}");
        s
    }
}
