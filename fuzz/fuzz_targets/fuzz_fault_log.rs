//! Fuzz target: `FaultLog` over corrupted storage
//!
//! Writes arbitrary bytes into the ring slots and the write index, then
//! reads the log back.  Verifies:
//! - No panics decoding garbage slots
//! - `read_all` never returns more than `FAULT_RING_SLOTS` records
//! - Appending after corruption still yields a readable record
//!
//! cargo fuzz run fuzz_fault_log

#![no_main]

use std::collections::HashMap;

use gripper_rl::app::ports::{StorageError, StoragePort};
use gripper_rl::diagnostics::{FAULT_RING_SLOTS, FaultLog};
use gripper_rl::error::{Component, FaultRecord};
use libfuzzer_sys::fuzz_target;

// ── In-memory StoragePort for fuzz testing ────────────────────

#[derive(Default)]
struct MemStore {
    data: HashMap<String, Vec<u8>>,
}

impl StoragePort for MemStore {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let v = self
            .data
            .get(&format!("{ns}::{key}"))
            .ok_or(StorageError::NotFound)?;
        if v.len() > buf.len() {
            return Err(StorageError::BufferTooSmall(v.len()));
        }
        buf[..v.len()].copy_from_slice(v);
        Ok(v.len())
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.data.insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.data.contains_key(&format!("{ns}::{key}"))
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.data.remove(&format!("{ns}::{key}"));
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Raw decode first: postcard must reject, not panic.
    let _ = postcard::from_bytes::<FaultRecord>(data);

    let mut store = MemStore::default();
    let chunk = (data.len() / FAULT_RING_SLOTS).max(1);
    for (slot, bytes) in data.chunks(chunk).take(FAULT_RING_SLOTS).enumerate() {
        store.write("faults", &format!("f{slot}"), bytes).ok();
    }
    store.write("faults", "fault_idx", &data[..data.len().min(4)]).ok();

    let mut log = FaultLog::new();
    log.init(&store);
    assert!(log.read_all(&store).len() <= FAULT_RING_SLOTS);

    let record = FaultRecord::new(Component::ServoBus, "fuzz", true).with_action(&[1, 2, 3]);
    log.append(&mut store, &record).ok();
    assert!(log.read_all(&store).contains(&record));
});
