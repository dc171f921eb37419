//! One-shot recovery cascade.
//!
//! ```text
//!   fault ──▶ recoverable? ──no──▶ fatal
//!                 │yes
//!                 ▼
//!            one attempt ──err──▶ fatal (no second attempt)
//!                 │ok
//!                 ▼
//!              resume
//! ```
//!
//! The cascade never retries a recovery.  Hardware that is still faulted
//! after one home-and-resume is treated as unsafe to drive automatically.

use log::{error, info, warn};

use crate::error::{EnvironmentError, FaultRecord};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryCascade {
    attempts: u32,
    recoveries: u32,
}

impl RecoveryCascade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recovery attempts made so far (successful or not).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts that brought the system back.
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// Try `recover` once for `fault`.
    ///
    /// Returns the recovered value, or the record to escalate: `fault`
    /// itself when it is not recoverable, otherwise a non-recoverable
    /// record describing why the attempt failed.
    pub fn run<T>(
        &mut self,
        fault: &FaultRecord,
        recover: impl FnOnce() -> Result<T, EnvironmentError>,
    ) -> Result<T, FaultRecord> {
        if !fault.recoverable {
            error!("Unrecoverable fault: {fault}");
            return Err(fault.clone());
        }

        warn!("Recoverable fault, attempting recovery: {fault}");
        self.attempts += 1;
        match recover() {
            Ok(value) => {
                self.recoveries += 1;
                info!("Recovered from {} fault", fault.component);
                Ok(value)
            }
            Err(e) => {
                let escalated = FaultRecord::from_environment(&e);
                let message = format!("recovery after {} failed: {e}", fault.component);
                let mut record = FaultRecord::new(escalated.component, &message, false)
                    .at_step(fault.total_step)
                    .with_action(&fault.action);
                record.motor_id = escalated.motor_id.or(fault.motor_id);
                error!("{record}");
                Err(record)
            }
        }
    }
}
