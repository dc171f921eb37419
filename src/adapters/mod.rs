//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                  |
//! |---------------|--------------------|------------------------------|
//! | `serial`      | Transport          | tty device (servo bus, MCU)  |
//! | `storage`     | StoragePort        | run directory on disk        |
//! | `config_file` | ConfigPort         | JSON config file             |
//! | `time`        | Clock, DelayNs     | std monotonic clock, sleep   |
//! | `log_sink`    | EventSink          | `log` records                |
//! | `bringup`     | Agent, ReplayMemory| uniform-random placeholders  |

pub mod bringup;
pub mod config_file;
pub mod log_sink;
#[cfg(unix)]
pub mod serial;
pub mod storage;
pub mod time;
