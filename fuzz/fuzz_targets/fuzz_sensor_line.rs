//! Fuzz target: magnetic-sensor reply parsing
//!
//! Classifies arbitrary reply lines against both commands and decodes any
//! matched payload the way the sensor does.  Must never panic, and a
//! decoded yaw must always be wrapped into `[0, 360)`.
//!
//! cargo fuzz run fuzz_sensor_line

#![no_main]

use gripper_rl::sensors::magnetic::{Command, Reply, parse_flag, parse_reply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Reply::Matched(payload) = parse_reply(data, Command::GetYaw) {
        if let Some(yaw) = payload.parse::<f64>().ok().filter(|y| y.is_finite()) {
            let wrapped = yaw.rem_euclid(360.0);
            assert!((0.0..=360.0).contains(&wrapped));
        }
    }
    if let Reply::Matched(payload) = parse_reply(data, Command::Offset) {
        let _ = parse_flag(payload);
    }
});
