//! Dynamixel servo stack, bottom-up: address tables, packet codec, bus,
//! and the per-servo domain wrapper.

pub mod bus;
pub mod protocol;
pub mod registers;
pub mod unit;
