//! Board-independent pieces of the firmware.
//!
//! Anything here can be exercised by the on-target unit tests without
//! bringing up the network or the peripherals.

#![no_std]

extern crate alloc;

pub mod heap;
pub mod indicator;
pub mod site;
pub mod switch;
