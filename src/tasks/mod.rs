//! Background Tasks Module
//!
//! # Tasks
//! - TTL Sweep: Removes expired memory-backend entries at a configured interval

mod sweep;

pub use sweep::SweepTask;
