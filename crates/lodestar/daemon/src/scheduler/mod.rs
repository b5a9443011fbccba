//! Background maintenance.
//!
//! The only scheduled job is the reaper: a fixed-interval sweep that demotes
//! beacons that stopped checking in.

mod reaper;

pub use reaper::Reaper;
