//! REST handlers.

mod beacon;
mod operator;
mod system;

pub use beacon::{beacon_checkin, beacon_handshake};
pub use operator::{beacon_history, create_task, get_task, list_beacons};
pub use system::{daemon_status, health_check};
