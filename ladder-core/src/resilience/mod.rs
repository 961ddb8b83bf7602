//! Failure handling: the kill switch and retry backoff.

pub mod backoff;
pub mod kill_switch;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use kill_switch::{KillSwitch, KillSwitchState};
