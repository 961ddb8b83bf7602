//! Small shared utilities.

pub mod checkpoint;
pub mod clock;
pub mod ids;
pub mod logger;

pub use checkpoint::{Checkpoint, CheckpointBlob, CheckpointError};
