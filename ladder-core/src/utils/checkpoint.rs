//! Content-addressed engine checkpoints.
//!
//! A checkpoint captures everything needed to resume quoting without
//! waiting for the venue: the ledger head, the live-order table, the PID
//! integrator and the governor's EMA state. The blob is plain serialized
//! bytes plus a 128-bit content hash; storage and compression belong to
//! whatever sink the operator points at it.

use crate::core::LiveOrder;
use crate::ledger::BalanceSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckpointError {
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("deserialization failed: {0}")]
    Deserialize(String),
    #[error("content hash mismatch: expected {expected:032x}, got {actual:032x}")]
    HashMismatch { expected: u128, actual: u128 },
}

/// Resumable engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub symbol: String,
    pub ledger_head: BalanceSnapshot,
    pub live_orders: Vec<LiveOrder>,
    pub pid_integrator: f64,
    /// Governor EMA statistics: (usage, messages-per-delta).
    pub ema_usage: Option<f64>,
    pub ema_mpd: Option<f64>,
    pub captured_ts_ns: u64,
}

/// Serialized checkpoint with its content address.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointBlob {
    pub bytes: Vec<u8>,
    pub hash: u128,
}

fn hash_bytes(bytes: &[u8]) -> u128 {
    let digest = blake3::hash(bytes);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_le_bytes(out)
}

impl Checkpoint {
    pub fn to_blob(&self) -> Result<CheckpointBlob, CheckpointError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| CheckpointError::Serialize(e.to_string()))?;
        let hash = hash_bytes(&bytes);
        Ok(CheckpointBlob { bytes, hash })
    }

    /// Decode a blob, validating the content hash first.
    pub fn from_blob(blob: &CheckpointBlob) -> Result<Self, CheckpointError> {
        let actual = hash_bytes(&blob.bytes);
        if actual != blob.hash {
            return Err(CheckpointError::HashMismatch { expected: blob.hash, actual });
        }
        serde_json::from_slice(&blob.bytes)
            .map_err(|e| CheckpointError::Deserialize(e.to_string()))
    }
}
