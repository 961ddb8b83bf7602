//! Shadow-balance ledger: append-only event stream, delta-driven balance
//! projection, and periodic reconciliation against venue truth.

pub mod events;
pub mod reconcile;
pub mod shadow;

pub use events::{content_hash, BalanceSnapshot, ExecutionEvent};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use shadow::{ApplyOutcome, Asset, BalanceHandle, LedgerError, LedgerStats, ShadowLedger};
