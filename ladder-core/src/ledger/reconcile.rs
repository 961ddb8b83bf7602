//! Periodic reconciliation of the shadow ledger against venue truth.

use super::shadow::ShadowLedger;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Deviations below threshold; nothing changed.
    InSync,
    /// Shadow balances were overwritten with venue truth.
    ForceSynced { base_dev: f64, quote_dev: f64 },
}

pub struct Reconciler {
    /// Relative deviation that forces a sync, as a fraction (0.001 = 0.1%).
    threshold: Decimal,
    reconcile_count: u64,
    force_sync_count: u64,
}

impl Reconciler {
    pub fn new(deviation_threshold_pct: f64) -> Self {
        Self {
            threshold: Decimal::from_f64(deviation_threshold_pct / 100.0)
                .unwrap_or_else(|| Decimal::new(1, 3)),
            reconcile_count: 0,
            force_sync_count: 0,
        }
    }

    fn relative_dev(real: Decimal, shadow: Decimal) -> Decimal {
        let floor = Decimal::new(1, 2); // avoid blowing up on dust balances
        (real - shadow).abs() / real.abs().max(floor)
    }

    /// Compare shadow balances with venue truth and force-sync past the
    /// threshold.
    pub fn check(
        &mut self,
        ledger: &mut ShadowLedger,
        real_base: Decimal,
        real_quote: Decimal,
        now_ns: u64,
    ) -> ReconcileOutcome {
        self.reconcile_count += 1;
        let (shadow_base, shadow_quote) = ledger.balances();

        let base_dev = Self::relative_dev(real_base, shadow_base);
        let quote_dev = Self::relative_dev(real_quote, shadow_quote);

        if base_dev > self.threshold || quote_dev > self.threshold {
            warn!(
                %real_base, %shadow_base, %base_dev,
                %real_quote, %shadow_quote, %quote_dev,
                "shadow deviation over threshold, forcing sync"
            );
            ledger.force_set(real_base, real_quote, now_ns);
            self.force_sync_count += 1;
            info!(%real_base, %real_quote, "shadow force-synced to venue truth");
            use rust_decimal::prelude::ToPrimitive;
            ReconcileOutcome::ForceSynced {
                base_dev: base_dev.to_f64().unwrap_or(0.0),
                quote_dev: quote_dev.to_f64().unwrap_or(0.0),
            }
        } else {
            debug!(%base_dev, %quote_dev, "shadow within tolerance");
            ReconcileOutcome::InSync
        }
    }

    pub fn reconcile_count(&self) -> u64 {
        self.reconcile_count
    }

    pub fn force_sync_count(&self) -> u64 {
        self.force_sync_count
    }
}
