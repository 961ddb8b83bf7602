//! Prometheus metrics for the maker engine.

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use tracing::info;

/// All engine metric families behind one registry.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,

    // Trading activity
    pub orders_submitted: IntCounterVec,
    pub orders_canceled: IntCounter,
    pub orders_replaced: IntCounter,
    pub orders_rejected: IntCounterVec,
    pub fills: IntCounterVec,

    // Cross response
    pub cross_latency_ms: Histogram,
    pub cross_slow_responses: IntCounter,

    // Ledger
    pub ledger_events: IntGauge,
    pub ledger_duplicates: IntGauge,
    pub ledger_integrity_errors: IntGauge,
    pub reconcile_force_syncs: IntGauge,

    // Control plane
    pub usage_pct: Gauge,
    pub budgets: IntGaugeVec,
    pub weight_cooldowns: IntGauge,

    // Market data
    pub feed_quality: Gauge,
    pub feed_source_switches: IntGauge,

    // Engine
    pub engine_phase: IntGauge,
    pub open_orders: IntGauge,
    pub onbook_notional_usd: Gauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let ns = "ladder";

        let orders_submitted = IntCounterVec::new(
            Opts::new("orders_submitted_total", "Orders acknowledged by the venue").namespace(ns),
            &["side"],
        )?;
        registry.register(Box::new(orders_submitted.clone()))?;

        let orders_canceled =
            IntCounter::with_opts(Opts::new("orders_canceled_total", "Confirmed cancels").namespace(ns))?;
        registry.register(Box::new(orders_canceled.clone()))?;

        let orders_replaced = IntCounter::with_opts(
            Opts::new("orders_replaced_total", "Confirmed cancel-replaces").namespace(ns),
        )?;
        registry.register(Box::new(orders_replaced.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Rejected outbound orders").namespace(ns),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let fills = IntCounterVec::new(
            Opts::new("fills_total", "Own fills applied to the ledger").namespace(ns),
            &["side"],
        )?;
        registry.register(Box::new(fills.clone()))?;

        let cross_latency_ms = Histogram::with_opts(
            HistogramOpts::new("cross_response_latency_ms", "Fill to opposite-side submit latency")
                .namespace(ns)
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 15.0, 25.0, 50.0, 75.0, 100.0, 200.0]),
        )?;
        registry.register(Box::new(cross_latency_ms.clone()))?;

        let cross_slow_responses = IntCounter::with_opts(
            Opts::new("cross_slow_responses_total", "Cross responses over the latency target")
                .namespace(ns),
        )?;
        registry.register(Box::new(cross_slow_responses.clone()))?;

        let ledger_events =
            IntGauge::with_opts(Opts::new("ledger_events", "Events appended to the ledger").namespace(ns))?;
        registry.register(Box::new(ledger_events.clone()))?;

        let ledger_duplicates = IntGauge::with_opts(
            Opts::new("ledger_duplicates", "Duplicate execution reports skipped").namespace(ns),
        )?;
        registry.register(Box::new(ledger_duplicates.clone()))?;

        let ledger_integrity_errors = IntGauge::with_opts(
            Opts::new("ledger_integrity_errors", "Negative-delta reports rejected").namespace(ns),
        )?;
        registry.register(Box::new(ledger_integrity_errors.clone()))?;

        let reconcile_force_syncs = IntGauge::with_opts(
            Opts::new("reconcile_force_syncs", "Reconciliations that overwrote the shadow")
                .namespace(ns),
        )?;
        registry.register(Box::new(reconcile_force_syncs.clone()))?;

        let usage_pct =
            Gauge::with_opts(Opts::new("usage_pct", "Worst bucket usage, percent").namespace(ns))?;
        registry.register(Box::new(usage_pct.clone()))?;

        let budgets = IntGaugeVec::new(
            Opts::new("budget_10s", "Current 10-second budget per bucket").namespace(ns),
            &["bucket"],
        )?;
        registry.register(Box::new(budgets.clone()))?;

        let weight_cooldowns = IntGauge::with_opts(
            Opts::new("weight_cooldowns", "Times the weight fuse tripped").namespace(ns),
        )?;
        registry.register(Box::new(weight_cooldowns.clone()))?;

        let feed_quality =
            Gauge::with_opts(Opts::new("feed_quality", "Quality of the last snapshot").namespace(ns))?;
        registry.register(Box::new(feed_quality.clone()))?;

        let feed_source_switches = IntGauge::with_opts(
            Opts::new("feed_source_switches", "Market data path switches").namespace(ns),
        )?;
        registry.register(Box::new(feed_source_switches.clone()))?;

        let engine_phase =
            IntGauge::with_opts(Opts::new("engine_phase", "Engine lifecycle phase").namespace(ns))?;
        registry.register(Box::new(engine_phase.clone()))?;

        let open_orders =
            IntGauge::with_opts(Opts::new("open_orders", "Live orders on the book").namespace(ns))?;
        registry.register(Box::new(open_orders.clone()))?;

        let onbook_notional_usd = Gauge::with_opts(
            Opts::new("onbook_notional_usd", "Total resting notional").namespace(ns),
        )?;
        registry.register(Box::new(onbook_notional_usd.clone()))?;

        info!("metrics registry initialized");

        Ok(Self {
            registry,
            orders_submitted,
            orders_canceled,
            orders_replaced,
            orders_rejected,
            fills,
            cross_latency_ms,
            cross_slow_responses,
            ledger_events,
            ledger_duplicates,
            ledger_integrity_errors,
            reconcile_force_syncs,
            usage_pct,
            budgets,
            weight_cooldowns,
            feed_quality,
            feed_source_switches,
            engine_phase,
            open_orders,
            onbook_notional_usd,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_and_gathers() {
        let m = EngineMetrics::new().unwrap();
        m.orders_submitted.with_label_values(&["BUY"]).inc();
        m.cross_latency_ms.observe(12.0);
        let families = m.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "ladder_orders_submitted_total"));
        assert!(families.iter().any(|f| f.get_name() == "ladder_cross_response_latency_ms"));
    }

    #[test]
    fn duplicate_registration_fails_cleanly() {
        // Two registries must not collide; each carries its own families.
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.orders_canceled.inc();
        assert_eq!(b.orders_canceled.get(), 0);
    }
}
