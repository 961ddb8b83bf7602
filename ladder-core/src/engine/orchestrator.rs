//! The orchestrator: three entrypoints, no business logic of its own.
//!
//! One decision worker serializes ticks, fills and the timer for the
//! symbol; the executor worker owns the outbound pipe. When a tick and a
//! fill are both pending, the fill wins — it mutates the inventory the
//! tick's decision depends on.

use super::state::{EnginePhase, EngineState, HealthInputs};
use super::traits::{QuoteInputs, Quoter};
use crate::config::EngineConfig;
use crate::connector::{normalize_execution_report, Connector, MarketEvent};
use crate::core::{Budgets, Bucket, MarketSnapshot, PlannedOrder, Side};
use crate::exec::{BatchExecutor, ExecFeedback, ExecutorCtl, ExecutorHandle};
use crate::ledger::{ApplyOutcome, Asset, Reconciler, ShadowLedger};
use crate::monitoring::EngineMetrics;
use crate::resilience::KillSwitch;
use crate::risk::{BudgetAllocator, BudgetGovernor, GovernorInputs, MakerGuard, MsgCounts, RateGate, WeightMonitor};
use crate::utils::checkpoint::Checkpoint;
use crate::utils::clock::{epoch_ms, epoch_ns};
use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sender side of the engine's inbound streams, handed to the connector
/// plumbing.
#[derive(Clone)]
pub struct EngineChannels {
    pub market_tx: mpsc::Sender<MarketEvent>,
    pub report_tx: mpsc::Sender<Map<String, Value>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub ticks: u64,
    pub fills: u64,
    pub normalize_errors: u64,
    pub integrity_errors: u64,
    pub plans: u64,
    pub skipped_stale: u64,
}

pub struct Engine<Q: Quoter, C: Connector> {
    config: EngineConfig,
    quoter: Q,
    connector: Arc<C>,
    kill: KillSwitch,
    metrics: Arc<EngineMetrics>,

    feed: crate::data::DualPathFeed,
    ledger: ShadowLedger,
    reconciler: Reconciler,
    governor: BudgetGovernor,
    allocator: BudgetAllocator,
    state: EngineState,
    gate: RateGate,
    exec_handle: ExecutorHandle,

    market_rx: mpsc::Receiver<MarketEvent>,
    report_rx: mpsc::Receiver<Map<String, Value>>,
    feedback_rx: mpsc::UnboundedReceiver<ExecFeedback>,

    budgets: Budgets,
    cached_filters: crate::core::SymbolFilters,
    last_mid: Decimal,
    last_quality: f64,
    onbook_usd_10s_ago: f64,
    next_plan_at: Instant,
    force_reconcile: bool,
    cancel_all_sent: bool,
    stats: EngineStats,
    started: Instant,
}

impl<Q: Quoter, C: Connector> Engine<Q, C> {
    /// Build the engine and its executor worker. Fetches symbol filters
    /// and seeds the ledger from venue balances.
    pub async fn init(
        config: EngineConfig,
        quoter: Q,
        connector: Arc<C>,
        kill: KillSwitch,
    ) -> Result<(Self, BatchExecutor<C>, EngineChannels, Arc<EngineMetrics>)> {
        config.validate()?;
        let metrics = Arc::new(EngineMetrics::new().context("metrics registry")?);

        let filters = connector
            .symbol_filters(&config.symbol)
            .await
            .context("fetching symbol filters")?;
        info!(symbol = %config.symbol, ?filters, "symbol filters loaded");

        let weight = Arc::new(WeightMonitor::new(
            config.governor.weight_danger_threshold,
            config.governor.weight_limit,
            config.governor.cooldown_s,
        ));
        let baseline = Budgets::baseline();
        let gate = RateGate::new(
            (baseline.fill_10s, baseline.reprice_10s, baseline.cancel_10s),
            (baseline.burst_fill, baseline.burst_reprice, baseline.burst_cancel),
            weight,
        );

        let guard = MakerGuard::new(
            config.spread.safety_ticks,
            config.spread.high_vol_threshold,
            config.spread.adverse_imbalance_threshold,
        );

        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let (executor, exec_handle) = BatchExecutor::new(
            config.executor.clone(),
            config.symbol.clone(),
            connector.clone(),
            gate.clone(),
            filters.clone(),
            guard,
            feedback_tx,
            metrics.clone(),
        );
        let _ = exec_handle.try_send_ctl(ExecutorCtl::Filters(filters.clone()));

        let mut ledger = ShadowLedger::new(config.ledger.clone());
        match connector.balances().await {
            Ok(balances) => {
                ledger.set_initial_balances(
                    balances.base_total(),
                    balances.quote_total(),
                    epoch_ns(),
                );
            }
            Err(e) => warn!(error = %e, "starting with empty shadow balances"),
        }

        let (market_tx, market_rx) = mpsc::channel(1024);
        let (report_tx, report_rx) = mpsc::channel(256);

        let engine = Self {
            feed: crate::data::DualPathFeed::new(
                config.symbol.clone(),
                config.market_data.clone(),
            ),
            reconciler: Reconciler::new(config.ledger.deviation_threshold_pct),
            governor: BudgetGovernor::new(config.governor.clone()),
            allocator: BudgetAllocator::new(),
            state: EngineState::new(config.startup_delay_s),
            ledger,
            gate,
            exec_handle,
            market_rx,
            report_rx,
            feedback_rx,
            budgets: baseline,
            cached_filters: filters,
            last_mid: Decimal::ZERO,
            last_quality: 0.0,
            onbook_usd_10s_ago: 0.0,
            next_plan_at: Instant::now(),
            force_reconcile: false,
            cancel_all_sent: false,
            stats: EngineStats::default(),
            started: Instant::now(),
            config,
            quoter,
            connector,
            kill,
            metrics: metrics.clone(),
        };

        Ok((engine, executor, EngineChannels { market_tx, report_tx }, metrics))
    }

    /// Event loop. Returns once the kill switch fires and the cancel-all
    /// has been handed to the executor.
    pub async fn run(mut self) -> Result<EngineStats> {
        self.state.start(epoch_ms());
        let mut timer = tokio::time::interval(Duration::from_secs(1));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut seconds: u64 = 0;

        info!(symbol = %self.config.symbol, quoter = self.quoter.name(), "engine started");

        loop {
            if self.kill.should_stop() {
                self.enter_kill_switch().await;
                return Ok(self.stats);
            }

            tokio::select! {
                biased;

                report = self.report_rx.recv() => match report {
                    Some(raw) => self.on_fill(raw).await,
                    None => {
                        warn!("report stream closed, shutting down");
                        self.kill.shutdown("report stream closed");
                    }
                },
                Some(feedback) = self.feedback_rx.recv() => self.on_feedback(feedback),
                event = self.market_rx.recv() => match event {
                    Some(event) => self.on_tick(event).await,
                    None => {
                        warn!("market stream closed, shutting down");
                        self.kill.shutdown("market stream closed");
                    }
                },
                _ = timer.tick() => {
                    seconds += 1;
                    self.on_timer(seconds).await;
                }
            }
        }
    }

    /// Market-data entrypoint.
    async fn on_tick(&mut self, event: MarketEvent) {
        self.stats.ticks += 1;
        let now_ns = epoch_ns();

        match &event {
            MarketEvent::Trade(trade) => {
                self.quoter.observe_trade(trade.price, trade.qty, now_ns);
            }
            MarketEvent::Depth(depth) => {
                if let (Some(&(_, bid_qty)), Some(&(_, ask_qty))) =
                    (depth.bids.first(), depth.asks.first())
                {
                    self.quoter.observe_depth(bid_qty, ask_qty);
                }
            }
        }
        self.feed.apply(&event, now_ns);

        if let Some(top) = self.feed.top_of_book() {
            let _ = self.exec_handle.try_send_ctl(ExecutorCtl::Top(top));
        }

        let snapshot = self.feed.snapshot(now_ns);
        self.last_mid = snapshot.mid;
        self.last_quality = snapshot.quality;
        self.quoter.observe_tick(&snapshot);

        self.update_phase();
        self.maybe_quote(&snapshot);
    }

    /// Own-fill entrypoint. Ledger first, then the cross response.
    async fn on_fill(&mut self, raw: Map<String, Value>) {
        let received = Instant::now();
        let report = match normalize_execution_report(&raw) {
            Ok(report) => report,
            Err(e) => {
                self.stats.normalize_errors += 1;
                warn!(error = %e, "unusable execution report dropped");
                return;
            }
        };

        let outcome = match self.ledger.apply(&report, epoch_ns()) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.integrity_errors += 1;
                self.force_reconcile = true;
                error!(error = %e, "ledger integrity violation, reconcile forced");
                return;
            }
        };

        if outcome == ApplyOutcome::Duplicate {
            return;
        }

        let traded = matches!(outcome, ApplyOutcome::Applied { .. }) && report.has_fill();
        if traded {
            self.stats.fills += 1;
            self.metrics.fills.with_label_values(&[report.side.as_str()]).inc();

            let mid = if self.last_mid > Decimal::ZERO { self.last_mid } else { report.price };
            let inventory = self.ledger.inventory_at(mid, self.config.target_weight);

            if self.state.can_quote() {
                let _ = self.exec_handle.try_send_ctl(ExecutorCtl::Cross {
                    fill_side: report.side,
                    fill_order_id: report.order_id,
                    imbalance: inventory.imbalance,
                    fill_qty: report.last_qty,
                    received,
                });
            }
        }

        // Keep the live table in sync after the cross directive resolved
        // its layer.
        let _ = self.exec_handle.try_send_ctl(ExecutorCtl::Report(report));
    }

    /// Periodic entrypoint: reconcile, budget recompute, metrics.
    async fn on_timer(&mut self, seconds: u64) {
        self.update_phase();

        if seconds % 10 == 0 {
            self.recompute_budgets();
        }

        let interval = self.config.ledger.reconcile_interval_s.max(1);
        if self.force_reconcile || seconds % interval == 0 {
            self.force_reconcile = false;
            self.reconcile().await;
        }

        // Keep the cross-response cache warm at the current imbalance so
        // the next fill hits a precomputed directive.
        if self.last_mid > Decimal::ZERO {
            let inventory = self.ledger.inventory_at(self.last_mid, self.config.target_weight);
            let _ = self
                .exec_handle
                .try_send_ctl(ExecutorCtl::Precompute { imbalance: inventory.imbalance });
        }

        self.publish_metrics();
    }

    fn on_feedback(&mut self, feedback: ExecFeedback) {
        match feedback {
            ExecFeedback::FilterRejected { side, layer, reason } => {
                debug!(%side, %layer, reason, "filter reject fed back to planner");
                self.quoter.on_filter_reject(side, layer);
            }
            ExecFeedback::WouldMatchGaveUp { side, layer } => {
                warn!(%side, %layer, "post-only retry exhausted, side constrained");
                self.quoter.on_filter_reject(side, layer);
            }
            ExecFeedback::InflightUnknown { client_order_id } => {
                debug!(client_order_id, "inflight unknown, probing on next timer");
                self.force_reconcile = true;
            }
            ExecFeedback::RateLimited { retry_after_s } => {
                warn!(retry_after_s, "venue rate limit, cooldown engaged");
            }
        }
    }

    fn update_phase(&mut self) {
        let phase = self.state.update(
            epoch_ms(),
            HealthInputs {
                quality: self.last_quality,
                usage_pct: self.gate.usage_pct(),
                usage_safe_pct: self.config.governor.usage_safe_pct,
                kill_triggered: self.kill.should_stop(),
            },
        );
        self.metrics.engine_phase.set(phase.code());
    }

    /// Plan the ladder and hand the missing slots to the executor.
    fn maybe_quote(&mut self, snapshot: &MarketSnapshot) {
        if !self.state.can_quote() || self.kill.is_paused() {
            return;
        }
        if !snapshot.is_tradable() {
            self.stats.skipped_stale += 1;
            return;
        }
        // Back off while the previous batch is still queued, and bound
        // the planning rate.
        if self.exec_handle.queue_len() > 0 || Instant::now() < self.next_plan_at {
            return;
        }
        self.next_plan_at = Instant::now() + Duration::from_millis(100);

        let inventory = self.ledger.inventory_at(snapshot.mid, self.config.target_weight);
        let filters = self.filters_for_planning();
        let inputs = QuoteInputs {
            snapshot,
            inventory: &inventory,
            budgets: &self.budgets,
            filters: &filters,
            top: self.feed.top_of_book(),
            free_base: self.ledger.available(Asset::Base),
            free_quote: self.ledger.available(Asset::Quote),
            degraded: self.state.is_degraded(),
        };
        let planned = self.quoter.plan(&inputs);
        if planned.is_empty() {
            return;
        }
        self.stats.plans += 1;

        let missing = self.missing_slots(planned);
        if missing.is_empty() {
            return;
        }

        if self.should_burst(&missing) {
            let _ = self.exec_handle.try_send_ctl(ExecutorCtl::BurstDeploy(missing));
            // Waves take a few batch cycles to land; don't re-plan into
            // a table that has not caught up yet.
            self.next_plan_at = Instant::now() + Duration::from_millis(400);
        } else {
            self.exec_handle.submit_ladder(missing);
        }
    }

    /// Planner view of the symbol filters. Read-mostly: loaded at init,
    /// refreshed only if a bounded refresh task replaces them.
    fn filters_for_planning(&self) -> crate::core::SymbolFilters {
        self.cached_filters.clone()
    }

    /// Drop planned orders whose (side, layer) slot is already occupied.
    fn missing_slots(&self, planned: Vec<PlannedOrder>) -> Vec<PlannedOrder> {
        let view = self.exec_handle.view();
        let mut open = view.slot_counts;
        let mut missing = Vec::with_capacity(planned.len());
        for order in planned {
            let si = match order.side {
                Side::Buy => 0,
                Side::Sell => 1,
            };
            let li = order.layer.index();
            if open[si][li] > 0 {
                open[si][li] -= 1;
                continue;
            }
            missing.push(order);
        }
        missing
    }

    /// Burst when idle cash is worth deploying and the gap is wide.
    fn should_burst(&self, missing: &[PlannedOrder]) -> bool {
        let free_quote = self.ledger.available(Asset::Quote);
        if free_quote < self.config.executor.min_deployable_notional {
            return false;
        }
        let onbook = self.exec_handle.view().onbook_total();
        let total = onbook + free_quote + self.ledger.available(Asset::Base) * self.last_mid;
        let deployment_ratio = if total > Decimal::ZERO {
            (onbook / total).to_f64().unwrap_or(1.0)
        } else {
            1.0
        };
        deployment_ratio < self.config.executor.max_deployment_ratio
            && missing.len() >= self.config.executor.burst_size / 2
    }

    fn recompute_budgets(&mut self) {
        let targets = self.quoter.concurrency_targets();
        let (fill_n, reprice_n, cancel_n) = self.gate.window_counts();
        let view = self.exec_handle.view();
        let onbook_now = view.onbook_total().to_f64().unwrap_or(0.0);

        let inventory = self.ledger.inventory_at(
            if self.last_mid > Decimal::ZERO { self.last_mid } else { Decimal::ONE },
            self.config.target_weight,
        );

        let inputs = GovernorInputs {
            n_l0: targets.n_l0,
            n_l1: targets.n_l1,
            n_l2: targets.n_l2,
            ttl_l0_s: targets.ttl_l0_s,
            ttl_l1_s: targets.ttl_l1_s,
            ttl_l2_s: targets.ttl_l2_s,
            msg_10s: MsgCounts { fill: fill_n, reprice: reprice_n, cancel: cancel_n },
            usage_pct: self.gate.usage_pct(),
            onbook_usd_now: onbook_now,
            onbook_usd_10s_ago: self.onbook_usd_10s_ago,
            inventory_err: inventory.error(),
        };
        self.onbook_usd_10s_ago = onbook_now;

        let budgets = self.governor.step(self.started.elapsed().as_secs_f64(), &inputs);

        // Allocator: usage feedback, dynamic bursts, borrowing.
        let now_s = self.started.elapsed().as_secs_f64();
        self.allocator.record_usage(now_s, Bucket::Fill, fill_n, budgets.fill_10s);
        self.allocator.record_usage(now_s, Bucket::Reprice, reprice_n, budgets.reprice_10s);
        self.allocator.record_usage(now_s, Bucket::Cancel, cancel_n, budgets.cancel_10s);
        self.allocator.set_emergency_level(if self.state.is_degraded() { 1.0 } else { 0.0 });
        let allocation = self.allocator.optimize(
            now_s,
            [budgets.fill_10s, budgets.reprice_10s, budgets.cancel_10s],
        );

        self.budgets = Budgets {
            fill_10s: allocation.budgets[0],
            reprice_10s: allocation.budgets[1],
            cancel_10s: allocation.budgets[2],
            burst_fill: allocation.bursts[0],
            burst_reprice: allocation.bursts[1],
            burst_cancel: allocation.bursts[2],
            ..budgets
        };

        self.gate.reconfigure(Bucket::Fill, self.budgets.fill_10s, self.budgets.burst_fill);
        self.gate.reconfigure(Bucket::Reprice, self.budgets.reprice_10s, self.budgets.burst_reprice);
        self.gate.reconfigure(Bucket::Cancel, self.budgets.cancel_10s, self.budgets.burst_cancel);

        debug!(
            fill = self.budgets.fill_10s,
            reprice = self.budgets.reprice_10s,
            cancel = self.budgets.cancel_10s,
            alpha = self.budgets.alpha,
            "budgets applied"
        );
    }

    async fn reconcile(&mut self) {
        let mut backoff = crate::resilience::ExponentialBackoff::new(
            crate::resilience::BackoffConfig {
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                multiplier: 2.0,
                max_retries: Some(3),
                jitter_factor: 0.1,
            },
        );
        loop {
            match self.connector.balances().await {
                Ok(balances) => {
                    self.reconciler.check(
                        &mut self.ledger,
                        balances.base_total(),
                        balances.quote_total(),
                        epoch_ns(),
                    );
                    return;
                }
                Err(e) if e.is_transient() => match backoff.next_delay() {
                    Some(delay) => {
                        debug!(error = %e, ?delay, "reconcile fetch failed, backing off");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(error = %e, "reconcile abandoned until next interval");
                        return;
                    }
                },
                Err(e) => {
                    debug!(error = %e, "reconcile fetch rejected, retrying next interval");
                    return;
                }
            }
        }
    }

    async fn enter_kill_switch(&mut self) {
        if !self.cancel_all_sent {
            self.cancel_all_sent = true;
            info!("kill switch: cancel-all dispatched");
            let _ = self.exec_handle.send_ctl(ExecutorCtl::CancelAll).await;
        }
        self.update_phase();
    }

    fn publish_metrics(&self) {
        let ledger_stats = self.ledger.stats();
        self.metrics.ledger_events.set(self.ledger.seq() as i64);
        self.metrics.ledger_duplicates.set(ledger_stats.duplicates as i64);
        self.metrics.ledger_integrity_errors.set(ledger_stats.negative_delta as i64);
        self.metrics.reconcile_force_syncs.set(self.reconciler.force_sync_count() as i64);

        self.metrics.usage_pct.set(self.gate.usage_pct());
        for (bucket, value) in [
            ("fill", self.budgets.fill_10s),
            ("reprice", self.budgets.reprice_10s),
            ("cancel", self.budgets.cancel_10s),
        ] {
            self.metrics.budgets.with_label_values(&[bucket]).set(value as i64);
        }
        self.metrics.weight_cooldowns.set(self.gate.weight().trip_count() as i64);

        let feed_stats = self.feed.stats();
        self.metrics.feed_quality.set(self.last_quality);
        self.metrics.feed_source_switches.set(feed_stats.source_switches as i64);

        let view = self.exec_handle.view();
        self.metrics.open_orders.set(view.open_orders as i64);
        self.metrics
            .onbook_notional_usd
            .set(view.onbook_total().to_f64().unwrap_or(0.0));
    }

    /// Capture a resumable checkpoint of the decision-side state.
    pub fn capture_checkpoint(&self) -> Checkpoint {
        let (ema_usage, ema_mpd) = self.governor.ema_stats();
        Checkpoint {
            symbol: self.config.symbol.clone(),
            ledger_head: self.ledger.snapshot(),
            live_orders: Vec::new(), // executor-owned; merged by the caller
            pid_integrator: self.governor.integrator(),
            ema_usage,
            ema_mpd,
            captured_ts_ns: epoch_ns(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.phase()
    }
}
