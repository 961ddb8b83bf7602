//! Batch executor: owns the live-order table and the outbound pipe.
//!
//! Operations accumulate for one micro-batch window (or until the burst
//! size is reached) and flush concurrently. Cross-response directives skip
//! the batch entirely. A TTL sweep cancels overstayed orders, and a burst
//! deploy pushes a fresh ladder out in layer waves when idle cash appears.

use super::cross_response::{AdjustmentKind, CrossResponder, LatencySummary};
use super::queue::{OpPriority, OpQueue, OrderOp, QueuedOp};
use crate::config::ExecutorConfig;
use crate::connector::{
    CancelReplaceRequest, CancelRequest, Connector, ConnectorError, OrderType, SubmitAck,
    SubmitRequest, TimeInForce,
};
use crate::core::{
    Bucket, ExecReport, Layer, LiveOrder, LiveState, PlannedOrder, Side, SymbolFilters, TopOfBook,
};
use crate::monitoring::EngineMetrics;
use crate::resilience::KillSwitch;
use crate::risk::{pretrade_sanitize, GuardContext, MakerGuard, RateGate};
use crate::utils::clock::epoch_ns;
use crate::utils::ids::new_client_order_id;
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Events surfaced back to the decision side.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecFeedback {
    FilterRejected { side: Side, layer: Layer, reason: String },
    WouldMatchGaveUp { side: Side, layer: Layer },
    InflightUnknown { client_order_id: String },
    RateLimited { retry_after_s: u64 },
}

/// Control messages from the orchestrator.
#[derive(Debug)]
pub enum ExecutorCtl {
    Top(TopOfBook),
    Filters(SymbolFilters),
    Report(ExecReport),
    Cross {
        fill_side: Side,
        fill_order_id: u64,
        imbalance: f64,
        fill_qty: Decimal,
        received: Instant,
    },
    BurstDeploy(Vec<PlannedOrder>),
    /// Warm the cross-response cache at the current imbalance.
    Precompute { imbalance: f64 },
    CancelAll,
}

/// Shared read-only view of executor state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecView {
    pub open_orders: usize,
    pub onbook_buy_notional: Decimal,
    pub onbook_sell_notional: Decimal,
    pub pending_ops: usize,
    /// Open orders per [side][layer], buy = 0.
    pub slot_counts: [[u32; 3]; 2],
}

impl ExecView {
    pub fn onbook_total(&self) -> Decimal {
        self.onbook_buy_notional + self.onbook_sell_notional
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutorStats {
    pub submitted: u64,
    pub canceled: u64,
    pub replaced: u64,
    pub rejected: u64,
    pub would_match_retries: u64,
    pub ttl_cancels: u64,
    pub timeouts: u64,
    pub batches_flushed: u64,
    pub burst_deploys: u64,
    pub gate_denials: u64,
}

/// Producer-side handle held by the orchestrator.
#[derive(Clone)]
pub struct ExecutorHandle {
    queue: Arc<OpQueue>,
    ctl: mpsc::Sender<ExecutorCtl>,
    view: Arc<RwLock<ExecView>>,
}

impl ExecutorHandle {
    pub fn enqueue(&self, priority: OpPriority, op: OrderOp) -> bool {
        self.queue
            .push(QueuedOp { priority, op, enqueued_ns: epoch_ns() })
            .is_ok()
    }

    pub fn submit_ladder(&self, orders: Vec<PlannedOrder>) -> usize {
        let mut accepted = 0;
        for order in orders {
            if self.enqueue(OpPriority::Create, OrderOp::Submit { order, critical: false }) {
                accepted += 1;
            }
        }
        accepted
    }

    pub async fn send_ctl(&self, ctl: ExecutorCtl) -> bool {
        self.ctl.send(ctl).await.is_ok()
    }

    /// Non-async best-effort variant for synchronous call sites.
    pub fn try_send_ctl(&self, ctl: ExecutorCtl) -> bool {
        self.ctl.try_send(ctl).is_ok()
    }

    pub fn view(&self) -> ExecView {
        *self.view.read()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

enum CallResult {
    Submitted { ack: SubmitAck, order: PlannedOrder },
    SubmitFailed { order: PlannedOrder, err: ConnectorError, retried: bool },
    Canceled { order_id: u64 },
    CancelFailed { order_id: u64, err: ConnectorError },
    Replaced { ack: SubmitAck, new: PlannedOrder, old_id: u64 },
    ReplaceFailed { old_id: u64, new: PlannedOrder, err: ConnectorError },
}

pub struct BatchExecutor<C: Connector> {
    config: ExecutorConfig,
    symbol: String,
    connector: Arc<C>,
    gate: RateGate,
    queue: Arc<OpQueue>,
    ctl_rx: mpsc::Receiver<ExecutorCtl>,
    feedback: mpsc::UnboundedSender<ExecFeedback>,
    responder: CrossResponder,
    guard: MakerGuard,
    filters: SymbolFilters,
    top: Option<TopOfBook>,
    live: HashMap<u64, LiveOrder>,
    by_client: HashMap<String, u64>,
    unknown_inflight: HashSet<String>,
    view: Arc<RwLock<ExecView>>,
    metrics: Arc<EngineMetrics>,
    stats: ExecutorStats,
}

impl<C: Connector> BatchExecutor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutorConfig,
        symbol: impl Into<String>,
        connector: Arc<C>,
        gate: RateGate,
        filters: SymbolFilters,
        guard: MakerGuard,
        feedback: mpsc::UnboundedSender<ExecFeedback>,
        metrics: Arc<EngineMetrics>,
    ) -> (Self, ExecutorHandle) {
        let queue = Arc::new(OpQueue::new(1024));
        let (ctl_tx, ctl_rx) = mpsc::channel(256);
        let view = Arc::new(RwLock::new(ExecView::default()));
        let responder = CrossResponder::new(config.cross_response_target_ms);
        let handle =
            ExecutorHandle { queue: queue.clone(), ctl: ctl_tx, view: view.clone() };
        let executor = Self {
            config,
            symbol: symbol.into(),
            connector,
            gate,
            queue,
            ctl_rx,
            feedback,
            responder,
            guard,
            filters,
            top: None,
            live: HashMap::new(),
            by_client: HashMap::new(),
            unknown_inflight: HashSet::new(),
            view,
            metrics,
            stats: ExecutorStats::default(),
        };
        (executor, handle)
    }

    /// Worker loop. Exits once the kill switch fires, after a cancel-all.
    pub async fn run(mut self, kill: KillSwitch) {
        let mut sweep =
            tokio::time::interval(Duration::from_millis(self.config.ttl_sweep_interval_ms));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(symbol = %self.symbol, "executor worker started");
        loop {
            if kill.should_stop() {
                self.queue.clear();
                self.cancel_all().await;
                info!("executor worker stopped by kill switch");
                return;
            }
            tokio::select! {
                _ = sweep.tick() => self.ttl_sweep(),
                ctl = self.ctl_rx.recv() => match ctl {
                    Some(ctl) => self.handle_ctl(ctl).await,
                    None => {
                        self.cancel_all().await;
                        return;
                    }
                },
                _ = self.queue.wait_nonempty() => self.collect_and_flush().await,
            }
            self.publish_view();
        }
    }

    async fn handle_ctl(&mut self, ctl: ExecutorCtl) {
        match ctl {
            ExecutorCtl::Top(top) => self.top = Some(top),
            ExecutorCtl::Filters(filters) => self.filters = filters,
            ExecutorCtl::Report(report) => self.on_exec_report(&report),
            ExecutorCtl::Cross { fill_side, fill_order_id, imbalance, fill_qty, received } => {
                self.handle_cross(fill_side, fill_order_id, imbalance, fill_qty, received).await;
            }
            ExecutorCtl::BurstDeploy(orders) => self.burst_deploy(orders).await,
            ExecutorCtl::Precompute { imbalance } => self.responder.precompute(imbalance),
            ExecutorCtl::CancelAll => self.cancel_all().await,
        }
    }

    /// Apply an own execution report to the live table.
    fn on_exec_report(&mut self, report: &ExecReport) {
        self.unknown_inflight.remove(&report.client_order_id);
        if report.status.is_terminal() {
            if let Some(o) = self.live.remove(&report.order_id) {
                self.by_client.remove(&o.client_order_id);
            }
            return;
        }
        let Some(order) = self.live.get_mut(&report.order_id) else {
            // Ack for an order submitted before a restart, or a probe
            // answer; nothing to update.
            return;
        };
        if report.has_fill() {
            order.qty_open = (order.qty_open - report.last_qty).max(Decimal::ZERO);
        }
        if report.status == crate::core::OrderStatus::PendingCancel {
            order.state = LiveState::PendingCancel;
        }
    }

    /// Queue cancels for every expired order. The order stays reserved
    /// until the venue confirms.
    fn ttl_sweep(&mut self) {
        let now = epoch_ns();
        let mut expired: Vec<u64> = Vec::new();
        for (id, order) in &self.live {
            if order.state != LiveState::PendingCancel && order.is_expired(now) {
                expired.push(*id);
            }
        }
        for id in expired {
            if let Some(order) = self.live.get_mut(&id) {
                order.state = LiveState::PendingCancel;
            }
            let pushed = self.queue.push(QueuedOp {
                priority: OpPriority::Cancel,
                op: OrderOp::Cancel { order_id: id, critical: false },
                enqueued_ns: now,
            });
            if pushed.is_ok() {
                self.stats.ttl_cancels += 1;
            } else if let Some(order) = self.live.get_mut(&id) {
                // Queue full: retry on the next sweep.
                order.state = LiveState::Acked;
            }
        }
    }

    /// Accumulate one micro-batch and flush it. A `Fill`-priority op
    /// short-circuits accumulation.
    async fn collect_and_flush(&mut self) {
        let window = Duration::from_millis(
            (self.config.micro_batch_ms.0 + self.config.micro_batch_ms.1) / 2,
        );
        let deadline = Instant::now() + window;
        let mut batch: Vec<QueuedOp> = Vec::with_capacity(self.config.burst_size);
        let mut expedite = false;

        loop {
            while batch.len() < self.config.burst_size {
                match self.queue.try_pop() {
                    Some(op) => {
                        expedite |= op.priority == OpPriority::Fill;
                        batch.push(op);
                    }
                    None => break,
                }
            }
            if expedite || batch.len() >= self.config.burst_size || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        if !batch.is_empty() {
            self.flush(batch).await;
        }
    }

    fn bucket_for(op: &OrderOp) -> Bucket {
        match op {
            OrderOp::Submit { .. } => Bucket::Fill,
            OrderOp::Cancel { .. } => Bucket::Cancel,
            OrderOp::Replace { .. } => Bucket::Reprice,
        }
    }

    async fn flush(&mut self, batch: Vec<QueuedOp>) {
        self.stats.batches_flushed += 1;
        let mut calls: JoinSet<CallResult> = JoinSet::new();

        for queued in batch {
            let critical = match &queued.op {
                OrderOp::Submit { critical, .. }
                | OrderOp::Cancel { critical, .. }
                | OrderOp::Replace { critical, .. } => *critical,
            };
            if !self.gate.admit(Self::bucket_for(&queued.op), critical) {
                self.stats.gate_denials += 1;
                if let Some(order) = Self::op_order(&queued.op) {
                    debug!(client_order_id = %order.client_order_id, "op denied by rate gate");
                }
                // A denied TTL cancel comes back on the next sweep.
                if let OrderOp::Cancel { order_id, .. } = queued.op {
                    if let Some(o) = self.live.get_mut(&order_id) {
                        o.state = LiveState::Acked;
                    }
                }
                continue;
            }
            self.spawn_call(&mut calls, queued.op);
        }

        let mut retries: Vec<(PlannedOrder, u64)> = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(result) => {
                    if let Some(retry) = self.handle_result(result) {
                        retries.push(retry);
                    }
                }
                Err(e) => warn!(error = %e, "dispatch task panicked"),
            }
        }

        // Would-match rejects retry exactly once with one extra tick.
        for (order, extra_ticks) in retries {
            self.retry_wider(order, extra_ticks).await;
        }
    }

    fn op_order(op: &OrderOp) -> Option<&PlannedOrder> {
        match op {
            OrderOp::Submit { order, .. } => Some(order),
            OrderOp::Replace { new, .. } => Some(new),
            OrderOp::Cancel { .. } => None,
        }
    }

    fn spawn_call(&self, calls: &mut JoinSet<CallResult>, op: OrderOp) {
        let connector = self.connector.clone();
        let symbol = self.symbol.clone();
        let timeout = Duration::from_millis(self.config.request_timeout_ms);

        match op {
            OrderOp::Submit { order, .. } => {
                calls.spawn(async move {
                    let req = submit_request(&symbol, &order);
                    match tokio::time::timeout(timeout, connector.submit(req)).await {
                        Ok(Ok(ack)) => CallResult::Submitted { ack, order },
                        Ok(Err(err)) => CallResult::SubmitFailed { order, err, retried: false },
                        Err(_) => CallResult::SubmitFailed {
                            order,
                            err: ConnectorError::Timeout(timeout.as_millis() as u64),
                            retried: false,
                        },
                    }
                });
            }
            OrderOp::Cancel { order_id, .. } => {
                calls.spawn(async move {
                    let req = CancelRequest {
                        symbol,
                        order_id: Some(order_id),
                        client_order_id: None,
                    };
                    match tokio::time::timeout(timeout, connector.cancel(req)).await {
                        Ok(Ok(_)) => CallResult::Canceled { order_id },
                        Ok(Err(err)) => CallResult::CancelFailed { order_id, err },
                        Err(_) => CallResult::CancelFailed {
                            order_id,
                            err: ConnectorError::Timeout(timeout.as_millis() as u64),
                        },
                    }
                });
            }
            OrderOp::Replace { cancel_order_id, new, .. } => {
                calls.spawn(async move {
                    let req = CancelReplaceRequest {
                        symbol: symbol.clone(),
                        cancel_order_id,
                        new: submit_request(&symbol, &new),
                    };
                    match tokio::time::timeout(timeout, connector.cancel_replace(req)).await {
                        Ok(Ok(ack)) => CallResult::Replaced { ack, new, old_id: cancel_order_id },
                        Ok(Err(err)) => {
                            CallResult::ReplaceFailed { old_id: cancel_order_id, new, err }
                        }
                        Err(_) => CallResult::ReplaceFailed {
                            old_id: cancel_order_id,
                            new,
                            err: ConnectorError::Timeout(timeout.as_millis() as u64),
                        },
                    }
                });
            }
        }
    }

    /// Apply a call result. Returns a (order, extra_ticks) pair when a
    /// would-match reject earned its single retry.
    fn handle_result(&mut self, result: CallResult) -> Option<(PlannedOrder, u64)> {
        match result {
            CallResult::Submitted { ack, order } => {
                self.metrics.orders_submitted.with_label_values(&[order.side.as_str()]).inc();
                self.insert_live(ack, order);
                self.stats.submitted += 1;
                None
            }
            CallResult::SubmitFailed { order, err, retried } => {
                self.on_submit_error(order, err, retried)
            }
            CallResult::Canceled { order_id } => {
                if let Some(o) = self.live.remove(&order_id) {
                    self.by_client.remove(&o.client_order_id);
                }
                self.stats.canceled += 1;
                self.metrics.orders_canceled.inc();
                None
            }
            CallResult::CancelFailed { order_id, err } => {
                match err {
                    ConnectorError::Venue { .. } => {
                        // Unknown order: it is already gone venue-side.
                        if let Some(o) = self.live.remove(&order_id) {
                            self.by_client.remove(&o.client_order_id);
                        }
                    }
                    ConnectorError::Timeout(_) => {
                        self.stats.timeouts += 1;
                        if let Some(o) = self.live.get_mut(&order_id) {
                            o.state = LiveState::InflightUnknown;
                            let _ = self.feedback.send(ExecFeedback::InflightUnknown {
                                client_order_id: o.client_order_id.clone(),
                            });
                        }
                    }
                    ConnectorError::RateLimited { retry_after_s } => {
                        self.gate.weight().force_cooldown(retry_after_s);
                        let _ = self.feedback.send(ExecFeedback::RateLimited { retry_after_s });
                        if let Some(o) = self.live.get_mut(&order_id) {
                            o.state = LiveState::Acked; // retried by the sweep
                        }
                    }
                    _ => {
                        warn!(order_id, error = %err, "cancel failed");
                        if let Some(o) = self.live.get_mut(&order_id) {
                            o.state = LiveState::Acked;
                        }
                    }
                }
                None
            }
            CallResult::Replaced { ack, new, old_id } => {
                if let Some(o) = self.live.remove(&old_id) {
                    self.by_client.remove(&o.client_order_id);
                }
                self.insert_live(ack, new);
                self.stats.replaced += 1;
                self.metrics.orders_replaced.inc();
                None
            }
            CallResult::ReplaceFailed { old_id, new, err } => {
                warn!(old_id, error = %err, "cancel-replace failed");
                // STOP_ON_FAILURE: the old order may or may not be gone; a
                // later report or reconcile probe resolves it.
                self.on_submit_error(new, err, false)
            }
        }
    }

    fn on_submit_error(
        &mut self,
        order: PlannedOrder,
        err: ConnectorError,
        retried: bool,
    ) -> Option<(PlannedOrder, u64)> {
        match err {
            ConnectorError::FilterReject { reason } => {
                self.stats.rejected += 1;
                self.metrics.orders_rejected.with_label_values(&["filter"]).inc();
                let _ = self.feedback.send(ExecFeedback::FilterRejected {
                    side: order.side,
                    layer: order.layer,
                    reason,
                });
                None
            }
            ConnectorError::WouldMatch => {
                self.stats.rejected += 1;
                self.metrics.orders_rejected.with_label_values(&["would_match"]).inc();
                if retried {
                    warn!(side = %order.side, "post-only retry crossed again, degrading side");
                    let _ = self.feedback.send(ExecFeedback::WouldMatchGaveUp {
                        side: order.side,
                        layer: order.layer,
                    });
                    None
                } else {
                    self.stats.would_match_retries += 1;
                    Some((order, 1))
                }
            }
            ConnectorError::Timeout(_) => {
                self.stats.timeouts += 1;
                self.unknown_inflight.insert(order.client_order_id.clone());
                let _ = self.feedback.send(ExecFeedback::InflightUnknown {
                    client_order_id: order.client_order_id,
                });
                None
            }
            ConnectorError::RateLimited { retry_after_s } => {
                self.gate.weight().force_cooldown(retry_after_s);
                let _ = self.feedback.send(ExecFeedback::RateLimited { retry_after_s });
                None
            }
            err => {
                self.stats.rejected += 1;
                debug!(error = %err, "submit failed");
                None
            }
        }
    }

    /// Re-guard the price with extra ticks and resubmit once.
    async fn retry_wider(&mut self, order: PlannedOrder, extra_ticks: u64) {
        let Some(top) = self.top else {
            return;
        };
        let ticks = self.guard.base_safety_ticks + extra_ticks as u32;
        let price = self.guard.guard_price(
            order.side,
            order.price,
            &top,
            self.filters.tick_size,
            ticks.min(3),
        );
        let retry = PlannedOrder { price, ..order };
        if !self.gate.admit(Bucket::Fill, false) {
            self.stats.gate_denials += 1;
            return;
        }
        let connector = self.connector.clone();
        let req = submit_request(&self.symbol, &retry);
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let result = match tokio::time::timeout(timeout, connector.submit(req)).await {
            Ok(Ok(ack)) => CallResult::Submitted { ack, order: retry },
            Ok(Err(err)) => CallResult::SubmitFailed { order: retry, err, retried: true },
            Err(_) => CallResult::SubmitFailed {
                order: retry,
                err: ConnectorError::Timeout(timeout.as_millis() as u64),
                retried: true,
            },
        };
        let _ = self.handle_result(result);
    }

    fn insert_live(&mut self, ack: SubmitAck, order: PlannedOrder) {
        self.unknown_inflight.remove(&order.client_order_id);
        let live = LiveOrder {
            order_id: ack.order_id,
            client_order_id: order.client_order_id.clone(),
            side: order.side,
            price: order.price,
            qty_open: order.qty,
            layer: order.layer,
            created_ts_ns: epoch_ns(),
            ttl_ms: order.ttl_ms,
            state: LiveState::Acked,
        };
        self.by_client.insert(order.client_order_id, ack.order_id);
        self.live.insert(ack.order_id, live);
    }

    /// Interpret a cross directive against the live table and dispatch it
    /// as a single expedited call.
    async fn handle_cross(
        &mut self,
        fill_side: Side,
        fill_order_id: u64,
        imbalance: f64,
        fill_qty: Decimal,
        received: Instant,
    ) {
        let layer = self.live.get(&fill_order_id).map(|o| o.layer).unwrap_or(Layer::L0);
        let directive = self.responder.directive(fill_side, layer, imbalance);
        let Some(top) = self.top else {
            return;
        };
        let tick = self.filters.tick_size;

        let op = match directive.kind {
            AdjustmentKind::Replace | AdjustmentKind::Reprice => {
                match self.nearest_live(directive.side) {
                    Some(target) => {
                        let shift = tick * Decimal::from(directive.ticks);
                        let desired_price = match directive.side {
                            // Move toward mid to get filled sooner.
                            Side::Sell => target.price - shift,
                            Side::Buy => target.price + shift,
                        };
                        let mult = Decimal::from_f64(directive.size_mult).unwrap_or(Decimal::ONE);
                        match pretrade_sanitize(
                            directive.side,
                            desired_price,
                            target.qty_open * mult,
                            &self.filters,
                            &top,
                            &self.guard,
                            GuardContext { volatility: 0.0, depth_imbalance: 0.0 },
                        ) {
                            Ok(s) => Some(OrderOp::Replace {
                                cancel_order_id: target.order_id,
                                new: PlannedOrder {
                                    side: directive.side,
                                    price: s.price,
                                    qty: s.qty,
                                    layer: target.layer,
                                    ttl_ms: target.ttl_ms,
                                    client_order_id: new_client_order_id(
                                        directive.side,
                                        target.layer,
                                    ),
                                    post_only: true,
                                },
                                critical: true,
                            }),
                            Err(e) => {
                                debug!(error = %e, "cross replace failed sanitize");
                                None
                            }
                        }
                    }
                    // Nothing resting on that side: refill instead.
                    None => self.build_refill(directive.side, layer, fill_qty, &top),
                }
            }
            AdjustmentKind::New => self.build_refill(directive.side, layer, fill_qty, &top),
        };

        if let Some(op) = op {
            if self.gate.admit(Self::bucket_for(&op), true) {
                let mut calls = JoinSet::new();
                self.spawn_call(&mut calls, op);
                while let Some(joined) = calls.join_next().await {
                    if let Ok(result) = joined {
                        let _ = self.handle_result(result);
                    }
                }
            } else {
                self.stats.gate_denials += 1;
            }
        }

        let latency_ms = received.elapsed().as_secs_f64() * 1000.0;
        self.responder.record_latency(latency_ms);
        self.metrics.cross_latency_ms.observe(latency_ms);
        if latency_ms > self.config.cross_response_target_ms as f64 {
            self.metrics.cross_slow_responses.inc();
        }
    }

    fn build_refill(
        &self,
        side: Side,
        layer: Layer,
        qty: Decimal,
        top: &TopOfBook,
    ) -> Option<OrderOp> {
        if qty <= Decimal::ZERO {
            return None;
        }
        // Quote at the guard minimum off the touch; the sanitize pass
        // snaps it outward.
        let desired = match side {
            Side::Buy => top.bid,
            Side::Sell => top.ask,
        };
        match pretrade_sanitize(
            side,
            desired,
            qty,
            &self.filters,
            top,
            &self.guard,
            GuardContext::default(),
        ) {
            Ok(s) => Some(OrderOp::Submit {
                order: PlannedOrder {
                    side,
                    price: s.price,
                    qty: s.qty,
                    layer,
                    ttl_ms: 2000,
                    client_order_id: new_client_order_id(side, layer),
                    post_only: true,
                },
                critical: true,
            }),
            Err(e) => {
                debug!(error = %e, "cross refill failed sanitize");
                None
            }
        }
    }

    /// Live order on `side` closest to mid (best sell = lowest price,
    /// best buy = highest), L0 preferred.
    fn nearest_live(&self, side: Side) -> Option<LiveOrder> {
        let candidates = self
            .live
            .values()
            .filter(|o| o.side == side && o.state == LiveState::Acked);
        match side {
            Side::Sell => candidates
                .min_by(|a, b| (a.layer, a.price).cmp(&(b.layer, b.price)))
                .cloned(),
            Side::Buy => candidates
                .min_by(|a, b| {
                    (a.layer, std::cmp::Reverse(a.price))
                        .cmp(&(b.layer, std::cmp::Reverse(b.price)))
                })
                .cloned(),
        }
    }

    /// Dispatch a prepared ladder in layer waves: L0 first, then L1, L2,
    /// spaced by the wave interval.
    async fn burst_deploy(&mut self, orders: Vec<PlannedOrder>) {
        if orders.is_empty() {
            return;
        }
        self.stats.burst_deploys += 1;
        info!(orders = orders.len(), "burst deploy");

        let mut waves: [Vec<PlannedOrder>; 3] = Default::default();
        for order in orders {
            waves[order.layer.index()].push(order);
        }

        let mut dispatched_waves = 0;
        for wave in waves.into_iter() {
            if wave.is_empty() {
                continue;
            }
            if dispatched_waves >= self.config.max_waves {
                break;
            }
            if dispatched_waves > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.wave_interval_ms)).await;
            }
            let mut calls = JoinSet::new();
            for order in wave {
                if !self.gate.admit(Bucket::Fill, false) {
                    self.stats.gate_denials += 1;
                    continue;
                }
                self.spawn_call(&mut calls, OrderOp::Submit { order, critical: false });
            }
            while let Some(joined) = calls.join_next().await {
                if let Ok(result) = joined {
                    let _ = self.handle_result(result);
                }
            }
            dispatched_waves += 1;
        }
    }

    /// Cancel everything we believe is resting. Idempotent; critical ops
    /// pass the gate during cooldown.
    pub async fn cancel_all(&mut self) {
        let ids: Vec<u64> = self.live.keys().copied().collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "cancel-all");
        let mut calls = JoinSet::new();
        for id in ids {
            if !self.gate.admit(Bucket::Cancel, true) {
                break; // weight cap exhausted; nothing more can be sent
            }
            self.spawn_call(&mut calls, OrderOp::Cancel { order_id: id, critical: true });
        }
        while let Some(joined) = calls.join_next().await {
            if let Ok(result) = joined {
                let _ = self.handle_result(result);
            }
        }
        self.publish_view();
    }

    fn publish_view(&self) {
        let mut buy = Decimal::ZERO;
        let mut sell = Decimal::ZERO;
        let mut slots = [[0u32; 3]; 2];
        for order in self.live.values() {
            let side_idx = match order.side {
                Side::Buy => {
                    buy += order.reserved_notional();
                    0
                }
                Side::Sell => {
                    sell += order.reserved_notional();
                    1
                }
            };
            slots[side_idx][order.layer.index()] += 1;
        }
        *self.view.write() = ExecView {
            open_orders: self.live.len(),
            onbook_buy_notional: buy,
            onbook_sell_notional: sell,
            pending_ops: self.queue.len(),
            slot_counts: slots,
        };
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.responder.latency_summary()
    }

    pub fn open_orders(&self) -> Vec<LiveOrder> {
        self.live.values().cloned().collect()
    }
}

fn submit_request(symbol: &str, order: &PlannedOrder) -> SubmitRequest {
    SubmitRequest {
        symbol: symbol.to_string(),
        client_order_id: order.client_order_id.clone(),
        side: order.side,
        order_type: OrderType::LimitMaker,
        time_in_force: TimeInForce::Gtc,
        price: order.price,
        qty: order.qty,
        post_only: order.post_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrderStatus;
    use crate::risk::WeightMonitor;
    use crate::testing::SimConnector;
    use rust_decimal_macros::dec;

    fn executor() -> (BatchExecutor<SimConnector>, ExecutorHandle, Arc<SimConnector>) {
        let connector = Arc::new(SimConnector::new(SymbolFilters::permissive()));
        connector.set_book(dec!(0.26398), dec!(0.26402));
        let weight = Arc::new(WeightMonitor::new(900, 1200, 60));
        let gate = RateGate::new((20, 20, 80), (20, 20, 80), weight);
        let (tx, _rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let config = crate::config::profiles::default_profile("DOGEUSDT", dec!(1000)).executor;
        let (exec, handle) = BatchExecutor::new(
            config,
            "DOGEUSDT",
            connector.clone(),
            gate,
            SymbolFilters::permissive(),
            MakerGuard::new(2, 0.005, 0.3),
            tx,
            metrics,
        );
        (exec, handle, connector)
    }

    fn planned(side: Side, layer: Layer, price: Decimal, qty: Decimal) -> PlannedOrder {
        PlannedOrder {
            side,
            price,
            qty,
            layer,
            ttl_ms: 2000,
            client_order_id: new_client_order_id(side, layer),
            post_only: true,
        }
    }

    fn ack(id: u64, order: &PlannedOrder) -> SubmitAck {
        SubmitAck { order_id: id, client_order_id: order.client_order_id.clone() }
    }

    fn report(order_id: u64, status: OrderStatus, last_qty: Decimal) -> ExecReport {
        ExecReport {
            order_id,
            client_order_id: String::new(),
            symbol: "DOGEUSDT".into(),
            side: Side::Buy,
            status,
            status_raw: status.as_str().into(),
            last_qty,
            cum_qty: last_qty,
            last_quote: last_qty * dec!(0.264),
            cum_quote: last_qty * dec!(0.264),
            price: dec!(0.264),
            is_maker: true,
            ts_ns: 0,
            update_id: 1,
        }
    }

    #[test]
    fn partial_fill_shrinks_open_qty_and_terminal_removes() {
        let (mut exec, _handle, _sim) = executor();
        let order = planned(Side::Buy, Layer::L0, dec!(0.26395), dec!(50));
        exec.insert_live(ack(1, &order), order);

        exec.on_exec_report(&report(1, OrderStatus::PartiallyFilled, dec!(20)));
        assert_eq!(exec.open_orders()[0].qty_open, dec!(30));

        exec.on_exec_report(&report(1, OrderStatus::Filled, dec!(30)));
        assert!(exec.open_orders().is_empty());
        assert!(exec.by_client.is_empty());
    }

    #[test]
    fn ttl_sweep_queues_cancels_at_cancel_priority() {
        let (mut exec, handle, _sim) = executor();
        let mut order = planned(Side::Sell, Layer::L0, dec!(0.26410), dec!(50));
        order.ttl_ms = 1; // expires immediately
        exec.insert_live(ack(7, &order), order);
        std::thread::sleep(Duration::from_millis(5));

        exec.ttl_sweep();
        assert_eq!(exec.stats().ttl_cancels, 1);
        assert_eq!(handle.queue_len(), 1);
        assert_eq!(exec.queue.peek_priority(), Some(OpPriority::Cancel));
        // Marked pending so the next sweep does not double-queue.
        assert_eq!(exec.open_orders()[0].state, LiveState::PendingCancel);
        exec.ttl_sweep();
        assert_eq!(exec.stats().ttl_cancels, 1);
    }

    #[test]
    fn nearest_live_prefers_inner_layer_and_best_price() {
        let (mut exec, _handle, _sim) = executor();
        for (id, layer, price) in [
            (1u64, Layer::L1, dec!(0.26420)),
            (2u64, Layer::L0, dec!(0.26412)),
            (3u64, Layer::L0, dec!(0.26408)),
        ] {
            let order = planned(Side::Sell, layer, price, dec!(10));
            exec.insert_live(ack(id, &order), order);
        }
        let nearest = exec.nearest_live(Side::Sell).unwrap();
        assert_eq!(nearest.order_id, 3);

        for (id, layer, price) in [
            (4u64, Layer::L0, dec!(0.26390)),
            (5u64, Layer::L0, dec!(0.26394)),
        ] {
            let order = planned(Side::Buy, layer, price, dec!(10));
            exec.insert_live(ack(id, &order), order);
        }
        assert_eq!(exec.nearest_live(Side::Buy).unwrap().order_id, 5);
    }

    #[tokio::test]
    async fn cancel_all_clears_the_table() {
        let (mut exec, _handle, sim) = executor();
        for id in 1..=3u64 {
            let order = planned(Side::Buy, Layer::L0, dec!(0.26390), dec!(10));
            exec.insert_live(ack(id, &order), order);
        }
        exec.cancel_all().await;
        assert!(exec.open_orders().is_empty());
        assert_eq!(sim.cancel_count(), 3);
        assert_eq!(exec.stats().canceled, 3);
        // Second pass is a no-op.
        exec.cancel_all().await;
        assert_eq!(sim.cancel_count(), 3);
    }

    #[tokio::test]
    async fn would_match_submit_retries_once_with_wider_guard() {
        let (mut exec, _handle, sim) = executor();
        exec.top = Some(TopOfBook {
            bid: dec!(0.26398),
            ask: dec!(0.26402),
            bid_qty: dec!(1000),
            ask_qty: dec!(1000),
            last_update_ns: 0,
        });
        // Price that crosses the simulated book: first submit rejected,
        // the retry goes out one tick safer and lands.
        let order = planned(Side::Sell, Layer::L0, dec!(0.26398), dec!(50));
        let retry = exec
            .on_submit_error(order, ConnectorError::WouldMatch, false)
            .expect("first would-match earns a retry");
        exec.retry_wider(retry.0, retry.1).await;

        assert_eq!(exec.stats().would_match_retries, 1);
        assert_eq!(sim.submit_count(), 1);
        let resting = exec.open_orders();
        assert_eq!(resting.len(), 1);
        assert!(resting[0].price >= dec!(0.26402) + dec!(0.00003));
    }

    #[tokio::test]
    async fn burst_deploy_dispatches_in_layer_waves() {
        let (mut exec, _handle, sim) = executor();
        let orders = vec![
            planned(Side::Buy, Layer::L0, dec!(0.26390), dec!(10)),
            planned(Side::Sell, Layer::L0, dec!(0.26410), dec!(10)),
            planned(Side::Buy, Layer::L1, dec!(0.26380), dec!(10)),
            planned(Side::Sell, Layer::L2, dec!(0.26430), dec!(10)),
        ];
        exec.burst_deploy(orders).await;
        assert_eq!(sim.submit_count(), 4);
        assert_eq!(exec.open_orders().len(), 4);
        assert_eq!(exec.stats().burst_deploys, 1);
    }
}
