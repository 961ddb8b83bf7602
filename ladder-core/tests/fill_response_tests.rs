//! Fill handling end to end: ledger application, cross response, and the
//! kill-switch cancel-all.

mod common;

use common::{depth_event, order_id_of_submit, seeded_connector, test_config};
use ladder_core::testing::{raw_report, SimCall};
use ladder_core::{Engine, KillSwitch, Side};
use ladder_quoting::LayeredQuoter;
use rust_decimal_macros::dec;
use std::time::Duration;

struct Harness {
    connector: std::sync::Arc<ladder_core::testing::SimConnector>,
    kill: KillSwitch,
    channels: ladder_core::EngineChannels,
    metrics: std::sync::Arc<ladder_core::monitoring::EngineMetrics>,
    engine_task: tokio::task::JoinHandle<ladder_core::Result<ladder_core::engine::EngineStats>>,
    executor_task: tokio::task::JoinHandle<()>,
}

async fn start() -> Harness {
    let connector = seeded_connector(dec!(0), dec!(1000));
    let kill = KillSwitch::new();
    let config = test_config(0);
    let quoter = LayeredQuoter::new(config.clone());

    let (engine, executor, channels, metrics) =
        Engine::init(config, quoter, connector.clone(), kill.clone()).await.unwrap();
    let executor_task = tokio::spawn(executor.run(kill.clone()));
    let engine_task = tokio::spawn(engine.run());

    Harness { connector, kill, channels, metrics, engine_task, executor_task }
}

impl Harness {
    async fn warm_up(&self, events: u64) {
        for update_id in 1..=events {
            let _ = self.channels.market_tx.send(depth_event(update_id)).await;
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    }

    async fn stop(self) {
        self.kill.shutdown("test done");
        let _ = tokio::time::timeout(Duration::from_secs(5), self.engine_task).await;
        let _ = tokio::time::timeout(Duration::from_secs(5), self.executor_task).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_fill_triggers_an_opposite_side_replace() {
    let h = start().await;
    h.warm_up(20).await;

    let (buy_id, _qty) =
        order_id_of_submit(&h.connector, Side::Buy).expect("a buy order must be resting");
    let replaces_before = h
        .connector
        .calls()
        .iter()
        .filter(|c| matches!(c, SimCall::CancelReplace(_)))
        .count();

    // Two-step fill: 20 then the remaining 30, exactly as the venue
    // streams it.
    let _ = h
        .channels
        .report_tx
        .send(raw_report(
            buy_id,
            Side::Buy,
            "PARTIALLY_FILLED",
            dec!(20),
            dec!(20),
            dec!(5.279),
            dec!(0.26395),
            1,
        ))
        .await;
    let _ = h
        .channels
        .report_tx
        .send(raw_report(
            buy_id,
            Side::Buy,
            "FILLED",
            dec!(30),
            dec!(50),
            dec!(13.198),
            dec!(0.26395),
            2,
        ))
        .await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    // Book went long: the severe-imbalance path must move the sell side
    // via cancel-replace (or refill it if nothing was resting).
    let calls = h.connector.calls();
    let sell_adjusted = calls.iter().any(|c| match c {
        SimCall::CancelReplace(req) => req.new.side == Side::Sell,
        _ => false,
    });
    let replaces_after =
        calls.iter().filter(|c| matches!(c, SimCall::CancelReplace(_))).count();
    assert!(
        sell_adjusted && replaces_after > replaces_before,
        "expected a sell-side cancel-replace after the buy fill"
    );

    // The response latency histogram saw both fills.
    assert!(h.metrics.cross_latency_ms.get_sample_count() >= 2);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cross_response_stays_inside_the_latency_budget() {
    let h = start().await;
    h.warm_up(20).await;

    let (buy_id, _) =
        order_id_of_submit(&h.connector, Side::Buy).expect("a buy order must be resting");

    // Stream of small partial fills on one order.
    for update_id in 1..=50u64 {
        let cum = dec!(0.5) * rust_decimal::Decimal::from(update_id);
        let _ = h
            .channels
            .report_tx
            .send(raw_report(
                buy_id,
                Side::Buy,
                "PARTIALLY_FILLED",
                dec!(0.5),
                cum,
                cum * dec!(0.264),
                dec!(0.264),
                update_id,
            ))
            .await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let count = h.metrics.cross_latency_ms.get_sample_count();
    let sum_ms = h.metrics.cross_latency_ms.get_sample_sum();
    assert!(count >= 50, "expected 50 latency samples, got {count}");
    let mean = sum_ms / count as f64;
    assert!(mean <= 15.0, "mean fill→repost latency {mean:.2} ms exceeds budget");

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_fill_reports_apply_once() {
    let h = start().await;
    h.warm_up(20).await;

    let (buy_id, _) =
        order_id_of_submit(&h.connector, Side::Buy).expect("a buy order must be resting");

    let report = raw_report(
        buy_id,
        Side::Buy,
        "PARTIALLY_FILLED",
        dec!(20),
        dec!(20),
        dec!(5.279),
        dec!(0.26395),
        7,
    );
    let _ = h.channels.report_tx.send(report.clone()).await;
    let _ = h.channels.report_tx.send(report).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Exactly one fill counted; the duplicate is acknowledged silently.
    assert_eq!(h.metrics.fills.with_label_values(&["BUY"]).get(), 1);

    h.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_switch_cancels_everything_and_stops_quoting() {
    let h = start().await;
    h.warm_up(20).await;

    let submits_at_kill = h.connector.submit_count();
    assert!(submits_at_kill > 0);

    h.kill.shutdown("operator");
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(h.connector.cancel_count() > 0, "live orders must be cancelled");
    // Nothing new after the switch fired.
    let _ = h.channels.market_tx.send(depth_event(999)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.connector.submit_count(), submits_at_kill);

    h.stop().await;
}
