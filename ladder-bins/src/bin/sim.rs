//! Layered quoter against the simulated venue.
//!
//! Drives the full decision path — fusion, toxicity, spread, inventory,
//! budgets, maker-guard, batch execution — with a synthetic random-walk
//! market. Fill handling is exercised by the integration tests; this
//! binary is for watching the quote loop run.

use anyhow::Result;
use clap::Parser;
use ladder_bins::common::{init_logging, print_stats, CommonArgs};
use ladder_core::connector::{AggTrade, MarketDepthUpdate, MarketEvent, VenueBalances};
use ladder_core::monitoring::{MetricsServer, MetricsServerConfig};
use ladder_core::testing::SimConnector;
use ladder_core::{Engine, KillSwitch, SymbolFilters};
use ladder_quoting::LayeredQuoter;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Seconds to run before shutting down (0 = until ctrl-c)
    #[arg(long, default_value = "60")]
    duration_s: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common.log_level)?;

    let config = args.common.engine_config()?;
    tracing::info!(symbol = %config.symbol, profile = %args.common.profile, "=== ladder-sim ===");

    let kill = KillSwitch::new();
    {
        let kill = kill.clone();
        ctrlc::set_handler(move || kill.shutdown("ctrl-c"))?;
    }

    let connector = Arc::new(SimConnector::new(SymbolFilters::permissive()));
    connector.set_book(dec!(0.26398), dec!(0.26402));
    connector.set_balances(VenueBalances {
        base_free: dec!(0),
        base_locked: dec!(0),
        quote_free: args.common.equity,
        quote_locked: dec!(0),
    });

    let (engine, executor, channels, metrics) =
        Engine::init(config, LayeredQuoter::new(args.common.engine_config()?), connector.clone(), kill.clone())
            .await?;

    if args.common.metrics_port != 0 {
        let server = MetricsServer::new(
            MetricsServerConfig {
                listen_addr: SocketAddr::from(([127, 0, 0, 1], args.common.metrics_port)),
                metrics_path: "/metrics".to_string(),
            },
            (*metrics).clone(),
        );
        tokio::spawn(server.serve());
    }

    let executor_task = tokio::spawn(executor.run(kill.clone()));
    let feed_task = tokio::spawn(synthetic_market(
        channels.market_tx.clone(),
        connector.clone(),
        kill.clone(),
    ));

    if args.duration_s > 0 {
        let kill = kill.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
            kill.shutdown("duration elapsed");
        });
    }

    let stats = engine.run().await?;
    let _ = feed_task.await;
    let _ = executor_task.await;

    print_stats(&stats);
    tracing::info!(
        submits = connector.submit_count(),
        cancels = connector.cancel_count(),
        "simulated venue totals"
    );
    Ok(())
}

/// Random-walk depth updates at ~20 Hz with occasional trade prints.
async fn synthetic_market(
    market_tx: mpsc::Sender<MarketEvent>,
    connector: Arc<SimConnector>,
    kill: KillSwitch,
) {
    use rand::Rng;
    let mut mid: f64 = 0.26400;
    let mut update_id: u64 = 1;
    let mut ticks: u64 = 0;

    while !kill.should_stop() {
        {
            let mut rng = rand::thread_rng();
            mid *= 1.0 + rng.gen_range(-0.0002..0.0002);
            mid = mid.clamp(0.20, 0.35);
        }
        let half = mid * 0.0003; // ~6 bp spread
        let bid = Decimal::from_f64(mid - half).unwrap_or(dec!(0.26398)).round_dp(5);
        let ask = Decimal::from_f64(mid + half).unwrap_or(dec!(0.26402)).round_dp(5);
        connector.set_book(bid, ask);

        let depth = MarketEvent::Depth(MarketDepthUpdate {
            bids: vec![(bid, dec!(1200))],
            asks: vec![(ask, dec!(1100))],
            ts_exch_ms: ladder_core::utils::clock::epoch_ms(),
            last_update_id: update_id,
        });
        update_id += 1;
        if market_tx.send(depth).await.is_err() {
            return;
        }

        ticks += 1;
        if ticks % 10 == 0 {
            let qty = {
                let mut rng = rand::thread_rng();
                rng.gen_range(50.0..500.0)
            };
            let trade = MarketEvent::Trade(AggTrade {
                price: Decimal::from_f64(mid).unwrap_or(dec!(0.264)).round_dp(5),
                qty: Decimal::from_f64(qty).unwrap_or(dec!(100)).round_dp(0),
                ts_exch_ms: ladder_core::utils::clock::epoch_ms(),
            });
            if market_tx.send(trade).await.is_err() {
                return;
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
