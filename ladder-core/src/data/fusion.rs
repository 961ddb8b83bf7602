//! Dual-path market-data fusion.
//!
//! The book stream is the primary path; the trade tape is the backup; the
//! last known mid is the fallback of last resort. Whatever happens, a
//! snapshot always carries a strictly positive mid — the emergency floor
//! exists so that downstream arithmetic never divides by zero, and its
//! quality score marks it un-tradable.

use super::{BookPath, TradePath};
use crate::config::MarketDataConfig;
use crate::connector::{MarketDepthUpdate, MarketEvent};
use crate::core::{MarketSnapshot, Source, TopOfBook};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{error, warn};

/// Emergency floor when no path has ever produced a price.
fn emergency_mid() -> Decimal {
    Decimal::new(1, 3) // 1e-3
}

/// Per-source usage counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedStats {
    pub primary_used: u64,
    pub secondary_used: u64,
    pub fallback_used: u64,
    pub emergency_used: u64,
    pub source_switches: u64,
    pub book_updates: u64,
    pub trade_updates: u64,
}

/// Fuses the two inbound streams into `MarketSnapshot`s.
pub struct DualPathFeed {
    symbol: String,
    config: MarketDataConfig,
    primary: BookPath,
    secondary: TradePath,
    last_known_mid: Decimal,
    last_source: Option<Source>,
    stats: FeedStats,
}

impl DualPathFeed {
    pub fn new(symbol: impl Into<String>, config: MarketDataConfig) -> Self {
        let secondary = TradePath::new(config.vwap_window_ms);
        Self {
            symbol: symbol.into(),
            config,
            primary: BookPath::new(),
            secondary,
            last_known_mid: Decimal::ZERO,
            last_source: None,
            stats: FeedStats::default(),
        }
    }

    /// Route an inbound market event into the right path.
    pub fn apply(&mut self, event: &MarketEvent, now_ns: u64) {
        match event {
            MarketEvent::Depth(depth) => self.on_depth(depth, now_ns),
            MarketEvent::Trade(trade) => {
                self.stats.trade_updates += 1;
                self.secondary.add_trade(trade.price, trade.qty, now_ns);
                if trade.price > Decimal::ZERO {
                    self.last_known_mid = trade.price;
                }
            }
        }
    }

    fn on_depth(&mut self, depth: &MarketDepthUpdate, now_ns: u64) {
        self.primary.update(depth, now_ns);
        self.stats.book_updates += 1;
        if let Some(mid) = self.primary.mid() {
            if mid > Decimal::ZERO {
                self.last_known_mid = mid;
            }
        }
    }

    /// Current top of book, fresh or not. The maker-guard wants the last
    /// observed book even while the fusion layer is in fallback.
    pub fn top_of_book(&self) -> Option<TopOfBook> {
        self.primary.top()
    }

    /// Produce a snapshot using the best available path.
    pub fn snapshot(&mut self, now_ns: u64) -> MarketSnapshot {
        let cfg = &self.config;

        // 1. Fresh book wins outright.
        if self.primary.is_fresh(now_ns, cfg.primary_max_age_ms) {
            if let (Some(top), Some(mid)) = (self.primary.top(), self.primary.mid()) {
                if mid > Decimal::ZERO {
                    self.stats.primary_used += 1;
                    self.track_switch(Source::Primary);
                    return self.publish(top.bid, top.ask, mid, now_ns, Source::Primary, 1.0, false);
                }
            }
        }

        // 2. Trade tape with a synthetic book around VWAP.
        if self.secondary.is_fresh(now_ns, cfg.secondary_max_age_ms) {
            if let Some(mid) = self.secondary.vwap(now_ns) {
                if mid > Decimal::ZERO {
                    self.stats.secondary_used += 1;
                    self.track_switch(Source::Secondary);
                    warn!(symbol = %self.symbol, %mid, "book path stale, quoting off trade tape");
                    let (bid, ask) = self.synthetic_book(mid);
                    return self.publish(bid, ask, mid, now_ns, Source::Secondary, 0.8, false);
                }
            }
        }

        // 3. Last known mid. Marked stale: the decision worker must not
        // emit new orders off this.
        if self.last_known_mid > Decimal::ZERO {
            self.stats.fallback_used += 1;
            self.track_switch(Source::Fallback);
            warn!(symbol = %self.symbol, mid = %self.last_known_mid, "both paths stale, using last known mid");
            let (bid, ask) = self.synthetic_book(self.last_known_mid);
            return self.publish(bid, ask, self.last_known_mid, now_ns, Source::Fallback, 0.5, true);
        }

        // 4. Absolute floor. Should not happen outside cold start.
        self.stats.emergency_used += 1;
        self.track_switch(Source::Emergency);
        error!(symbol = %self.symbol, "no valid price on any path");
        let mid = emergency_mid();
        self.publish(mid, mid, mid, now_ns, Source::Emergency, 0.1, true)
    }

    fn synthetic_book(&self, mid: Decimal) -> (Decimal, Decimal) {
        let eps = Decimal::from_f64(self.config.synthetic_half_spread_bp / 10_000.0)
            .unwrap_or(Decimal::ZERO);
        (mid * (Decimal::ONE - eps), mid * (Decimal::ONE + eps))
    }

    fn publish(
        &self,
        bid: Decimal,
        ask: Decimal,
        mid: Decimal,
        now_ns: u64,
        source: Source,
        quality: f64,
        is_stale: bool,
    ) -> MarketSnapshot {
        let spread_bps = if mid > Decimal::ZERO {
            ((ask - bid) / mid * Decimal::from(10_000)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        MarketSnapshot {
            symbol: self.symbol.clone(),
            bid,
            ask,
            mid,
            spread_bps,
            ts_ns: now_ns,
            source,
            quality,
            is_stale,
        }
    }

    fn track_switch(&mut self, source: Source) {
        if self.last_source != Some(source) {
            if self.last_source.is_some() {
                self.stats.source_switches += 1;
            }
            self.last_source = Some(source);
        }
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// At least one path can still produce a price.
    pub fn health_check(&self, now_ns: u64) -> bool {
        self.primary.is_fresh(now_ns, self.config.primary_max_age_ms * 2)
            || self.secondary.is_fresh(now_ns, self.config.secondary_max_age_ms * 2)
            || self.last_known_mid > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::AggTrade;
    use rust_decimal_macros::dec;

    const MS: u64 = 1_000_000;

    fn feed() -> DualPathFeed {
        DualPathFeed::new(
            "DOGEUSDT",
            MarketDataConfig {
                primary_max_age_ms: 500,
                secondary_max_age_ms: 1000,
                vwap_window_ms: 1000,
                synthetic_half_spread_bp: 1.0,
            },
        )
    }

    fn depth_event(bid: Decimal, ask: Decimal, id: u64) -> MarketEvent {
        MarketEvent::Depth(MarketDepthUpdate {
            bids: vec![(bid, dec!(1000))],
            asks: vec![(ask, dec!(900))],
            ts_exch_ms: 0,
            last_update_id: id,
        })
    }

    #[test]
    fn fresh_book_is_primary_quality_one() {
        let mut f = feed();
        f.apply(&depth_event(dec!(0.26398), dec!(0.26402), 1), 0);
        let snap = f.snapshot(100 * MS);
        assert_eq!(snap.source, Source::Primary);
        assert_eq!(snap.mid, dec!(0.26400));
        assert_eq!(snap.quality, 1.0);
        assert!(snap.bid <= snap.mid && snap.mid <= snap.ask);
    }

    #[test]
    fn stale_book_falls_back_to_tape_vwap() {
        let mut f = feed();
        f.apply(&depth_event(dec!(0.26398), dec!(0.26402), 1), 0);
        f.apply(
            &MarketEvent::Trade(AggTrade { price: dec!(0.26500), qty: dec!(100), ts_exch_ms: 0 }),
            600 * MS,
        );
        let snap = f.snapshot(700 * MS);
        assert_eq!(snap.source, Source::Secondary);
        assert_eq!(snap.mid, dec!(0.26500));
        assert_eq!(snap.quality, 0.8);
        assert!(snap.bid < snap.mid && snap.mid < snap.ask);
        assert!(snap.is_tradable());
    }

    #[test]
    fn everything_stale_uses_last_known_mid() {
        let mut f = feed();
        f.apply(&depth_event(dec!(0.26398), dec!(0.26402), 1), 0);
        let snap = f.snapshot(10_000 * MS);
        assert_eq!(snap.source, Source::Fallback);
        assert_eq!(snap.mid, dec!(0.26400));
        assert_eq!(snap.quality, 0.5);
        assert!(snap.is_stale);
        assert!(!snap.is_tradable());
    }

    #[test]
    fn cold_start_emergency_mid_is_positive() {
        let mut f = feed();
        let snap = f.snapshot(0);
        assert_eq!(snap.source, Source::Emergency);
        assert!(snap.mid > Decimal::ZERO);
        assert_eq!(snap.quality, 0.1);
        assert!(!snap.is_tradable());
        assert!(snap.bid <= snap.mid && snap.mid <= snap.ask);
    }

    #[test]
    fn source_switches_are_counted() {
        let mut f = feed();
        f.apply(&depth_event(dec!(0.26398), dec!(0.26402), 1), 0);
        let _ = f.snapshot(100 * MS); // primary
        let _ = f.snapshot(10_000 * MS); // fallback
        f.apply(&depth_event(dec!(0.26398), dec!(0.26402), 2), 10_100 * MS);
        let _ = f.snapshot(10_200 * MS); // primary again
        assert_eq!(f.stats().source_switches, 2);
    }

    #[test]
    fn snapshot_mid_is_never_zero() {
        let mut f = feed();
        for now in [0, 50 * MS, 100_000 * MS] {
            assert!(f.snapshot(now).mid > Decimal::ZERO);
        }
    }
}
