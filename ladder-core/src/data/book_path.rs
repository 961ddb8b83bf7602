//! Primary market-data path: top of book from the depth stream.

use crate::connector::MarketDepthUpdate;
use crate::core::TopOfBook;
use rust_decimal::Decimal;

/// Maintains best bid/ask from depth updates and knows how old they are.
#[derive(Debug, Default)]
pub struct BookPath {
    top: Option<TopOfBook>,
    last_update_id: u64,
    update_count: u64,
}

impl BookPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a depth update. Out-of-order updates (by `last_update_id`)
    /// and updates with an empty side are ignored.
    pub fn update(&mut self, depth: &MarketDepthUpdate, now_ns: u64) {
        if depth.last_update_id != 0 && depth.last_update_id <= self.last_update_id {
            return;
        }
        let (Some(&(bid, bid_qty)), Some(&(ask, ask_qty))) =
            (depth.bids.first(), depth.asks.first())
        else {
            return;
        };
        if bid <= Decimal::ZERO || ask <= Decimal::ZERO {
            return;
        }
        self.top = Some(TopOfBook { bid, ask, bid_qty, ask_qty, last_update_ns: now_ns });
        self.last_update_id = depth.last_update_id;
        self.update_count += 1;
    }

    /// Fresh iff we have a sane book no older than `max_age_ms`.
    pub fn is_fresh(&self, now_ns: u64, max_age_ms: u64) -> bool {
        match self.top {
            Some(top) => {
                top.bid > Decimal::ZERO
                    && top.ask > top.bid
                    && now_ns.saturating_sub(top.last_update_ns) <= max_age_ms * 1_000_000
            }
            None => false,
        }
    }

    pub fn top(&self) -> Option<TopOfBook> {
        self.top
    }

    pub fn mid(&self) -> Option<Decimal> {
        self.top.map(|t| (t.bid + t.ask) / Decimal::TWO)
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn depth(bid: Decimal, ask: Decimal, update_id: u64) -> MarketDepthUpdate {
        MarketDepthUpdate {
            bids: vec![(bid, dec!(1000))],
            asks: vec![(ask, dec!(900))],
            ts_exch_ms: 0,
            last_update_id: update_id,
        }
    }

    #[test]
    fn tracks_top_of_book() {
        let mut path = BookPath::new();
        path.update(&depth(dec!(0.26398), dec!(0.26402), 1), 1_000);
        assert_eq!(path.mid(), Some(dec!(0.26400)));
        assert!(path.is_fresh(1_000, 500));
    }

    #[test]
    fn freshness_expires() {
        let mut path = BookPath::new();
        path.update(&depth(dec!(0.26398), dec!(0.26402), 1), 0);
        assert!(path.is_fresh(500 * 1_000_000, 500));
        assert!(!path.is_fresh(501 * 1_000_000, 500));
    }

    #[test]
    fn stale_update_ids_are_dropped() {
        let mut path = BookPath::new();
        path.update(&depth(dec!(0.26398), dec!(0.26402), 5), 0);
        path.update(&depth(dec!(0.30000), dec!(0.30004), 4), 0);
        assert_eq!(path.mid(), Some(dec!(0.26400)));
        assert_eq!(path.update_count(), 1);
    }

    #[test]
    fn empty_or_crossed_book_is_not_fresh() {
        let mut path = BookPath::new();
        assert!(!path.is_fresh(0, 500));
        path.update(
            &MarketDepthUpdate {
                bids: vec![],
                asks: vec![(dec!(0.264), dec!(1))],
                ts_exch_ms: 0,
                last_update_id: 1,
            },
            0,
        );
        assert!(path.top().is_none());
    }
}
