//! Client order id generation.
//!
//! Ids are time-ordered (millisecond prefix) with a random suffix so two
//! orders planned in the same millisecond cannot collide. The side/layer
//! prefix makes venue logs greppable.

use crate::core::{Layer, Side};
use rand::Rng;

/// e.g. `B0-1718000123456-9f3a2c`.
pub fn new_client_order_id(side: Side, layer: Layer) -> String {
    let prefix = match side {
        Side::Buy => 'B',
        Side::Sell => 'S',
    };
    let suffix: u32 = rand::thread_rng().gen_range(0..0xFFFFFF);
    format!(
        "{}{}-{}-{:06x}",
        prefix,
        layer.index(),
        super::clock::epoch_ms(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_side_and_layer() {
        let id = new_client_order_id(Side::Sell, Layer::L2);
        assert!(id.starts_with("S2-"));
    }

    #[test]
    fn ids_do_not_collide_in_bulk() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(new_client_order_id(Side::Buy, Layer::L0)));
        }
    }

    #[test]
    fn ids_sort_by_time() {
        let a = new_client_order_id(Side::Buy, Layer::L0);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_client_order_id(Side::Buy, Layer::L0);
        // Same prefix length, millisecond field is zero-padded by epoch scale.
        assert!(a < b);
    }
}
