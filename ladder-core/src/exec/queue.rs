//! Bounded priority queue for outbound order operations.
//!
//! Four levels, strict priority between levels, FIFO within a level. A
//! higher-priority arrival never preempts an in-flight network call; it is
//! simply head-of-line for the next flush.

use crate::core::PlannedOrder;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Dispatch priority, highest first. `Fill` is reserved for the
/// cross-response path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpPriority {
    Fill = 0,
    Cancel = 1,
    Replace = 2,
    Create = 3,
}

impl OpPriority {
    pub const LEVELS: usize = 4;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Outbound operation payload.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOp {
    Submit {
        order: PlannedOrder,
        critical: bool,
    },
    Cancel {
        order_id: u64,
        critical: bool,
    },
    Replace {
        cancel_order_id: u64,
        new: PlannedOrder,
        critical: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOp {
    pub priority: OpPriority,
    pub op: OrderOp,
    pub enqueued_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("op queue full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// MPSC queue shared between producers (decision worker, cross-response,
/// TTL sweep) and the single executor worker.
pub struct OpQueue {
    levels: Mutex<[VecDeque<QueuedOp>; OpPriority::LEVELS]>,
    capacity: usize,
    len: AtomicUsize,
    dropped: AtomicU64,
    notify: Notify,
}

impl OpQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            levels: Mutex::new(std::array::from_fn(|_| VecDeque::new())),
            capacity,
            len: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, item: QueuedOp) -> Result<(), QueueFull> {
        let mut levels = self.levels.lock();
        if self.len.load(Ordering::Acquire) >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(QueueFull { capacity: self.capacity });
        }
        levels[item.priority.index()].push_back(item);
        self.len.fetch_add(1, Ordering::AcqRel);
        drop(levels);
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the head of the highest non-empty level.
    pub fn try_pop(&self) -> Option<QueuedOp> {
        let mut levels = self.levels.lock();
        for level in levels.iter_mut() {
            if let Some(item) = level.pop_front() {
                self.len.fetch_sub(1, Ordering::AcqRel);
                return Some(item);
            }
        }
        None
    }

    /// Highest pending priority without consuming.
    pub fn peek_priority(&self) -> Option<OpPriority> {
        let levels = self.levels.lock();
        const ORDER: [OpPriority; 4] =
            [OpPriority::Fill, OpPriority::Cancel, OpPriority::Replace, OpPriority::Create];
        ORDER
            .iter()
            .copied()
            .find(|p| !levels[p.index()].is_empty())
    }

    /// Wait until at least one item is queued.
    pub async fn wait_nonempty(&self) {
        loop {
            if self.len.load(Ordering::Acquire) > 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.len.load(Ordering::Acquire) > 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Drop everything queued; used by the kill switch.
    pub fn clear(&self) -> usize {
        let mut levels = self.levels.lock();
        let mut cleared = 0;
        for level in levels.iter_mut() {
            cleared += level.len();
            level.clear();
        }
        self.len.store(0, Ordering::Release);
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Layer, Side};
    use rust_decimal_macros::dec;

    fn planned(tag: &str) -> PlannedOrder {
        PlannedOrder {
            side: Side::Buy,
            price: dec!(0.26395),
            qty: dec!(10),
            layer: Layer::L0,
            ttl_ms: 2000,
            client_order_id: tag.to_string(),
            post_only: true,
        }
    }

    fn queued(priority: OpPriority, tag: &str) -> QueuedOp {
        QueuedOp {
            priority,
            op: OrderOp::Submit { order: planned(tag), critical: false },
            enqueued_ns: 0,
        }
    }

    fn tag_of(op: &QueuedOp) -> String {
        match &op.op {
            OrderOp::Submit { order, .. } => order.client_order_id.clone(),
            _ => String::new(),
        }
    }

    #[test]
    fn higher_priority_pops_first() {
        let q = OpQueue::new(16);
        q.push(queued(OpPriority::Create, "create")).unwrap();
        q.push(queued(OpPriority::Cancel, "cancel")).unwrap();
        q.push(queued(OpPriority::Fill, "fill")).unwrap();

        assert_eq!(tag_of(&q.try_pop().unwrap()), "fill");
        assert_eq!(tag_of(&q.try_pop().unwrap()), "cancel");
        assert_eq!(tag_of(&q.try_pop().unwrap()), "create");
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn fifo_within_a_level() {
        let q = OpQueue::new(16);
        for tag in ["a", "b", "c"] {
            q.push(queued(OpPriority::Create, tag)).unwrap();
        }
        assert_eq!(tag_of(&q.try_pop().unwrap()), "a");
        assert_eq!(tag_of(&q.try_pop().unwrap()), "b");
        assert_eq!(tag_of(&q.try_pop().unwrap()), "c");
    }

    #[test]
    fn capacity_is_enforced() {
        let q = OpQueue::new(2);
        q.push(queued(OpPriority::Create, "a")).unwrap();
        q.push(queued(OpPriority::Create, "b")).unwrap();
        assert!(q.push(queued(OpPriority::Fill, "c")).is_err());
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn clear_empties_all_levels() {
        let q = OpQueue::new(16);
        q.push(queued(OpPriority::Fill, "a")).unwrap();
        q.push(queued(OpPriority::Create, "b")).unwrap();
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn wait_nonempty_wakes_on_push() {
        use std::sync::Arc;
        let q = Arc::new(OpQueue::new(4));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            q2.wait_nonempty().await;
            q2.try_pop().unwrap()
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        q.push(queued(OpPriority::Cancel, "x")).unwrap();
        let got = waiter.await.unwrap();
        assert_eq!(got.priority, OpPriority::Cancel);
    }

    #[test]
    fn peek_reports_highest_priority() {
        let q = OpQueue::new(16);
        assert_eq!(q.peek_priority(), None);
        q.push(queued(OpPriority::Replace, "r")).unwrap();
        q.push(queued(OpPriority::Cancel, "c")).unwrap();
        assert_eq!(q.peek_priority(), Some(OpPriority::Cancel));
    }
}
