//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at one price. Orders live in a
//! per-level arena and are linked into a doubly-linked FIFO through arena
//! slots, so removal by handle is O(1) and slots stay stable while other
//! orders come and go.

use slab::Slab;
use types::order::Order;

/// A price level containing orders at a specific price
///
/// Insertion order is time priority. `push_front` exists for orders that must
/// keep their priority when re-inserted.
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    /// Arena of orders at this level
    orders: Slab<LevelOrder>,
    head: Option<usize>,
    tail: Option<usize>,
}

/// Arena entry with intrusive links to its neighbours
#[derive(Debug, Clone)]
struct LevelOrder {
    order: Order,
    prev: Option<usize>,
    next: Option<usize>,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order at the back of the queue. Returns its arena slot.
    pub fn push_back(&mut self, order: Order) -> usize {
        let slot = self.orders.insert(LevelOrder {
            order,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.orders[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        slot
    }

    /// Insert an order at the front of the queue. Returns its arena slot.
    pub fn push_front(&mut self, order: Order) -> usize {
        let slot = self.orders.insert(LevelOrder {
            order,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(head) => self.orders[head].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        slot
    }

    /// Unlink and return the order stored at `slot`.
    pub fn remove(&mut self, slot: usize) -> Option<Order> {
        let entry = self.orders.try_remove(slot)?;
        match entry.prev {
            Some(prev) => self.orders[prev].next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.orders[next].prev = entry.prev,
            None => self.tail = entry.prev,
        }
        Some(entry.order)
    }

    /// Slot of the oldest order.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Slot following `slot` in time priority.
    pub fn next_slot(&self, slot: usize) -> Option<usize> {
        self.orders.get(slot).and_then(|entry| entry.next)
    }

    pub fn get(&self, slot: usize) -> Option<&Order> {
        self.orders.get(slot).map(|entry| &entry.order)
    }

    /// Orders in time priority.
    pub fn iter(&self) -> LevelIter<'_> {
        LevelIter {
            level: self,
            cursor: self.head,
        }
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Get the number of orders at this level
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// FIFO iterator over a level
pub struct LevelIter<'a> {
    level: &'a PriceLevel,
    cursor: Option<usize>,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = (usize, &'a Order);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let entry = self.level.orders.get(slot)?;
        self.cursor = entry.next;
        Some((slot, &entry.order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{ClobPairId, OrderId, SubaccountId};
    use types::numeric::{BaseQuantums, Subticks};
    use types::order::{GoodTil, Side, TimeInForce};

    fn create_test_order(client_id: u32) -> Order {
        Order::new(
            OrderId::new(SubaccountId::new("alice", 0), client_id, 0, ClobPairId(0)),
            Side::BUY,
            BaseQuantums(10),
            Subticks(100),
            GoodTil::Block(10),
            TimeInForce::GTC,
        )
    }

    fn client_ids(level: &PriceLevel) -> Vec<u32> {
        level.iter().map(|(_, order)| order.order_id.client_id).collect()
    }

    #[test]
    fn test_price_level_fifo_order() {
        let mut level = PriceLevel::new();
        level.push_back(create_test_order(1));
        level.push_back(create_test_order(2));
        level.push_back(create_test_order(3));

        assert_eq!(client_ids(&level), vec![1, 2, 3]);
        assert_eq!(level.order_count(), 3);
    }

    #[test]
    fn test_price_level_push_front() {
        let mut level = PriceLevel::new();
        level.push_back(create_test_order(1));
        level.push_front(create_test_order(0));

        assert_eq!(client_ids(&level), vec![0, 1]);
    }

    #[test]
    fn test_price_level_remove_middle() {
        let mut level = PriceLevel::new();
        level.push_back(create_test_order(1));
        let middle = level.push_back(create_test_order(2));
        level.push_back(create_test_order(3));

        let removed = level.remove(middle).unwrap();
        assert_eq!(removed.order_id.client_id, 2);
        assert_eq!(client_ids(&level), vec![1, 3]);
        assert!(level.remove(middle).is_none());
    }

    #[test]
    fn test_price_level_remove_head_and_tail() {
        let mut level = PriceLevel::new();
        let first = level.push_back(create_test_order(1));
        let last = level.push_back(create_test_order(2));

        level.remove(first);
        assert_eq!(level.head(), Some(last));
        level.remove(last);
        assert!(level.is_empty());
        assert_eq!(level.head(), None);

        // Level is reusable once drained
        level.push_back(create_test_order(9));
        assert_eq!(client_ids(&level), vec![9]);
    }

    #[test]
    fn test_price_level_slots_stable_across_removals() {
        let mut level = PriceLevel::new();
        let a = level.push_back(create_test_order(1));
        let b = level.push_back(create_test_order(2));
        level.remove(a);
        level.push_back(create_test_order(3));

        assert_eq!(level.get(b).unwrap().order_id.client_id, 2);
        assert_eq!(level.next_slot(b).map(|s| level.get(s).unwrap().order_id.client_id), Some(3));
    }
}
