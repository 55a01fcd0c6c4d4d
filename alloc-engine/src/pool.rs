//! Order in which a pool's candidates are tried.
//!
//! The iterative allocator keeps one cursor per pool and continues after the
//! last candidate it handed out, the random allocator starts anywhere. Both
//! then walk the pool in order and wrap, so every candidate is visited at
//! most once per attempt.
use std::{collections::HashMap, net::IpAddr};

use config::{AllocatorKind, Pool, SubnetId};
use parking_lot::Mutex;
use rand::Rng;

#[derive(Debug, Default)]
pub struct PoolCursors {
    next: Mutex<HashMap<(SubnetId, IpAddr), u128>>,
}

impl PoolCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// candidate indices of `pool`, at most `limit` of them
    pub fn walk(
        &self,
        subnet: SubnetId,
        pool: &Pool,
        allocator: AllocatorKind,
        limit: Option<u64>,
    ) -> PoolWalk {
        let capacity = pool.capacity();
        let start = match allocator {
            AllocatorKind::Iterative => self
                .next
                .lock()
                .get(&(subnet, pool.first()))
                .copied()
                .unwrap_or(0),
            AllocatorKind::Random => rand::thread_rng().gen_range(0..capacity),
        };
        PoolWalk {
            start: start % capacity,
            capacity,
            remaining: limit.map_or(capacity, |l| capacity.min(l as u128)),
            offset: 0,
        }
    }

    /// index `idx` of `pool` was handed out
    pub fn picked(&self, subnet: SubnetId, pool: &Pool, idx: u128) {
        let next = if idx.saturating_add(1) >= pool.capacity() {
            0
        } else {
            idx + 1
        };
        self.next.lock().insert((subnet, pool.first()), next);
    }
}

#[derive(Debug, Clone)]
pub struct PoolWalk {
    start: u128,
    capacity: u128,
    remaining: u128,
    offset: u128,
}

impl Iterator for PoolWalk {
    type Item = u128;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // start + offset may overflow for a pool spanning all of v6
        let idx = match self.start.checked_add(self.offset) {
            Some(i) if i < self.capacity => i,
            Some(i) => i - self.capacity,
            None => self.offset - (self.capacity - self.start),
        };
        self.offset += 1;
        Some(idx)
    }
}
