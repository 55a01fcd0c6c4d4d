//! Per-address critical sections. A lock is held from reading the current
//! lease until the write for that address returned, so two allocations in this
//! process never interleave their read-check-write on the same address.
//! Nothing ever waits on a lock: a busy address is simply skipped.
use std::{collections::HashSet, net::IpAddr, sync::Arc};

use parking_lot::Mutex;

#[derive(Debug, Clone, Default)]
pub struct AddrLocks {
    held: Arc<Mutex<HashSet<IpAddr>>>,
}

impl AddrLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// None if the address is already locked
    pub fn try_lock(&self, addr: IpAddr) -> Option<AddrGuard> {
        if self.held.lock().insert(addr) {
            Some(AddrGuard {
                held: Arc::clone(&self.held),
                addr,
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, addr: IpAddr) -> bool {
        self.held.lock().contains(&addr)
    }
}

/// unlocks the address on drop
#[derive(Debug)]
pub struct AddrGuard {
    held: Arc<Mutex<HashSet<IpAddr>>>,
    addr: IpAddr,
}

impl AddrGuard {
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

impl Drop for AddrGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_until_dropped() {
        let locks = AddrLocks::new();
        let addr = "10.0.0.10".parse().unwrap();
        let guard = locks.try_lock(addr).unwrap();
        assert_eq!(guard.addr(), addr);
        assert!(locks.is_locked(addr));
        assert!(locks.clone().try_lock(addr).is_none());
        // other addresses are independent
        assert!(locks.try_lock("10.0.0.11".parse().unwrap()).is_some());

        drop(guard);
        assert!(!locks.is_locked(addr));
        assert!(locks.try_lock(addr).is_some());
    }
}
