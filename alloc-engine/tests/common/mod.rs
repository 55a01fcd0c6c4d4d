#![allow(dead_code)]

use std::{
    net::IpAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::SystemTime,
};

use alloc_engine::ClientContext;
use async_trait::async_trait;
use config::{ClientIdentifiers, Identifier, SubnetId, SubnetSelector, Topology, TopologyStore};
use lease_store::{
    DeleteOutcome, Lease, LeaseRepository, MemoryStore, Precondition, RepositoryError,
    WriteOutcome,
};

pub fn topology(yaml: &str) -> Arc<Topology> {
    TopologyStore::new().commit_str(yaml).unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn mac(s: &str) -> ClientIdentifiers {
    let hw = s
        .split(':')
        .map(|b| u8::from_str_radix(b, 16).unwrap())
        .collect();
    ClientIdentifiers {
        hw_address: Some(hw),
        ..ClientIdentifiers::default()
    }
}

pub fn on_iface(ids: ClientIdentifiers, iface: &str) -> ClientContext {
    ClientContext::new(
        ids,
        SubnetSelector {
            iface: Some(iface.to_owned()),
            ..SubnetSelector::default()
        },
    )
}

/// active leases per address in the store
pub fn active_count(store: &MemoryStore, addr: IpAddr) -> usize {
    let now = SystemTime::now();
    store
        .snapshot()
        .iter()
        .filter(|l| l.addr == addr && l.is_active(now))
        .count()
}

/// fails the first `failures` writes with a transient error
#[derive(Debug, Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
        }
    }
}

#[async_trait]
impl LeaseRepository for FlakyStore {
    async fn get_lease(&self, addr: IpAddr) -> Result<Option<Lease>, RepositoryError> {
        self.inner.get_lease(addr).await
    }
    async fn get_leases(&self, owner: &Identifier) -> Result<Vec<Lease>, RepositoryError> {
        self.inner.get_leases(owner).await
    }
    async fn create_or_update(
        &self,
        lease: Lease,
        expected: Precondition,
    ) -> Result<WriteOutcome, RepositoryError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(RepositoryError::Transient("connection reset".to_owned()));
        }
        self.inner.create_or_update(lease, expected).await
    }
    async fn delete_lease(&self, addr: IpAddr) -> Result<DeleteOutcome, RepositoryError> {
        self.inner.delete_lease(addr).await
    }
    async fn scan_expired(
        &self,
        max: usize,
        now: SystemTime,
    ) -> Result<Vec<Lease>, RepositoryError> {
        self.inner.scan_expired(max, now).await
    }
    async fn scan_reclaimed(
        &self,
        before: SystemTime,
        max: usize,
    ) -> Result<Vec<Lease>, RepositoryError> {
        self.inner.scan_reclaimed(before, max).await
    }
    async fn count_active(
        &self,
        subnet: SubnetId,
        now: SystemTime,
    ) -> Result<usize, RepositoryError> {
        self.inner.count_active(subnet, now).await
    }
}
