use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use config::{Identifier, SubnetId};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    DeleteOutcome, Lease, LeaseRepository, LeaseState, Precondition, RepositoryError, WriteOutcome,
};

/// Leases kept in a map behind a mutex. Each call takes the lock once, so a
/// compare-and-swap is atomic with respect to every other call.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<IpAddr, Lease>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// every record, ordered by address
    pub fn snapshot(&self) -> Vec<Lease> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl LeaseRepository for MemoryStore {
    async fn get_lease(&self, addr: IpAddr) -> Result<Option<Lease>, RepositoryError> {
        Ok(self.inner.lock().get(&addr).cloned())
    }

    async fn get_leases(&self, owner: &Identifier) -> Result<Vec<Lease>, RepositoryError> {
        let guard = self.inner.lock();
        Ok(guard
            .values()
            .filter(|lease| lease.is_owned_by(owner))
            .cloned()
            .collect())
    }

    async fn create_or_update(
        &self,
        mut lease: Lease,
        expected: Precondition,
    ) -> Result<WriteOutcome, RepositoryError> {
        let mut guard = self.inner.lock();
        let current = guard.get(&lease.addr);
        let version = match (expected, current) {
            (Precondition::Vacant, None) => 1,
            (Precondition::Matches(v), Some(cur)) if cur.version == v => v + 1,
            (_, current) => {
                trace!(addr = ?lease.addr, ?expected, found = ?current.map(|l| l.version), "write precondition failed");
                return Ok(WriteOutcome::Conflict(current.cloned()));
            }
        };
        lease.version = version;
        guard.insert(lease.addr, lease.clone());
        Ok(WriteOutcome::Committed(lease))
    }

    async fn delete_lease(&self, addr: IpAddr) -> Result<DeleteOutcome, RepositoryError> {
        Ok(match self.inner.lock().remove(&addr) {
            Some(lease) => {
                debug!(?addr, "deleted lease");
                DeleteOutcome::Deleted(lease)
            }
            None => DeleteOutcome::NotFound,
        })
    }

    async fn scan_expired(
        &self,
        max: usize,
        now: SystemTime,
    ) -> Result<Vec<Lease>, RepositoryError> {
        let guard = self.inner.lock();
        let mut expired = guard
            .values()
            .filter(|lease| lease.needs_reclaim(now))
            .cloned()
            .collect::<Vec<_>>();
        expired.sort_by_key(|lease| lease.expires_at());
        expired.truncate(max);
        Ok(expired)
    }

    async fn scan_reclaimed(
        &self,
        before: SystemTime,
        max: usize,
    ) -> Result<Vec<Lease>, RepositoryError> {
        let guard = self.inner.lock();
        Ok(guard
            .values()
            .filter(|lease| lease.state == LeaseState::Reclaimed && lease.expires_at() < before)
            .take(max)
            .cloned()
            .collect())
    }

    async fn count_active(
        &self,
        subnet: SubnetId,
        now: SystemTime,
    ) -> Result<usize, RepositoryError> {
        let guard = self.inner.lock();
        Ok(guard
            .values()
            .filter(|lease| lease.subnet_id == subnet && lease.is_active(now))
            .count())
    }
}
