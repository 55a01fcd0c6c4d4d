//! Expired lease reclamation, run as a background task owned by the caller.
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use alloc_core::{
    config::cli::EngineOpts,
    metrics,
    tokio::{self, task::JoinHandle},
};
use lease_store::{DeleteOutcome, LeaseRepository, LeaseState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::{
    engine::{AllocEngine, reclaim_lease},
    error::AllocError,
    hooks::AllocHooks,
    locks::AddrLocks,
};

/// counts from one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimStats {
    pub reclaimed: usize,
    /// reclaimed leases deleted after the hold time
    pub removed: usize,
    /// busy or changed while sweeping, picked up next time
    pub skipped: usize,
}

impl ReclaimStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
pub struct Reclaimer<R> {
    repo: Arc<R>,
    hooks: Arc<dyn AllocHooks>,
    locks: AddrLocks,
    interval: Duration,
    batch: usize,
    hold: Option<Duration>,
}

impl<R: LeaseRepository> AllocEngine<R> {
    /// reclaimer sharing this engine's repository, hooks and address locks
    pub fn reclaimer(&self, opts: &EngineOpts) -> Reclaimer<R> {
        Reclaimer {
            repo: Arc::clone(self.repo()),
            hooks: Arc::clone(self.hooks()),
            locks: self.locks().clone(),
            interval: opts.reclaim_interval(),
            batch: opts.reclaim_batch,
            hold: opts.hold_reclaimed_time(),
        }
    }
}

impl<R: LeaseRepository> Reclaimer<R> {
    /// Reclaim up to one batch of expired leases, then delete reclaimed leases
    /// that have been held for longer than the hold time.
    pub async fn reclaim_once(&self, now: SystemTime) -> Result<ReclaimStats, AllocError> {
        let mut stats = ReclaimStats::default();
        for lease in self.repo.scan_expired(self.batch, now).await? {
            let Some(_guard) = self.locks.try_lock(lease.addr) else {
                stats.skipped += 1;
                continue;
            };
            match reclaim_lease(self.repo.as_ref(), self.hooks.as_ref(), lease).await? {
                Some(_) => stats.reclaimed += 1,
                None => stats.skipped += 1,
            }
        }

        let Some(hold) = self.hold else {
            return Ok(stats);
        };
        let before = now.checked_sub(hold).unwrap_or(SystemTime::UNIX_EPOCH);
        for lease in self.repo.scan_reclaimed(before, self.batch).await? {
            let Some(_guard) = self.locks.try_lock(lease.addr) else {
                stats.skipped += 1;
                continue;
            };
            // the address may have been handed out again since the scan
            match self.repo.get_lease(lease.addr).await? {
                Some(cur) if cur.state == LeaseState::Reclaimed && cur.version == lease.version => {
                    if let DeleteOutcome::Deleted(_) = self.repo.delete_lease(lease.addr).await? {
                        metrics::LEASES_REMOVED.inc();
                        trace!(addr = ?lease.addr, "removed reclaimed lease");
                        stats.removed += 1;
                    }
                }
                _ => stats.skipped += 1,
            }
        }
        Ok(stats)
    }

    /// run [`Reclaimer::reclaim_once`] every interval until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("lease reclamation task stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        match self.reclaim_once(SystemTime::now()).await {
                            Ok(stats) if stats.is_empty() => trace!("nothing to reclaim"),
                            Ok(stats) => info!(
                                reclaimed = stats.reclaimed,
                                removed = stats.removed,
                                skipped = stats.skipped,
                                "lease reclamation sweep completed"
                            ),
                            Err(err) => error!(?err, "lease reclamation sweep failed"),
                        }
                    }
                }
            }
        })
    }
}
