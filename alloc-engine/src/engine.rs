use std::{
    fmt,
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use alloc_core::{
    metrics::{self, ALLOC_OUTCOME},
    print_time,
};
use config::{
    ClassSet, ClientIdentifiers, HostReservation, Identifier, Lifetimes, Pool, Scope, Subnet,
    SubnetId, Topology,
};
use lease_store::{
    DeleteOutcome, Lease, LeaseRepository, LeaseState, Precondition, WriteOutcome,
};
use tracing::{debug, instrument, trace, warn};

use crate::{
    context::{AllocMode, ClientContext, LeaseType},
    error::AllocError,
    hooks::{AllocHooks, HookAction, NoHooks},
    locks::AddrLocks,
    pool::PoolCursors,
    selector::{self, Candidate, Selection},
};

/// how long a declined address is kept out of use
pub const DEFAULT_DECLINE_PROBATION: Duration = Duration::from_secs(86_400);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AllocKind {
    /// dynamically picked address
    New,
    /// the client's active lease, extended
    Renewed,
    /// fixed address from a host reservation
    Reserved,
}

/// A lease handed to a client and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub lease: Lease,
    pub subnet_id: SubnetId,
    pub pool_id: Option<u32>,
    pub kind: AllocKind,
    pub hostname: Option<String>,
    pub classes: ClassSet,
    pub lifetimes: Lifetimes,
    /// false for offers, nothing was written
    pub committed: bool,
}

/// steps of one allocation attempt, logged as they're taken
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AllocState {
    Requested,
    ReservationCheck,
    ConflictCheck,
    Committed,
    Rejected,
}

impl fmt::Display for AllocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocState::Requested => "requested",
            AllocState::ReservationCheck => "reservation-check",
            AllocState::ConflictCheck => "conflict-check",
            AllocState::Committed => "committed",
            AllocState::Rejected => "rejected",
        })
    }
}

fn transition(state: &mut AllocState, next: AllocState, addr: Option<IpAddr>) {
    trace!(from = %state, to = %next, ?addr, "allocation state");
    *state = next;
}

/// what became of one candidate address
enum Tried {
    Allocated(Allocation),
    /// in use, reserved for someone else, or otherwise not for this client
    Unavailable,
    /// locked by another request in this process, may be free once it's done
    Busy,
}

impl Tried {
    /// the allocation, if any, remembering `addr` in `busy` when it was locked
    fn note_busy(self, addr: IpAddr, busy: &mut Option<IpAddr>) -> Option<Allocation> {
        match self {
            Tried::Allocated(alloc) => Some(alloc),
            Tried::Busy => {
                busy.get_or_insert(addr);
                None
            }
            Tried::Unavailable => None,
        }
    }
}

/// result of trying every candidate of one subnet
enum Walk {
    Allocated(Allocation),
    /// nothing handed out. `busy` is a locked address skipped on the way
    Exhausted { busy: Option<IpAddr> },
}

/// per-subnet facts of one allocation attempt
struct Attempt<'a, 't> {
    ctx: &'a ClientContext,
    candidate: &'a Candidate<'t>,
    owner: Identifier,
    classes: ClassSet,
    /// scope whose reservations dynamic allocation must stay clear of
    in_pool_check: Option<Scope>,
    lifetimes: Lifetimes,
    hostname: Option<String>,
    mode: AllocMode,
    now: SystemTime,
}

impl Attempt<'_, '_> {
    fn subnet(&self) -> &Subnet {
        self.candidate.subnet
    }

    fn pools(&self) -> &[Pool] {
        match self.ctx.lease_type {
            LeaseType::Address => self.subnet().pools(),
            LeaseType::Prefix => self.subnet().pd_pools(),
        }
    }

    /// pools the client's classes allow
    fn eligible_pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools().iter().filter(|p| p.match_class(&self.classes))
    }

    fn eligible_pool_of(&self, addr: IpAddr) -> Option<&Pool> {
        self.eligible_pools().find(|p| p.contains(addr))
    }

    /// prefix length of a single address in this subnet
    fn addr_len(&self) -> u8 {
        if self.subnet().is_v6() { 128 } else { 32 }
    }

    /// the lease is of the kind being requested
    fn same_type(&self, lease: &Lease) -> bool {
        (lease.prefix_len < self.addr_len()) == (self.ctx.lease_type == LeaseType::Prefix)
    }
}

/// Selects subnets and allocates leases against a committed [`Topology`].
///
/// The engine keeps no lease state of its own, the [`LeaseRepository`] is the
/// only source of truth. Within one process, [`AddrLocks`] make the
/// read-check-write on an address exclusive, the repository's
/// compare-and-swap covers everything else.
pub struct AllocEngine<R> {
    repo: Arc<R>,
    hooks: Arc<dyn AllocHooks>,
    locks: AddrLocks,
    cursors: PoolCursors,
    max_alloc_attempts: Option<u64>,
    decline_probation: Duration,
}

impl<R> fmt::Debug for AllocEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocEngine")
            .field("max_alloc_attempts", &self.max_alloc_attempts)
            .field("decline_probation", &self.decline_probation)
            .finish()
    }
}

impl<R> AllocEngine<R>
where
    R: LeaseRepository,
{
    pub fn new(repo: R) -> Self {
        Self::with_repo(Arc::new(repo))
    }

    pub fn with_repo(repo: Arc<R>) -> Self {
        Self {
            repo,
            hooks: Arc::new(NoHooks),
            locks: AddrLocks::new(),
            cursors: PoolCursors::new(),
            max_alloc_attempts: None,
            decline_probation: DEFAULT_DECLINE_PROBATION,
        }
    }

    pub fn with_hooks(mut self, hooks: impl AllocHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// candidates tried per pool, None for the pool's capacity
    pub fn with_max_alloc_attempts(mut self, max: Option<u64>) -> Self {
        self.max_alloc_attempts = max;
        self
    }

    pub fn with_decline_probation(mut self, probation: Duration) -> Self {
        self.decline_probation = probation;
        self
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn AllocHooks> {
        &self.hooks
    }

    pub(crate) fn locks(&self) -> &AddrLocks {
        &self.locks
    }

    /// Pick the subnet for a request. Resolves the client's classes into `ctx`.
    #[instrument(level = "debug", skip_all, fields(selector = ?ctx.selector))]
    pub fn select<'t>(
        &self,
        topo: &'t Topology,
        ctx: &mut ClientContext,
    ) -> Result<Selection<'t>, AllocError> {
        selector::select_subnet(topo, ctx)
    }

    /// Select a subnet and allocate a lease in it, falling back to the other
    /// candidates of a shared network when a subnet has no free address.
    #[instrument(level = "debug", skip_all, fields(hw = ?ctx.ids.hw_address, hint = ?ctx.hint, mode = ?mode))]
    pub async fn allocate(
        &self,
        topo: &Topology,
        ctx: &mut ClientContext,
        mode: AllocMode,
    ) -> Result<Allocation, AllocError> {
        let start = Instant::now();
        let res = self.allocate_inner(topo, ctx, mode).await;
        metrics::ALLOC_DURATION.observe(start.elapsed().as_secs_f64());
        record_outcome(&res, mode);
        res
    }

    async fn allocate_inner(
        &self,
        topo: &Topology,
        ctx: &mut ClientContext,
        mode: AllocMode,
    ) -> Result<Allocation, AllocError> {
        if ctx.ids.is_empty() {
            return Err(AllocError::MissingIdentifier);
        }
        let mut selection = self.select(topo, ctx)?;
        let ctx = &*ctx;

        // candidates may disagree on `match_client_id`, so the client can own
        // leases under more than one identifier
        let mut owners = Vec::new();
        for candidate in selection.candidates() {
            let owner = ctx
                .ids
                .owner(candidate.params.match_client_id)
                .ok_or(AllocError::MissingIdentifier)?;
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
        let mut existing = Vec::new();
        for owner in &owners {
            existing.extend(self.repo.get_leases(owner).await?);
        }
        let now = SystemTime::now();
        // a client with an active lease somewhere in the shared network keeps it
        selection.prefer(|subnet| {
            existing
                .iter()
                .any(|l| l.subnet_id == subnet.id() && l.is_active(now))
        });

        let mut last = selection.subnet().id();
        let mut busy = None;
        for candidate in selection.candidates() {
            match self
                .allocate_in(topo, candidate, ctx, mode, &existing)
                .await?
            {
                Walk::Allocated(alloc) => return Ok(alloc),
                Walk::Exhausted { busy: skipped } => {
                    last = candidate.subnet.id();
                    debug!(subnet = %last, "no address in subnet, trying next candidate");
                    busy = busy.or(skipped);
                }
            }
        }
        match busy {
            // an address was only locked, not taken. Worth another try
            Some(addr) => {
                debug!(?addr, "no free address but some were busy");
                Err(AllocError::RepositoryConflict { addr })
            }
            None => Err(AllocError::PoolExhausted { subnet: last }),
        }
    }

    async fn allocate_in(
        &self,
        topo: &Topology,
        candidate: &Candidate<'_>,
        ctx: &ClientContext,
        mode: AllocMode,
        existing: &[Lease],
    ) -> Result<Walk, AllocError> {
        let subnet = candidate.subnet;
        let params = &candidate.params;
        let mut state = AllocState::Requested;
        let owner = ctx
            .ids
            .owner(params.match_client_id)
            .ok_or(AllocError::MissingIdentifier)?;

        transition(&mut state, AllocState::ReservationCheck, None);
        let reservation = selector::effective_reservation(topo, candidate, &ctx.ids);
        let classes = selector::classes_with_reservation(topo, ctx, reservation);
        let attempt = Attempt {
            ctx,
            candidate,
            owner,
            in_pool_check: params.reservation_mode.in_pool_check(subnet.id()),
            lifetimes: params.lease_time.determine_lease(ctx.requested_lifetime),
            hostname: reservation
                .and_then(|r| r.hostname())
                .map(|h| h.to_owned())
                .or_else(|| ctx.hostname.clone()),
            classes,
            mode,
            now: SystemTime::now(),
        };
        debug!(
            subnet = %subnet.id(),
            reservation = ?reservation.map(|r| r.label()),
            classes = %attempt.classes,
            "resolved reservation"
        );

        if let Some((addr, prefix_len)) = reservation.and_then(|r| self.fixed_target(&attempt, r)) {
            transition(&mut state, AllocState::ConflictCheck, Some(addr));
            let pool_id = attempt.pools().iter().find(|p| p.contains(addr)).and_then(|p| p.id());
            return match self
                .try_addr(topo, &attempt, addr, prefix_len, pool_id, true)
                .await
                {
                Ok(Tried::Allocated(alloc)) => {
                    transition(&mut state, AllocState::Committed, Some(addr));
                    Ok(Walk::Allocated(alloc))
                }
                // fixed addresses report errors instead of being skipped
                Ok(Tried::Unavailable | Tried::Busy) => Err(AllocError::RepositoryConflict { addr }),
                Err(err) => {
                    transition(&mut state, AllocState::Rejected, Some(addr));
                    Err(err)
                }
            };
        }

        transition(&mut state, AllocState::ConflictCheck, None);
        let res = self.allocate_dynamic(topo, &attempt, existing).await;
        match &res {
            Ok(Walk::Allocated(alloc)) => {
                transition(&mut state, AllocState::Committed, Some(alloc.lease.addr))
            }
            Ok(Walk::Exhausted { .. }) | Err(_) => {
                transition(&mut state, AllocState::Rejected, None)
            }
        }
        res
    }

    /// the reserved address or prefix, if this subnet may hand it out
    fn fixed_target(
        &self,
        attempt: &Attempt<'_, '_>,
        res: &HostReservation,
    ) -> Option<(IpAddr, u8)> {
        let subnet = attempt.subnet();
        let (addr, prefix_len) = match attempt.ctx.lease_type {
            LeaseType::Address => (res.address(subnet.is_v6())?, attempt.addr_len()),
            LeaseType::Prefix => {
                let prefix = res.prefixes().first()?;
                (prefix.network(), prefix.prefix_len())
            }
        };
        let in_pool = attempt.pools().iter().any(|p| p.contains(addr));
        let mode = attempt.candidate.params.reservation_mode;
        if !subnet.contains(addr) && attempt.ctx.lease_type == LeaseType::Address {
            debug!(?addr, subnet = %subnet.prefix(), "reserved address outside subnet, ignoring it");
            return None;
        }
        if in_pool || mode.out_of_pool_allowed() {
            Some((addr, prefix_len))
        } else {
            debug!(?addr, ?mode, "reserved address outside pools not allowed by mode");
            None
        }
    }

    async fn allocate_dynamic(
        &self,
        topo: &Topology,
        attempt: &Attempt<'_, '_>,
        existing: &[Lease],
    ) -> Result<Walk, AllocError> {
        let subnet_id = attempt.subnet().id();
        let mine = existing
            .iter()
            .filter(|l| {
                l.subnet_id == subnet_id && l.is_owned_by(&attempt.owner) && attempt.same_type(l)
            })
            .collect::<Vec<_>>();
        let mut busy = None;

        // renewal of an active lease still inside an eligible pool
        for lease in mine.iter().filter(|l| l.is_active(attempt.now)) {
            if let Some(pool) = attempt.eligible_pool_of(lease.addr) {
                if let Some(alloc) = self
                    .try_addr(topo, attempt, lease.addr, pool.prefix_len(), pool.id(), false)
                    .await?
                    .note_busy(lease.addr, &mut busy)
                {
                    return Ok(Walk::Allocated(alloc));
                }
            }
        }

        if let Some(hint) = attempt.ctx.hint {
            match attempt.eligible_pool_of(hint) {
                Some(pool) => {
                    if let Some(alloc) = self
                        .try_addr(topo, attempt, hint, pool.prefix_len(), pool.id(), false)
                        .await?
                        .note_busy(hint, &mut busy)
                    {
                        return Ok(Walk::Allocated(alloc));
                    }
                    debug!(?hint, "hint not available");
                }
                None => debug!(?hint, "hint outside of eligible pools, ignoring"),
            }
        }

        // lease affinity, most recent first
        let mut previous = mine
            .into_iter()
            .filter(|l| !l.is_active(attempt.now))
            .collect::<Vec<_>>();
        previous.sort_by_key(|l| std::cmp::Reverse(l.cltt));
        for lease in previous {
            if let Some(pool) = attempt.eligible_pool_of(lease.addr) {
                if let Some(alloc) = self
                    .try_addr(topo, attempt, lease.addr, pool.prefix_len(), pool.id(), false)
                    .await?
                    .note_busy(lease.addr, &mut busy)
                {
                    debug!(addr = ?lease.addr, "reusing previous lease");
                    return Ok(Walk::Allocated(alloc));
                }
            }
        }

        let allocator = attempt.candidate.params.allocator;
        for pool in attempt.eligible_pools() {
            for idx in self
                .cursors
                .walk(subnet_id, pool, allocator, self.max_alloc_attempts)
            {
                let Some(addr) = pool.nth(idx) else {
                    break;
                };
                if let Some(alloc) = self
                    .try_addr(topo, attempt, addr, pool.prefix_len(), pool.id(), false)
                    .await?
                    .note_busy(addr, &mut busy)
                {
                    self.cursors.picked(subnet_id, pool, idx);
                    return Ok(Walk::Allocated(alloc));
                }
            }
            trace!(%pool, "pool has no free candidate");
        }
        debug!(subnet = %subnet_id, classes = %attempt.classes, ?busy, "no free address in eligible pools");
        Ok(Walk::Exhausted { busy })
    }

    /// Check one address and write the lease if it's free. Anything but
    /// `Tried::Allocated` means the caller should try another address.
    async fn try_addr(
        &self,
        topo: &Topology,
        attempt: &Attempt<'_, '_>,
        addr: IpAddr,
        prefix_len: u8,
        pool_id: Option<u32>,
        fixed: bool,
    ) -> Result<Tried, AllocError> {
        let now = attempt.now;
        let ids = &attempt.ctx.ids;
        if !fixed
            && attempt
                .in_pool_check
                .is_some_and(|scope| topo.reservations().reserved_for_other(scope, addr, ids))
        {
            trace!(?addr, "reserved for another client, skipping");
            return Ok(Tried::Unavailable);
        }

        let Some(_guard) = self.locks.try_lock(addr) else {
            if fixed {
                debug!(?addr, "reserved address busy");
                return Err(AllocError::RepositoryConflict { addr });
            }
            trace!(?addr, "address busy, skipping");
            return Ok(Tried::Busy);
        };

        let mut current = self.repo.get_lease(addr).await?;
        let mut renewed = false;
        if let Some(lease) = &current {
            if lease.blocks(now) {
                if lease.state == LeaseState::Active && lease.is_owned_by(&attempt.owner) {
                    renewed = true;
                } else if fixed {
                    let holder = lease
                        .owner
                        .as_ref()
                        .map_or_else(|| lease.state.to_string(), |o| o.to_string());
                    warn!(
                        ?addr,
                        %holder,
                        expires_at = %print_time(lease.expires_at()),
                        "reserved address is leased to another client"
                    );
                    return Err(AllocError::ReservationConflict { addr, holder });
                } else {
                    trace!(?addr, state = %lease.state, "address in use");
                    return Ok(Tried::Unavailable);
                }
            }
        }

        // expired records are reclaimed before they're overwritten
        if attempt.mode == AllocMode::Commit {
            if let Some(lease) = current.as_ref().filter(|l| l.needs_reclaim(now)) {
                match reclaim_lease(self.repo.as_ref(), self.hooks.as_ref(), lease.clone()).await? {
                    Some(reclaimed) => current = Some(reclaimed),
                    None => return Err(AllocError::RepositoryConflict { addr }),
                }
            }
        }

        let lease = Lease {
            addr,
            prefix_len,
            owner: Some(attempt.owner.clone()),
            subnet_id: attempt.subnet().id(),
            pool_id,
            cltt: now,
            valid_lft: attempt.lifetimes.valid,
            state: LeaseState::Active,
            hostname: attempt.hostname.clone(),
            version: current.as_ref().map_or(0, |l| l.version),
        };
        if self.hooks.lease_select(attempt.ctx, &lease, attempt.mode) == HookAction::Skip {
            debug!(?addr, "hook skipped lease");
            return Err(AllocError::HookSkipped { addr });
        }
        let kind = if fixed {
            AllocKind::Reserved
        } else if renewed {
            AllocKind::Renewed
        } else {
            AllocKind::New
        };

        let (lease, committed) = match attempt.mode {
            AllocMode::Offer => (lease, false),
            AllocMode::Commit => {
                let expected = Precondition::from_current(current.as_ref());
                match self.repo.create_or_update(lease, expected).await? {
                    WriteOutcome::Committed(lease) => {
                        if !renewed {
                            metrics::add_subnet_assigned(lease.subnet_id.0, 1);
                        }
                        self.hooks.lease_committed(&lease);
                        (lease, true)
                    }
                    WriteOutcome::Conflict(found) => {
                        debug!(?addr, found = ?found.map(|l| l.version), "lease changed under us");
                        return Err(AllocError::RepositoryConflict { addr });
                    }
                }
            }
        };
        debug!(
            ?addr,
            ?kind,
            subnet = %lease.subnet_id,
            expires_at = %print_time(lease.expires_at()),
            committed,
            "allocated lease"
        );
        Ok(Tried::Allocated(Allocation {
            subnet_id: lease.subnet_id,
            pool_id,
            kind,
            hostname: attempt.hostname.clone(),
            classes: attempt.classes.clone(),
            lifetimes: attempt.lifetimes,
            committed,
            lease,
        }))
    }

    /// the client's active lease on `addr`
    async fn owned_lease(
        &self,
        topo: &Topology,
        ids: &ClientIdentifiers,
        addr: IpAddr,
    ) -> Result<Lease, AllocError> {
        let not_found = AllocError::LeaseNotFound { addr };
        let Some(lease) = self.repo.get_lease(addr).await? else {
            return Err(not_found);
        };
        let match_client_id = topo
            .find_subnet_by_id(lease.subnet_id)
            .is_none_or(|s| topo.params(s).match_client_id);
        let owner = ids
            .owner(match_client_id)
            .ok_or(AllocError::MissingIdentifier)?;
        if !lease.is_owned_by(&owner) || !lease.is_active(SystemTime::now()) {
            debug!(?addr, lease = %lease, "address not leased to client");
            return Err(not_found);
        }
        Ok(lease)
    }

    /// The client gives up its lease on `addr`, the record is deleted.
    #[instrument(level = "debug", skip_all, fields(addr = ?addr))]
    pub async fn release(
        &self,
        topo: &Topology,
        ids: &ClientIdentifiers,
        addr: IpAddr,
    ) -> Result<Lease, AllocError> {
        let _guard = self
            .locks
            .try_lock(addr)
            .ok_or(AllocError::RepositoryConflict { addr })?;
        let lease = self.owned_lease(topo, ids, addr).await?;
        match self.repo.delete_lease(addr).await? {
            DeleteOutcome::Deleted(_) => {
                metrics::add_subnet_assigned(lease.subnet_id.0, -1);
                metrics::LEASES_RELEASED.inc();
                debug!(lease = %lease, "released lease");
                Ok(lease)
            }
            DeleteOutcome::NotFound => Err(AllocError::LeaseNotFound { addr }),
        }
    }

    /// The client found `addr` in use by someone else. The address is taken
    /// out of use for the probation period, after which it gets reclaimed.
    #[instrument(level = "debug", skip_all, fields(addr = ?addr))]
    pub async fn decline(
        &self,
        topo: &Topology,
        ids: &ClientIdentifiers,
        addr: IpAddr,
    ) -> Result<Lease, AllocError> {
        let _guard = self
            .locks
            .try_lock(addr)
            .ok_or(AllocError::RepositoryConflict { addr })?;
        let lease = self.owned_lease(topo, ids, addr).await?;
        let declined = Lease {
            owner: None,
            hostname: None,
            cltt: SystemTime::now(),
            valid_lft: self.decline_probation,
            state: LeaseState::Declined,
            ..lease.clone()
        };
        match self
            .repo
            .create_or_update(declined, Precondition::Matches(lease.version))
            .await?
        {
            WriteOutcome::Committed(declined) => {
                metrics::add_subnet_assigned(lease.subnet_id.0, -1);
                metrics::LEASES_DECLINED.inc();
                warn!(
                    ?addr,
                    probation_until = %print_time(declined.expires_at()),
                    "address declined, on probation"
                );
                Ok(declined)
            }
            WriteOutcome::Conflict(_) => Err(AllocError::RepositoryConflict { addr }),
        }
    }
}

/// Move an expired lease to `Reclaimed`. None if the record changed since it
/// was read.
pub(crate) async fn reclaim_lease<R: LeaseRepository + ?Sized>(
    repo: &R,
    hooks: &dyn AllocHooks,
    lease: Lease,
) -> Result<Option<Lease>, AllocError> {
    let was_assigned = matches!(
        lease.state,
        LeaseState::Active | LeaseState::ExpiredReclaimable
    );
    let expected = Precondition::Matches(lease.version);
    let reclaimed = Lease {
        state: LeaseState::Reclaimed,
        ..lease
    };
    match repo.create_or_update(reclaimed, expected).await? {
        WriteOutcome::Committed(lease) => {
            if was_assigned {
                metrics::add_subnet_assigned(lease.subnet_id.0, -1);
            }
            metrics::LEASES_RECLAIMED.inc();
            hooks.lease_reclaimed(&lease);
            trace!(lease = %lease, "reclaimed lease");
            Ok(Some(lease))
        }
        WriteOutcome::Conflict(_) => Ok(None),
    }
}

fn record_outcome(res: &Result<Allocation, AllocError>, mode: AllocMode) {
    let stats = &ALLOC_OUTCOME;
    match res {
        Ok(_) if mode == AllocMode::Offer => stats.offered.inc(),
        Ok(alloc) => match alloc.kind {
            AllocKind::New => stats.committed.inc(),
            AllocKind::Renewed => stats.renewed.inc(),
            AllocKind::Reserved => stats.reserved.inc(),
        },
        Err(err) => match err {
            AllocError::NoSubnetSelected => stats.no_subnet.inc(),
            AllocError::MissingIdentifier => stats.missing_identifier.inc(),
            AllocError::PoolExhausted { .. } => stats.pool_exhausted.inc(),
            AllocError::ReservationConflict { .. } => stats.reservation_conflict.inc(),
            AllocError::RepositoryConflict { .. } => stats.repository_conflict.inc(),
            AllocError::RepositoryTransient(_) => stats.repository_transient.inc(),
            AllocError::HookSkipped { .. } => stats.hook_skipped.inc(),
            AllocError::Repository(_) | AllocError::LeaseNotFound { .. } => {
                stats.repository_error.inc()
            }
        },
    }
}
