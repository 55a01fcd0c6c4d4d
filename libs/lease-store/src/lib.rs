//! # lease-store
//!
//! `lease-store` defines the trait [`LeaseRepository`], the only mutable state
//! shared between allocations. Every write carries a [`Precondition`] on the
//! record currently stored for the address, a store must apply the write only
//! if the precondition holds and otherwise report a [`WriteOutcome::Conflict`].
//! That compare-and-swap is what keeps two allocations from both committing
//! the same address.
//!
//! Expected outcomes (no lease, lost race, nothing to delete) are values, only
//! backend failures are errors.
//!
//! [`MemoryStore`] is an in-process implementation.
use std::{
    fmt,
    net::IpAddr,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use config::{Identifier, SubnetId};
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseState {
    /// held by its owner until `cltt + valid_lft`
    Active,
    /// Past its lifetime, waiting for reclamation. The engine reclaims straight
    /// from `Active`, this state is only written by backends that flag expired
    /// records themselves. Such records are scanned and reclaimed like expired
    /// active ones, whatever their lifetime says.
    ExpiredReclaimable,
    /// reclaimed, the address is free. The record is kept for lease affinity
    Reclaimed,
    /// declined by a client, unusable until the probation period ends
    Declined,
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaseState::Active => "active",
            LeaseState::ExpiredReclaimable => "expired-reclaimable",
            LeaseState::Reclaimed => "reclaimed",
            LeaseState::Declined => "declined",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub addr: IpAddr,
    /// 32 or 128 for addresses, the delegated length for prefixes
    pub prefix_len: u8,
    pub owner: Option<Identifier>,
    pub subnet_id: SubnetId,
    /// None for reserved out-of-pool addresses
    pub pool_id: Option<u32>,
    /// client last transaction time
    pub cltt: SystemTime,
    pub valid_lft: Duration,
    pub state: LeaseState,
    pub hostname: Option<String>,
    /// bumped by the store on every committed write
    pub version: u64,
}

impl Lease {
    pub fn new(addr: IpAddr, prefix_len: u8, subnet_id: SubnetId) -> Self {
        Self {
            addr,
            prefix_len,
            owner: None,
            subnet_id,
            pool_id: None,
            cltt: SystemTime::UNIX_EPOCH,
            valid_lft: Duration::ZERO,
            state: LeaseState::Reclaimed,
            hostname: None,
            version: 0,
        }
    }

    pub fn expires_at(&self) -> SystemTime {
        self.cltt + self.valid_lft
    }

    /// lifetime is over, whatever the state says
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at() <= now
    }

    /// address is in use by its owner
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.state == LeaseState::Active && !self.is_expired(now)
    }

    /// An address can't be handed to anyone while its lease is active or a
    /// decline is still on probation.
    pub fn blocks(&self, now: SystemTime) -> bool {
        match self.state {
            LeaseState::Active | LeaseState::Declined => !self.is_expired(now),
            LeaseState::ExpiredReclaimable | LeaseState::Reclaimed => false,
        }
    }

    /// the record has to be reclaimed before the address is reused
    pub fn needs_reclaim(&self, now: SystemTime) -> bool {
        match self.state {
            LeaseState::Active | LeaseState::Declined => self.is_expired(now),
            LeaseState::ExpiredReclaimable => true,
            LeaseState::Reclaimed => false,
        }
    }

    pub fn is_owned_by(&self, id: &Identifier) -> bool {
        self.owner.as_ref() == Some(id)
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {} subnet {}", self.addr, self.prefix_len, self.state, self.subnet_id)?;
        if let Some(owner) = &self.owner {
            write!(f, " owner {owner}")?;
        }
        write!(
            f,
            " expires {}",
            DateTime::<Utc>::from(self.expires_at()).to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// what the caller expects to be stored for the address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// no record exists
    Vacant,
    /// the record has exactly this version
    Matches(u64),
}

impl Precondition {
    /// precondition that holds if nothing changed since `current` was read
    pub fn from_current(current: Option<&Lease>) -> Self {
        current.map_or(Precondition::Vacant, |l| Precondition::Matches(l.version))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// the lease as stored, with its new version
    Committed(Lease),
    /// precondition failed, holds what is stored now
    Conflict(Option<Lease>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Lease),
    NotFound,
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// backend unavailable or timed out, the call may be retried
    #[error("lease repository temporarily unavailable: {0}")]
    Transient(String),
    #[error("lease repository error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

#[async_trait]
pub trait LeaseRepository: Send + Sync + 'static {
    /// record stored for an address, in any state
    async fn get_lease(&self, addr: IpAddr) -> Result<Option<Lease>, RepositoryError>;
    /// every record owned by `owner`
    async fn get_leases(&self, owner: &Identifier) -> Result<Vec<Lease>, RepositoryError>;
    /// insert or replace the record for `lease.addr` if `expected` holds
    async fn create_or_update(
        &self,
        lease: Lease,
        expected: Precondition,
    ) -> Result<WriteOutcome, RepositoryError>;
    async fn delete_lease(&self, addr: IpAddr) -> Result<DeleteOutcome, RepositoryError>;
    /// up to `max` records that need reclaiming at `now`, oldest expiry first
    async fn scan_expired(&self, max: usize, now: SystemTime)
    -> Result<Vec<Lease>, RepositoryError>;
    /// up to `max` reclaimed records that expired before `before`
    async fn scan_reclaimed(
        &self,
        before: SystemTime,
        max: usize,
    ) -> Result<Vec<Lease>, RepositoryError>;
    /// number of records in `subnet` that are active at `now`
    async fn count_active(
        &self,
        subnet: SubnetId,
        now: SystemTime,
    ) -> Result<usize, RepositoryError>;
}
