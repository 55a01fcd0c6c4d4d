//! # Parameter inheritance
//!
//! Subnets, shared networks and the global scope all carry the same optional
//! [`Params`]. A value is resolved for a subnet by looking at the subnet itself,
//! then its shared network, then the global scope, and finally falling back to
//! a built-in default. [`Inherit`] implements that lookup once, callers pick the
//! field with a closure.
use std::{net::IpAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    LeaseTime,
    reservations::Scope,
    topology::SubnetId,
    wire,
};

/// default valid lifetime when none is configured anywhere
pub const DEFAULT_VALID_LIFETIME: Duration = Duration::from_secs(7_200);
pub const DEFAULT_AUTHORITATIVE: bool = false;
pub const DEFAULT_MATCH_CLIENT_ID: bool = true;

/// How host reservations apply to a subnet
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationMode {
    /// no reservations are used at all
    Disabled,
    /// subnet reservations are used, but only out-of-pool addresses are
    /// guaranteed, in-pool reserved addresses are not skipped by dynamic allocation
    OutOfPool,
    /// only global reservations are used
    Global,
    /// subnet reservations are used, in and out of pool
    #[default]
    All,
}

impl ReservationMode {
    /// subnet-scoped reservations are consulted
    pub fn subnet_reservations(self) -> bool {
        matches!(self, ReservationMode::OutOfPool | ReservationMode::All)
    }
    /// global reservations are consulted
    pub fn global_reservations(self) -> bool {
        self == ReservationMode::Global
    }
    /// a reserved address outside of every pool may be handed out
    pub fn out_of_pool_allowed(self) -> bool {
        matches!(self, ReservationMode::OutOfPool | ReservationMode::All)
    }
    /// Reservations in this scope must be skipped when picking a dynamic
    /// address for someone else. None if in-pool reservations aren't checked.
    pub fn in_pool_check(self, subnet: SubnetId) -> Option<Scope> {
        match self {
            ReservationMode::All => Some(Scope::Subnet(subnet)),
            ReservationMode::Global => Some(Scope::Global),
            ReservationMode::OutOfPool | ReservationMode::Disabled => None,
        }
    }
}

/// order in which a pool's candidates are tried
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocatorKind {
    /// continue after the last candidate handed out
    #[default]
    Iterative,
    /// start at a random candidate
    Random,
}

/// optional parameters at one level of the hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pub valid_lifetime: Option<Duration>,
    pub min_valid_lifetime: Option<Duration>,
    pub max_valid_lifetime: Option<Duration>,
    pub renew_timer: Option<Duration>,
    pub rebind_timer: Option<Duration>,
    pub reservation_mode: Option<ReservationMode>,
    pub interface: Option<String>,
    pub relay: Option<Vec<IpAddr>>,
    pub authoritative: Option<bool>,
    pub match_client_id: Option<bool>,
    pub allocator: Option<AllocatorKind>,
}

impl From<wire::Params> for Params {
    fn from(p: wire::Params) -> Self {
        let secs = |n: std::num::NonZeroU32| Duration::from_secs(n.get() as u64);
        Self {
            valid_lifetime: p.valid_lifetime.map(secs),
            min_valid_lifetime: p.min_valid_lifetime.map(secs),
            max_valid_lifetime: p.max_valid_lifetime.map(secs),
            renew_timer: p.renew_timer.map(secs),
            rebind_timer: p.rebind_timer.map(secs),
            reservation_mode: p.reservation_mode,
            interface: p.interface,
            relay: p.relay.map(|r| r.ip_addresses),
            authoritative: p.authoritative,
            match_client_id: p.match_client_id,
            allocator: p.allocator,
        }
    }
}

/// Resolves a parameter for one subnet: local, then network, then global.
#[derive(Debug, Copy, Clone)]
pub struct Inherit<'a> {
    local: &'a Params,
    network: Option<&'a Params>,
    global: &'a Params,
}

impl<'a> Inherit<'a> {
    pub fn new(local: &'a Params, network: Option<&'a Params>, global: &'a Params) -> Self {
        Self {
            local,
            network,
            global,
        }
    }

    /// first level that sets the field
    pub fn get<T>(&self, field: impl Fn(&'a Params) -> Option<T>) -> Option<T> {
        field(self.local)
            .or_else(|| self.network.and_then(&field))
            .or_else(|| field(self.global))
    }

    /// first level that sets the field, or `default`
    pub fn get_or<T>(&self, field: impl Fn(&'a Params) -> Option<T>, default: T) -> T {
        self.get(field).unwrap_or(default)
    }

    /// resolve every parameter
    pub fn resolve(&self) -> SubnetParams {
        let valid = self.get_or(|p| p.valid_lifetime, DEFAULT_VALID_LIFETIME);
        let lease_time = LeaseTime::new(
            valid,
            self.get_or(|p| p.min_valid_lifetime, valid),
            self.get_or(|p| p.max_valid_lifetime, valid),
        )
        .with_timers(self.get(|p| p.renew_timer), self.get(|p| p.rebind_timer));

        SubnetParams {
            lease_time,
            reservation_mode: self.get_or(|p| p.reservation_mode, ReservationMode::default()),
            interface: self.get(|p| p.interface.clone()),
            relay: self.get(|p| p.relay.clone()).unwrap_or_default(),
            authoritative: self.get_or(|p| p.authoritative, DEFAULT_AUTHORITATIVE),
            match_client_id: self.get_or(|p| p.match_client_id, DEFAULT_MATCH_CLIENT_ID),
            allocator: self.get_or(|p| p.allocator, AllocatorKind::default()),
        }
    }
}

/// every parameter resolved for one subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetParams {
    pub lease_time: LeaseTime,
    pub reservation_mode: ReservationMode,
    pub interface: Option<String>,
    pub relay: Vec<IpAddr>,
    pub authoritative: bool,
    pub match_client_id: bool,
    pub allocator: AllocatorKind,
}
