//! # Topology
//!
//! The committed, read-only view of subnets, pools and shared networks.
//!
//! Subnets declared in a shared network are kept under the network and also
//! copied into the flat subnet list, which is what lookups by id or selector
//! use. A subnet refers to its network by name only.
//!
//! ## Subnet ids
//!
//! A subnet with id `0` (or no id) is given the next id above the highest one
//! assigned so far, walking `subnets` and then `shared_networks` in document
//! order. An explicit id that was already used, explicitly or generated, is a
//! [`ConfigError::DuplicateSubnetId`].
use std::{
    collections::{HashMap, HashSet},
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    client_classes::{ClassSet, ClientClasses},
    error::ConfigError,
    params::{DEFAULT_AUTHORITATIVE, Inherit, Params, SubnetParams},
    reservations::{HostReservation, ReservationIndex, Scope},
    wire,
};

#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct SubnetId(pub u32);

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// addresses are handled as integers so v4 and v6 share the same maths
pub fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(ip) => u32::from(ip) as u128,
        IpAddr::V6(ip) => u128::from(ip),
    }
}

/// inverse of [`ip_to_u128`], None if `n` doesn't fit the family
pub fn u128_to_ip(v6: bool, n: u128) -> Option<IpAddr> {
    if v6 {
        Some(IpAddr::V6(Ipv6Addr::from(n)))
    } else {
        u32::try_from(n).ok().map(|n| IpAddr::V4(Ipv4Addr::from(n)))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// single addresses
    Address,
    /// delegated prefixes of `delegated_len`
    Prefix { delegated_len: u8 },
}

/// A range of candidates within a subnet. For address pools every address in
/// `first..=last` is a candidate, for prefix pools every `delegated_len` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    id: Option<u32>,
    kind: PoolKind,
    first: IpAddr,
    last: IpAddr,
    client_class: Option<String>,
}

impl Pool {
    pub fn new(first: IpAddr, last: IpAddr) -> Self {
        Self {
            id: None,
            kind: PoolKind::Address,
            first,
            last,
            client_class: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.client_class = Some(class.into());
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }
    pub fn kind(&self) -> PoolKind {
        self.kind
    }
    pub fn first(&self) -> IpAddr {
        self.first
    }
    pub fn last(&self) -> IpAddr {
        self.last
    }
    pub fn client_class(&self) -> Option<&str> {
        self.client_class.as_deref()
    }
    pub fn is_v6(&self) -> bool {
        self.first.is_ipv6()
    }
    pub fn is_prefix(&self) -> bool {
        matches!(self.kind, PoolKind::Prefix { .. })
    }

    /// prefix length recorded on leases from this pool
    pub fn prefix_len(&self) -> u8 {
        match self.kind {
            PoolKind::Prefix { delegated_len } => delegated_len,
            PoolKind::Address if self.is_v6() => 128,
            PoolKind::Address => 32,
        }
    }

    /// distance between two candidates
    fn step(&self) -> u128 {
        match self.kind {
            PoolKind::Address => 1,
            // delegated_len is validated to be in 1..=128
            PoolKind::Prefix { delegated_len } => 1u128 << (128 - delegated_len as u32),
        }
    }

    /// number of candidates
    pub fn capacity(&self) -> u128 {
        let span = ip_to_u128(self.last) - ip_to_u128(self.first);
        // a full v6 address pool has 2^128 candidates, saturate
        (span / self.step()).saturating_add(1)
    }

    /// the `i`th candidate
    pub fn nth(&self, i: u128) -> Option<IpAddr> {
        if i >= self.capacity() {
            return None;
        }
        let n = ip_to_u128(self.first).checked_add(i.checked_mul(self.step())?)?;
        u128_to_ip(self.is_v6(), n)
    }

    /// position of `addr` in the pool, None if it isn't a candidate
    pub fn index_of(&self, addr: IpAddr) -> Option<u128> {
        if addr.is_ipv6() != self.is_v6() {
            return None;
        }
        let (n, first, last) = (
            ip_to_u128(addr),
            ip_to_u128(self.first),
            ip_to_u128(self.last),
        );
        if n < first || n > last || (n - first) % self.step() != 0 {
            return None;
        }
        Some((n - first) / self.step())
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.index_of(addr).is_some()
    }

    /// if pool has no class, this is always true, otherwise the class must be in the set
    pub fn match_class(&self, classes: &ClassSet) -> bool {
        classes.allows(self.client_class())
    }

    fn overlaps(&self, other: &Pool) -> bool {
        self.is_v6() == other.is_v6()
            && ip_to_u128(self.first) <= ip_to_u128(other.last)
            && ip_to_u128(other.first) <= ip_to_u128(self.last)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PoolKind::Address => write!(f, "{}-{}", self.first, self.last),
            PoolKind::Prefix { delegated_len } => {
                write!(f, "{}-{}/{}", self.first, self.last, delegated_len)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    id: SubnetId,
    prefix: IpNet,
    pools: Vec<Pool>,
    pd_pools: Vec<Pool>,
    client_class: Option<String>,
    /// name of the shared network this subnet is part of
    shared_network: Option<String>,
    params: Params,
}

impl Subnet {
    pub fn id(&self) -> SubnetId {
        self.id
    }
    pub fn prefix(&self) -> IpNet {
        self.prefix
    }
    pub fn is_v6(&self) -> bool {
        matches!(self.prefix, IpNet::V6(_))
    }
    /// address pools in config order
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }
    /// prefix delegation pools in config order
    pub fn pd_pools(&self) -> &[Pool] {
        &self.pd_pools
    }
    pub fn client_class(&self) -> Option<&str> {
        self.client_class.as_deref()
    }
    pub fn shared_network(&self) -> Option<&str> {
        self.shared_network.as_deref()
    }
    /// parameters set on the subnet itself, see [`Topology::params`] for resolved values
    pub fn local_params(&self) -> &Params {
        &self.params
    }
    /// the address is inside the subnet prefix
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.prefix.contains(&addr)
    }
    /// the address pool containing `addr`
    pub fn find_pool(&self, addr: IpAddr) -> Option<&Pool> {
        self.pools.iter().find(|p| p.contains(addr))
    }
    /// the prefix pool containing the delegated prefix starting at `addr`
    pub fn find_pd_pool(&self, addr: IpAddr) -> Option<&Pool> {
        self.pd_pools.iter().find(|p| p.contains(addr))
    }
    /// true if `addr` is inside any address pool
    pub fn in_pool(&self, addr: IpAddr) -> bool {
        self.find_pool(addr).is_some()
    }
    /// count the total number of candidates across all pools
    pub fn total_addrs(&self) -> u128 {
        self.pools
            .iter()
            .chain(self.pd_pools.iter())
            .fold(0u128, |acc, p| acc.saturating_add(p.capacity()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedNetwork {
    name: String,
    client_class: Option<String>,
    /// copies of the member subnets
    subnets: Vec<Subnet>,
    params: Params,
}

impl SharedNetwork {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn client_class(&self) -> Option<&str> {
        self.client_class.as_deref()
    }
    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }
    pub fn local_params(&self) -> &Params {
        &self.params
    }
}

/// What the network layer knows about where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetSelector {
    /// receiving interface name
    pub iface: Option<String>,
    /// giaddr, or the link address of the relay closest to the client
    pub relay_addr: Option<IpAddr>,
    /// link-selection / subnet-selection option
    pub link_select: Option<IpAddr>,
    /// ciaddr, the address the client says it has
    pub client_addr: Option<IpAddr>,
    /// address of the interface the request arrived on
    pub local_addr: Option<IpAddr>,
}

impl SubnetSelector {
    pub fn is_relayed(&self) -> bool {
        self.relay_addr.is_some() || self.link_select.is_some()
    }
}

/// Subnets, shared networks, reservations and classes of one configuration generation
#[derive(Debug, Clone, Default)]
pub struct Topology {
    generation: u64,
    subnets: Vec<Subnet>,
    by_id: HashMap<SubnetId, usize>,
    shared_networks: Vec<SharedNetwork>,
    networks_by_name: HashMap<String, usize>,
    global: Params,
    reservations: ReservationIndex,
    classes: ClientClasses,
}

impl TryFrom<wire::Config> for Topology {
    type Error = ConfigError;

    fn try_from(cfg: wire::Config) -> Result<Self, Self::Error> {
        Self::build(cfg, 0)
    }
}

/// hands out subnet ids at commit
#[derive(Debug, Default)]
struct SubnetIds {
    used: HashSet<SubnetId>,
    max: u32,
}

impl SubnetIds {
    fn assign(&mut self, requested: u32) -> Result<SubnetId, ConfigError> {
        let id = if requested == 0 {
            self.max
                .checked_add(1)
                .map(SubnetId)
                .ok_or(ConfigError::SubnetIdExhausted(SubnetId(self.max)))?
        } else {
            SubnetId(requested)
        };
        if !self.used.insert(id) {
            return Err(ConfigError::DuplicateSubnetId(id));
        }
        self.max = self.max.max(id.0);
        Ok(id)
    }
}

/// state shared while converting subnets
struct Builder {
    ids: SubnetIds,
    reservations: ReservationIndex,
    ip_unique: bool,
}

impl Builder {
    fn subnet(
        &mut self,
        w: wire::Subnet,
        shared_network: Option<&str>,
    ) -> Result<Subnet, ConfigError> {
        let id = self.ids.assign(w.id)?;
        let prefix = w.subnet.trunc();

        let mut pools = Vec::with_capacity(w.pools.len());
        for pool in &w.pools {
            let invalid = |reason: String| ConfigError::InvalidPool {
                subnet: id,
                pool: pool.pool.clone(),
                reason,
            };
            let (first, last) = pool.range().map_err(invalid)?;
            if first.is_ipv6() != last.is_ipv6() {
                return Err(invalid("mixed address families".to_owned()));
            }
            if ip_to_u128(first) > ip_to_u128(last) {
                return Err(invalid("first address is after last".to_owned()));
            }
            if !prefix.contains(&first) || !prefix.contains(&last) {
                return Err(invalid(format!("not inside {prefix}")));
            }
            pools.push(Pool {
                id: pool.id,
                kind: PoolKind::Address,
                first,
                last,
                client_class: pool.client_class.clone(),
            });
        }

        let mut pd_pools = Vec::with_capacity(w.pd_pools.len());
        for pd in &w.pd_pools {
            let invalid = |reason: String| ConfigError::InvalidPool {
                subnet: id,
                pool: format!("{}/{}", pd.prefix, pd.delegated_len),
                reason,
            };
            let IpNet::V6(net) = pd.prefix.trunc() else {
                return Err(invalid("prefix delegation needs an IPv6 prefix".to_owned()));
            };
            if pd.delegated_len < net.prefix_len() || pd.delegated_len > 128 {
                return Err(invalid(format!(
                    "delegated_len must be between {} and 128",
                    net.prefix_len()
                )));
            }
            let first = u128::from(net.network());
            let step = 1u128 << (128 - pd.delegated_len as u32);
            let count = 1u128 << (pd.delegated_len - net.prefix_len()) as u32;
            let last = first + (count - 1) * step;
            pd_pools.push(Pool {
                id: pd.id,
                kind: PoolKind::Prefix {
                    delegated_len: pd.delegated_len,
                },
                first: IpAddr::V6(Ipv6Addr::from(first)),
                last: IpAddr::V6(Ipv6Addr::from(last)),
                client_class: pd.client_class.clone(),
            });
        }

        for group in [&pools, &pd_pools] {
            for (i, a) in group.iter().enumerate() {
                if let Some(b) = group[i + 1..].iter().find(|b| a.overlaps(b)) {
                    return Err(ConfigError::OverlappingPools {
                        subnet: id,
                        first: a.to_string(),
                        second: b.to_string(),
                    });
                }
            }
        }

        for res in w.reservations {
            let res = HostReservation::from_wire(Scope::Subnet(id), res)?;
            if let Some(addr) = res.addresses().iter().find(|a| !prefix.contains(*a)) {
                return Err(ConfigError::ReservationOutsideSubnet {
                    subnet: id,
                    reservation: res.label(),
                    addr: addr.to_string(),
                });
            }
            self.reservations.insert(res, self.ip_unique)?;
        }

        Ok(Subnet {
            id,
            prefix,
            pools,
            pd_pools,
            client_class: w.client_class,
            shared_network: shared_network.map(|s| s.to_owned()),
            params: w.params.into(),
        })
    }
}

impl Topology {
    /// Validate a wire config and build the topology. Nothing partially built
    /// escapes, any error discards the whole thing.
    pub fn build(cfg: wire::Config, generation: u64) -> Result<Self, ConfigError> {
        let classes = ClientClasses::try_from(cfg.client_classes)?;
        let global = Params::from(cfg.params);
        if cfg.host_reservation_identifiers.is_empty() {
            return Err(ConfigError::EmptyIdentifierOrder);
        }
        let mut builder = Builder {
            ids: SubnetIds::default(),
            reservations: ReservationIndex::new(cfg.host_reservation_identifiers),
            ip_unique: cfg.ip_reservations_unique,
        };
        for res in cfg.reservations {
            let res = HostReservation::from_wire(Scope::Global, res)?;
            builder.reservations.insert(res, builder.ip_unique)?;
        }

        let mut subnets = Vec::new();
        for subnet in cfg.subnets {
            subnets.push(builder.subnet(subnet, None)?);
        }

        let mut shared_networks = Vec::with_capacity(cfg.shared_networks.len());
        let mut networks_by_name = HashMap::new();
        for net in cfg.shared_networks {
            if net.name.trim().is_empty() {
                return Err(ConfigError::EmptyNetworkName);
            }
            if networks_by_name.contains_key(&net.name) {
                return Err(ConfigError::DuplicateSharedNetwork(net.name));
            }
            let params = Params::from(net.params);
            let authoritative = params
                .authoritative
                .or(global.authoritative)
                .unwrap_or(DEFAULT_AUTHORITATIVE);
            // the network's own interface, or the first one a member subnet names
            let mut iface = params.interface.clone();

            let mut members = Vec::with_capacity(net.subnets.len());
            for subnet in net.subnets {
                let subnet = builder.subnet(subnet, Some(&net.name))?;
                if let Some(found) = subnet.params.interface.as_deref() {
                    match iface.as_deref() {
                        Some(expected) if expected != found => {
                            return Err(ConfigError::InterfaceMismatch {
                                network: net.name,
                                subnet: subnet.id,
                                expected: expected.to_owned(),
                                found: found.to_owned(),
                            });
                        }
                        Some(_) => {}
                        None => iface = Some(found.to_owned()),
                    }
                }
                if let Some(found) = subnet.params.authoritative {
                    if found != authoritative {
                        return Err(ConfigError::AuthoritativeMismatch {
                            network: net.name,
                            subnet: subnet.id,
                            expected: authoritative,
                            found,
                        });
                    }
                }
                members.push(subnet);
            }

            subnets.extend(members.iter().cloned());
            networks_by_name.insert(net.name.clone(), shared_networks.len());
            shared_networks.push(SharedNetwork {
                name: net.name,
                client_class: net.client_class,
                subnets: members,
                params,
            });
        }

        let by_id = subnets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();

        let topology = Self {
            generation,
            subnets,
            by_id,
            shared_networks,
            networks_by_name,
            global,
            reservations: builder.reservations,
            classes,
        };
        topology.validate_params()?;
        topology.warn_undefined_guards();
        debug!(
            generation,
            subnets = topology.subnets.len(),
            shared_networks = topology.shared_networks.len(),
            reservations = topology.reservations.len(),
            "built topology"
        );
        Ok(topology)
    }

    /// lifetimes can only be checked once inheritance is known
    fn validate_params(&self) -> Result<(), ConfigError> {
        for subnet in &self.subnets {
            let lease = self.params(subnet).lease_time;
            let (min, default, max) = (lease.get_min(), lease.get_default(), lease.get_max());
            if !(min <= default && default <= max) {
                return Err(ConfigError::InvalidLifetime {
                    subnet: subnet.id,
                    reason: format!(
                        "expected min <= valid <= max, got {}s <= {}s <= {}s",
                        min.as_secs(),
                        default.as_secs(),
                        max.as_secs()
                    ),
                });
            }
        }
        Ok(())
    }

    fn warn_undefined_guards(&self) {
        let guards = self
            .subnets
            .iter()
            .flat_map(|s| {
                s.client_class()
                    .into_iter()
                    .chain(s.pools.iter().chain(&s.pd_pools).filter_map(|p| p.client_class()))
            })
            .chain(self.shared_networks.iter().filter_map(|n| n.client_class()));
        for class in guards {
            if self.classes.find(class).is_none() && !client_classification::is_builtin(class) {
                warn!(?class, "guard references a class that is never defined");
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// every subnet, plain and shared-network members, in document order
    pub fn all_subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn all_shared_networks(&self) -> &[SharedNetwork] {
        &self.shared_networks
    }

    pub fn find_subnet_by_id(&self, id: SubnetId) -> Option<&Subnet> {
        self.by_id.get(&id).and_then(|&i| self.subnets.get(i))
    }

    pub fn shared_network(&self, name: &str) -> Option<&SharedNetwork> {
        self.networks_by_name
            .get(name)
            .and_then(|&i| self.shared_networks.get(i))
    }

    /// the shared network `subnet` belongs to
    pub fn network_of(&self, subnet: &Subnet) -> Option<&SharedNetwork> {
        subnet.shared_network().and_then(|n| self.shared_network(n))
    }

    pub fn global_params(&self) -> &Params {
        &self.global
    }

    pub fn reservations(&self) -> &ReservationIndex {
        &self.reservations
    }

    pub fn classes(&self) -> &ClientClasses {
        &self.classes
    }

    /// resolver for the subnet's parameters
    pub fn inherit<'a>(&'a self, subnet: &'a Subnet) -> Inherit<'a> {
        Inherit::new(
            &subnet.params,
            self.network_of(subnet).map(|n| &n.params),
            &self.global,
        )
    }

    /// every parameter of `subnet` resolved: subnet, then network, then global, then default
    pub fn params(&self, subnet: &Subnet) -> SubnetParams {
        self.inherit(subnet).resolve()
    }

    /// all subnets matching the selector, without shared-network expansion
    fn match_selector(&self, sel: &SubnetSelector) -> Vec<&Subnet> {
        // relay addresses configured on the subnet or its network come first
        if let Some(relay) = sel.relay_addr {
            let by_relay = self
                .subnets
                .iter()
                .filter(|s| {
                    self.inherit(s)
                        .get(|p| p.relay.as_ref())
                        .is_some_and(|addrs| addrs.contains(&relay))
                })
                .collect::<Vec<_>>();
            if !by_relay.is_empty() {
                return by_relay;
            }
        }
        if let Some(addr) = sel
            .link_select
            .or(sel.relay_addr)
            .or(sel.client_addr)
            .or(sel.local_addr)
        {
            let by_addr = self
                .subnets
                .iter()
                .filter(|s| s.contains(addr))
                .collect::<Vec<_>>();
            if !by_addr.is_empty() {
                return by_addr;
            }
        }
        // a relayed request never matches on the receiving interface
        match sel.iface.as_deref() {
            Some(iface) if !sel.is_relayed() => self
                .subnets
                .iter()
                .filter(|s| self.inherit(s).get(|p| p.interface.as_deref()) == Some(iface))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// first subnet matching the selector, ignoring client classes
    pub fn find_subnet_by_selector(&self, sel: &SubnetSelector) -> Option<&Subnet> {
        self.match_selector(sel).into_iter().next()
    }

    /// Subnets matching the selector, each followed by its shared-network
    /// siblings, deduplicated and in order. Class guards are not applied.
    pub fn select_candidates(&self, sel: &SubnetSelector) -> Vec<&Subnet> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for subnet in self.match_selector(sel) {
            if seen.insert(subnet.id) {
                candidates.push(subnet);
            }
            if let Some(net) = self.network_of(subnet) {
                for sibling in net.subnets() {
                    if seen.insert(sibling.id) {
                        if let Some(flat) = self.find_subnet_by_id(sibling.id) {
                            candidates.push(flat);
                        }
                    }
                }
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::params::ReservationMode;

    pub static SAMPLE_YAML: &str = include_str!("../sample/config.yaml");

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn topology(yaml: &str) -> Result<Topology, ConfigError> {
        Topology::try_from(wire::Config::parse(yaml)?)
    }

    #[test]
    fn test_sample() {
        let topo = topology(SAMPLE_YAML).unwrap();
        // plain subnets first, then shared network members
        let ids = topo
            .all_subnets()
            .iter()
            .map(|s| s.id().0)
            .collect::<Vec<_>>();
        assert_eq!(ids, [10, 20, 21, 22]);

        let subnet = topo.find_subnet_by_id(SubnetId(10)).unwrap();
        assert_eq!(subnet.pools()[0].first(), ip("10.0.0.10"));
        assert_eq!(subnet.pools()[0].capacity(), 91);
        assert!(subnet.shared_network().is_none());

        let net = topo.shared_network("frog").unwrap();
        assert_eq!(net.subnets().len(), 2);
        let member = topo.find_subnet_by_id(SubnetId(21)).unwrap();
        assert_eq!(member.shared_network(), Some("frog"));
        // copies are equal to what the network keeps
        assert_eq!(&net.subnets()[0], member);
        assert_eq!(topo.network_of(member).unwrap().name(), "frog");
    }

    #[test]
    fn inherited_params() {
        let topo = topology(SAMPLE_YAML).unwrap();
        let subnet = topo.find_subnet_by_id(SubnetId(10)).unwrap();
        let params = topo.params(subnet);
        assert_eq!(params.reservation_mode, ReservationMode::OutOfPool);
        assert_eq!(params.lease_time.get_default(), Duration::from_secs(3600));

        // subnet 21 sets nothing, takes the network's values
        let member = topo.find_subnet_by_id(SubnetId(21)).unwrap();
        let params = topo.params(member);
        assert_eq!(params.interface.as_deref(), Some("eth1"));
        assert_eq!(params.reservation_mode, ReservationMode::Global);
        assert_eq!(params.lease_time.get_default(), Duration::from_secs(1800));
        // subnet 22 overrides the network
        let member = topo.find_subnet_by_id(SubnetId(22)).unwrap();
        assert_eq!(
            topo.params(member).lease_time.get_default(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn select_by_iface_relay_and_addr() {
        let topo = topology(SAMPLE_YAML).unwrap();
        let ids = |sel: SubnetSelector| {
            topo.select_candidates(&sel)
                .iter()
                .map(|s| s.id().0)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            ids(SubnetSelector {
                iface: Some("eth0".to_owned()),
                ..SubnetSelector::default()
            }),
            [10]
        );
        // shared network expands to both members, matched subnet first
        assert_eq!(
            ids(SubnetSelector {
                client_addr: Some(ip("10.2.0.5")),
                ..SubnetSelector::default()
            }),
            [22, 21]
        );
        assert_eq!(
            ids(SubnetSelector {
                iface: Some("eth1".to_owned()),
                ..SubnetSelector::default()
            }),
            [21, 22]
        );
        // configured relay address wins over the relay's own prefix
        assert_eq!(
            ids(SubnetSelector {
                relay_addr: Some(ip("192.168.55.1")),
                ..SubnetSelector::default()
            }),
            [20]
        );
        // relayed requests don't match on interface
        assert!(
            ids(SubnetSelector {
                iface: Some("eth0".to_owned()),
                relay_addr: Some(ip("172.16.0.1")),
                ..SubnetSelector::default()
            })
            .is_empty()
        );
        assert_eq!(
            topo.find_subnet_by_selector(&SubnetSelector {
                local_addr: Some(ip("10.0.0.1")),
                ..SubnetSelector::default()
            })
            .map(|s| s.id()),
            Some(SubnetId(10))
        );
    }

    #[test]
    fn autogenerated_ids() {
        let topo = topology(
            r#"
subnets:
  - subnet: 10.0.0.0/24
  - id: 7
    subnet: 10.0.1.0/24
  - subnet: 10.0.2.0/24
shared_networks:
  - name: net
    subnets:
      - subnet: 10.0.3.0/24
"#,
        )
        .unwrap();
        let ids = topo
            .all_subnets()
            .iter()
            .map(|s| s.id().0)
            .collect::<Vec<_>>();
        assert_eq!(ids, [1, 7, 8, 9]);

        // explicit id colliding with a generated one
        let err = topology(
            r#"
subnets:
  - subnet: 10.0.0.0/24
  - id: 1
    subnet: 10.0.1.0/24
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSubnetId(SubnetId(1))));
    }

    #[test]
    fn shared_network_errors() {
        let dup = r#"
shared_networks:
  - name: a
  - name: a
"#;
        assert!(matches!(
            topology(dup),
            Err(ConfigError::DuplicateSharedNetwork(name)) if name == "a"
        ));
        assert!(matches!(
            topology("shared_networks: [{name: ''}]"),
            Err(ConfigError::EmptyNetworkName)
        ));

        let iface = r#"
shared_networks:
  - name: a
    subnets:
      - subnet: 10.0.0.0/24
        interface: eth0
      - subnet: 10.0.1.0/24
        interface: eth1
"#;
        assert!(matches!(
            topology(iface),
            Err(ConfigError::InterfaceMismatch { .. })
        ));

        let auth = r#"
authoritative: true
shared_networks:
  - name: a
    subnets:
      - subnet: 10.0.0.0/24
        authoritative: false
"#;
        assert!(matches!(
            topology(auth),
            Err(ConfigError::AuthoritativeMismatch {
                expected: true,
                found: false,
                ..
            })
        ));
    }

    #[test]
    fn pool_errors() {
        let overlap = r#"
subnets:
  - subnet: 10.0.0.0/24
    pools:
      - pool: 10.0.0.10 - 10.0.0.100
      - pool: 10.0.0.100 - 10.0.0.200
"#;
        assert!(matches!(
            topology(overlap),
            Err(ConfigError::OverlappingPools { .. })
        ));
        let outside = r#"
subnets:
  - subnet: 10.0.0.0/24
    pools:
      - pool: 10.0.1.10 - 10.0.1.100
"#;
        assert!(matches!(
            topology(outside),
            Err(ConfigError::InvalidPool { .. })
        ));
        let backwards = r#"
subnets:
  - subnet: 10.0.0.0/24
    pools:
      - pool: 10.0.0.100 - 10.0.0.10
"#;
        assert!(matches!(
            topology(backwards),
            Err(ConfigError::InvalidPool { .. })
        ));
    }

    #[test]
    fn reservation_errors() {
        let outside = r#"
subnets:
  - subnet: 10.0.0.0/24
    reservations:
      - hw_address: "01:02:03:04:05:06"
        ip_address: 10.0.9.1
"#;
        assert!(matches!(
            topology(outside),
            Err(ConfigError::ReservationOutsideSubnet { .. })
        ));
        let lifetimes = r#"
valid_lifetime: 100
min_valid_lifetime: 200
subnets:
  - subnet: 10.0.0.0/24
"#;
        assert!(matches!(
            topology(lifetimes),
            Err(ConfigError::InvalidLifetime { .. })
        ));
    }

    #[test]
    fn pd_pool_candidates() {
        let topo = topology(
            r#"
subnets:
  - subnet: 2001:db8:1::/64
    pools:
      - pool: 2001:db8:1::10 - 2001:db8:1::ff
    pd_pools:
      - prefix: 2001:db8:8000::/48
        delegated_len: 56
"#,
        )
        .unwrap();
        let subnet = &topo.all_subnets()[0];
        let pd = &subnet.pd_pools()[0];
        assert_eq!(pd.capacity(), 256);
        assert_eq!(pd.prefix_len(), 56);
        assert_eq!(pd.nth(1), Some(ip("2001:db8:8000:100::")));
        assert_eq!(pd.last(), ip("2001:db8:8000:ff00::"));
        assert!(pd.contains(ip("2001:db8:8000:200::")));
        // not aligned on a delegated prefix
        assert!(!pd.contains(ip("2001:db8:8000:201::")));
        assert_eq!(subnet.pools()[0].prefix_len(), 128);
        assert_eq!(subnet.total_addrs(), 0xf0 + 256);
    }

    #[test]
    fn pool_indexing() {
        let pool = Pool::new(ip("10.0.0.10"), ip("10.0.0.12")).with_class("foo");
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.nth(0), Some(ip("10.0.0.10")));
        assert_eq!(pool.nth(2), Some(ip("10.0.0.12")));
        assert_eq!(pool.nth(3), None);
        assert_eq!(pool.index_of(ip("10.0.0.11")), Some(1));
        assert_eq!(pool.index_of(ip("10.0.0.13")), None);
        assert_eq!(pool.index_of(ip("::a")), None);
        assert!(pool.match_class(&["foo"].into_iter().collect()));
        assert!(!pool.match_class(&ClassSet::new()));
    }
}
