//! # Host reservations
//!
//! Reservations map client identifiers to fixed addresses/prefixes, a hostname
//! and client classes. The [`ReservationIndex`] is built once per commit and
//! holds two partitions: [`Scope::Global`] and one per subnet. Lookups try
//! identifier types in the configured `host_reservation_identifiers` order and
//! return the first match.
use std::{collections::HashMap, fmt, net::IpAddr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize, Serializer};

use crate::{error::ConfigError, topology::SubnetId, wire};

/// hw-address, duid, circuit-id, client-id
pub const DEFAULT_IDENTIFIER_ORDER: [IdentifierType; 4] = [
    IdentifierType::HwAddress,
    IdentifierType::Duid,
    IdentifierType::CircuitId,
    IdentifierType::ClientId,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierType {
    HwAddress,
    Duid,
    ClientId,
    CircuitId,
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentifierType::HwAddress => "hw-address",
            IdentifierType::Duid => "duid",
            IdentifierType::ClientId => "client-id",
            IdentifierType::CircuitId => "circuit-id",
        })
    }
}

/// a typed client identifier, e.g. `hw-address=aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    kind: IdentifierType,
    value: Vec<u8>,
}

impl Identifier {
    pub fn new(kind: IdentifierType, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Parse the config representation: hex bytes optionally separated by `:`
    /// or `-`, or for circuit-id also text in single quotes.
    pub fn parse(kind: IdentifierType, s: &str) -> Result<Self, ConfigError> {
        let err = |reason: String| ConfigError::InvalidIdentifier {
            kind: kind.to_string(),
            value: s.to_owned(),
            reason,
        };
        let s = s.trim();
        if let Some(text) = s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            if kind != IdentifierType::CircuitId {
                return Err(err("quoted text is only valid for circuit-id".to_owned()));
            }
            return Ok(Self::new(kind, text.as_bytes()));
        }
        let digits = s
            .trim_start_matches("0x")
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect::<String>();
        let value = hex::decode(&digits).map_err(|e| err(e.to_string()))?;
        if value.is_empty() {
            return Err(err("empty identifier".to_owned()));
        }
        Ok(Self::new(kind, value))
    }

    pub fn kind(&self) -> IdentifierType {
        self.kind
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.kind)?;
        for (i, b) in self.value.iter().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Every identifier a client presented in one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentifiers {
    pub hw_address: Option<Vec<u8>>,
    pub duid: Option<Vec<u8>>,
    pub client_id: Option<Vec<u8>>,
    pub circuit_id: Option<Vec<u8>>,
}

impl ClientIdentifiers {
    pub fn get(&self, kind: IdentifierType) -> Option<&[u8]> {
        match kind {
            IdentifierType::HwAddress => self.hw_address.as_deref(),
            IdentifierType::Duid => self.duid.as_deref(),
            IdentifierType::ClientId => self.client_id.as_deref(),
            IdentifierType::CircuitId => self.circuit_id.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hw_address.is_none()
            && self.duid.is_none()
            && self.client_id.is_none()
            && self.circuit_id.is_none()
    }

    /// true if `id` is one of the identifiers presented
    pub fn matches(&self, id: &Identifier) -> bool {
        self.get(id.kind()) == Some(id.value())
    }

    /// The identifier leases are recorded against: the DUID if present, then
    /// client-id when `match_client_id` is set, then the hardware address.
    pub fn owner(&self, match_client_id: bool) -> Option<Identifier> {
        let pick = |kind| self.get(kind).map(|v| Identifier::new(kind, v));
        pick(IdentifierType::Duid)
            .or_else(|| {
                match_client_id
                    .then(|| pick(IdentifierType::ClientId))
                    .flatten()
            })
            .or_else(|| pick(IdentifierType::HwAddress))
    }
}

/// which partition of the index a reservation lives in
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global,
    Subnet(SubnetId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Subnet(id) => write!(f, "subnet {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReservation {
    scope: Scope,
    identifiers: Vec<Identifier>,
    addresses: Vec<IpAddr>,
    prefixes: Vec<IpNet>,
    hostname: Option<String>,
    classes: Vec<String>,
}

impl HostReservation {
    pub fn from_wire(scope: Scope, res: wire::Reservation) -> Result<Self, ConfigError> {
        let identifiers = [
            (IdentifierType::HwAddress, res.hw_address.as_deref()),
            (IdentifierType::Duid, res.duid.as_deref()),
            (IdentifierType::ClientId, res.client_id.as_deref()),
            (IdentifierType::CircuitId, res.circuit_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, s)| s.map(|s| Identifier::parse(kind, s)))
        .collect::<Result<Vec<_>, _>>()?;
        if identifiers.is_empty() {
            return Err(ConfigError::MissingIdentifier { scope });
        }

        let mut addresses = res.ip_address.into_iter().collect::<Vec<_>>();
        for addr in res.ip_addresses {
            if !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }

        Ok(Self {
            scope,
            identifiers,
            addresses,
            prefixes: res.prefixes.into_iter().map(|p| p.trunc()).collect(),
            hostname: res.hostname,
            classes: res.client_classes,
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }
    /// reserved addresses, in config order
    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }
    /// reserved delegated prefixes
    pub fn prefixes(&self) -> &[IpNet] {
        &self.prefixes
    }
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
    /// classes assigned to any client matching this reservation
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
    /// first reserved address of the given family
    pub fn address(&self, v6: bool) -> Option<IpAddr> {
        self.addresses.iter().copied().find(|a| a.is_ipv6() == v6)
    }
    /// true if any identifier of the reservation was presented by the client
    pub fn belongs_to(&self, ids: &ClientIdentifiers) -> bool {
        self.identifiers.iter().any(|id| ids.matches(id))
    }
    /// name used in errors and logs
    pub fn label(&self) -> String {
        self.identifiers
            .first()
            .map(|id| id.to_string())
            .unwrap_or_default()
    }
    /// addresses and prefix starts, for address-uniqueness checks
    fn claimed(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.addresses
            .iter()
            .copied()
            .chain(self.prefixes.iter().map(|p| p.network()))
    }
}

/// Reservations by scope, identifier and address
#[derive(Debug, Clone, Default)]
pub struct ReservationIndex {
    order: Vec<IdentifierType>,
    hosts: Vec<HostReservation>,
    by_id: HashMap<(Scope, IdentifierType), HashMap<Vec<u8>, usize>>,
    by_addr: HashMap<(Scope, IpAddr), Vec<usize>>,
}

impl ReservationIndex {
    pub fn new(order: Vec<IdentifierType>) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Add a reservation. Fails if another reservation in the same scope uses one
    /// of its identifiers, or, when `ip_unique` is set, one of its addresses.
    pub fn insert(&mut self, res: HostReservation, ip_unique: bool) -> Result<(), ConfigError> {
        let scope = res.scope();
        for id in res.identifiers() {
            if let Some(&i) = self
                .by_id
                .get(&(scope, id.kind()))
                .and_then(|ids| ids.get(id.value()))
            {
                return Err(ConfigError::DuplicateReservation {
                    scope,
                    identifier: id.to_string(),
                    first: self.hosts[i].label(),
                    second: res.label(),
                });
            }
        }
        if ip_unique {
            for addr in res.claimed() {
                if let Some(&i) = self.by_addr.get(&(scope, addr)).and_then(|v| v.first()) {
                    return Err(ConfigError::DuplicateReservedAddress {
                        scope,
                        addr: addr.to_string(),
                        first: self.hosts[i].label(),
                        second: res.label(),
                    });
                }
            }
        }

        let idx = self.hosts.len();
        for id in res.identifiers() {
            self.by_id
                .entry((scope, id.kind()))
                .or_default()
                .insert(id.value().to_vec(), idx);
        }
        for addr in res.claimed() {
            self.by_addr.entry((scope, addr)).or_default().push(idx);
        }
        self.hosts.push(res);
        Ok(())
    }

    /// find the client's reservation in `scope`, trying identifiers in the
    /// configured order
    pub fn lookup(&self, scope: Scope, ids: &ClientIdentifiers) -> Option<&HostReservation> {
        self.order.iter().find_map(|&kind| {
            let value = ids.get(kind)?;
            let idx = self.by_id.get(&(scope, kind))?.get(value)?;
            self.hosts.get(*idx)
        })
    }

    /// the (first) reservation claiming `addr` in `scope`
    pub fn lookup_by_addr(&self, scope: Scope, addr: IpAddr) -> Option<&HostReservation> {
        self.by_addr
            .get(&(scope, addr))
            .and_then(|v| v.first())
            .and_then(|&i| self.hosts.get(i))
    }

    /// true if `addr` is reserved in `scope` for a client other than `ids`
    pub fn reserved_for_other(&self, scope: Scope, addr: IpAddr, ids: &ClientIdentifiers) -> bool {
        self.by_addr.get(&(scope, addr)).is_some_and(|v| {
            v.iter()
                .filter_map(|&i| self.hosts.get(i))
                .any(|res| !res.belongs_to(ids))
        })
    }

    /// identifier types in lookup order
    pub fn identifier_order(&self) -> &[IdentifierType] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostReservation> {
        self.hosts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw(s: &str) -> wire::Reservation {
        wire::Reservation {
            hw_address: Some(s.to_owned()),
            ..wire::Reservation::default()
        }
    }

    fn ids_hw(mac: [u8; 6]) -> ClientIdentifiers {
        ClientIdentifiers {
            hw_address: Some(mac.to_vec()),
            ..ClientIdentifiers::default()
        }
    }

    #[test]
    fn parse_identifier() {
        let id = Identifier::parse(IdentifierType::HwAddress, "aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(id.value(), &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(id.to_string(), "hw-address=aa:bb:cc:dd:ee:ff");
        let id = Identifier::parse(IdentifierType::Duid, "0x000102").unwrap();
        assert_eq!(id.value(), &[0, 1, 2]);
        let id = Identifier::parse(IdentifierType::CircuitId, "'charter950'").unwrap();
        assert_eq!(id.value(), b"charter950");
        assert!(Identifier::parse(IdentifierType::ClientId, "'text'").is_err());
        assert!(Identifier::parse(IdentifierType::HwAddress, "zz:zz").is_err());
        assert!(Identifier::parse(IdentifierType::HwAddress, "").is_err());
    }

    #[test]
    fn owner_priority() {
        let mut ids = ids_hw([1, 2, 3, 4, 5, 6]);
        assert_eq!(ids.owner(true).unwrap().kind(), IdentifierType::HwAddress);
        ids.client_id = Some(vec![1, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ids.owner(true).unwrap().kind(), IdentifierType::ClientId);
        assert_eq!(ids.owner(false).unwrap().kind(), IdentifierType::HwAddress);
        ids.duid = Some(vec![0, 3, 0, 1]);
        assert_eq!(ids.owner(true).unwrap().kind(), IdentifierType::Duid);
        assert_eq!(ClientIdentifiers::default().owner(true), None);
    }

    #[test]
    fn lookup_follows_identifier_order() {
        let mut index = ReservationIndex::new(vec![
            IdentifierType::CircuitId,
            IdentifierType::HwAddress,
        ]);
        let by_hw = HostReservation::from_wire(
            Scope::Global,
            wire::Reservation {
                hostname: Some("by-hw".to_owned()),
                ..hw("aa:bb:cc:dd:ee:ff")
            },
        )
        .unwrap();
        let by_circuit = HostReservation::from_wire(
            Scope::Global,
            wire::Reservation {
                circuit_id: Some("'port1'".to_owned()),
                hostname: Some("by-circuit".to_owned()),
                ..wire::Reservation::default()
            },
        )
        .unwrap();
        index.insert(by_hw, true).unwrap();
        index.insert(by_circuit, true).unwrap();

        let mut ids = ids_hw([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(
            index.lookup(Scope::Global, &ids).unwrap().hostname(),
            Some("by-hw")
        );
        ids.circuit_id = Some(b"port1".to_vec());
        assert_eq!(
            index.lookup(Scope::Global, &ids).unwrap().hostname(),
            Some("by-circuit")
        );
        // other partition is empty
        assert!(index.lookup(Scope::Subnet(SubnetId(1)), &ids).is_none());
    }

    #[test]
    fn identifiers_not_in_order_are_ignored() {
        let mut index = ReservationIndex::new(vec![IdentifierType::Duid]);
        index
            .insert(
                HostReservation::from_wire(Scope::Global, hw("aa:bb:cc:dd:ee:ff")).unwrap(),
                true,
            )
            .unwrap();
        let ids = ids_hw([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(index.lookup(Scope::Global, &ids).is_none());
    }

    #[test]
    fn duplicate_identifier_in_scope() {
        let mut index = ReservationIndex::new(DEFAULT_IDENTIFIER_ORDER.to_vec());
        let scope = Scope::Subnet(SubnetId(1));
        index
            .insert(HostReservation::from_wire(scope, hw("01:02:03:04:05:06")).unwrap(), true)
            .unwrap();
        // same identifier in another scope is fine
        index
            .insert(
                HostReservation::from_wire(Scope::Global, hw("01:02:03:04:05:06")).unwrap(),
                true,
            )
            .unwrap();
        let err = index
            .insert(HostReservation::from_wire(scope, hw("010203040506")).unwrap(), true)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "subnet 1 reservations hw-address=01:02:03:04:05:06 and hw-address=01:02:03:04:05:06 share identifier hw-address=01:02:03:04:05:06"
        );
    }

    #[test]
    fn duplicate_address() {
        let scope = Scope::Subnet(SubnetId(1));
        let with_ip = |mac: &str| {
            HostReservation::from_wire(
                scope,
                wire::Reservation {
                    ip_address: Some("10.0.0.5".parse().unwrap()),
                    ..hw(mac)
                },
            )
            .unwrap()
        };

        let mut index = ReservationIndex::new(DEFAULT_IDENTIFIER_ORDER.to_vec());
        index.insert(with_ip("01:02:03:04:05:06"), true).unwrap();
        assert!(matches!(
            index.insert(with_ip("01:02:03:04:05:07"), true),
            Err(ConfigError::DuplicateReservedAddress { .. })
        ));

        // allowed when not unique
        let mut index = ReservationIndex::new(DEFAULT_IDENTIFIER_ORDER.to_vec());
        index.insert(with_ip("01:02:03:04:05:06"), false).unwrap();
        index.insert(with_ip("01:02:03:04:05:07"), false).unwrap();
        let addr = "10.0.0.5".parse().unwrap();
        let first = ids_hw([1, 2, 3, 4, 5, 6]);
        let stranger = ids_hw([9, 9, 9, 9, 9, 9]);
        assert!(index.reserved_for_other(scope, addr, &first));
        assert!(index.reserved_for_other(scope, addr, &stranger));
        assert_eq!(
            index.lookup_by_addr(scope, addr).unwrap().label(),
            "hw-address=01:02:03:04:05:06"
        );
    }

    #[test]
    fn missing_identifier() {
        assert!(matches!(
            HostReservation::from_wire(Scope::Global, wire::Reservation::default()),
            Err(ConfigError::MissingIdentifier {
                scope: Scope::Global
            })
        ));
    }
}
