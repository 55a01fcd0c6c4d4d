use thiserror::Error;

use crate::{reservations::Scope, topology::SubnetId};

/// A configuration that can't be committed. Returned from [`TopologyStore::commit`],
/// in which case the previously committed topology stays active.
///
/// [`TopologyStore::commit`]: crate::TopologyStore::commit
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to decode config as json or yaml: {0}")]
    Decode(String),
    #[error("duplicate subnet id {0}")]
    DuplicateSubnetId(SubnetId),
    #[error("no subnet ids left to autogenerate after {0}")]
    SubnetIdExhausted(SubnetId),
    #[error("shared network name must not be empty")]
    EmptyNetworkName,
    #[error("duplicate shared network name {0:?}")]
    DuplicateSharedNetwork(String),
    #[error(
        "subnet {subnet} in shared network {network:?} uses interface {found:?}, expected {expected:?}"
    )]
    InterfaceMismatch {
        network: String,
        subnet: SubnetId,
        expected: String,
        found: String,
    },
    #[error(
        "subnet {subnet} authoritative={found} disagrees with shared network {network:?} authoritative={expected}"
    )]
    AuthoritativeMismatch {
        network: String,
        subnet: SubnetId,
        expected: bool,
        found: bool,
    },
    #[error("invalid pool {pool:?} in subnet {subnet}: {reason}")]
    InvalidPool {
        subnet: SubnetId,
        pool: String,
        reason: String,
    },
    #[error("pools {first} and {second} overlap in subnet {subnet}")]
    OverlappingPools {
        subnet: SubnetId,
        first: String,
        second: String,
    },
    #[error("invalid lifetimes in subnet {subnet}: {reason}")]
    InvalidLifetime { subnet: SubnetId, reason: String },
    #[error("invalid {kind} identifier {value:?}: {reason}")]
    InvalidIdentifier {
        kind: String,
        value: String,
        reason: String,
    },
    #[error("{scope} reservation has no identifier")]
    MissingIdentifier { scope: Scope },
    #[error("{scope} reservations {first} and {second} share identifier {identifier}")]
    DuplicateReservation {
        scope: Scope,
        identifier: String,
        first: String,
        second: String,
    },
    #[error("{scope} reservations {first} and {second} both reserve {addr}")]
    DuplicateReservedAddress {
        scope: Scope,
        addr: String,
        first: String,
        second: String,
    },
    #[error("reservation {reservation} for {addr} is outside of subnet {subnet}")]
    ReservationOutsideSubnet {
        subnet: SubnetId,
        reservation: String,
        addr: String,
    },
    #[error("host_reservation_identifiers must not be empty")]
    EmptyIdentifierOrder,
    #[error("failed to parse client class {name}")]
    ClassExpr {
        name: String,
        #[source]
        source: client_classification::ParseErr,
    },
    #[error("client class {0:?} defined more than once")]
    DuplicateClass(String),
    #[error("client class {class:?} references undefined class {missing:?}")]
    UndefinedClass { class: String, missing: String },
    #[error("client class {0:?} redefines a built-in class")]
    BuiltinClass(String),
    #[error(transparent)]
    ClassOrder(#[from] topo_sort::TopoSortError),
}
