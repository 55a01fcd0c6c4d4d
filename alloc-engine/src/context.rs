use std::{net::IpAddr, time::Duration};

use config::{ClassSet, ClientIdentifiers, SubnetSelector};

/// kind of resource being allocated
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum LeaseType {
    #[default]
    Address,
    /// delegated prefix, taken from `pd_pools`
    Prefix,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum AllocMode {
    /// pick and check an address without writing anything
    Offer,
    /// pick, check and persist
    #[default]
    Commit,
}

/// Everything known about one client request. Built by the protocol layer,
/// the engine fills in the resolved classes during subnet selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ids: ClientIdentifiers,
    pub selector: SubnetSelector,
    /// address (or prefix) the client asked for
    pub hint: Option<IpAddr>,
    pub requested_lifetime: Option<Duration>,
    pub lease_type: LeaseType,
    /// hostname sent by the client, a reservation's hostname takes precedence
    pub hostname: Option<String>,
    classes: ClassSet,
}

impl ClientContext {
    pub fn new(ids: ClientIdentifiers, selector: SubnetSelector) -> Self {
        Self {
            ids,
            selector,
            ..Self::default()
        }
    }

    pub fn with_hint(mut self, hint: IpAddr) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.requested_lifetime = Some(lifetime);
        self
    }

    pub fn with_lease_type(mut self, lease_type: LeaseType) -> Self {
        self.lease_type = lease_type;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// classes resolved during subnet selection, empty before
    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }

    pub(crate) fn set_classes(&mut self, classes: ClassSet) {
        self.classes = classes;
    }
}
