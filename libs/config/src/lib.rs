//! Configuration for the allocation engine: the wire format, the validated
//! [`Topology`] built from it, and the [`TopologyStore`] that hands committed
//! snapshots to request handlers.
use std::{fs, path::Path, sync::Arc, time::Duration};

use alloc_core::metrics;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

pub mod client_classes;
pub mod error;
pub mod params;
pub mod reservations;
pub mod topology;
pub mod wire;

pub use client_classes::{ClassEvaluator, ClassFacts, ClassSet, ClientClasses};
pub use error::ConfigError;
pub use params::{AllocatorKind, Inherit, Params, ReservationMode, SubnetParams};
pub use reservations::{
    ClientIdentifiers, HostReservation, Identifier, IdentifierType, ReservationIndex, Scope,
};
pub use topology::{Pool, PoolKind, SharedNetwork, Subnet, SubnetId, SubnetSelector, Topology};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LeaseTime {
    default: Duration,
    min: Duration,
    max: Duration,
    renew: Option<Duration>,
    rebind: Option<Duration>,
}

/// lifetimes handed to a client
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Lifetimes {
    pub valid: Duration,
    pub renew: Duration,
    pub rebind: Duration,
}

impl LeaseTime {
    pub fn new(default: Duration, min: Duration, max: Duration) -> Self {
        Self {
            default,
            min,
            max,
            renew: None,
            rebind: None,
        }
    }
    /// configured timers, otherwise derived from the valid lifetime
    pub fn with_timers(mut self, renew: Option<Duration>, rebind: Option<Duration>) -> Self {
        self.renew = renew;
        self.rebind = rebind;
        self
    }
    pub fn get_default(&self) -> Duration {
        self.default
    }
    pub fn get_min(&self) -> Duration {
        self.min
    }
    pub fn get_max(&self) -> Duration {
        self.max
    }
    /// calculate the lease time based on a possible requested time
    pub fn determine_lease(&self, requested: Option<Duration>) -> Lifetimes {
        // time must be larger than `min` and smaller than `max`
        let valid = requested.map_or(self.default, |req| req.clamp(self.min, self.max));
        Lifetimes {
            valid,
            renew: self.renew.unwrap_or_else(|| renew(valid)).min(valid),
            rebind: self.rebind.unwrap_or_else(|| rebind(valid)).min(valid),
        }
    }
}

pub fn renew(t: Duration) -> Duration {
    t / 2
}

pub fn rebind(t: Duration) -> Duration {
    t * 7 / 8
}

/// Holds the active [`Topology`]. Readers clone the `Arc` and keep using that
/// snapshot for the whole request, a commit swaps in a complete new one.
#[derive(Debug, Default)]
pub struct TopologyStore {
    current: RwLock<Arc<Topology>>,
    /// serializes commits so generations are handed out in order
    commit_lock: Mutex<()>,
}

impl TopologyStore {
    /// an empty topology, generation 0
    pub fn new() -> Self {
        Self::default()
    }

    /// the active snapshot
    pub fn current(&self) -> Arc<Topology> {
        self.current.read().clone()
    }

    /// Validate `cfg` and make it the active topology. On error the previous
    /// topology stays active and nothing of `cfg` is visible.
    pub fn commit(&self, cfg: wire::Config) -> Result<Arc<Topology>, ConfigError> {
        let _guard = self.commit_lock.lock();
        let generation = self.current.read().generation() + 1;
        let topology = match Topology::build(cfg, generation) {
            Ok(topology) => Arc::new(topology),
            Err(err) => {
                error!(?err, generation, "config rejected, keeping active topology");
                return Err(err);
            }
        };
        for subnet in topology.all_subnets() {
            metrics::set_subnet_total(subnet.id().0, subnet.total_addrs());
        }
        *self.current.write() = topology.clone();
        info!(
            generation,
            subnets = topology.all_subnets().len(),
            shared_networks = topology.all_shared_networks().len(),
            "committed topology"
        );
        Ok(topology)
    }

    /// decode JSON or YAML and commit it
    pub fn commit_str<S: AsRef<str>>(&self, input: S) -> Result<Arc<Topology>, ConfigError> {
        self.commit(wire::Config::parse(input)?)
    }

    /// read a file and commit it
    pub fn commit_path<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Topology>, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading config");
        let input = fs::read_to_string(path)
            .map_err(|err| ConfigError::Decode(format!("{}: {err}", path.display())))?;
        self.commit_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: &str = include_str!("../sample/config.yaml");

    #[test]
    fn lease_time_clamps() {
        let lt = LeaseTime::new(
            Duration::from_secs(100),
            Duration::from_secs(50),
            Duration::from_secs(200),
        );
        let l = lt.determine_lease(None);
        assert_eq!(l.valid, Duration::from_secs(100));
        assert_eq!(l.renew, Duration::from_secs(50));
        assert_eq!(l.rebind, Duration::from_millis(87_500));

        assert_eq!(
            lt.determine_lease(Some(Duration::from_secs(10))).valid,
            Duration::from_secs(50)
        );
        assert_eq!(
            lt.determine_lease(Some(Duration::from_secs(1000))).valid,
            Duration::from_secs(200)
        );

        // configured timers are used as-is, but never exceed the lifetime
        let lt = lt.with_timers(Some(Duration::from_secs(30)), Some(Duration::from_secs(500)));
        let l = lt.determine_lease(None);
        assert_eq!(l.renew, Duration::from_secs(30));
        assert_eq!(l.rebind, Duration::from_secs(100));
    }

    #[test]
    fn commit_is_fail_closed() {
        let store = TopologyStore::new();
        assert_eq!(store.current().generation(), 0);
        assert!(store.current().all_subnets().is_empty());

        let first = store.commit_str(SAMPLE).unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(store.current().all_subnets().len(), 4);

        // duplicate shared network name, nothing of it may become active
        let bad = r#"
subnets:
  - id: 99
    subnet: 192.168.0.0/24
shared_networks:
  - name: dup
  - name: dup
"#;
        assert!(matches!(
            store.commit_str(bad),
            Err(ConfigError::DuplicateSharedNetwork(_))
        ));
        let current = store.current();
        assert_eq!(current.generation(), 1);
        assert!(current.find_subnet_by_id(SubnetId(99)).is_none());
        assert!(Arc::ptr_eq(&current, &first));

        // readers holding the old snapshot keep it after the next commit
        let second = store.commit_str("subnets: [{id: 5, subnet: 10.9.0.0/16}]").unwrap();
        assert_eq!(second.generation(), 2);
        assert_eq!(first.all_subnets().len(), 4);
        assert_eq!(store.current().all_subnets().len(), 1);
    }

    #[test]
    fn commit_decode_error() {
        let store = TopologyStore::new();
        assert!(matches!(
            store.commit_str("subnets: {"),
            Err(ConfigError::Decode(_))
        ));
        assert!(matches!(
            store.commit_path("/nonexistent/alloc.yaml"),
            Err(ConfigError::Decode(_))
        ));
        assert_eq!(store.current().generation(), 0);
    }
}
