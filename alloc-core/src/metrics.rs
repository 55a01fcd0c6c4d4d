#![allow(missing_docs)] // proc macros dont play nicely with docstrings

//! # metrics
//!
//! Statistics emitted by the engine. Everything here is write-only from the
//! engine's point of view, nothing reads these values back.
use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounter, IntCounterVec, IntGaugeVec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge_vec,
};
use prometheus_static_metric::make_static_metric;

make_static_metric! {
    pub label_enum AllocOutcome {
        offered,
        committed,
        renewed,
        reserved,
        no_subnet,
        pool_exhausted,
        reservation_conflict,
        repository_conflict,
        repository_transient,
        repository_error,
        hook_skipped,
        missing_identifier,
    }
    pub struct AllocStats: IntCounter {
        "outcome" => AllocOutcome
    }
}

lazy_static! {
    /// When the engine started
    pub static ref START_TIME: Instant = Instant::now();

    pub static ref ALLOC_OUTCOME_VEC: IntCounterVec = register_int_counter_vec!(
        "alloc_outcome_counts",
        "allocation attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// count of allocation attempts by outcome
    pub static ref ALLOC_OUTCOME: AllocStats = AllocStats::from(&ALLOC_OUTCOME_VEC);

    /// addresses (or delegated prefixes) a subnet's pools can hand out
    pub static ref SUBNET_TOTAL_ADDRS: IntGaugeVec = register_int_gauge_vec!(
        "subnet_total_addresses",
        "count of addresses in the pools of a subnet",
        &["subnet_id"]
    )
    .unwrap();

    /// committed leases per subnet
    pub static ref SUBNET_ASSIGNED_ADDRS: IntGaugeVec = register_int_gauge_vec!(
        "subnet_assigned_addresses",
        "count of addresses currently leased in a subnet",
        &["subnet_id"]
    )
    .unwrap();

    /// expired leases moved to reclaimed
    pub static ref LEASES_RECLAIMED: IntCounter =
        register_int_counter!("leases_reclaimed", "count of expired leases reclaimed").unwrap();
    /// reclaimed leases removed after the hold time
    pub static ref LEASES_REMOVED: IntCounter =
        register_int_counter!("leases_removed", "count of reclaimed leases removed").unwrap();
    /// leases declined by clients
    pub static ref LEASES_DECLINED: IntCounter =
        register_int_counter!("leases_declined", "count of leases declined").unwrap();
    /// leases released by clients
    pub static ref LEASES_RELEASED: IntCounter =
        register_int_counter!("leases_released", "count of leases released").unwrap();

    /// time spent in one allocation attempt, including repository calls
    pub static ref ALLOC_DURATION: Histogram = register_histogram!(
        "alloc_duration",
        "allocation duration (seconds)"
    )
    .unwrap();
}

/// set the address space gauge for a subnet
pub fn set_subnet_total(subnet_id: u32, total: u128) {
    SUBNET_TOTAL_ADDRS
        .with_label_values(&[subnet_id.to_string().as_str()])
        .set(i64::try_from(total).unwrap_or(i64::MAX));
}

/// adjust the assigned gauge for a subnet by `delta`
pub fn add_subnet_assigned(subnet_id: u32, delta: i64) {
    SUBNET_ASSIGNED_ADDRS
        .with_label_values(&[subnet_id.to_string().as_str()])
        .add(delta);
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use prometheus::gather;

    use super::*;

    #[test]
    fn metrics_are_registered_and_exposed() {
        ALLOC_OUTCOME.committed.inc();
        ALLOC_DURATION.observe(0.001);
        set_subnet_total(1, u128::MAX);
        add_subnet_assigned(1, 1);

        let names = gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect::<HashSet<_>>();

        for name in [
            "alloc_outcome_counts",
            "alloc_duration",
            "subnet_total_addresses",
            "subnet_assigned_addresses",
        ] {
            assert!(names.contains(name), "registered metric families: {names:?}");
        }
        assert_eq!(
            SUBNET_TOTAL_ADDRS.with_label_values(&["1"]).get(),
            i64::MAX
        );
    }
}
