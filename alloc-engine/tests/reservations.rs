//! Reservation mode behaviour, driven from YAML topologies.
mod common;

use alloc_engine::{AllocEngine, AllocError, AllocKind, AllocMode};
use config::SubnetId;
use lease_store::MemoryStore;
use tracing_test::traced_test;

use common::*;

#[tokio::test]
#[traced_test]
async fn global_hostname_only_reservation_gets_dynamic_address() {
    let topo = topology(
        r#"
reservation_mode: global
reservations:
  - hw_address: "aa:bb:cc:dd:ee:ff"
    hostname: hw-host-dynamic
subnets:
  - id: 1
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.100
"#,
    );
    let engine = AllocEngine::new(MemoryStore::new());
    let mut ctx = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0");

    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.kind, AllocKind::New);
    assert_eq!(alloc.subnet_id, SubnetId(1));
    assert_eq!(alloc.hostname.as_deref(), Some("hw-host-dynamic"));
    assert!(alloc.committed);
    let addr = alloc.lease.addr;
    assert!(ip("10.0.0.10") <= addr && addr <= ip("10.0.0.100"));
    assert_eq!(alloc.lease.hostname.as_deref(), Some("hw-host-dynamic"));
    assert!(ctx.classes().contains("KNOWN"));
}

static MIXED: &str = r#"
reservations:
  - hw_address: "aa:bb:cc:dd:ee:ff"
    hostname: global-host
subnets:
  - id: 10
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.100
    reservations:
      - hw_address: "aa:bb:cc:dd:ee:ff"
        hostname: subnet-10-host
  - id: 20
    subnet: 10.1.0.0/24
    interface: eth1
    reservation_mode: global
    pools:
      - pool: 10.1.0.10 - 10.1.0.100
"#;

#[tokio::test]
#[traced_test]
async fn mode_picks_subnet_or_global_reservation() {
    let topo = topology(MIXED);
    let engine = AllocEngine::new(MemoryStore::new());

    let mut ctx = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0");
    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.subnet_id, SubnetId(10));
    assert_eq!(alloc.hostname.as_deref(), Some("subnet-10-host"));

    let mut ctx = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth1");
    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.subnet_id, SubnetId(20));
    assert_eq!(alloc.hostname.as_deref(), Some("global-host"));
}

#[tokio::test]
#[traced_test]
async fn out_of_pool_reservation_is_handed_out() {
    let topo = topology(
        r#"
reservations:
  - hw_address: "aa:bb:cc:dd:ee:ff"
    hostname: global-host
subnets:
  - id: 10
    subnet: 10.0.0.0/24
    interface: eth0
    reservation_mode: out-of-pool
    pools:
      - pool: 10.0.0.10 - 10.0.0.100
    reservations:
      - hw_address: "aa:bb:cc:dd:ee:ff"
        ip_address: 10.0.0.105
"#,
    );
    let engine = AllocEngine::new(MemoryStore::new());
    let mut ctx = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0");
    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.lease.addr, ip("10.0.0.105"));
    assert_eq!(alloc.kind, AllocKind::Reserved);
    assert_eq!(alloc.pool_id, None);
    // the global reservation isn't consulted in out-of-pool mode
    assert_eq!(alloc.hostname, None);

    // a second request is a renewal of the same fixed address
    let again = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(again.lease.addr, ip("10.0.0.105"));
    assert_eq!(again.lease.version, alloc.lease.version + 1);
    assert_eq!(engine.repo().len(), 1);
}

static GUARDED: &str = r#"
reservation_mode: global
client_classes:
  - name: reserved_class
  - name: unreserved_class
    test: "not member('reserved_class')"
reservations:
  - hw_address: "aa:bb:cc:dd:ee:fe"
    client_classes: [reserved_class]
shared_networks:
  - name: frog
    interface: eth1
    subnets:
      - id: 1
        subnet: 10.0.0.0/24
        pools:
          - pool: 10.0.0.10 - 10.0.0.63
            client_class: reserved_class
      - id: 2
        subnet: 10.0.1.0/24
        pools:
          - pool: 10.0.1.10 - 10.0.1.63
            client_class: unreserved_class
"#;

#[tokio::test]
#[traced_test]
async fn reservation_classes_guard_pools_in_shared_network() {
    let topo = topology(GUARDED);
    let engine = AllocEngine::new(MemoryStore::new());

    let mut reserved = on_iface(mac("aa:bb:cc:dd:ee:fe"), "eth1");
    let alloc = engine
        .allocate(&topo, &mut reserved, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.subnet_id, SubnetId(1));
    assert_eq!(alloc.lease.addr, ip("10.0.0.10"));
    assert!(alloc.classes.contains("reserved_class"));
    assert!(!alloc.classes.contains("unreserved_class"));

    // asks for an address in the reserved_class pool, doesn't get it
    let mut other = on_iface(mac("aa:bb:cc:dd:ee:01"), "eth1").with_hint(ip("10.0.0.11"));
    let alloc = engine
        .allocate(&topo, &mut other, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.subnet_id, SubnetId(2));
    assert_eq!(alloc.lease.addr, ip("10.0.1.10"));
    assert!(alloc.classes.contains("unreserved_class"));
}

#[tokio::test]
#[traced_test]
async fn in_pool_reservation_is_skipped_for_others() {
    let topo = topology(
        r#"
subnets:
  - id: 1
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.12
    reservations:
      - hw_address: "aa:bb:cc:dd:ee:ff"
        ip_address: 10.0.0.10
"#,
    );
    let engine = AllocEngine::new(MemoryStore::new());
    let mut ctx = on_iface(mac("00:00:00:00:00:01"), "eth0").with_hint(ip("10.0.0.10"));
    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.lease.addr, ip("10.0.0.11"));

    // the owner still gets its address
    let mut owner = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0");
    let alloc = engine
        .allocate(&topo, &mut owner, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.lease.addr, ip("10.0.0.10"));
    assert_eq!(alloc.kind, AllocKind::Reserved);
}

#[tokio::test]
#[traced_test]
async fn reserved_address_held_by_another_client() {
    let topo = topology(
        r#"
reservation_mode: out-of-pool
subnets:
  - id: 1
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.10
"#,
    );
    let engine = AllocEngine::new(MemoryStore::new());
    let mut squatter = on_iface(mac("00:00:00:00:00:01"), "eth0");
    let taken = engine
        .allocate(&topo, &mut squatter, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(taken.lease.addr, ip("10.0.0.10"));

    // reservation added for the same address on the next commit
    let topo = topology(
        r#"
reservation_mode: out-of-pool
subnets:
  - id: 1
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.10
    reservations:
      - hw_address: "aa:bb:cc:dd:ee:ff"
        ip_address: 10.0.0.10
"#,
    );
    let mut owner = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0");
    let err = engine
        .allocate(&topo, &mut owner, AllocMode::Commit)
        .await
        .unwrap_err();
    assert!(
        matches!(err, AllocError::ReservationConflict { addr, .. } if addr == ip("10.0.0.10")),
        "{err:?}"
    );
    assert_eq!(active_count(engine.repo(), ip("10.0.0.10")), 1);
}

#[tokio::test]
#[traced_test]
async fn disabled_mode_ignores_reservations() {
    let topo = topology(
        r#"
reservation_mode: disabled
subnets:
  - id: 1
    subnet: 10.0.0.0/24
    interface: eth0
    pools:
      - pool: 10.0.0.10 - 10.0.0.20
    reservations:
      - hw_address: "aa:bb:cc:dd:ee:ff"
        ip_address: 10.0.0.200
        hostname: ignored
"#,
    );
    let engine = AllocEngine::new(MemoryStore::new());
    let mut ctx = on_iface(mac("aa:bb:cc:dd:ee:ff"), "eth0").with_hostname("client-sent");
    let alloc = engine
        .allocate(&topo, &mut ctx, AllocMode::Commit)
        .await
        .unwrap();
    assert_eq!(alloc.kind, AllocKind::New);
    assert_eq!(alloc.lease.addr, ip("10.0.0.10"));
    assert_eq!(alloc.hostname.as_deref(), Some("client-sent"));
    assert!(!ctx.classes().contains("KNOWN"));
}
