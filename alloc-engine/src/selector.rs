//! # Subnet selection
//!
//! 1. subnets matching the request's selector, each followed by its
//!    shared-network siblings
//! 2. classes are resolved for the client
//! 3. if any candidate uses `reservation_mode: global`, the global reservation
//!    is looked up and its classes merged, classes are then recomputed so
//!    they can steer which subnet gets picked
//! 4. candidates whose subnet or shared network guard isn't in the class set
//!    are dropped
//!
//! The first remaining candidate is the selected subnet, the rest are tried in
//! order if it runs out of addresses.
use config::{
    ClassEvaluator, ClassFacts, ClassSet, ClientIdentifiers, HostReservation, Scope, Subnet,
    SubnetParams, Topology,
};
use tracing::{debug, trace};

use crate::{context::ClientContext, error::AllocError};

/// a subnet allocation can be attempted in
#[derive(Debug, Clone)]
pub struct Candidate<'t> {
    pub subnet: &'t Subnet,
    pub params: SubnetParams,
}

#[derive(Debug, Clone)]
pub struct Selection<'t> {
    candidates: Vec<Candidate<'t>>,
    global: Option<&'t HostReservation>,
}

impl<'t> Selection<'t> {
    /// the selected subnet
    pub fn subnet(&self) -> &'t Subnet {
        // never empty, checked in `select_subnet`
        self.candidates[0].subnet
    }
    /// selected subnet first, then fallbacks
    pub fn candidates(&self) -> &[Candidate<'t>] {
        &self.candidates
    }
    /// global reservation consulted during selection
    pub fn global_reservation(&self) -> Option<&'t HostReservation> {
        self.global
    }
    /// put candidates matching `first` ahead of the others, keeping order
    pub(crate) fn prefer(&mut self, first: impl Fn(&Subnet) -> bool) {
        self.candidates.sort_by_key(|c| !first(c.subnet));
    }
}

pub fn select_subnet<'t>(
    topo: &'t Topology,
    ctx: &mut ClientContext,
) -> Result<Selection<'t>, AllocError> {
    let matched = topo.select_candidates(&ctx.selector);
    if matched.is_empty() {
        debug!(selector = ?ctx.selector, "no subnet matches request");
        return Err(AllocError::NoSubnetSelected);
    }
    let iface = ctx.selector.iface.as_deref();
    let params = matched.iter().map(|s| topo.params(s)).collect::<Vec<_>>();

    let mut classes = topo
        .classes()
        .resolve_classes(&ClassFacts::new(&ctx.ids, iface));
    let mut global = None;
    if params
        .iter()
        .any(|p| p.reservation_mode.global_reservations())
    {
        global = topo.reservations().lookup(Scope::Global, &ctx.ids);
        let reserved = global.map_or(&[][..], |r| r.classes());
        classes = topo.classes().resolve_classes(
            &ClassFacts::new(&ctx.ids, iface).with_reservation(global.is_some(), reserved),
        );
        if let Some(res) = global {
            debug!(reservation = %res.label(), %classes, "global reservation found, classes merged");
        }
    }

    let candidates = matched
        .into_iter()
        .zip(params)
        .filter(|(subnet, _)| {
            let network_guard = topo.network_of(subnet).and_then(|n| n.client_class());
            let eligible =
                classes.allows(subnet.client_class()) && classes.allows(network_guard);
            if !eligible {
                trace!(
                    subnet = %subnet.id(),
                    guard = ?subnet.client_class(),
                    ?network_guard,
                    "client classes don't match subnet guard"
                );
            }
            eligible
        })
        .map(|(subnet, params)| Candidate { subnet, params })
        .collect::<Vec<_>>();
    ctx.set_classes(classes);

    if candidates.is_empty() {
        debug!(classes = %ctx.classes(), "no subnet eligible for client classes");
        return Err(AllocError::NoSubnetSelected);
    }
    debug!(
        subnet = %candidates[0].subnet.id(),
        prefix = %candidates[0].subnet.prefix(),
        fallbacks = candidates.len() - 1,
        "selected subnet"
    );
    Ok(Selection { candidates, global })
}

/// The reservation that applies to the client within one subnet. Under
/// `global` mode only the global scope is used, under `all` and `out-of-pool`
/// only the subnet's own.
pub fn effective_reservation<'t>(
    topo: &'t Topology,
    candidate: &Candidate<'t>,
    ids: &ClientIdentifiers,
) -> Option<&'t HostReservation> {
    let mode = candidate.params.reservation_mode;
    if mode.global_reservations() {
        topo.reservations().lookup(Scope::Global, ids)
    } else if mode.subnet_reservations() {
        topo.reservations()
            .lookup(Scope::Subnet(candidate.subnet.id()), ids)
    } else {
        None
    }
}

/// classes recomputed from scratch once the reservation is known
pub fn classes_with_reservation(
    topo: &Topology,
    ctx: &ClientContext,
    reservation: Option<&HostReservation>,
) -> ClassSet {
    let reserved = reservation.map_or(&[][..], |r| r.classes());
    topo.classes().resolve_classes(
        &ClassFacts::new(&ctx.ids, ctx.selector.iface.as_deref())
            .with_reservation(reservation.is_some(), reserved),
    )
}
