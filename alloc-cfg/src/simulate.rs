//! Replays a list of client requests against a committed topology and an
//! in-memory lease store.
use std::{
    net::IpAddr,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use alloc_core::{config::cli::EngineOpts, print_time, tracing::info};
use alloc_engine::{
    AllocEngine, AllocMode, Allocation, ClientContext, LeaseType, RetryPolicy, allocate_with_retry,
};
use config::{ClientIdentifiers, Identifier, IdentifierType, SubnetSelector, TopologyStore};
use lease_store::{Lease, MemoryStore};

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allocate,
    Release,
    Decline,
}

/// one client request, identifiers are hex with optional `:` separators
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Request {
    pub action: Action,
    pub hw_address: Option<String>,
    pub duid: Option<String>,
    pub client_id: Option<String>,
    pub circuit_id: Option<String>,
    pub iface: Option<String>,
    pub relay_addr: Option<IpAddr>,
    pub link_select: Option<IpAddr>,
    pub client_addr: Option<IpAddr>,
    pub local_addr: Option<IpAddr>,
    pub hint: Option<IpAddr>,
    /// requested valid lifetime in seconds
    pub lifetime: Option<u64>,
    pub hostname: Option<String>,
    /// allocate a delegated prefix
    pub prefix: bool,
    /// pick without writing
    pub offer: bool,
    /// address released or declined
    pub addr: Option<IpAddr>,
}

impl Request {
    fn ids(&self) -> Result<ClientIdentifiers> {
        let parse = |kind, s: &Option<String>| -> Result<Option<Vec<u8>>> {
            s.as_deref()
                .map(|s| Identifier::parse(kind, s).map(|id| id.value().to_vec()))
                .transpose()
                .map_err(Into::into)
        };
        Ok(ClientIdentifiers {
            hw_address: parse(IdentifierType::HwAddress, &self.hw_address)?,
            duid: parse(IdentifierType::Duid, &self.duid)?,
            client_id: parse(IdentifierType::ClientId, &self.client_id)?,
            circuit_id: parse(IdentifierType::CircuitId, &self.circuit_id)?,
        })
    }

    fn context(&self) -> Result<ClientContext> {
        let mut ctx = ClientContext::new(
            self.ids()?,
            SubnetSelector {
                iface: self.iface.clone(),
                relay_addr: self.relay_addr,
                link_select: self.link_select,
                client_addr: self.client_addr,
                local_addr: self.local_addr,
            },
        );
        ctx.hint = self.hint;
        ctx.requested_lifetime = self.lifetime.map(Duration::from_secs);
        ctx.hostname = self.hostname.clone();
        if self.prefix {
            ctx.lease_type = LeaseType::Prefix;
        }
        Ok(ctx)
    }
}

/// result of one request, printed as JSON
#[derive(Serialize, Debug, Clone, Default)]
pub struct Outcome {
    pub request: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn allocated(request: usize, alloc: &Allocation) -> Self {
        Self {
            request,
            ok: true,
            kind: Some(format!("{:?}", alloc.kind).to_lowercase()),
            hostname: alloc.hostname.clone(),
            classes: alloc.classes.iter().map(|c| c.to_owned()).collect(),
            committed: alloc.committed,
            ..Self::lease(request, &alloc.lease)
        }
    }

    fn lease(request: usize, lease: &Lease) -> Self {
        Self {
            request,
            ok: true,
            addr: Some(format!("{}/{}", lease.addr, lease.prefix_len)),
            subnet_id: Some(lease.subnet_id.0),
            expires_at: Some(print_time(lease.expires_at())),
            committed: true,
            ..Self::default()
        }
    }

    fn failed(request: usize, err: impl std::fmt::Display) -> Self {
        Self {
            request,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Report {
    pub generation: u64,
    pub outcomes: Vec<Outcome>,
    /// every lease left in the store
    pub leases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaimed: Option<usize>,
}

pub async fn run(
    store: &TopologyStore,
    opts: &EngineOpts,
    requests: Vec<Request>,
    reclaim_after: Option<u64>,
) -> Result<Report> {
    let topo = store.current();
    let engine = AllocEngine::new(MemoryStore::new())
        .with_max_alloc_attempts(opts.max_alloc_attempts());
    let policy = RetryPolicy::from(opts);

    let mut outcomes = Vec::with_capacity(requests.len());
    for (i, req) in requests.iter().enumerate() {
        let mut ctx = req
            .context()
            .with_context(|| format!("request {i} has an invalid identifier"))?;
        let outcome = match req.action {
            Action::Allocate => {
                let mode = if req.offer {
                    AllocMode::Offer
                } else {
                    AllocMode::Commit
                };
                match allocate_with_retry(&engine, store, &mut ctx, mode, policy).await {
                    Ok(alloc) => Outcome::allocated(i, &alloc),
                    Err(err) => Outcome::failed(i, err),
                }
            }
            Action::Release | Action::Decline => {
                let addr = req
                    .addr
                    .with_context(|| format!("request {i} needs an addr to {:?}", req.action))?;
                let res = if req.action == Action::Release {
                    engine.release(&topo, &ctx.ids, addr).await
                } else {
                    engine.decline(&topo, &ctx.ids, addr).await
                };
                match res {
                    Ok(lease) => Outcome::lease(i, &lease),
                    Err(err) => Outcome::failed(i, err),
                }
            }
        };
        outcomes.push(outcome);
    }

    let reclaimed = match reclaim_after {
        Some(secs) => {
            let stats = engine
                .reclaimer(opts)
                .reclaim_once(SystemTime::now() + Duration::from_secs(secs))
                .await?;
            info!(?stats, "simulated reclamation sweep");
            Some(stats.reclaimed)
        }
        None => None,
    };

    Ok(Report {
        generation: topo.generation(),
        outcomes,
        leases: engine
            .repo()
            .snapshot()
            .iter()
            .map(|l| l.to_string())
            .collect(),
        reclaimed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static CONFIG: &str = include_str!("../../libs/config/sample/config.yaml");
    static REQUESTS: &str = include_str!("../sample/requests.yaml");

    #[alloc_core::tokio::test(crate = "alloc_core::tokio")]
    async fn sample_requests() {
        let store = TopologyStore::new();
        store.commit_str(CONFIG).unwrap();
        let requests = serde_yaml::from_str::<Vec<Request>>(REQUESTS).unwrap();
        let report = run(&store, &EngineOpts::default(), requests, Some(4_000))
            .await
            .unwrap();
        let out = &report.outcomes;
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|o| o.ok), "{out:#?}");

        assert_eq!(out[0].addr.as_deref(), Some("10.0.0.105/32"));
        assert_eq!(out[0].kind.as_deref(), Some("reserved"));
        assert_eq!(out[0].hostname.as_deref(), Some("fixed-host"));
        assert_eq!(out[1].addr.as_deref(), Some("10.0.0.50/32"));
        assert_eq!(out[1].hostname.as_deref(), Some("laptop"));
        assert_eq!(out[2].subnet_id, Some(20));
        assert!(!out[2].committed);
        // reserved_class client can't use the unreserved pool of subnet 21
        assert_eq!(out[3].subnet_id, Some(22));
        assert_eq!(out[4].addr.as_deref(), Some("10.2.1.10/32"));
        assert_eq!(out[5].addr.as_deref(), Some("10.0.0.50/32"));

        // three leases left, all expired but still inside the hold time
        assert_eq!(report.reclaimed, Some(3));
        assert_eq!(report.leases.len(), 3);
    }

    #[test]
    fn bad_identifier() {
        let req = Request {
            hw_address: Some("zz:00".to_owned()),
            ..Request::default()
        };
        assert!(req.context().is_err());
    }
}
