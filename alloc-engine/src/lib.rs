#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::too_many_arguments)]

//! # alloc-engine
//!
//! Given a client request and a committed [`Topology`](config::Topology),
//! [`AllocEngine`] picks a subnet, resolves the client's reservation and
//! classes, and hands out an address or prefix:
//!
//! 1. a reserved fixed address, if the subnet's reservation mode allows it
//! 2. the client's active lease in the subnet (renewal)
//! 3. the address the client hinted at
//! 4. the client's previous, expired lease (affinity)
//! 5. the next free candidate of the first eligible pool
//!
//! Each address is checked and written under a per-address lock with a
//! compare-and-swap against the [`LeaseRepository`](lease_store::LeaseRepository),
//! so at most one active lease exists per address. Expired leases are reclaimed
//! inline before reuse, and in the background by [`Reclaimer`].
pub mod context;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod locks;
pub mod pool;
pub mod reclaim;
pub mod retry;
pub mod selector;

pub use context::{AllocMode, ClientContext, LeaseType};
pub use engine::{AllocEngine, AllocKind, Allocation, DEFAULT_DECLINE_PROBATION};
pub use error::AllocError;
pub use hooks::{AllocHooks, HookAction, NoHooks};
pub use reclaim::{ReclaimStats, Reclaimer};
pub use retry::{RetryPolicy, allocate_with_retry};
pub use selector::{Candidate, Selection};
