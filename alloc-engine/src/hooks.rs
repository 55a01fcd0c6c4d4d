//! Call points for code that wants to observe or veto allocations.
use std::fmt;

use lease_store::Lease;

use crate::context::{AllocMode, ClientContext};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// drop the candidate lease, the allocation fails with `HookSkipped`
    Skip,
}

/// All methods default to doing nothing
pub trait AllocHooks: Send + Sync + 'static {
    /// called with the lease about to be offered or committed
    fn lease_select(&self, _ctx: &ClientContext, _lease: &Lease, _mode: AllocMode) -> HookAction {
        HookAction::Continue
    }
    /// called after a lease was written
    fn lease_committed(&self, _lease: &Lease) {}
    /// called after an expired lease was reclaimed
    fn lease_reclaimed(&self, _lease: &Lease) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl AllocHooks for NoHooks {}

impl fmt::Debug for dyn AllocHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AllocHooks")
    }
}
