//! alloc prelude

pub use crate::{
    anyhow::{self, Context, Result},
    async_trait,
    metrics::{self, ALLOC_OUTCOME},
    print_time, tokio,
    tracing::{self, debug, error, info, instrument, trace, warn},
};

pub use std::{io, sync::Arc};
