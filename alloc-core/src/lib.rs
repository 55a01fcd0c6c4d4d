//! # alloc-core
//!
//! Pieces shared by every crate in the allocation workspace: tracing setup,
//! environment helpers, the engine's command line options and the prometheus
//! statistics sink.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use async_trait::async_trait;
pub use chrono;
pub use tokio;
pub use tracing;

pub mod config;
pub mod env;
pub mod metrics;
pub mod prelude;

use std::time::SystemTime;

/// format a timestamp as RFC 3339 in UTC, used when logging lease expiry
pub fn print_time(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}
