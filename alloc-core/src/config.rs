//! engine runtime options and tracing setup

pub mod cli {
    //! Parse from either cli or env var

    /// the default path to config
    pub static DEFAULT_CONFIG_PATH: &str = "/etc/alloc/config.yaml";
    /// default log level. Can use this argument or ALLOC_LOG env var
    pub const DEFAULT_ALLOC_LOG: &str = "info";
    /// seconds between reclamation sweeps
    pub const DEFAULT_RECLAIM_INTERVAL: u64 = 10;
    /// max leases reclaimed in one sweep
    pub const DEFAULT_RECLAIM_BATCH: usize = 100;
    /// seconds a reclaimed lease is kept before it is deleted, 0 keeps them forever
    pub const DEFAULT_HOLD_RECLAIMED: u64 = 3_600;
    /// attempts made by the retry helper before giving up
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
    /// base back-off between retries, in ms
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
    /// candidates tried per pool, 0 means the pool capacity is the only bound
    pub const DEFAULT_MAX_ALLOC_ATTEMPTS: u64 = 0;

    use std::time::Duration;

    pub use clap::Parser;

    /// Options controlling the allocation engine, meant to be `#[clap(flatten)]`ed
    /// into a binary's arguments.
    #[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
    pub struct EngineOpts {
        /// seconds between expired lease reclamation sweeps
        #[clap(long, env, value_parser, default_value_t = DEFAULT_RECLAIM_INTERVAL)]
        pub reclaim_interval: u64,
        /// max expired leases reclaimed per sweep
        #[clap(long, env, value_parser, default_value_t = DEFAULT_RECLAIM_BATCH)]
        pub reclaim_batch: usize,
        /// seconds to keep reclaimed leases for lease affinity, 0 keeps them forever
        #[clap(long, env, value_parser, default_value_t = DEFAULT_HOLD_RECLAIMED)]
        pub hold_reclaimed_time: u64,
        /// attempts for retryable allocation failures
        #[clap(long, env, value_parser, default_value_t = DEFAULT_RETRY_ATTEMPTS)]
        pub retry_attempts: u32,
        /// base back-off between allocation retries in ms
        #[clap(long, env, value_parser, default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
        pub retry_backoff_ms: u64,
        /// max candidates tried per pool, 0 for unbounded
        #[clap(long, env, value_parser, default_value_t = DEFAULT_MAX_ALLOC_ATTEMPTS)]
        pub max_alloc_attempts: u64,
    }

    impl Default for EngineOpts {
        fn default() -> Self {
            Self {
                reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
                reclaim_batch: DEFAULT_RECLAIM_BATCH,
                hold_reclaimed_time: DEFAULT_HOLD_RECLAIMED,
                retry_attempts: DEFAULT_RETRY_ATTEMPTS,
                retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
                max_alloc_attempts: DEFAULT_MAX_ALLOC_ATTEMPTS,
            }
        }
    }

    impl EngineOpts {
        /// interval between reclamation sweeps
        pub fn reclaim_interval(&self) -> Duration {
            Duration::from_secs(self.reclaim_interval)
        }
        /// how long reclaimed leases are held, None if forever
        pub fn hold_reclaimed_time(&self) -> Option<Duration> {
            (self.hold_reclaimed_time != 0).then(|| Duration::from_secs(self.hold_reclaimed_time))
        }
        /// base retry back-off
        pub fn retry_backoff(&self) -> Duration {
            Duration::from_millis(self.retry_backoff_ms)
        }
        /// per-pool candidate limit, None if unbounded
        pub fn max_alloc_attempts(&self) -> Option<u64> {
            (self.max_alloc_attempts != 0).then_some(self.max_alloc_attempts)
        }
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::{Result, anyhow};
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields, Writer},
            time::FormatTime,
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    use std::str;

    use crate::env::parse_var_with_err;

    /// log as "json", "pretty" or "standard" (unstructured)
    static DEFAULT_LOG_FORMAT: &str = "standard";

    /// output format selected with `LOG_FORMAT`
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum LogFormat {
        /// one json object per line
        Json,
        /// multi-line, human friendly
        Pretty,
        /// default `fmt` layer
        Standard,
    }

    impl str::FromStr for LogFormat {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> Result<Self> {
            match s {
                "json" => Ok(LogFormat::Json),
                "pretty" => Ok(LogFormat::Pretty),
                "standard" => Ok(LogFormat::Standard),
                other => Err(anyhow!("unknown LOG_FORMAT {other:?}")),
            }
        }
    }

    /// RFC 3339 UTC timestamps
    #[derive(Debug, Copy, Clone, Default)]
    pub struct Rfc3339;

    impl FormatTime for Rfc3339 {
        fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
            write!(w, "{}", chrono::Utc::now().to_rfc3339())
        }
    }

    /// Tracing subscriber configuration
    #[derive(Debug)]
    pub struct Config {
        /// formatting applied to logs
        pub log_frmt: LogFormat,
    }

    impl Config {
        /// Read `LOG_FORMAT` and install the global subscriber filtered by `alloc_log`
        pub fn parse(alloc_log: &str) -> Result<Self> {
            let log_frmt: String = parse_var_with_err("LOG_FORMAT", DEFAULT_LOG_FORMAT)?;
            let log_frmt = log_frmt.parse::<LogFormat>()?;

            // Log level comes from ALLOC_LOG
            let filter = EnvFilter::try_new(alloc_log).or_else(|_| EnvFilter::try_new("info"))?;

            match log_frmt {
                LogFormat::Json => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_timer(Rfc3339))
                    .try_init()?,
                LogFormat::Pretty => tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        fmt::layer()
                            .event_format(
                                Format::default()
                                    .pretty()
                                    .with_source_location(false)
                                    .with_timer(Rfc3339),
                            )
                            .fmt_fields(PrettyFields::new()),
                    )
                    .try_init()?,
                LogFormat::Standard => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_timer(Rfc3339))
                    .try_init()?,
            }

            Ok(Self { log_frmt })
        }
    }

}
