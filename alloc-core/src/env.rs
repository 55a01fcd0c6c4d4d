//! convenience fns for reading env vars
use anyhow::Context;

use std::{env, str};

/// Returns the value of the environment variable `name` parsed as `T`, or
/// `default` if the variable isn't set.
/// # Examples
/// ```
/// let val: u64 = alloc_core::env::parse_var("ALLOC_DOC_UNSET_KEY", 10).unwrap();
/// assert_eq!(val, 10);
/// ```
pub fn parse_var<T, S>(name: &str, default: S) -> Result<T, <T as str::FromStr>::Err>
where
    T: str::FromStr,
    S: ToString,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
}

/// Returns the parsed value of `name`, or None if it is unset or fails to parse
pub fn parse_var_opt<T>(name: &str) -> Option<T>
where
    T: str::FromStr,
{
    env::var(name).ok()?.parse::<T>().ok()
}

/// Calls [`parse_var`] and names the variable in the error
///
/// [`parse_var`]: crate::env::parse_var
pub fn parse_var_with_err<T, S>(name: &str, default: S) -> anyhow::Result<T>
where
    T: str::FromStr,
    <T as str::FromStr>::Err: std::error::Error + Send + Sync + 'static,
    S: ToString,
{
    parse_var::<T, S>(name, default).with_context(|| format!("error parsing env var {name}"))
}
