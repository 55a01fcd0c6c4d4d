//! # Config wire format
//!
//! What gets deserialized from a JSON or YAML document before it is validated
//! and turned into a [`Topology`](crate::Topology). Keys are snake_case, enum
//! values kebab-case.
//!
//! ```yaml
//! valid_lifetime: 1h
//! reservation_mode: all
//! host_reservation_identifiers: [hw-address, duid, circuit-id, client-id]
//! client_classes:
//!   - name: reserved_class
//!   - name: unreserved_class
//!     test: "not member('reserved_class')"
//! reservations:
//!   - hw_address: "aa:bb:cc:dd:ee:fe"
//!     client_classes: [reserved_class]
//! subnets:
//!   - id: 10
//!     subnet: 10.0.0.0/24
//!     interface: eth0
//!     pools:
//!       - pool: 10.0.0.10 - 10.0.0.100
//!     reservations:
//!       - hw_address: "aa:bb:cc:dd:ee:ff"
//!         ip_address: 10.0.0.105
//! shared_networks:
//!   - name: frog
//!     interface: eth1
//!     subnets: []
//! ```
//!
//! Lifetimes and timers accept plain seconds or a string with an `s`, `m` or `h` suffix.
use std::{net::IpAddr, num::NonZeroU32};

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{
    error::ConfigError,
    params::{AllocatorKind, ReservationMode},
    reservations::{DEFAULT_IDENTIFIER_ORDER, IdentifierType},
};

/// top-level config type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// global parameters, inherited by shared networks and subnets
    #[serde(flatten)]
    pub params: Params,
    /// identifier types tried in order when looking up a reservation
    #[serde(default = "default_identifier_order")]
    pub host_reservation_identifiers: Vec<IdentifierType>,
    /// reject two reservations claiming the same address within one scope
    #[serde(default = "default_ip_reservations_unique")]
    pub ip_reservations_unique: bool,
    #[serde(default)]
    pub client_classes: Vec<ClientClass>,
    /// global reservations
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub shared_networks: Vec<SharedNetwork>,
}

impl Config {
    /// decode from YAML
    pub fn yaml<S: AsRef<str>>(input: S) -> Result<Self, ConfigError> {
        serde_yaml::from_str(input.as_ref()).map_err(|err| ConfigError::Decode(err.to_string()))
    }
    /// decode from JSON
    pub fn json<S: AsRef<str>>(input: S) -> Result<Self, ConfigError> {
        serde_json::from_str(input.as_ref()).map_err(|err| ConfigError::Decode(err.to_string()))
    }
    /// attempts to decode the config first as JSON, then YAML, returning the
    /// YAML error if neither work
    pub fn parse<S: AsRef<str>>(input: S) -> Result<Self, ConfigError> {
        match Self::json(input.as_ref()) {
            Ok(cfg) => Ok(cfg),
            Err(_err) => Self::yaml(input.as_ref()),
        }
    }
}

/// Parameters that can be set globally, per shared network, or per subnet.
/// Unset values are inherited from the enclosing level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Params {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_lifetime: Option<NonZeroU32>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_valid_lifetime: Option<NonZeroU32>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_valid_lifetime: Option<NonZeroU32>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub renew_timer: Option<NonZeroU32>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub rebind_timer: Option<NonZeroU32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_mode: Option<ReservationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<Relay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authoritative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_client_id: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocator: Option<AllocatorKind>,
}

/// relay agent addresses that select this subnet or network
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Relay {
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SharedNetwork {
    pub name: String,
    pub client_class: Option<String>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(flatten)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subnet {
    /// 0 or missing means the id is generated at commit
    #[serde(default)]
    pub id: u32,
    pub subnet: IpNet,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub pd_pools: Vec<PdPool>,
    pub client_class: Option<String>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(flatten)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pool {
    /// `first - last` or a CIDR prefix
    pub pool: String,
    pub client_class: Option<String>,
    pub id: Option<u32>,
}

impl Pool {
    /// first and last address of the pool
    pub fn range(&self) -> Result<(IpAddr, IpAddr), String> {
        parse_range(&self.pool)
    }
}

/// delegated prefix pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PdPool {
    pub prefix: IpNet,
    pub delegated_len: u8,
    pub client_class: Option<String>,
    pub id: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Reservation {
    /// hex, separated by `:` or `-` or not at all
    pub hw_address: Option<String>,
    pub duid: Option<String>,
    pub client_id: Option<String>,
    /// hex, or text in single quotes
    pub circuit_id: Option<String>,
    pub ip_address: Option<IpAddr>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub prefixes: Vec<IpNet>,
    pub hostname: Option<String>,
    #[serde(default)]
    pub client_classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientClass {
    pub name: String,
    /// classes without a test are only assigned by reservations
    pub test: Option<String>,
}

pub fn default_identifier_order() -> Vec<IdentifierType> {
    DEFAULT_IDENTIFIER_ORDER.to_vec()
}

pub const fn default_ip_reservations_unique() -> bool {
    true
}

/// parse `a - b` or a CIDR prefix into the first and last address
pub fn parse_range(s: &str) -> Result<(IpAddr, IpAddr), String> {
    let s = s.trim();
    if let Some((first, last)) = s.split_once('-') {
        let first = first
            .trim()
            .parse::<IpAddr>()
            .map_err(|err| format!("bad first address: {err}"))?;
        let last = last
            .trim()
            .parse::<IpAddr>()
            .map_err(|err| format!("bad last address: {err}"))?;
        return Ok((first, last));
    }
    let net = s
        .parse::<IpNet>()
        .map_err(|err| format!("expected `first - last` or a prefix: {err}"))?;
    Ok((net.network(), net.broadcast()))
}

/// Parse a duration string with optional time units
/// Accepts: "3600", "3600s", "60m", "24h"
/// If no unit is specified, assumes seconds
fn parse_duration(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_owned());
    }

    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    // split units
    let (num, unit) = s.split_at(end);
    let num = num
        .parse::<u32>()
        .map_err(|err| format!("invalid number: {err}"))?;

    let secs = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => {
            return Err(format!(
                "unknown time unit '{other}', only 'h', 'm', or 's' are supported"
            ));
        }
    };

    num.checked_mul(secs)
        .ok_or_else(|| "duration value overflow".to_owned())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDuration {
    Seconds(u64),
    String(String),
}

impl WireDuration {
    fn into_nonzero<E: de::Error>(self) -> Result<NonZeroU32, E> {
        let secs = match self {
            WireDuration::Seconds(val) => {
                u32::try_from(val).map_err(|_| E::custom("duration value too large"))?
            }
            WireDuration::String(s) => parse_duration(&s).map_err(E::custom)?,
        };
        NonZeroU32::new(secs).ok_or_else(|| E::custom("duration cannot be zero"))
    }
}

fn deserialize_optional_duration<'de, D>(de: D) -> Result<Option<NonZeroU32>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireDuration>::deserialize(de)?
        .map(WireDuration::into_nonzero)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub static EXAMPLE: &str = include_str!("../../sample/config.yaml");

    #[test]
    fn test_example() {
        let cfg = Config::parse(EXAMPLE).unwrap();
        assert_eq!(cfg.params.valid_lifetime, NonZeroU32::new(3600));
        assert_eq!(cfg.params.reservation_mode, Some(ReservationMode::All));
        assert_eq!(cfg.client_classes.len(), 2);
        assert_eq!(cfg.shared_networks[0].subnets.len(), 2);
        let subnet = &cfg.subnets[0];
        assert_eq!(subnet.id, 10);
        assert_eq!(subnet.params.reservation_mode, Some(ReservationMode::OutOfPool));
        // back to yaml and again
        let s = serde_yaml::to_string(&cfg).unwrap();
        assert_eq!(Config::yaml(s).unwrap(), cfg);
    }

    #[test]
    fn test_json_and_defaults() {
        let cfg = Config::parse(
            r#"{"subnets": [{"subnet": "192.168.0.0/24", "pools": [{"pool": "192.168.0.0/28"}]}]}"#,
        )
        .unwrap();
        assert!(cfg.ip_reservations_unique);
        assert_eq!(cfg.host_reservation_identifiers, DEFAULT_IDENTIFIER_ORDER);
        assert_eq!(cfg.subnets[0].id, 0);
        assert_eq!(
            cfg.subnets[0].pools[0].range().unwrap(),
            (
                "192.168.0.0".parse().unwrap(),
                "192.168.0.15".parse().unwrap()
            )
        );
    }

    #[test]
    fn test_decode_error() {
        assert!(matches!(
            Config::parse("subnets: {not: [a list"),
            Err(ConfigError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_range("10.0.0.10 - 10.0.0.100").unwrap(),
            ("10.0.0.10".parse().unwrap(), "10.0.0.100".parse().unwrap())
        );
        assert_eq!(
            parse_range("2001:db8::10-2001:db8::20").unwrap(),
            (
                "2001:db8::10".parse().unwrap(),
                "2001:db8::20".parse().unwrap()
            )
        );
        assert!(parse_range("10.0.0.10 to 10.0.0.100").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3600").unwrap(), 3600);
        assert_eq!(parse_duration("60s").unwrap(), 60);
        assert_eq!(parse_duration("90m").unwrap(), 5400);
        assert_eq!(parse_duration("24h").unwrap(), 86400);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("60d").is_err());
        assert!(parse_duration("60mins").is_err());
    }

    #[test]
    fn test_lifetime_strings() {
        let params: Params =
            serde_json::from_str(r#"{"valid_lifetime": "1h", "renew_timer": 900}"#).unwrap();
        assert_eq!(params.valid_lifetime, NonZeroU32::new(3600));
        assert_eq!(params.renew_timer, NonZeroU32::new(900));
        assert!(serde_json::from_str::<Params>(r#"{"valid_lifetime": 0}"#).is_err());
    }
}
