use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use alloc_core::{
    config::{
        cli::{DEFAULT_ALLOC_LOG, DEFAULT_CONFIG_PATH, EngineOpts},
        trace,
    },
    tokio::runtime::Builder,
    tracing::debug,
};
use config::{Topology, TopologyStore, wire};
use serde::de::DeserializeOwned;

mod simulate;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, version, about, long_about = None)]
/// Validate an allocation topology and try requests against it
pub struct Args {
    /// path to the topology config. Format is picked from the extension, without one JSON then YAML is tried
    #[clap(short = 'p', long, env, value_parser, default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,
    /// log filter, also read from ALLOC_LOG
    #[clap(long, env = "ALLOC_LOG", value_parser, default_value = DEFAULT_ALLOC_LOG)]
    pub log: String,
    #[clap(flatten)]
    pub engine: EngineOpts,
    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// validate the config and print what it contains
    Check {
        #[clap(short = 'f', long, value_enum, default_value_t = Format::Summary)]
        format: Format,
    },
    /// run a list of requests against an empty in-memory lease store
    Simulate {
        /// JSON or YAML list of requests
        #[clap(short = 'r', long, value_parser)]
        requests: PathBuf,
        /// run one reclamation sweep after the requests, as if this many seconds had passed
        #[clap(long, value_parser)]
        reclaim_after: Option<u64>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// the decoded config as written
    Wire,
    /// the validated topology, debug printed
    Internal,
    /// one line per shared network and subnet
    Summary,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let trace_config = trace::Config::parse(&args.log)?;
    debug!(?args, ?trace_config);
    println!("found config at path = {}", args.config_path.display());

    match &args.cmd {
        Command::Check { format } => check(&args.config_path, *format),
        Command::Simulate {
            requests,
            reclaim_after,
        } => {
            let store = TopologyStore::new();
            store.commit(parse_wire::<wire::Config>(&args.config_path)?)?;
            let requests = parse_wire::<Vec<simulate::Request>>(requests)?;
            let rt = Builder::new_current_thread().enable_all().build()?;
            let report = rt.block_on(simulate::run(
                &store,
                &args.engine,
                requests,
                *reclaim_after,
            ))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn check(path: &Path, format: Format) -> Result<()> {
    let wire_cfg = parse_wire::<wire::Config>(path)?;
    if format == Format::Wire {
        println!("printing wire format");
        println!("{:#?}", wire_cfg);
    }
    let topo = Topology::build(wire_cfg, 1).context("config is invalid")?;
    match format {
        Format::Internal => {
            println!("parsed wire format into internal format, pretty printing");
            println!("{:#?}", topo);
        }
        Format::Summary => print_summary(&topo),
        Format::Wire => {}
    }
    println!("config is valid");
    Ok(())
}

fn print_summary(topo: &Topology) {
    println!(
        "{} subnets, {} shared networks, {} reservations, {} client classes",
        topo.all_subnets().len(),
        topo.all_shared_networks().len(),
        topo.reservations().len(),
        topo.classes().len(),
    );
    for net in topo.all_shared_networks() {
        let ids = net
            .subnets()
            .iter()
            .map(|s| s.id().to_string())
            .collect::<Vec<_>>();
        println!(
            "shared-network {} guard={:?} subnets=[{}]",
            net.name(),
            net.client_class(),
            ids.join(", ")
        );
    }
    for subnet in topo.all_subnets() {
        let params = topo.params(subnet);
        println!(
            "subnet {} {} network={:?} pools={} pd_pools={} addrs={} mode={:?} allocator={:?} valid={}s",
            subnet.id(),
            subnet.prefix(),
            subnet.shared_network(),
            subnet.pools().len(),
            subnet.pd_pools().len(),
            subnet.total_addrs(),
            params.reservation_mode,
            params.allocator,
            params.lease_time.get_default().as_secs(),
        );
    }
}

fn parse_wire<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    Ok(match path.extension() {
        Some(ext) if ext == "json" => serde_json::from_str(&input)?,
        Some(ext) if ext == "yaml" || ext == "yml" => serde_yaml::from_str(&input)?,
        _ => match serde_json::from_str(&input) {
            Ok(r) => r,
            Err(_err) => {
                debug!("failed parsing from json, trying yaml");
                serde_yaml::from_str(&input)?
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let args = Args::parse_from(["alloc-cfg", "-p", "cfg.yaml", "check", "-f", "wire"]);
        assert_eq!(args.config_path, PathBuf::from("cfg.yaml"));
        assert_eq!(
            args.cmd,
            Command::Check {
                format: Format::Wire
            }
        );

        let args = Args::parse_from([
            "alloc-cfg",
            "--retry-attempts",
            "5",
            "simulate",
            "-r",
            "reqs.json",
            "--reclaim-after",
            "60",
        ]);
        assert_eq!(args.engine.retry_attempts, 5);
        assert_eq!(
            args.cmd,
            Command::Simulate {
                requests: PathBuf::from("reqs.json"),
                reclaim_after: Some(60),
            }
        );
    }

    #[test]
    fn sample_config_checks() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../libs/config/sample/config.yaml");
        check(&path, Format::Summary).unwrap();
    }
}
