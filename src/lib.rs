//! # natmap - NAT 1:1 address discovery for media relay nodes
//!
//! A relay node advertises candidate addresses to its peers. Behind a 1:1 NAT
//! the addresses of its interfaces are not the ones peers can reach, so each
//! local address is probed against reflection (STUN) servers to learn its
//! external counterpart. The outcome is a list of `"<external>/<local>"` pairs.
//!
//! ## Architecture
//!
//! - [`config`] - `NatConfig` and its defaults
//! - [`resolver`] - the per-address probe task
//! - [`collector`] - fan-in of the probe results under a two-phase deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use natmap::config::NatConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> natmap::error::Result<()> {
//! let config = NatConfig::empty()
//!     .set_port_range(50000, 60000)
//!     .set_stun_servers(vec!["stun.l.google.com:19302".to_string()]);
//! for mapping in natmap::resolve_nat_1to1_ips(&config).await? {
//!     println!("{mapping}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! An empty list means nothing could be resolved; [`nat_1to1_ips`] then falls
//! back to the configured node IP.

pub mod collector;
pub mod config;
pub mod error;
pub mod resolver;

use std::net::IpAddr;
use std::sync::Arc;

use collector::{MappingCollector, MappingReport};
use config::NatConfig;
use natmap_core::extend::addr::{interface_addresses, select_local_addresses};
use natmap_core::port::CandidatePortSet;
use natmap_core::stun::{Reflector, StunReflector};

pub use natmap_core::filter::{InterfaceFilter, IpFilter};
pub use natmap_core::stun;

/// Resolve the NAT 1:1 mapping of every eligible local address.
///
/// Returns `"<external>/<local>"` strings in no particular order, or an empty
/// list when no external address was found.
pub async fn resolve_nat_1to1_ips(config: &NatConfig) -> error::Result<Vec<String>> {
    let reflector = Arc::new(StunReflector::new(config.timeouts.probe));
    let report = resolve_report(config, reflector).await?;
    Ok(report.to_strings())
}

/// [`resolve_nat_1to1_ips`] with a caller supplied reflector and the full report.
///
/// Configuration errors are reported before anything touches the network.
/// Every enumerated local address is a candidate; only the IP filter narrows
/// the set, the interface lists do not.
pub async fn resolve_report(
    config: &NatConfig,
    reflector: Arc<dyn Reflector>,
) -> error::Result<MappingReport> {
    let ip_filter = config.ips.filter()?;
    let ports = config.candidate_ports()?;
    let interfaces = interface_addresses()?;
    collect_interface_addresses(config, reflector, ip_filter, ports, interfaces).await
}

async fn collect_interface_addresses(
    config: &NatConfig,
    reflector: Arc<dyn Reflector>,
    ip_filter: Option<IpFilter>,
    ports: CandidatePortSet,
    interfaces: Vec<(String, IpAddr)>,
) -> error::Result<MappingReport> {
    let locals = select_local_addresses(interfaces, config.enable_loopback_candidate, None)?;
    log::debug!("resolving external ips of {locals:?} on ports {:?}", ports.ports());
    let report = MappingCollector::new(reflector, config.stun_servers(), ports)
        .with_timeouts(config.timeouts)
        .collect_filtered(&locals, ip_filter.as_ref())
        .await;
    log::debug!(
        "resolved {} of {} local ips, {} duplicates",
        report.resolved,
        report.launched,
        report.duplicates
    );
    Ok(report)
}

/// The NAT 1:1 IPs a node should advertise, if any override applies.
///
/// Only a configured node IP triggers an override, and an auto-generated one
/// only together with `use_external_ip`. With `use_external_ip` the mappings
/// are resolved and the node IP is the fallback when none is found.
pub async fn nat_1to1_ips(config: &NatConfig) -> error::Result<Option<Vec<String>>> {
    let Some(node_ip) = node_ip_override(config) else {
        return Ok(None);
    };
    if !config.use_external_ip {
        return Ok(Some(vec![node_ip.to_string()]));
    }
    let ips = resolve_nat_1to1_ips(config).await?;
    Ok(Some(with_node_ip_fallback(ips, node_ip)))
}

fn node_ip_override(config: &NatConfig) -> Option<IpAddr> {
    config
        .node_ip
        .filter(|_| config.use_external_ip || !config.node_ip_auto_generated)
}

fn with_node_ip_fallback(ips: Vec<String>, node_ip: IpAddr) -> Vec<String> {
    if ips.is_empty() {
        log::info!("no external IPs found, using node IP for NAT1To1Ips: ip={node_ip}");
        vec![node_ip.to_string()]
    } else {
        log::info!("using external IPs: ips={ips:?}");
        ips
    }
}
