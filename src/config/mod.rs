use std::net::IpAddr;
use std::time::Duration;

use natmap_core::filter::{InterfaceFilter, IpFilter};
use natmap_core::port::CandidatePortSet;
use serde::{Deserialize, Serialize};

pub use natmap_core::port::PortRange;

/// Reflection servers used when none are configured.
pub const DEFAULT_STUN_SERVERS: &[&str] = &["stun.l.google.com:19302", "stun1.l.google.com:19302"];

pub(crate) const INITIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const GRACE_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const PROBE_TIMEOUT: Duration = natmap_core::stun::DEFAULT_STUN_TIMEOUT;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NatConfig {
    pub stun_servers: Vec<String>,
    pub udp_port: Option<u16>,
    pub port_range: Option<PortRange>,
    pub enable_loopback_candidate: bool,
    pub interfaces: InterfacesConfig,
    pub ips: IpsConfig,
    pub node_ip: Option<IpAddr>,
    pub node_ip_auto_generated: bool,
    pub use_external_ip: bool,
    pub timeouts: ResolveTimeouts,
}

impl NatConfig {
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn set_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }
    pub fn set_udp_port(mut self, udp_port: u16) -> Self {
        self.udp_port.replace(udp_port);
        self
    }
    pub fn set_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range.replace(PortRange::new(start, end));
        self
    }
    pub fn set_enable_loopback_candidate(mut self, enable_loopback_candidate: bool) -> Self {
        self.enable_loopback_candidate = enable_loopback_candidate;
        self
    }
    pub fn set_interfaces(mut self, interfaces: InterfacesConfig) -> Self {
        self.interfaces = interfaces;
        self
    }
    pub fn set_ips(mut self, ips: IpsConfig) -> Self {
        self.ips = ips;
        self
    }
    pub fn set_node_ip(mut self, node_ip: IpAddr) -> Self {
        self.node_ip.replace(node_ip);
        self
    }
    pub fn set_node_ip_auto_generated(mut self, node_ip_auto_generated: bool) -> Self {
        self.node_ip_auto_generated = node_ip_auto_generated;
        self
    }
    pub fn set_use_external_ip(mut self, use_external_ip: bool) -> Self {
        self.use_external_ip = use_external_ip;
        self
    }
    pub fn set_timeouts(mut self, timeouts: ResolveTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The configured reflection servers, or [`DEFAULT_STUN_SERVERS`].
    pub fn stun_servers(&self) -> Vec<String> {
        if self.stun_servers.is_empty() {
            DEFAULT_STUN_SERVERS.iter().map(|v| v.to_string()).collect()
        } else {
            self.stun_servers.clone()
        }
    }
    pub fn candidate_ports(&self) -> natmap_core::error::Result<CandidatePortSet> {
        CandidatePortSet::new(self.port_range, self.udp_port)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfacesConfig {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

impl InterfacesConfig {
    /// `None` when neither list is set.
    pub fn filter(&self) -> Option<InterfaceFilter> {
        if self.includes.is_empty() && self.excludes.is_empty() {
            return None;
        }
        Some(InterfaceFilter::new(
            self.includes.clone(),
            self.excludes.clone(),
        ))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpsConfig {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
}

impl IpsConfig {
    /// Parses every CIDR; `Ok(None)` when neither list is set.
    pub fn filter(&self) -> natmap_core::error::Result<Option<IpFilter>> {
        if self.includes.is_empty() && self.excludes.is_empty() {
            return Ok(None);
        }
        IpFilter::new(&self.includes, &self.excludes).map(Some)
    }
}

/// Time budget of one resolution.
///
/// The collector waits up to `initial` for a first mapping, then only `grace`
/// more for the others. `probe` bounds each reflection request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveTimeouts {
    pub initial: Duration,
    pub grace: Duration,
    pub probe: Duration,
}

impl Default for ResolveTimeouts {
    fn default() -> Self {
        Self {
            initial: INITIAL_TIMEOUT,
            grace: GRACE_TIMEOUT,
            probe: PROBE_TIMEOUT,
        }
    }
}

impl ResolveTimeouts {
    pub fn set_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }
    pub fn set_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
    pub fn set_probe(mut self, probe: Duration) -> Self {
        self.probe = probe;
        self
    }
}

/// ICE server URLs (`stun:<host:port>`) for a list of reflection servers.
pub fn stun_urls<S: AsRef<str>>(servers: &[S]) -> Vec<String> {
    servers
        .iter()
        .map(|server| format!("stun:{}", server.as_ref()))
        .collect()
}
