//! # natmap-core - Building blocks for NAT 1:1 address discovery
//!
//! `natmap-core` provides the leaf pieces used by `natmap` to work out which
//! external address each local address of a media relay node is translated to.
//!
//! ## Features
//!
//! - **Address Filters**: interface-name and CIDR include/exclude predicates
//! - **Candidate Ports**: the UDP ports a probe walks through
//! - **Local Addresses**: enumeration of the node's IPv4 addresses
//! - **STUN Reflection**: learn the external address of a local endpoint
//!
//! ## Architecture
//!
//! - [`filter`] - `InterfaceFilter` and `IpFilter`
//! - [`port`] - `CandidatePortSet` and `PortRange`
//! - [`extend`] - local address enumeration
//! - [`socket`] - UDP binding
//! - [`stun`] - the `Reflector` seam and its STUN implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use natmap_core::extend::addr::local_ip_addresses;
//! use natmap_core::filter::IpFilter;
//! use natmap_core::port::CandidatePortSet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ip_filter = IpFilter::new(&["10.0.0.0/8"], &[])?;
//! let ports = CandidatePortSet::new(None, Some(7882))?;
//! for ip in local_ip_addresses(false, None)? {
//!     if ip_filter.allow(ip) {
//!         println!("would probe {ip} on ports {:?}", ports.ports());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extend;
pub mod filter;
pub mod port;
pub mod socket;
pub mod stun;
