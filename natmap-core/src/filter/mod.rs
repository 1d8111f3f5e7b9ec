//! Eligibility predicates for local interfaces and addresses.
//!
//! Both filters share the same precedence: a non-empty include list wins and
//! rejects everything it does not name; otherwise a non-empty exclude list
//! rejects what it names; otherwise everything passes.
//!
//! # Examples
//!
//! ```rust
//! use natmap_core::filter::{InterfaceFilter, IpFilter};
//!
//! let filter = InterfaceFilter::new(vec![], vec!["docker0".to_string()]);
//! assert!(filter.allow("eth0"));
//! assert!(!filter.allow("docker0"));
//!
//! let filter = IpFilter::new(&["10.0.0.0/8".to_string()], &[]).unwrap();
//! assert!(filter.allow("10.1.2.3".parse().unwrap()));
//! assert!(!filter.allow("192.168.1.2".parse().unwrap()));
//! ```

use crate::error::{Error, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// Accepts or rejects network interfaces by name.
#[derive(Clone, Debug, Default)]
pub struct InterfaceFilter {
    includes: Arc<[String]>,
    excludes: Arc<[String]>,
}

impl InterfaceFilter {
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self {
            includes: includes.into(),
            excludes: excludes.into(),
        }
    }
    pub fn allow(&self, name: &str) -> bool {
        if !self.includes.is_empty() {
            return self.includes.iter().any(|iface| iface == name);
        }
        !self.excludes.iter().any(|iface| iface == name)
    }
}

/// Accepts or rejects addresses by CIDR containment.
///
/// Every CIDR is parsed by [`IpFilter::new`], so a malformed entry is reported
/// before anything touches the network.
#[derive(Clone, Debug, Default)]
pub struct IpFilter {
    includes: Arc<[IpNet]>,
    excludes: Arc<[IpNet]>,
}

impl IpFilter {
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self> {
        Ok(Self {
            includes: parse_cidrs(includes)?.into(),
            excludes: parse_cidrs(excludes)?.into(),
        })
    }
    pub fn allow(&self, ip: IpAddr) -> bool {
        if !self.includes.is_empty() {
            return self.includes.iter().any(|net| net.contains(&ip));
        }
        !self.excludes.iter().any(|net| net.contains(&ip))
    }
}

fn parse_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Vec<IpNet>> {
    cidrs
        .iter()
        .map(|cidr| {
            let cidr = cidr.as_ref();
            cidr.trim()
                .parse::<IpNet>()
                .map_err(|source| Error::InvalidCidr {
                    cidr: cidr.to_string(),
                    source,
                })
        })
        .collect()
}
