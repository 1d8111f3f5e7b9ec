use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Number of ports drawn from a configured range.
pub const RANGE_SAMPLES: usize = 5;

/// Half-open UDP port range `[start, end)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// The ports every probe task walks through, in order.
///
/// Computed once per resolution and shared read-only by all tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidatePortSet {
    ports: Vec<u16>,
}

impl CandidatePortSet {
    /// A range wins over a fixed port; with neither the OS picks (port 0).
    pub fn new(range: Option<PortRange>, port: Option<u16>) -> Result<Self> {
        if let Some(range) = range {
            if range.is_empty() {
                return Err(Error::InvalidPortRange {
                    start: range.start,
                    end: range.end,
                });
            }
            let mut rng = rand::thread_rng();
            let ports = (0..RANGE_SAMPLES)
                .map(|_| rng.gen_range(range.start..range.end))
                .collect();
            return Ok(Self { ports });
        }
        match port {
            Some(port) if port != 0 => Ok(Self { ports: vec![port] }),
            _ => Ok(Self::ephemeral()),
        }
    }
    pub fn ephemeral() -> Self {
        Self { ports: vec![0] }
    }
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

impl Deref for CandidatePortSet {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        &self.ports
    }
}

impl From<Vec<u16>> for CandidatePortSet {
    fn from(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}
