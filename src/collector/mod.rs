//! Fan-out of probe tasks and fan-in of their mappings.
//!
//! One task per local address reports through a channel to a single
//! [`MappingCollector`], which alone owns the mapping table. The wait is bounded
//! by a two-phase deadline: a long initial wait for the first answer, then a
//! short grace period for the rest once anybody has answered.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_shutdown::ShutdownManager;
use natmap_core::filter::IpFilter;
use natmap_core::port::CandidatePortSet;
use natmap_core::stun::Reflector;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ResolveTimeouts;
use crate::resolver::{resolve_external, AddressMapping, ResolveContext, ResolveOutcome};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum DeadlineState {
    AwaitingFirst,
    GraceAfterFirst,
    Done,
}

#[derive(Debug)]
struct Deadline {
    state: DeadlineState,
    at: Instant,
}

impl Deadline {
    fn start(initial: std::time::Duration) -> Self {
        Self {
            state: DeadlineState::AwaitingFirst,
            at: Instant::now() + initial,
        }
    }
    /// Only the first mapping of a resolution moves the deadline.
    fn on_mapping(&mut self, grace: std::time::Duration) {
        if self.state == DeadlineState::AwaitingFirst {
            self.state = DeadlineState::GraceAfterFirst;
            self.at = Instant::now() + grace;
        }
    }
    fn finish(&mut self) {
        self.state = DeadlineState::Done;
    }
    fn is_done(&self) -> bool {
        self.state == DeadlineState::Done
    }
}

/// external address -> local address, first arrival wins.
#[derive(Debug, Default)]
struct NatMappingTable {
    mappings: HashMap<IpAddr, IpAddr>,
}

impl NatMappingTable {
    fn insert(&mut self, mapping: AddressMapping) -> bool {
        if let Some(local) = self.mappings.get(&mapping.external) {
            log::info!(
                "external ip already solved, ignore duplicate: external={} local={} ignore={}",
                mapping.external,
                local,
                mapping.local
            );
            return false;
        }
        self.mappings.insert(mapping.external, mapping.local);
        true
    }
    fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
    /// Map every local address without an entry of its own to itself.
    fn fill_identity(&mut self, locals: &[IpAddr]) {
        for local in locals {
            if self.mappings.values().any(|v| v == local) {
                continue;
            }
            if let Some(owner) = self.mappings.get(local) {
                log::warn!("local ip {local} is already the external ip of {owner}, not mapped to itself");
                continue;
            }
            let mapping = AddressMapping::identity(*local);
            self.mappings.insert(mapping.external, mapping.local);
        }
    }
    fn into_mappings(self) -> Vec<AddressMapping> {
        self.mappings
            .into_iter()
            .map(|(external, local)| AddressMapping::new(external, local))
            .collect()
    }
}

/// Result of one resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingReport {
    /// Unordered; empty when no external address was found at all.
    pub mappings: Vec<AddressMapping>,
    /// Probe tasks started, one per eligible local address.
    pub launched: usize,
    /// Mappings received before the deadline, duplicates included.
    pub resolved: usize,
    pub duplicates: usize,
    /// Probe tasks joined before returning, whatever their outcome.
    pub joined: usize,
}

impl MappingReport {
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
    /// `"<external>/<local>"` per mapping.
    pub fn to_strings(&self) -> Vec<String> {
        self.mappings.iter().map(|v| v.to_string()).collect()
    }
}

pub struct MappingCollector {
    reflector: Arc<dyn Reflector>,
    servers: Arc<[String]>,
    ports: Arc<CandidatePortSet>,
    timeouts: ResolveTimeouts,
}

impl MappingCollector {
    pub fn new(reflector: Arc<dyn Reflector>, servers: Vec<String>, ports: CandidatePortSet) -> Self {
        Self {
            reflector,
            servers: servers.into(),
            ports: Arc::new(ports),
            timeouts: ResolveTimeouts::default(),
        }
    }
    pub fn with_timeouts(mut self, timeouts: ResolveTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Like [`MappingCollector::collect`], keeping only the addresses `ip_filter` allows.
    pub async fn collect_filtered(
        &self,
        locals: &[IpAddr],
        ip_filter: Option<&IpFilter>,
    ) -> MappingReport {
        let locals: Vec<IpAddr> = locals
            .iter()
            .copied()
            .filter(|ip| ip_filter.map_or(true, |filter| filter.allow(*ip)))
            .collect();
        self.collect(&locals).await
    }

    /// Resolve every address of `locals` concurrently.
    ///
    /// Returns once the deadline has passed or every task has finished, and
    /// never before all tasks are joined. When anything resolved, each address
    /// of `locals` appears exactly once in the result.
    pub async fn collect(&self, locals: &[IpAddr]) -> MappingReport {
        let mut unique = Vec::with_capacity(locals.len());
        for ip in locals {
            if !unique.contains(ip) {
                unique.push(*ip);
            }
        }
        let locals = unique;
        if locals.is_empty() {
            log::debug!("no local address to resolve");
            return MappingReport::default();
        }

        let (sender, mut receiver) = tokio::sync::mpsc::channel(locals.len());
        let shutdown_manager = ShutdownManager::<()>::new();
        let mut join_set = JoinSet::new();
        for &local in &locals {
            let context = ResolveContext {
                reflector: self.reflector.clone(),
                servers: self.servers.clone(),
                ports: self.ports.clone(),
                shutdown_manager: shutdown_manager.clone(),
                sender: sender.clone(),
            };
            join_set.spawn(resolve_external(local, context));
        }
        drop(sender);
        let launched = join_set.len();

        let mut table = NatMappingTable::default();
        let mut resolved = 0;
        let mut duplicates = 0;
        let mut deadline = Deadline::start(self.timeouts.initial);
        while !deadline.is_done() {
            tokio::select! {
                mapping = receiver.recv() => match mapping {
                    Some(mapping) => {
                        resolved += 1;
                        deadline.on_mapping(self.timeouts.grace);
                        if !table.insert(mapping) {
                            duplicates += 1;
                        }
                    }
                    None => {
                        log::debug!("all resolve tasks finished before the deadline");
                        deadline.finish();
                    }
                },
                _ = tokio::time::sleep_until(deadline.at) => {
                    log::debug!("resolve deadline reached in state {:?}", deadline.state);
                    deadline.finish();
                }
            }
        }
        receiver.close();

        _ = shutdown_manager.trigger_shutdown(());
        let mut joined = 0;
        while let Some(rs) = join_set.join_next().await {
            joined += 1;
            match rs {
                Ok(ResolveOutcome::Resolved) | Ok(ResolveOutcome::Cancelled) => {}
                Ok(outcome) => log::debug!("resolve task ended: {outcome:?}"),
                Err(e) => log::warn!("resolve task {e:?}"),
            }
        }

        if table.is_empty() {
            log::info!("no external ip resolved from {} local ips", launched);
            return MappingReport {
                mappings: vec![],
                launched,
                resolved,
                duplicates,
                joined,
            };
        }
        table.fill_identity(&locals);
        MappingReport {
            mappings: table.into_mappings(),
            launched,
            resolved,
            duplicates,
            joined,
        }
    }
}
