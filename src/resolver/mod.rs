use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_shutdown::ShutdownManager;
use natmap_core::port::CandidatePortSet;
use natmap_core::socket::is_addr_in_use;
use natmap_core::stun::Reflector;
use tokio::sync::mpsc::Sender;

/// One discovered translation: `local` is seen as `external`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AddressMapping {
    pub external: IpAddr,
    pub local: IpAddr,
}

impl AddressMapping {
    pub fn new(external: IpAddr, local: IpAddr) -> Self {
        Self { external, local }
    }
    /// A local address that stands for itself.
    pub fn identity(local: IpAddr) -> Self {
        Self::new(local, local)
    }
}

impl fmt::Display for AddressMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.external, self.local)
    }
}

/// How a probe task ended.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ResolveOutcome {
    Resolved,
    /// Every candidate port was taken.
    Exhausted,
    Failed,
    Cancelled,
}

/// Everything one probe task needs, shared across tasks of the same resolution.
#[derive(Clone)]
pub(crate) struct ResolveContext {
    pub(crate) reflector: Arc<dyn Reflector>,
    pub(crate) servers: Arc<[String]>,
    pub(crate) ports: Arc<CandidatePortSet>,
    pub(crate) shutdown_manager: ShutdownManager<()>,
    pub(crate) sender: Sender<AddressMapping>,
}

/// Find the external address of `local`.
///
/// Ports are tried in order; only a port already in use moves on to the next
/// one. Any other failure ends the task. At most one mapping is sent.
pub(crate) async fn resolve_external(local: IpAddr, context: ResolveContext) -> ResolveOutcome {
    let ResolveContext {
        reflector,
        servers,
        ports,
        shutdown_manager,
        sender,
    } = context;
    for &port in ports.iter() {
        if shutdown_manager.is_shutdown_triggered() {
            log::debug!("stop resolving {local}: cancelled");
            return ResolveOutcome::Cancelled;
        }
        let addr = SocketAddr::new(local, port);
        let Ok(rs) = shutdown_manager
            .wrap_cancel(reflector.probe(addr, &servers))
            .await
        else {
            log::debug!("stop resolving {local}: cancelled during probe on port {port}");
            return ResolveOutcome::Cancelled;
        };
        match rs {
            Ok(external) => {
                if sender
                    .send(AddressMapping::new(external, local))
                    .await
                    .is_err()
                {
                    log::debug!("external ip {external} of {local} resolved after collection ended");
                }
                return ResolveOutcome::Resolved;
            }
            Err(e) if is_addr_in_use(&e) => {
                log::debug!("failed to get external ip, address already in use: local={local} port={port}");
                continue;
            }
            Err(e) => {
                log::info!("failed to get external ip: local={local} err={e:?}");
                return ResolveOutcome::Failed;
            }
        }
    }
    log::info!(
        "failed to get external ip after all ports tried: local={local} ports={:?}",
        ports.ports()
    );
    ResolveOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::{resolve_external, AddressMapping, ResolveContext, ResolveOutcome};
    use async_shutdown::ShutdownManager;
    use async_trait::async_trait;
    use natmap_core::port::CandidatePortSet;
    use natmap_core::stun::Reflector;
    use parking_lot::Mutex;
    use std::io;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers per port: `None` means the port is taken, `Some(Err)` a failed
    /// request, `Some(Ok)` the external address.
    struct PortScript {
        answers: Vec<(u16, Option<Result<IpAddr, io::ErrorKind>>)>,
        delay: Duration,
        tried: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl Reflector for PortScript {
        async fn probe(&self, local: SocketAddr, _servers: &[String]) -> io::Result<IpAddr> {
            self.tried.lock().push(local.port());
            tokio::time::sleep(self.delay).await;
            let answer = self
                .answers
                .iter()
                .find(|(port, _)| *port == local.port())
                .map(|(_, answer)| answer.clone());
            match answer {
                Some(Some(Ok(ip))) => Ok(ip),
                Some(Some(Err(kind))) => Err(io::Error::from(kind)),
                Some(None) | None => Err(io::Error::from(io::ErrorKind::AddrInUse)),
            }
        }
    }

    fn context(
        script: Arc<PortScript>,
        ports: Vec<u16>,
    ) -> (
        ResolveContext,
        tokio::sync::mpsc::Receiver<AddressMapping>,
        ShutdownManager<()>,
    ) {
        let (sender, receiver) = tokio::sync::mpsc::channel(1);
        let shutdown_manager = ShutdownManager::new();
        let context = ResolveContext {
            reflector: script,
            servers: vec!["stun.example.com".to_string()].into(),
            ports: Arc::new(CandidatePortSet::from(ports)),
            shutdown_manager: shutdown_manager.clone(),
            sender,
        };
        (context, receiver, shutdown_manager)
    }
    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn skips_ports_in_use() {
        let script = Arc::new(PortScript {
            answers: vec![(5000, None), (5001, None), (5002, Some(Ok(ip("203.0.113.9"))))],
            delay: Duration::ZERO,
            tried: Mutex::new(vec![]),
        });
        let (context, mut receiver, _shutdown) = context(script.clone(), vec![5000, 5001, 5002, 5003]);
        let outcome = resolve_external(ip("10.0.0.2"), context).await;
        assert_eq!(outcome, ResolveOutcome::Resolved);
        assert_eq!(
            receiver.recv().await,
            Some(AddressMapping::new(ip("203.0.113.9"), ip("10.0.0.2")))
        );
        assert_eq!(receiver.recv().await, None);
        assert_eq!(*script.tried.lock(), vec![5000, 5001, 5002]);
    }
    #[tokio::test]
    async fn other_failures_abort() {
        let script = Arc::new(PortScript {
            answers: vec![
                (5000, Some(Err(io::ErrorKind::TimedOut))),
                (5001, Some(Ok(ip("203.0.113.9")))),
            ],
            delay: Duration::ZERO,
            tried: Mutex::new(vec![]),
        });
        let (context, mut receiver, _shutdown) = context(script.clone(), vec![5000, 5001]);
        let outcome = resolve_external(ip("10.0.0.2"), context).await;
        assert_eq!(outcome, ResolveOutcome::Failed);
        assert_eq!(receiver.recv().await, None);
        assert_eq!(*script.tried.lock(), vec![5000]);
    }
    #[tokio::test]
    async fn exhausted_ports() {
        let script = Arc::new(PortScript {
            answers: vec![],
            delay: Duration::ZERO,
            tried: Mutex::new(vec![]),
        });
        let (context, mut receiver, _shutdown) = context(script.clone(), vec![5000, 5000, 5001]);
        let outcome = resolve_external(ip("10.0.0.2"), context).await;
        assert_eq!(outcome, ResolveOutcome::Exhausted);
        assert_eq!(receiver.recv().await, None);
        assert_eq!(*script.tried.lock(), vec![5000, 5000, 5001]);
    }
    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_probe() {
        let script = Arc::new(PortScript {
            answers: vec![(5000, Some(Ok(ip("203.0.113.9"))))],
            delay: Duration::from_secs(60),
            tried: Mutex::new(vec![]),
        });
        let (context, mut receiver, shutdown) = context(script.clone(), vec![5000]);
        let task = tokio::spawn(resolve_external(ip("10.0.0.2"), context));
        tokio::time::sleep(Duration::from_secs(1)).await;
        _ = shutdown.trigger_shutdown(());
        assert_eq!(task.await.unwrap(), ResolveOutcome::Cancelled);
        assert_eq!(receiver.recv().await, None);
    }
    #[tokio::test]
    async fn cancelled_before_first_port() {
        let script = Arc::new(PortScript {
            answers: vec![(5000, Some(Ok(ip("203.0.113.9"))))],
            delay: Duration::ZERO,
            tried: Mutex::new(vec![]),
        });
        let (context, _receiver, shutdown) = context(script.clone(), vec![5000]);
        _ = shutdown.trigger_shutdown(());
        let outcome = resolve_external(ip("10.0.0.2"), context).await;
        assert_eq!(outcome, ResolveOutcome::Cancelled);
        assert!(script.tried.lock().is_empty());
    }
    #[test]
    fn display() {
        let mapping = AddressMapping::new(ip("203.0.113.9"), ip("10.0.0.2"));
        assert_eq!(mapping.to_string(), "203.0.113.9/10.0.0.2");
        assert_eq!(AddressMapping::identity(ip("::1")).to_string(), "::1/::1");
    }
}
