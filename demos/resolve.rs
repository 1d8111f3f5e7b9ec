use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use env_logger::Env;
use natmap::config::{IpsConfig, NatConfig};
use natmap::stun::StunReflector;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// STUN server, may be repeated.
    /// example: --stun stun.l.google.com:19302
    #[arg(short, long)]
    stun: Vec<String>,
    /// Fixed UDP port to probe from
    #[arg(short = 'P', long)]
    port: Option<u16>,
    /// UDP port range to sample probe ports from.
    /// example: --port-range 50000-60000
    #[arg(short = 'r', long)]
    port_range: Option<String>,
    /// Probe loopback addresses as well
    #[arg(long)]
    loopback: bool,
    /// Only use addresses in these CIDRs.
    /// example: --ip 10.0.0.0/8
    #[arg(long)]
    ip: Vec<String>,
    /// Skip addresses in these CIDRs
    #[arg(long)]
    exclude_ip: Vec<String>,
    /// Node IP advertised when nothing resolves
    #[arg(short, long)]
    node_ip: Option<IpAddr>,
}

fn parse_port_range(range: &str) -> anyhow::Result<(u16, u16)> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| anyhow!("--port-range expects <start>-<end>, got {range}"))?;
    let start = start.trim().parse().context("--port-range start")?;
    let end = end.trim().parse().context("--port-range end")?;
    Ok((start, end))
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let Args {
        stun,
        port,
        port_range,
        loopback,
        ip,
        exclude_ip,
        node_ip,
    } = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();

    let mut config = NatConfig::empty()
        .set_stun_servers(stun)
        .set_enable_loopback_candidate(loopback)
        .set_ips(IpsConfig {
            includes: ip,
            excludes: exclude_ip,
        });
    if let Some(port) = port {
        config = config.set_udp_port(port);
    }
    if let Some(range) = port_range {
        let (start, end) = parse_port_range(&range)?;
        config = config.set_port_range(start, end);
    }

    let reflector = Arc::new(StunReflector::new(config.timeouts.probe));
    let report = natmap::resolve_report(&config, reflector).await?;
    log::info!(
        "launched {} probes, {} answered, {} duplicates, {} joined",
        report.launched,
        report.resolved,
        report.duplicates,
        report.joined
    );
    if report.is_empty() {
        match node_ip {
            Some(node_ip) => println!("{node_ip}"),
            None => log::warn!("no external ip resolved"),
        }
        return Ok(());
    }
    for mapping in report.to_strings() {
        println!("{mapping}");
    }
    Ok(())
}
