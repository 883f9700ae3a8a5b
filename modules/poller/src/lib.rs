//! Concurrent census poll: fans a batch of endpoints out over a bounded set
//! of in-flight probes and collects whatever answers.

use a2s_query::{query_server, QueryTarget};
use census_core::pacer::LaunchPacer;
use census_core::{Endpoint, PollOutcome, ProbeError, Snapshot};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Per send/receive timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum probes in flight at once.
    pub concurrency: usize,
    /// Probe launches per second; 0 disables pacing.
    pub qps: u32,
    /// Address queried instead of our own public IP.
    pub loopback_ip: IpAddr,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            timeout_ms: 3000,
            concurrency: 150,
            qps: 0,
            loopback_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Servers hosted behind our own public IP cannot be reached through it from
/// the inside, so they are queried on the loopback address instead. The
/// public endpoint stays the identity of record.
pub fn query_target(endpoint: Endpoint, public_ip: Option<IpAddr>, loopback_ip: IpAddr) -> QueryTarget {
    match public_ip {
        Some(own) if own == endpoint.ip => QueryTarget {
            query_addr: SocketAddr::new(loopback_ip, endpoint.query_port),
            endpoint,
        },
        _ => QueryTarget::direct(endpoint),
    }
}

/// Probe every endpoint. Results arrive in completion order; failures are
/// counted and dropped, never propagated.
pub async fn poll_all(endpoints: Vec<Endpoint>, public_ip: Option<IpAddr>, opts: &PollOptions) -> PollOutcome {
    let attempted = endpoints.len();
    let sem = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let pacer = LaunchPacer::new(opts.qps).map(Arc::new);
    let (tx, mut rx) = mpsc::channel::<(Endpoint, Result<Snapshot, ProbeError>)>(attempted.max(1));

    for endpoint in endpoints {
        let target = query_target(endpoint, public_ip, opts.loopback_ip);
        let tx = tx.clone();
        let sem = sem.clone();
        let pacer = pacer.clone();
        let timeout_ms = opts.timeout_ms;
        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else { return };
            if let Some(p) = pacer {
                p.wait().await;
            }
            let res = query_server(&target, timeout_ms).await;
            let _ = tx.send((endpoint, res)).await;
        });
    }
    drop(tx);

    let mut outcome = PollOutcome { attempted, ..PollOutcome::default() };
    while let Some((endpoint, res)) = rx.recv().await {
        match res {
            Ok(snap) => outcome.snapshots.push(snap),
            Err(e) => debug!(%endpoint, error = %e, "probe failed"),
        }
    }
    // a probe task that died without reporting still counts as a failure
    outcome.failed = attempted - outcome.snapshots.len();
    info!(
        attempted,
        answered = outcome.server_count(),
        failed = outcome.failed,
        players = outcome.player_total(),
        "poll complete"
    );
    outcome
}
