use anyhow::{Context, Result};
use census_engine::{apply_cycle, CycleLease};
use census_store::Db;
use operator_label::PatternTable;
use std::time::Instant;

use crate::config::Config;

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub fn labeler(cfg: &Config) -> Result<PatternTable> {
    PatternTable::new(cfg.operators.patterns.iter().map(|p| (p.pattern.as_str(), p.label.clone())))
        .context("compiling operator patterns")
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().context("building tokio runtime")
}

/// One census cycle: lease, directory lookup, poll, reconcile, release.
pub fn run(cfg: &Config) -> Result<()> {
    let db = Db::open_or_create(&cfg.database.path)?;
    let labeler = labeler(cfg)?;
    let Some(lease) = CycleLease::acquire(&db, unix_now(), cfg.lease.ttl)? else {
        tracing::warn!("another cycle holds the lease; skipping");
        return Ok(());
    };
    let started = Instant::now();

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let endpoints = directory::fetch_endpoints(&cfg.directory_options()).await.context("directory lookup")?;
        let public_ip = match cfg.public_ip_options() {
            Some(opts) => directory::public_ip(&opts).await,
            None => None,
        };
        tracing::info!(endpoints = endpoints.len(), public_ip = ?public_ip, "polling");
        anyhow::Ok(poller::poll_all(endpoints, public_ip, &cfg.poll_options()).await)
    })?;

    let report = apply_cycle(&db, &outcome, unix_now(), &cfg.settings(), &labeler)?;
    drop(lease);
    tracing::info!(
        servers = outcome.server_count(),
        players = outcome.player_total(),
        failed = outcome.failed,
        created = report.created,
        relocated = report.relocated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "cycle complete"
    );
    Ok(())
}
