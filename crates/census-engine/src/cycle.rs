use anyhow::{Context, Result};
use census_core::PollOutcome;
use census_store::{DayRange, Db, GlobalStatsRow, Timestamp};
use operator_label::OperatorLabeler;
use std::collections::HashSet;

use crate::{prune, reconcile, rollup, Interner, Labels, ReconcileSettings, Resolution, Resolver, Transition};

/// What one applied cycle changed.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub applied: usize,
    pub duplicates: usize,
    pub created: usize,
    pub relocated: usize,
    pub collisions: usize,
    pub rotations: usize,
    pub restarts: usize,
    pub sessions_archived: usize,
    pub servers_lost: usize,
    pub backfilled: bool,
    pub refreshed: Option<DayRange>,
}

/// Apply one poll batch to the store as a single transaction: prune, resolve
/// and reconcile every snapshot, sample totals, refresh rollups. Any error
/// rolls the whole cycle back.
pub fn apply_cycle(
    db: &Db,
    outcome: &PollOutcome,
    now: Timestamp,
    settings: &ReconcileSettings,
    labeler: &dyn OperatorLabeler,
) -> Result<CycleReport> {
    let tx = db.conn.unchecked_transaction().context("starting cycle transaction")?;
    let mut report = CycleReport::default();

    let pruned = prune(db, now, settings).context("pruning")?;
    report.sessions_archived = pruned.sessions_archived;
    report.servers_lost = pruned.servers_lost;

    let mut interner = Interner::load(db)?;
    let mut resolver = Resolver::new(outcome.snapshots.iter().map(|s| &s.endpoint));
    let mut seen = HashSet::new();

    for snap in &outcome.snapshots {
        if !seen.insert(snap.endpoint) {
            tracing::warn!(endpoint = %snap.endpoint, "duplicate snapshot in one cycle; skipped");
            report.duplicates += 1;
            continue;
        }
        let ip = snap.endpoint.ip.to_string();
        let labels = Labels { operator_name: labeler.label(&snap.name, &ip), location: db.locate(&ip)? };
        let map_id = interner.map_id(db, &snap.map)?;

        let resolved = resolver
            .resolve(db, snap, map_id, now, &labels.operator_name, &labels.location)
            .with_context(|| format!("resolving {}", snap.endpoint))?;
        match resolved.resolution {
            Resolution::Known => {}
            Resolution::Relocated { .. } => report.relocated += 1,
            Resolution::Collided => {
                report.collisions += 1;
                report.created += 1;
            }
            Resolution::Created => report.created += 1,
        }

        let transition = reconcile(db, &mut interner, snap, &resolved, map_id, now, settings, &labels)
            .with_context(|| format!("reconciling {}", snap.endpoint))?;
        match transition {
            Transition::Continued => {}
            Transition::MapRotation => report.rotations += 1,
            Transition::MatchRestart => report.restarts += 1,
        }
        report.applied += 1;
    }

    db.insert_global_stats(&GlobalStatsRow {
        scan_time: now,
        active_servers: outcome.server_count() as i64,
        active_players: outcome.player_total() as i64,
    })?;

    report.backfilled = rollup::backfill(db, false)?;
    report.refreshed = Some(rollup::refresh_recent(db, now, settings.rollup_window_days)?);

    tx.commit().context("committing cycle")?;
    tracing::info!(
        applied = report.applied,
        created = report.created,
        relocated = report.relocated,
        rotations = report.rotations,
        restarts = report.restarts,
        archived = report.sessions_archived,
        lost = report.servers_lost,
        "cycle committed"
    );
    Ok(report)
}
