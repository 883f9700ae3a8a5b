use anyhow::Result;
use census_store::{Db, Timestamp};

use crate::ReconcileSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub sessions_archived: usize,
    pub servers_lost: usize,
}

/// Archive sessions nobody has seen within the staleness window, then close
/// out servers silent past the connection-lost window.
pub fn prune(db: &Db, now: Timestamp, settings: &ReconcileSettings) -> Result<PruneReport> {
    let stale_cutoff = now - settings.session_stale_after.as_secs() as i64;
    let lost_cutoff = now - settings.server_lost_after.as_secs() as i64;
    let report = PruneReport {
        sessions_archived: db.archive_stale_sessions(stale_cutoff)?,
        servers_lost: db.archive_lost_servers(lost_cutoff, now)?,
    };
    if report.servers_lost > 0 {
        tracing::info!(servers = report.servers_lost, "servers marked connection_lost");
    }
    tracing::debug!(sessions = report.sessions_archived, "stale sessions archived");
    Ok(report)
}
