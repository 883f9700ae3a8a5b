use anyhow::Result;
use census_core::Snapshot;
use census_store::{Db, EndReason, MapId, MatchEnd, PlayerObservation, ServerState, Timestamp};

use crate::{new_epoch, Interner, ReconcileSettings, Resolved};

/// Ownership and location labels written onto the server row.
#[derive(Debug, Clone)]
pub struct Labels {
    pub operator_name: String,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continued,
    MapRotation,
    MatchRestart,
}

/// Advance one server's match lifecycle with a fresh snapshot and upsert the
/// sessions of every player it reports.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    db: &Db,
    interner: &mut Interner,
    snap: &Snapshot,
    resolved: &Resolved,
    map_id: MapId,
    now: Timestamp,
    settings: &ReconcileSettings,
    labels: &Labels,
) -> Result<Transition> {
    let server_id = resolved.server_id;

    let transition = if resolved.map_id != Some(map_id) {
        Transition::MapRotation
    } else {
        // scores must be read before this cycle's upserts overwrite them
        let prior = db.active_score_total(server_id)?;
        let current = snap.score_total();
        if settings.is_restart(prior, current) {
            tracing::info!(server = %snap.name, prior, current, "match restart detected");
            Transition::MatchRestart
        } else {
            Transition::Continued
        }
    };

    let (map_start, epoch) = match transition {
        Transition::Continued => (resolved.map_start, resolved.session_epoch.clone()),
        Transition::MapRotation | Transition::MatchRestart => {
            let reason = if transition == Transition::MapRotation { EndReason::MapRotation } else { EndReason::MatchRestart };
            db.insert_server_history(&MatchEnd {
                server_id,
                map_id: resolved.map_id,
                started: resolved.map_start,
                ended: now,
                reason,
                session_epoch: &resolved.session_epoch,
            })?;
            (now, new_epoch())
        }
    };

    db.update_server_state(
        server_id,
        &ServerState {
            name: &snap.name,
            map_id,
            player_count: snap.player_count as i64,
            map_start,
            last_seen: now,
            game_port: snap.game_port.or(resolved.game_port),
            session_epoch: &epoch,
            operator_name: &labels.operator_name,
            location: &labels.location,
        },
    )?;

    for p in &snap.players {
        let player_id = interner.player_id(db, &p.name)?;
        db.upsert_active_session(&PlayerObservation {
            server_id,
            player_id,
            map_id,
            score: p.score,
            reported_duration: p.duration,
            seen_at: now,
            session_epoch: &epoch,
        })?;
    }

    Ok(transition)
}
