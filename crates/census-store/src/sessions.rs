use crate::{
    ActiveSessionRow, Db, GlobalStatsRow, MapId, MatchEnd, PlayerId, PlayerObservation, ServerHistoryRow, ServerId,
    SessionHistoryRow, Timestamp,
};
use anyhow::Result;
use rusqlite::{params, Row};
use std::collections::HashMap;

impl Db {
    pub fn map_ids(&self) -> Result<HashMap<String, MapId>> {
        self.name_ids("SELECT name, id FROM maps")
    }

    pub fn player_ids(&self) -> Result<HashMap<String, PlayerId>> {
        self.name_ids("SELECT name, id FROM players")
    }

    fn name_ids(&self, sql: &str) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    /// Id for a map name, creating the row on first reference.
    pub fn intern_map(&self, name: &str) -> Result<MapId> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO maps(name) VALUES (?) ON CONFLICT(name) DO UPDATE SET name=excluded.name RETURNING id")?;
        Ok(stmt.query_row([name], |r| r.get(0))?)
    }

    /// Id for a player name, creating the row on first reference.
    pub fn intern_player(&self, name: &str) -> Result<PlayerId> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO players(name) VALUES (?) ON CONFLICT(name) DO UPDATE SET name=excluded.name RETURNING id")?;
        Ok(stmt.query_row([name], |r| r.get(0))?)
    }

    /// Record that a player was seen on a server. Re-observations keep the
    /// original first_seen and recompute the elapsed seconds from it. A
    /// non-finite reported duration is stored as 0.
    pub fn upsert_active_session(&self, o: &PlayerObservation) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO active_sessions(server_id,player_id,map_id,score,reported_duration,calculated_duration,first_seen,last_seen,session_epoch)
             VALUES (?1,?2,?3,?4,?5,0,?6,?6,?7)
             ON CONFLICT(server_id,player_id) DO UPDATE SET
                score=excluded.score,
                reported_duration=excluded.reported_duration,
                calculated_duration=excluded.last_seen - active_sessions.first_seen,
                map_id=excluded.map_id,
                last_seen=excluded.last_seen,
                session_epoch=excluded.session_epoch",
        )?;
        let reported = if o.reported_duration.is_finite() { o.reported_duration as f64 } else { 0.0 };
        stmt.execute(params![o.server_id, o.player_id, o.map_id, o.score, reported, o.seen_at, o.session_epoch])?;
        Ok(())
    }

    /// Sum of running scores currently recorded for a server.
    pub fn active_score_total(&self, server_id: ServerId) -> Result<i64> {
        let mut stmt = self.conn.prepare_cached("SELECT COALESCE(SUM(score), 0) FROM active_sessions WHERE server_id=?")?;
        Ok(stmt.query_row([server_id], |r| r.get(0))?)
    }

    /// Move sessions last seen before `cutoff` into history. Returns how many moved.
    pub fn archive_stale_sessions(&self, cutoff: Timestamp) -> Result<usize> {
        self.conn.execute(
            "INSERT INTO session_history(server_id,player_id,map_id,final_score,reported_duration,session_start,session_end,session_epoch,calculated_duration)
             SELECT server_id, player_id, map_id, score, reported_duration, first_seen, last_seen, session_epoch, calculated_duration
             FROM active_sessions
             WHERE last_seen < ?
             ORDER BY first_seen, server_id, player_id",
            [cutoff],
        )?;
        Ok(self.conn.execute("DELETE FROM active_sessions WHERE last_seen < ?", [cutoff])?)
    }

    /// Close out servers that still claim players but have not answered since
    /// `cutoff`, then mark them empty so the same loss is recorded only once.
    pub fn archive_lost_servers(&self, cutoff: Timestamp, now: Timestamp) -> Result<usize> {
        self.conn.execute(
            "INSERT INTO server_history(server_id,map_id,session_start,session_end,calculated_duration,reason,session_epoch)
             SELECT id, current_map_id, map_start, last_seen, MAX(0, last_seen - map_start), 'connection_lost', session_epoch
             FROM servers
             WHERE last_seen < ? AND player_count > 0
             ORDER BY id",
            [cutoff],
        )?;
        Ok(self.conn.execute(
            "UPDATE servers SET player_count=0, map_start=? WHERE last_seen < ? AND player_count > 0",
            params![now, cutoff],
        )?)
    }

    pub fn insert_server_history(&self, e: &MatchEnd) -> Result<()> {
        self.conn.execute(
            "INSERT INTO server_history(server_id,map_id,session_start,session_end,calculated_duration,reason,session_epoch)
             VALUES (?,?,?,?,?,?,?)",
            params![e.server_id, e.map_id, e.started, e.ended, (e.ended - e.started).max(0), e.reason, e.session_epoch],
        )?;
        Ok(())
    }

    pub fn insert_global_stats(&self, s: &GlobalStatsRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO global_stats(scan_time,active_servers,active_players) VALUES (?,?,?)",
            params![s.scan_time, s.active_servers, s.active_players],
        )?;
        Ok(())
    }

    pub fn active_sessions(&self, server_id: ServerId) -> Result<Vec<ActiveSessionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT server_id,player_id,map_id,score,reported_duration,calculated_duration,first_seen,last_seen,session_epoch
             FROM active_sessions WHERE server_id=? ORDER BY player_id",
        )?;
        let rows = stmt.query_map([server_id], |r| {
            Ok(ActiveSessionRow {
                server_id: r.get(0)?,
                player_id: r.get(1)?,
                map_id: r.get(2)?,
                score: r.get(3)?,
                reported_duration: r.get(4)?,
                calculated_duration: r.get(5)?,
                first_seen: r.get(6)?,
                last_seen: r.get(7)?,
                session_epoch: r.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn session_history(&self) -> Result<Vec<SessionHistoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id,server_id,player_id,map_id,final_score,reported_duration,session_start,session_end,session_epoch,calculated_duration
             FROM session_history ORDER BY id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(SessionHistoryRow {
                id: r.get(0)?,
                server_id: r.get(1)?,
                player_id: r.get(2)?,
                map_id: r.get(3)?,
                final_score: r.get(4)?,
                reported_duration: r.get(5)?,
                session_start: r.get(6)?,
                session_end: r.get(7)?,
                session_epoch: r.get(8)?,
                calculated_duration: r.get(9)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn server_history(&self, server_id: ServerId) -> Result<Vec<ServerHistoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id,server_id,map_id,session_start,session_end,calculated_duration,reason,session_epoch
             FROM server_history WHERE server_id=? ORDER BY id",
        )?;
        let rows = stmt.query_map([server_id], server_history_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn global_stats(&self) -> Result<Vec<GlobalStatsRow>> {
        let mut stmt = self.conn.prepare("SELECT scan_time,active_servers,active_players FROM global_stats ORDER BY id")?;
        let rows = stmt.query_map([], |r| {
            Ok(GlobalStatsRow { scan_time: r.get(0)?, active_servers: r.get(1)?, active_players: r.get(2)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn server_history_from_row(r: &Row) -> rusqlite::Result<ServerHistoryRow> {
    Ok(ServerHistoryRow {
        id: r.get(0)?,
        server_id: r.get(1)?,
        map_id: r.get(2)?,
        session_start: r.get(3)?,
        session_end: r.get(4)?,
        calculated_duration: r.get(5)?,
        reason: r.get(6)?,
        session_epoch: r.get(7)?,
    })
}
