use crate::{DayRange, Db, DimensionDaily, OperatorDaily, TrafficDaily};
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

// Each rebuild takes (?1, ?2) = (first day, last day); both NULL means every day.
const DAY_FILTER: &str = "(?1 IS NULL OR day BETWEEN ?1 AND ?2)";

// Rollup inserts end with `WHERE {DAY_FILTER} GROUP BY ...`, spliced in at rebuild time.

const OPERATOR_DAILY: &str = "
    INSERT INTO rollup_operator_daily (day, operator_name, server_count, unique_players, total_playtime_seconds, last_contact)
    SELECT day, operator_name, COUNT(DISTINCT server_id), COUNT(DISTINCT player_id), COALESCE(SUM(calculated_duration), 0), MAX(session_end)
    FROM (
        SELECT date(h.session_start, 'unixepoch') AS day, s.operator_name, h.server_id, h.player_id, h.calculated_duration, h.session_end
        FROM session_history h
        JOIN servers s ON h.server_id = s.id
        WHERE s.operator_name IS NOT NULL AND s.operator_name != 'Unknown'
    )
    WHERE {DAY_FILTER}
    GROUP BY day, operator_name";

const MAP_DAILY: &str = "
    INSERT INTO rollup_map_daily (day, map_id, session_count, total_seconds)
    SELECT day, map_id, COUNT(*), COALESCE(SUM(calculated_duration), 0)
    FROM (SELECT date(session_start, 'unixepoch') AS day, map_id, calculated_duration FROM server_history WHERE map_id IS NOT NULL)
    WHERE {DAY_FILTER}
    GROUP BY day, map_id";

const SERVER_DAILY: &str = "
    INSERT INTO rollup_server_daily (day, server_id, session_count, total_seconds)
    SELECT day, server_id, COUNT(*), COALESCE(SUM(calculated_duration), 0)
    FROM (SELECT date(session_start, 'unixepoch') AS day, server_id, calculated_duration FROM session_history)
    WHERE {DAY_FILTER}
    GROUP BY day, server_id";

const PLAYER_DAILY: &str = "
    INSERT INTO rollup_player_daily (day, player_id, session_count, total_seconds)
    SELECT day, player_id, COUNT(*), COALESCE(SUM(calculated_duration), 0)
    FROM (SELECT date(session_start, 'unixepoch') AS day, player_id, calculated_duration FROM session_history)
    WHERE {DAY_FILTER}
    GROUP BY day, player_id";

const TRAFFIC_DAILY: &str = "
    INSERT INTO rollup_traffic_daily (day, unique_players)
    SELECT day, COUNT(DISTINCT player_id)
    FROM (SELECT date(session_start, 'unixepoch') AS day, player_id FROM session_history)
    WHERE {DAY_FILTER}
    GROUP BY day";

const ROLLUPS: [(&str, &str); 5] = [
    ("rollup_operator_daily", OPERATOR_DAILY),
    ("rollup_map_daily", MAP_DAILY),
    ("rollup_server_daily", SERVER_DAILY),
    ("rollup_player_daily", PLAYER_DAILY),
    ("rollup_traffic_daily", TRAFFIC_DAILY),
];

impl Db {
    /// Delete and re-derive every rollup table for `range`, or for all days
    /// when `range` is `None`. Never merges into existing rows.
    pub fn rebuild_rollups(&self, range: Option<&DayRange>) -> Result<()> {
        let (first, last) = match range {
            Some(r) => (Some(r.first.as_str()), Some(r.last.as_str())),
            None => (None, None),
        };
        for (table, insert) in ROLLUPS {
            self.conn.execute(&format!("DELETE FROM {table} WHERE {DAY_FILTER}"), params![first, last])?;
            self.conn.execute(&insert.replace("{DAY_FILTER}", DAY_FILTER), params![first, last])?;
        }
        Ok(())
    }

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn.query_row("SELECT value FROM meta_kv WHERE key=?", [key], |r| r.get(0)).optional()?)
    }

    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta_kv(key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn operator_daily(&self) -> Result<Vec<OperatorDaily>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, operator_name, server_count, unique_players, total_playtime_seconds, last_contact
             FROM rollup_operator_daily ORDER BY day, operator_name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(OperatorDaily {
                day: r.get(0)?,
                operator_name: r.get(1)?,
                server_count: r.get(2)?,
                unique_players: r.get(3)?,
                total_playtime_seconds: r.get(4)?,
                last_contact: r.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn map_daily(&self) -> Result<Vec<DimensionDaily>> {
        self.dimension_daily("rollup_map_daily", "map_id")
    }

    pub fn server_daily(&self) -> Result<Vec<DimensionDaily>> {
        self.dimension_daily("rollup_server_daily", "server_id")
    }

    pub fn player_daily(&self) -> Result<Vec<DimensionDaily>> {
        self.dimension_daily("rollup_player_daily", "player_id")
    }

    fn dimension_daily(&self, table: &str, key: &str) -> Result<Vec<DimensionDaily>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT day, {key}, session_count, total_seconds FROM {table} ORDER BY day, {key}"))?;
        let rows = stmt.query_map([], |r| {
            Ok(DimensionDaily { day: r.get(0)?, key: r.get(1)?, session_count: r.get(2)?, total_seconds: r.get(3)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn traffic_daily(&self) -> Result<Vec<TrafficDaily>> {
        let mut stmt = self.conn.prepare("SELECT day, unique_players FROM rollup_traffic_daily ORDER BY day")?;
        let rows = stmt.query_map([], |r| Ok(TrafficDaily { day: r.get(0)?, unique_players: r.get(1)? }))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-03-01 00:00:00 UTC
    const DAY0: i64 = 1_772_323_200;

    fn history(db: &Db) {
        db.conn
            .execute_batch(&format!(
                "INSERT INTO maps(id, name) VALUES (1, 'KF-Outpost');
                 INSERT INTO players(id, name) VALUES (1, 'Alice'), (2, 'Bob');
                 INSERT INTO servers(id, ip_address, query_port, name, current_map_id, map_start, last_seen, session_epoch, operator_name)
                     VALUES (1, '10.0.0.1', 27015, 'alpha', 1, 0, 0, 'e', 'Night Owls');
                 INSERT INTO session_history(server_id, player_id, map_id, final_score, reported_duration, session_start, session_end, session_epoch, calculated_duration)
                     VALUES (1, 1, 1, 10, 0, {d0}, {d0} + 600, 'e', 600),
                            (1, 2, 1, 10, 0, {d0} + 60, {d0} + 360, 'e', 300),
                            (1, 1, 1, 10, 0, {d1}, {d1} + 100, 'e', 100);
                 INSERT INTO server_history(server_id, map_id, session_start, session_end, calculated_duration, reason, session_epoch)
                     VALUES (1, 1, {d0}, {d0} + 900, 900, 'map_rotation', 'e');",
                d0 = DAY0,
                d1 = DAY0 + 86_400,
            ))
            .unwrap();
    }

    #[test]
    fn full_rebuild_groups_by_day() {
        let db = Db::open_in_memory().unwrap();
        history(&db);
        db.rebuild_rollups(None).unwrap();

        let ops = db.operator_daily().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].day, "2026-03-01");
        assert_eq!((ops[0].server_count, ops[0].unique_players, ops[0].total_playtime_seconds), (1, 2, 900));
        assert_eq!(ops[0].last_contact, Some(DAY0 + 600));

        let traffic = db.traffic_daily().unwrap();
        assert_eq!(traffic.iter().map(|t| t.unique_players).collect::<Vec<_>>(), vec![2, 1]);

        let maps = db.map_daily().unwrap();
        assert_eq!(maps, vec![DimensionDaily { day: "2026-03-01".into(), key: 1, session_count: 1, total_seconds: 900 }]);

        let players = db.player_daily().unwrap();
        assert_eq!(players.len(), 3);
    }

    #[test]
    fn ranged_rebuild_leaves_other_days_alone() {
        let db = Db::open_in_memory().unwrap();
        history(&db);
        db.rebuild_rollups(None).unwrap();
        // history for day 1 changes; only day 1 is rebuilt
        db.conn.execute("DELETE FROM session_history WHERE session_start >= ?", [DAY0 + 86_400]).unwrap();
        let range = DayRange { first: "2026-03-02".into(), last: "2026-03-02".into() };
        db.rebuild_rollups(Some(&range)).unwrap();

        let servers = db.server_daily().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].day, "2026-03-01");
        assert_eq!(servers[0].total_seconds, 900);
    }

    #[test]
    fn every_insert_uses_the_day_filter() {
        for (table, insert) in ROLLUPS {
            assert_eq!(insert.matches("{DAY_FILTER}").count(), 1, "{table}");
            assert!(!insert.contains("BETWEEN"), "{table}");
        }
    }

    #[test]
    fn meta_roundtrip() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.meta_get("rollups_backfilled").unwrap(), None);
        db.meta_set("rollups_backfilled", "1").unwrap();
        db.meta_set("rollups_backfilled", "2").unwrap();
        assert_eq!(db.meta_get("rollups_backfilled").unwrap().as_deref(), Some("2"));
    }
}
