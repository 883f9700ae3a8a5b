use crate::{Db, NewServer, ServerId, ServerRow, ServerState};
use anyhow::Result;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use std::net::Ipv4Addr;

const SERVER_COLUMNS: &str = "id, ip_address, query_port, game_port, name, current_map_id, player_count, map_start, last_seen, session_epoch, operator_name, location";

fn server_from_row(r: &Row) -> rusqlite::Result<ServerRow> {
    Ok(ServerRow {
        id: r.get(0)?,
        ip_address: r.get(1)?,
        query_port: r.get(2)?,
        game_port: r.get(3)?,
        name: r.get(4)?,
        current_map_id: r.get(5)?,
        player_count: r.get(6)?,
        map_start: r.get(7)?,
        last_seen: r.get(8)?,
        session_epoch: r.get(9)?,
        operator_name: r.get(10)?,
        location: r.get(11)?,
    })
}

impl Db {
    pub fn servers(&self) -> Result<Vec<ServerRow>> {
        let mut stmt = self.conn.prepare(&format!("SELECT {SERVER_COLUMNS} FROM servers ORDER BY id"))?;
        let rows = stmt.query_map([], server_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn server(&self, id: ServerId) -> Result<Option<ServerRow>> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id=?");
        Ok(self.conn.query_row(&sql, [id], server_from_row).optional()?)
    }

    pub fn server_by_address(&self, ip: &str, query_port: u16) -> Result<Option<ServerRow>> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE ip_address=? AND query_port=?");
        Ok(self.conn.query_row(&sql, params![ip, query_port], server_from_row).optional()?)
    }

    pub fn servers_named(&self, name: &str) -> Result<Vec<ServerRow>> {
        let mut stmt = self.conn.prepare_cached(&format!("SELECT {SERVER_COLUMNS} FROM servers WHERE name=? ORDER BY id"))?;
        let rows = stmt.query_map([name], server_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert a server unless its address is already taken, then return the
    /// id owning that address.
    pub fn insert_server(&self, s: &NewServer) -> Result<ServerId> {
        self.conn.execute(
            "INSERT INTO servers(ip_address,query_port,game_port,name,current_map_id,player_count,map_start,last_seen,session_epoch,operator_name,location)
             VALUES (?,?,?,?,?,0,?,?,?,?,?)
             ON CONFLICT(ip_address,query_port) DO NOTHING",
            params![s.ip_address, s.query_port, s.game_port, s.name, s.map_id, s.seen_at, s.seen_at, s.session_epoch, s.operator_name, s.location],
        )?;
        let id: ServerId = self.conn.query_row(
            "SELECT id FROM servers WHERE ip_address=? AND query_port=?",
            params![s.ip_address, s.query_port],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Move a server to a new address. Returns `false` when the address
    /// already belongs to another server.
    pub fn relocate_server(&self, id: ServerId, ip: &str, query_port: u16) -> Result<bool> {
        match self.conn.execute(
            "UPDATE servers SET ip_address=?, query_port=? WHERE id=?",
            params![ip, query_port, id],
        ) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_server_state(&self, id: ServerId, s: &ServerState) -> Result<()> {
        self.conn.execute(
            "UPDATE servers SET name=?, current_map_id=?, player_count=?, map_start=?, last_seen=?, game_port=?, session_epoch=?, operator_name=?, location=?
             WHERE id=?",
            params![s.name, s.map_id, s.player_count, s.map_start, s.last_seen, s.game_port, s.session_epoch, s.operator_name, s.location, id],
        )?;
        Ok(())
    }

    /// Location label for an address from the imported `ip_ranges` table.
    /// Only IPv4 ranges are known; anything unresolvable is "Unknown".
    pub fn locate(&self, ip: &str) -> Result<String> {
        let Ok(v4) = ip.parse::<Ipv4Addr>() else { return Ok("Unknown".into()) };
        let mut stmt = self.conn.prepare_cached(
            "SELECT city_name, country_code FROM ip_ranges WHERE ip_to >= ? AND ip_from <= ? ORDER BY ip_to ASC LIMIT 1",
        )?;
        let n = u32::from(v4) as i64;
        let hit: Option<(Option<String>, Option<String>)> =
            stmt.query_row([n, n], |r| Ok((r.get(0)?, r.get(1)?))).optional()?;
        Ok(match hit {
            Some((Some(city), Some(cc))) if !city.is_empty() && !cc.is_empty() => format!("{city}, {cc}"),
            Some((_, Some(cc))) if !cc.is_empty() => cc,
            _ => "Unknown".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapId;

    fn new_server<'a>(ip: &'a str, name: &'a str, map_id: MapId) -> NewServer<'a> {
        NewServer {
            ip_address: ip,
            query_port: 27015,
            game_port: Some(7777),
            name,
            map_id,
            seen_at: 1_000,
            session_epoch: "epoch-a",
            operator_name: "Unknown",
            location: "Unknown",
        }
    }

    #[test]
    fn insert_is_idempotent_per_address() {
        let db = Db::open_in_memory().unwrap();
        let map = db.intern_map("KF-Outpost").unwrap();
        let a = db.insert_server(&new_server("10.0.0.1", "alpha", map)).unwrap();
        let again = db.insert_server(&new_server("10.0.0.1", "renamed", map)).unwrap();
        assert_eq!(a, again);
        let row = db.server(a).unwrap().unwrap();
        assert_eq!(row.name, "alpha");
        assert_eq!(row.player_count, 0);
        assert_eq!(row.game_port, Some(7777));
    }

    #[test]
    fn relocation_conflict_is_reported_not_raised() {
        let db = Db::open_in_memory().unwrap();
        let map = db.intern_map("KF-Outpost").unwrap();
        let a = db.insert_server(&new_server("10.0.0.1", "alpha", map)).unwrap();
        db.insert_server(&new_server("10.0.0.2", "bravo", map)).unwrap();

        assert!(!db.relocate_server(a, "10.0.0.2", 27015).unwrap());
        assert_eq!(db.server(a).unwrap().unwrap().ip_address, "10.0.0.1");

        assert!(db.relocate_server(a, "10.0.0.3", 27015).unwrap());
        assert!(db.server_by_address("10.0.0.3", 27015).unwrap().is_some());
    }

    #[test]
    fn locate_uses_ip_ranges() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.locate("10.0.0.1").unwrap(), "Unknown");
        let lo = u32::from(Ipv4Addr::new(10, 0, 0, 0)) as i64;
        let hi = u32::from(Ipv4Addr::new(10, 0, 0, 255)) as i64;
        db.conn
            .execute("INSERT INTO ip_ranges(ip_from, ip_to, city_name, country_code) VALUES (?,?,?,?)", params![lo, hi, "Berlin", "DE"])
            .unwrap();
        assert_eq!(db.locate("10.0.0.1").unwrap(), "Berlin, DE");
        assert_eq!(db.locate("10.0.1.1").unwrap(), "Unknown");
        assert_eq!(db.locate("::1").unwrap(), "Unknown");
    }
}
