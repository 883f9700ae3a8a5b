use crate::schema::MIG_0001_INIT;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::time::Duration;

pub struct Db {
    pub conn: Connection,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
        tracing::debug!(journal_mode = %mode, "database opened");
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // a second process holding the write lock waits instead of failing fast
    conn.busy_timeout(Duration::from_secs(30))?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    // naive: if servers table doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='servers'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT).context("applying initial schema")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_keeps_schema_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.db");
        {
            let db = Db::open_or_create(&path).unwrap();
            db.conn.execute("INSERT INTO maps(name) VALUES ('KF-Outpost')", []).unwrap();
        }
        let db = Db::open_or_create(&path).unwrap();
        let n: i64 = db.conn.query_row("SELECT COUNT(*) FROM maps", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
        assert!(db.table_exists("rollup_traffic_daily").unwrap());
    }
}
