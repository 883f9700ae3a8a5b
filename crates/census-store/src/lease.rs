use crate::{Db, Timestamp};
use anyhow::Result;
use rusqlite::params;

impl Db {
    /// Take the single cycle lease for `holder` if it is free or expired.
    /// Returns `false` while another holder's lease is still live.
    pub fn acquire_lease(&self, holder: &str, now: Timestamp, expires_at: Timestamp) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT INTO cycle_lease(id, holder, expires_at) VALUES (1, ?1, ?3)
             ON CONFLICT(id) DO UPDATE SET holder=excluded.holder, expires_at=excluded.expires_at
             WHERE cycle_lease.expires_at <= ?2 OR cycle_lease.holder = ?1",
            params![holder, now, expires_at],
        )?;
        Ok(changed == 1)
    }

    pub fn release_lease(&self, holder: &str) -> Result<()> {
        self.conn.execute("DELETE FROM cycle_lease WHERE holder=?", [holder])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_waits_for_expiry() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.acquire_lease("a", 100, 700).unwrap());
        assert!(!db.acquire_lease("b", 200, 800).unwrap());
        assert!(db.acquire_lease("b", 700, 1_300).unwrap());
        // "a" lost it and cannot release b's lease
        db.release_lease("a").unwrap();
        assert!(!db.acquire_lease("c", 800, 1_400).unwrap());
        db.release_lease("b").unwrap();
        assert!(db.acquire_lease("c", 800, 1_400).unwrap());
    }
}
