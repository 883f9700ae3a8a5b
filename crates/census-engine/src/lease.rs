use anyhow::Result;
use census_store::{Db, Timestamp};
use std::time::Duration;

/// Holds the store's single cycle lease until dropped.
pub struct CycleLease<'a> {
    db: &'a Db,
    holder: String,
}

impl<'a> CycleLease<'a> {
    /// `None` while another live cycle holds the lease. A lease older than
    /// `ttl` is taken over.
    pub fn acquire(db: &'a Db, now: Timestamp, ttl: Duration) -> Result<Option<Self>> {
        let holder = crate::new_epoch();
        if !db.acquire_lease(&holder, now, now + ttl.as_secs() as i64)? {
            return Ok(None);
        }
        tracing::debug!(%holder, "cycle lease acquired");
        Ok(Some(CycleLease { db, holder }))
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for CycleLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.db.release_lease(&self.holder) {
            tracing::warn!(holder = %self.holder, error = %e, "failed to release cycle lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_cycle_is_refused() {
        let db = Db::open_in_memory().unwrap();
        let ttl = Duration::from_secs(600);
        let first = CycleLease::acquire(&db, 1_000, ttl).unwrap().unwrap();
        assert!(CycleLease::acquire(&db, 1_100, ttl).unwrap().is_none());
        // a crashed holder's lease expires
        assert!(CycleLease::acquire(&db, 1_600, ttl).unwrap().is_some());
        drop(first);
        assert!(CycleLease::acquire(&db, 1_700, ttl).unwrap().is_some());
    }
}
