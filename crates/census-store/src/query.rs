use crate::Db;
use anyhow::Result;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        Ok(self.conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_schema_tables() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.count_rows("session_history").unwrap(), 0);
        assert!(db.table_exists("cycle_lease").unwrap());
        assert!(!db.table_exists("ports").unwrap());
    }
}
