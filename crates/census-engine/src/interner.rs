use anyhow::Result;
use census_store::{Db, MapId, PlayerId};
use std::collections::HashMap;

/// Name to id lookups for maps and players, owned by a single cycle.
///
/// Loaded from the store when the cycle starts and dropped with it, so ids
/// written by anything else between cycles are always picked up.
#[derive(Debug, Default)]
pub struct Interner {
    maps: HashMap<String, MapId>,
    players: HashMap<String, PlayerId>,
}

impl Interner {
    pub fn load(db: &Db) -> Result<Self> {
        Ok(Interner { maps: db.map_ids()?, players: db.player_ids()? })
    }

    pub fn map_id(&mut self, db: &Db, name: &str) -> Result<MapId> {
        if let Some(id) = self.maps.get(name) {
            return Ok(*id);
        }
        let id = db.intern_map(name)?;
        self.maps.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn player_id(&mut self, db: &Db, name: &str) -> Result<PlayerId> {
        if let Some(id) = self.players.get(name) {
            return Ok(*id);
        }
        let id = db.intern_player(name)?;
        self.players.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn sizes(&self) -> (usize, usize) {
        (self.maps.len(), self.players.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_up_rows_written_before_load() {
        let db = Db::open_in_memory().unwrap();
        let existing = db.intern_map("KF-Outpost").unwrap();
        let mut interner = Interner::load(&db).unwrap();
        assert_eq!(interner.sizes(), (1, 0));
        assert_eq!(interner.map_id(&db, "KF-Outpost").unwrap(), existing);

        let alice = interner.player_id(&db, "Alice").unwrap();
        assert_eq!(interner.player_id(&db, "Alice").unwrap(), alice);
        assert_eq!(db.player_ids().unwrap().len(), 1);
    }
}
