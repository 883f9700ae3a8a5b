use anyhow::Result;
use census_core::{Endpoint, Snapshot};
use census_store::{Db, MapId, NewServer, ServerId, ServerRow, Timestamp};
use std::collections::HashSet;

use crate::new_epoch;

/// Names too common to identify one server. Compared after trimming and
/// lowercasing.
const GENERIC_NAMES: &[&str] = &[
    "killing floor 2 server",
    "kf2 server",
    "kf2",
    "killing floor 2",
    "server",
    "dedicated server",
    "public server",
    "survival",
    "endless",
    "hard",
    "suicidal",
    "hoe",
    "hell on earth",
    "gameservers.com",
    "linuxgsm",
    "nitrado.net",
    "kf2 server endless",
    "kf2 server hard and long",
    "kf2 server long and hard",
    "kf2 server the zone",
    "kf2 server very hard and long",
    "mgga make gaming great again",
];

/// True when `name` must never be used to match a server across addresses.
pub fn is_generic_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.chars().count() < 4 || trimmed.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    GENERIC_NAMES.contains(&lower.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Address already on record.
    Known,
    /// Matched by name and moved from the given address.
    Relocated { from: String },
    /// A name match existed but its new address was taken.
    Collided,
    Created,
}

/// A server entity confirmed for one snapshot, with the lifecycle state it
/// carried before this cycle.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub server_id: ServerId,
    pub map_id: Option<MapId>,
    pub map_start: Timestamp,
    pub session_epoch: String,
    pub game_port: Option<u16>,
    pub resolution: Resolution,
}

impl Resolved {
    fn from_row(row: ServerRow, resolution: Resolution) -> Self {
        Resolved {
            server_id: row.id,
            map_id: row.current_map_id,
            map_start: row.map_start,
            session_epoch: row.session_epoch,
            game_port: row.game_port,
            resolution,
        }
    }
}

/// Per-cycle identity resolution. Remembers which entities this cycle has
/// already claimed so one entity never absorbs two snapshots.
#[derive(Debug, Default)]
pub struct Resolver {
    claimed: HashSet<ServerId>,
    polled: HashSet<(String, u16)>,
}

impl Resolver {
    /// `polled` is every address answering this cycle. A name match still
    /// answering at its own address has not moved.
    pub fn new<'a>(polled: impl IntoIterator<Item = &'a Endpoint>) -> Self {
        Resolver {
            claimed: HashSet::new(),
            polled: polled.into_iter().map(|e| (e.ip.to_string(), e.query_port)).collect(),
        }
    }

    pub fn resolve(
        &mut self,
        db: &Db,
        snap: &Snapshot,
        map_id: MapId,
        now: Timestamp,
        operator_name: &str,
        location: &str,
    ) -> Result<Resolved> {
        let ip = snap.endpoint.ip.to_string();
        let qport = snap.endpoint.query_port;

        if let Some(row) = db.server_by_address(&ip, qport)? {
            self.claimed.insert(row.id);
            return Ok(Resolved::from_row(row, Resolution::Known));
        }

        let mut collided = false;
        if let Some(row) = self.relocation_candidate(db, &snap.name)? {
            let from = format!("{}:{}", row.ip_address, row.query_port);
            if db.relocate_server(row.id, &ip, qport)? {
                tracing::info!(server = %snap.name, %from, to = %snap.endpoint, "server relocated");
                self.claimed.insert(row.id);
                return Ok(Resolved::from_row(row, Resolution::Relocated { from }));
            }
            tracing::warn!(server = %snap.name, %from, to = %snap.endpoint, "relocation target address taken; creating new server");
            collided = true;
        }

        let epoch = new_epoch();
        let server_id = db.insert_server(&NewServer {
            ip_address: &ip,
            query_port: qport,
            game_port: snap.game_port,
            name: &snap.name,
            map_id,
            seen_at: now,
            session_epoch: &epoch,
            operator_name,
            location,
        })?;
        tracing::debug!(server = %snap.name, endpoint = %snap.endpoint, server_id, "new server");
        self.claimed.insert(server_id);
        Ok(Resolved {
            server_id,
            map_id: Some(map_id),
            map_start: now,
            session_epoch: epoch,
            game_port: snap.game_port,
            resolution: if collided { Resolution::Collided } else { Resolution::Created },
        })
    }

    fn relocation_candidate(&self, db: &Db, name: &str) -> Result<Option<ServerRow>> {
        if is_generic_name(name) {
            return Ok(None);
        }
        let mut candidates = db.servers_named(name)?;
        if candidates.len() != 1 {
            return Ok(None);
        }
        let row = candidates.remove(0);
        if self.claimed.contains(&row.id) || self.polled.contains(&(row.ip_address.clone(), row.query_port)) {
            return Ok(None);
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(addr: &str, name: &str) -> Snapshot {
        Snapshot {
            endpoint: addr.parse().unwrap(),
            name: name.into(),
            map: "KF-Outpost".into(),
            player_count: 0,
            game_port: None,
            players: vec![],
        }
    }

    fn seed(db: &Db, addr: &str, name: &str) -> ServerId {
        let e: Endpoint = addr.parse().unwrap();
        let map = db.intern_map("KF-Outpost").unwrap();
        db.insert_server(&NewServer {
            ip_address: &e.ip.to_string(),
            query_port: e.query_port,
            game_port: None,
            name,
            map_id: map,
            seen_at: 100,
            session_epoch: "seed",
            operator_name: "Unknown",
            location: "Unknown",
        })
        .unwrap()
    }

    #[test]
    fn generic_names() {
        for name in ["server", "  Server ", "KF2", "abc", "12345", "Hell On Earth", "linuxgsm"] {
            assert!(is_generic_name(name), "{name}");
        }
        for name in ["Cyxc-Alpha-17", "Night Owls Endless", "abcd"] {
            assert!(!is_generic_name(name), "{name}");
        }
    }

    #[test]
    fn known_address_wins() {
        let db = Db::open_in_memory().unwrap();
        let id = seed(&db, "10.0.0.1:27015", "Cyxc-Alpha-17");
        let s = snap("10.0.0.1:27015", "Renamed");
        let mut r = Resolver::new([&s.endpoint]);
        let got = r.resolve(&db, &s, 1, 200, "Unknown", "Unknown").unwrap();
        assert_eq!((got.server_id, got.resolution), (id, Resolution::Known));
        assert_eq!(got.map_start, 100);
    }

    #[test]
    fn unique_name_relocates_once_per_cycle() {
        let db = Db::open_in_memory().unwrap();
        let id = seed(&db, "10.0.0.1:27015", "Cyxc-Alpha-17");

        let moved = snap("10.0.0.9:27015", "Cyxc-Alpha-17");
        let twin = snap("10.0.0.10:27015", "Cyxc-Alpha-17");
        let mut r = Resolver::new([&moved.endpoint, &twin.endpoint]);

        let got = r.resolve(&db, &moved, 1, 200, "Unknown", "Unknown").unwrap();
        assert_eq!(got.server_id, id);
        assert_eq!(got.resolution, Resolution::Relocated { from: "10.0.0.1:27015".into() });
        assert!(db.server_by_address("10.0.0.9", 27015).unwrap().is_some());

        let second = r.resolve(&db, &twin, 1, 200, "Unknown", "Unknown").unwrap();
        assert_ne!(second.server_id, id);
        assert_eq!(second.resolution, Resolution::Created);
    }

    #[test]
    fn name_match_still_answering_is_not_moved() {
        let db = Db::open_in_memory().unwrap();
        let id = seed(&db, "10.0.0.1:27015", "Cyxc-Alpha-17");
        let copy = snap("10.0.0.2:27015", "Cyxc-Alpha-17");
        let original = snap("10.0.0.1:27015", "Cyxc-Alpha-17");
        let mut r = Resolver::new([&copy.endpoint, &original.endpoint]);

        let got = r.resolve(&db, &copy, 1, 200, "Unknown", "Unknown").unwrap();
        assert_ne!(got.server_id, id);
        let again = r.resolve(&db, &original, 1, 200, "Unknown", "Unknown").unwrap();
        assert_eq!((again.server_id, again.resolution), (id, Resolution::Known));
    }

    #[test]
    fn ambiguous_or_generic_names_never_merge() {
        let db = Db::open_in_memory().unwrap();
        seed(&db, "10.0.0.1:27015", "server");
        let s = snap("10.0.0.5:27015", "server");
        let got = Resolver::new([&s.endpoint]).resolve(&db, &s, 1, 200, "Unknown", "Unknown").unwrap();
        assert_eq!(got.resolution, Resolution::Created);

        seed(&db, "10.0.0.2:27015", "Night Owls");
        seed(&db, "10.0.0.3:27015", "Night Owls");
        let s = snap("10.0.0.6:27015", "Night Owls");
        let got = Resolver::new([&s.endpoint]).resolve(&db, &s, 1, 200, "Unknown", "Unknown").unwrap();
        assert_eq!(got.resolution, Resolution::Created);
        assert_eq!(db.servers().unwrap().len(), 5);
    }
}
