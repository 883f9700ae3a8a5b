//! Core types shared by the census engine: endpoints, probe snapshots and the
//! per-endpoint failure taxonomy.

pub mod pacer;

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// An (IP, query port) pair at which a game server answers protocol queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub query_port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, query_port: u16) -> Self {
        Endpoint { ip, query_port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.query_port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = s
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid endpoint {:?}: {}", s, e))?;
        if addr.port() == 0 {
            anyhow::bail!("invalid endpoint {:?}: port 0", s);
        }
        Ok(Endpoint::new(addr.ip(), addr.port()))
    }
}

/// One row of a player-list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSample {
    pub name: String,
    pub score: i32,
    /// Seconds connected, as reported by the server.
    pub duration: f32,
}

/// The parsed result of one successful probe of one endpoint.
///
/// `endpoint` is always the public address of record, even when the query
/// itself went to a substituted address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub endpoint: Endpoint,
    pub name: String,
    pub map: String,
    pub player_count: u8,
    pub game_port: Option<u16>,
    pub players: Vec<PlayerSample>,
}

impl Snapshot {
    pub fn score_total(&self) -> i64 {
        self.players.iter().map(|p| p.score as i64).sum()
    }
}

/// Successful snapshots of one poll batch plus the batch bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub snapshots: Vec<Snapshot>,
    pub attempted: usize,
    pub failed: usize,
}

impl PollOutcome {
    pub fn server_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Sum of the player counts reported in the info responses.
    pub fn player_total(&self) -> u64 {
        self.snapshots.iter().map(|s| s.player_count as u64).sum()
    }
}

/// Why a single endpoint produced no snapshot.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response header 0x{0:02x}")]
    UnexpectedHeader(u8),
    #[error("truncated response: {0}")]
    Truncated(&'static str),
    #[error("malformed response: {0}")]
    Malformed(&'static str),
    #[error("server reported no name")]
    NoName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn endpoint_parse_and_display() {
        let e: Endpoint = "10.0.0.7:27015".parse().unwrap();
        assert_eq!(e.query_port, 27015);
        assert_eq!(e.to_string(), "10.0.0.7:27015");
        assert!("10.0.0.7".parse::<Endpoint>().is_err());
        assert!("10.0.0.7:0".parse::<Endpoint>().is_err());
    }

    #[test]
    fn outcome_totals() {
        let ep: Endpoint = "10.0.0.1:1".parse().unwrap();
        let snap = |count| Snapshot { endpoint: ep, name: "x".into(), map: "m".into(), player_count: count, game_port: None, players: vec![] };
        let out = PollOutcome { snapshots: vec![snap(3), snap(5)], attempted: 4, failed: 2 };
        assert_eq!(out.server_count(), 2);
        assert_eq!(out.player_total(), 8);
    }
}
