//! Client side of the two-step server query protocol: an info request and a
//! player-list request, each of which may be answered with a challenge first.

use census_core::{Endpoint, PlayerSample, ProbeError, Snapshot};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub const INFO_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFTSource Engine Query\x00";
pub const PLAYER_CHALLENGE_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFF\x55\xFF\xFF\xFF\xFF";
const PLAYER_REQUEST_HEADER: &[u8] = b"\xFF\xFF\xFF\xFF\x55";

const PACKET_PREFIX: &[u8] = b"\xFF\xFF\xFF\xFF";
const CHALLENGE_REPLY: u8 = 0x41;
const INFO_REPLY: u8 = 0x49;
const PLAYERS_REPLY: u8 = 0x44;
const EDF_GAME_PORT: u8 = 0x80;
const RECV_BUF: usize = 4096;

/// Where to send the query, and which public endpoint the answer belongs to.
#[derive(Debug, Clone, Copy)]
pub struct QueryTarget {
    pub query_addr: SocketAddr,
    pub endpoint: Endpoint,
}

impl QueryTarget {
    pub fn direct(endpoint: Endpoint) -> Self {
        QueryTarget { query_addr: endpoint.socket_addr(), endpoint }
    }
}

/// Fields of an info reply that the census keeps.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoReply {
    pub name: String,
    pub map: String,
    pub player_count: u8,
    pub game_port: Option<u16>,
}

/// Probe one endpoint. Every send and receive is bounded by `timeout_ms`.
pub async fn query_server(target: &QueryTarget, timeout_ms: u64) -> Result<Snapshot, ProbeError> {
    let bind: SocketAddr = match target.query_addr.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let sock = UdpSocket::bind(bind).await?;
    sock.connect(target.query_addr).await?;
    let limit = Duration::from_millis(timeout_ms);

    let raw = exchange(&sock, INFO_REQUEST, INFO_REQUEST, limit).await?;
    let info = parse_info(&raw)?;
    if info.name.trim().is_empty() {
        return Err(ProbeError::NoName);
    }

    let raw = exchange(&sock, PLAYER_CHALLENGE_REQUEST, PLAYER_REQUEST_HEADER, limit).await?;
    let players = parse_players(&raw, &target.endpoint)?;

    Ok(Snapshot {
        endpoint: target.endpoint,
        name: info.name,
        map: info.map,
        player_count: info.player_count,
        game_port: info.game_port,
        players,
    })
}

/// Send `request`; if the server answers with a challenge, send
/// `challenge_base` followed by the token and return the second answer.
async fn exchange(sock: &UdpSocket, request: &[u8], challenge_base: &[u8], limit: Duration) -> Result<Vec<u8>, ProbeError> {
    let first = round_trip(sock, request, limit).await?;
    match challenge_token(&first)? {
        None => Ok(first),
        Some(token) => {
            let mut retry = Vec::with_capacity(challenge_base.len() + token.len());
            retry.extend_from_slice(challenge_base);
            retry.extend_from_slice(token);
            round_trip(sock, &retry, limit).await
        }
    }
}

async fn round_trip(sock: &UdpSocket, request: &[u8], limit: Duration) -> Result<Vec<u8>, ProbeError> {
    let elapsed = |_| ProbeError::Timeout(limit.as_millis() as u64);
    timeout(limit, sock.send(request)).await.map_err(elapsed)??;
    let mut buf = vec![0u8; RECV_BUF];
    let n = timeout(limit, sock.recv(&mut buf)).await.map_err(elapsed)??;
    buf.truncate(n);
    Ok(buf)
}

/// Returns the 4-byte token if `data` is a challenge frame.
fn challenge_token(data: &[u8]) -> Result<Option<&[u8]>, ProbeError> {
    let kind = packet_kind(data)?;
    if kind != CHALLENGE_REPLY {
        return Ok(None);
    }
    data.get(5..9).map(Some).ok_or(ProbeError::Truncated("challenge token"))
}

fn packet_kind(data: &[u8]) -> Result<u8, ProbeError> {
    if data.len() < 5 {
        return Err(ProbeError::Truncated("packet header"));
    }
    if &data[..4] != PACKET_PREFIX {
        return Err(ProbeError::Malformed("missing packet prefix"));
    }
    Ok(data[4])
}

pub fn parse_info(data: &[u8]) -> Result<InfoReply, ProbeError> {
    let kind = packet_kind(data)?;
    if kind != INFO_REPLY {
        return Err(ProbeError::UnexpectedHeader(kind));
    }
    let mut r = Reader::new(data, 5);
    r.skip(1, "protocol version")?;
    let name = r.cstring("server name")?;
    let map = r.cstring("map name")?;
    r.cstring("game directory")?;
    r.cstring("game description")?;
    r.skip(2, "app id")?;
    let player_count = r.u8("player count")?;
    let mut game_port = None;
    if r.remaining() > 0 {
        let edf = r.u8("extra data flags")?;
        if edf & EDF_GAME_PORT != 0 {
            game_port = Some(r.u16_le("game port")?);
        }
    }
    Ok(InfoReply { name, map, player_count, game_port })
}

/// Parse a player-list reply. Blank names become a placeholder unique to the
/// endpoint and slot so they never collapse into one player identity.
pub fn parse_players(data: &[u8], endpoint: &Endpoint) -> Result<Vec<PlayerSample>, ProbeError> {
    let kind = packet_kind(data)?;
    if kind != PLAYERS_REPLY {
        return Err(ProbeError::UnexpectedHeader(kind));
    }
    let mut r = Reader::new(data, 5);
    let count = r.u8("player count")?;
    let mut players = Vec::with_capacity(count as usize);
    for slot in 0..count {
        r.skip(1, "player index")?;
        let raw = r.cstring("player name")?;
        let score = r.i32_le("player score")?;
        let duration = r.f32_le("player duration")?;
        let duration = if duration.is_finite() { duration } else { 0.0 };
        let trimmed = raw.trim();
        let name = if trimmed.is_empty() {
            placeholder_name(endpoint, slot)
        } else {
            trimmed.to_string()
        };
        players.push(PlayerSample { name, score, duration });
    }
    Ok(players)
}

pub fn placeholder_name(endpoint: &Endpoint, slot: u8) -> String {
    format!("[UNNAMED:{}:{}:{}]", endpoint.ip, endpoint.query_port, slot)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Reader { data, pos }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ProbeError> {
        if self.remaining() < n {
            return Err(ProbeError::Truncated(what));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize, what: &'static str) -> Result<(), ProbeError> {
        self.take(n, what).map(|_| ())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, ProbeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16_le(&mut self, what: &'static str) -> Result<u16, ProbeError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i32_le(&mut self, what: &'static str) -> Result<i32, ProbeError> {
        let b = self.take(4, what)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32_le(&mut self, what: &'static str) -> Result<f32, ProbeError> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Null-terminated string; invalid UTF-8 is replaced, a missing terminator is not tolerated.
    fn cstring(&mut self, what: &'static str) -> Result<String, ProbeError> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let end = rest.iter().position(|&b| b == 0).ok_or(ProbeError::Malformed(what))?;
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }
}
