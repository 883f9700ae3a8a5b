use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

pub type ServerId = i64;
pub type MapId = i64;
pub type PlayerId = i64;
/// Unix seconds, UTC.
pub type Timestamp = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    pub id: ServerId,
    pub ip_address: String,
    pub query_port: u16,
    pub game_port: Option<u16>,
    pub name: String,
    pub current_map_id: Option<MapId>,
    pub player_count: i64,
    pub map_start: Timestamp,
    pub last_seen: Timestamp,
    pub session_epoch: String,
    pub operator_name: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewServer<'a> {
    pub ip_address: &'a str,
    pub query_port: u16,
    pub game_port: Option<u16>,
    pub name: &'a str,
    pub map_id: MapId,
    pub seen_at: Timestamp,
    pub session_epoch: &'a str,
    pub operator_name: &'a str,
    pub location: &'a str,
}

/// The mutable fields rewritten on every cycle a server is observed.
#[derive(Debug, Clone)]
pub struct ServerState<'a> {
    pub name: &'a str,
    pub map_id: MapId,
    pub player_count: i64,
    pub map_start: Timestamp,
    pub last_seen: Timestamp,
    pub game_port: Option<u16>,
    pub session_epoch: &'a str,
    pub operator_name: &'a str,
    pub location: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    MapRotation,
    MatchRestart,
    ConnectionLost,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::MapRotation => "map_rotation",
            EndReason::MatchRestart => "match_restart",
            EndReason::ConnectionLost => "connection_lost",
        }
    }
}

impl ToSql for EndReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EndReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "map_rotation" => Ok(EndReason::MapRotation),
            "match_restart" => Ok(EndReason::MatchRestart),
            "connection_lost" => Ok(EndReason::ConnectionLost),
            other => Err(FromSqlError::Other(format!("unknown end reason {other:?}").into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerHistoryRow {
    pub id: i64,
    pub server_id: ServerId,
    pub map_id: Option<MapId>,
    pub session_start: Timestamp,
    pub session_end: Timestamp,
    pub calculated_duration: i64,
    pub reason: EndReason,
    pub session_epoch: String,
}

/// One archived map/match instance; the elapsed seconds are derived from the span.
#[derive(Debug, Clone)]
pub struct MatchEnd<'a> {
    pub server_id: ServerId,
    pub map_id: Option<MapId>,
    pub started: Timestamp,
    pub ended: Timestamp,
    pub reason: EndReason,
    pub session_epoch: &'a str,
}

#[derive(Debug, Clone)]
pub struct PlayerObservation<'a> {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub map_id: MapId,
    pub score: i32,
    pub reported_duration: f32,
    pub seen_at: Timestamp,
    pub session_epoch: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSessionRow {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub map_id: Option<MapId>,
    pub score: i64,
    pub reported_duration: f64,
    pub calculated_duration: i64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub session_epoch: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionHistoryRow {
    pub id: i64,
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub map_id: Option<MapId>,
    pub final_score: i64,
    pub reported_duration: f64,
    pub session_start: Timestamp,
    pub session_end: Timestamp,
    pub session_epoch: String,
    pub calculated_duration: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalStatsRow {
    pub scan_time: Timestamp,
    pub active_servers: i64,
    pub active_players: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDaily {
    pub day: String,
    pub operator_name: String,
    pub server_count: i64,
    pub unique_players: i64,
    pub total_playtime_seconds: i64,
    pub last_contact: Option<Timestamp>,
}

/// A per-day total keyed by a map, server or player id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDaily {
    pub day: String,
    pub key: i64,
    pub session_count: i64,
    pub total_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficDaily {
    pub day: String,
    pub unique_players: i64,
}

/// Inclusive range of `YYYY-MM-DD` day keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRange {
    pub first: String,
    pub last: String,
}
