pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE maps (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE
);

CREATE TABLE players (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE
);

CREATE TABLE servers (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  ip_address      TEXT NOT NULL,
  query_port      INTEGER NOT NULL CHECK (query_port BETWEEN 1 AND 65535),
  game_port       INTEGER,
  name            TEXT NOT NULL,
  current_map_id  INTEGER REFERENCES maps(id),
  player_count    INTEGER NOT NULL DEFAULT 0,
  map_start       INTEGER NOT NULL,
  last_seen       INTEGER NOT NULL,
  session_epoch   TEXT NOT NULL,
  operator_name   TEXT,
  location        TEXT,
  UNIQUE (ip_address, query_port)
);

CREATE TABLE active_sessions (
  server_id           INTEGER NOT NULL REFERENCES servers(id),
  player_id           INTEGER NOT NULL REFERENCES players(id),
  map_id              INTEGER REFERENCES maps(id),
  score               INTEGER NOT NULL,
  reported_duration   REAL NOT NULL,
  calculated_duration INTEGER NOT NULL DEFAULT 0,
  first_seen          INTEGER NOT NULL,
  last_seen           INTEGER NOT NULL,
  session_epoch       TEXT NOT NULL,
  PRIMARY KEY (server_id, player_id)
);

CREATE TABLE session_history (
  id                  INTEGER PRIMARY KEY AUTOINCREMENT,
  server_id           INTEGER NOT NULL REFERENCES servers(id),
  player_id           INTEGER NOT NULL REFERENCES players(id),
  map_id              INTEGER REFERENCES maps(id),
  final_score         INTEGER NOT NULL,
  reported_duration   REAL NOT NULL,
  session_start       INTEGER NOT NULL,
  session_end         INTEGER NOT NULL,
  session_epoch       TEXT NOT NULL,
  calculated_duration INTEGER NOT NULL
);

CREATE TABLE server_history (
  id                  INTEGER PRIMARY KEY AUTOINCREMENT,
  server_id           INTEGER NOT NULL REFERENCES servers(id),
  map_id              INTEGER REFERENCES maps(id),
  session_start       INTEGER NOT NULL,
  session_end         INTEGER NOT NULL,
  calculated_duration INTEGER NOT NULL,
  reason              TEXT NOT NULL CHECK (reason IN ('map_rotation','match_restart','connection_lost')),
  session_epoch       TEXT NOT NULL
);

CREATE TABLE global_stats (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  scan_time       INTEGER NOT NULL,
  active_servers  INTEGER NOT NULL,
  active_players  INTEGER NOT NULL
);

CREATE TABLE meta_kv (
  key             TEXT PRIMARY KEY,
  value           TEXT NOT NULL
);

CREATE TABLE cycle_lease (
  id              INTEGER PRIMARY KEY CHECK (id = 1),
  holder          TEXT NOT NULL,
  expires_at      INTEGER NOT NULL
);

CREATE TABLE ip_ranges (
  ip_to           INTEGER PRIMARY KEY,
  ip_from         INTEGER NOT NULL,
  city_name       TEXT,
  country_code    TEXT
);

CREATE TABLE rollup_operator_daily (
  day                     TEXT NOT NULL,
  operator_name           TEXT NOT NULL,
  server_count            INTEGER NOT NULL,
  unique_players          INTEGER NOT NULL,
  total_playtime_seconds  INTEGER NOT NULL,
  last_contact            INTEGER,
  PRIMARY KEY (day, operator_name)
);

CREATE TABLE rollup_map_daily (
  day             TEXT NOT NULL,
  map_id          INTEGER NOT NULL,
  session_count   INTEGER NOT NULL,
  total_seconds   INTEGER NOT NULL,
  PRIMARY KEY (day, map_id)
);

CREATE TABLE rollup_server_daily (
  day             TEXT NOT NULL,
  server_id       INTEGER NOT NULL,
  session_count   INTEGER NOT NULL,
  total_seconds   INTEGER NOT NULL,
  PRIMARY KEY (day, server_id)
);

CREATE TABLE rollup_player_daily (
  day             TEXT NOT NULL,
  player_id       INTEGER NOT NULL,
  session_count   INTEGER NOT NULL,
  total_seconds   INTEGER NOT NULL,
  PRIMARY KEY (day, player_id)
);

CREATE TABLE rollup_traffic_daily (
  day             TEXT PRIMARY KEY,
  unique_players  INTEGER NOT NULL
);

CREATE INDEX idx_servers_name ON servers(name);
CREATE INDEX idx_servers_last_seen ON servers(last_seen);
CREATE INDEX idx_active_last_seen ON active_sessions(last_seen);
CREATE INDEX idx_session_history_start ON session_history(session_start);
CREATE INDEX idx_server_history_start ON server_history(session_start);
CREATE INDEX idx_global_stats_time ON global_stats(scan_time);

COMMIT;
"#
;
