use arrow::datatypes::{DataType, Field, Schema};

pub fn session_history_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("server_id", DataType::Int64, false),
        Field::new("player_id", DataType::Int64, false),
        Field::new("map_id", DataType::Int64, true),
        Field::new("final_score", DataType::Int64, false),
        Field::new("reported_duration", DataType::Float64, false),
        Field::new("session_start", DataType::Int64, false),
        Field::new("session_end", DataType::Int64, false),
        Field::new("session_epoch", DataType::Utf8, false),
        Field::new("calculated_duration", DataType::Int64, false),
    ])
}

pub fn server_history_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("server_id", DataType::Int64, false),
        Field::new("map_id", DataType::Int64, true),
        Field::new("session_start", DataType::Int64, false),
        Field::new("session_end", DataType::Int64, false),
        Field::new("calculated_duration", DataType::Int64, false),
        Field::new("reason", DataType::Utf8, false),
        Field::new("session_epoch", DataType::Utf8, false),
    ])
}

pub fn global_stats_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("scan_time", DataType::Int64, false),
        Field::new("active_servers", DataType::Int64, false),
        Field::new("active_players", DataType::Int64, false),
    ])
}
