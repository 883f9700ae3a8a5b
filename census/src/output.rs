use anyhow::Result;
use census_core::Snapshot;
use std::io::Write;
use std::path::Path;

use crate::OutputFormat;

pub fn snapshot_line(s: &Snapshot) -> String {
    let port = s.game_port.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
    format!("{} {} [{}] players={} game_port={}", s.endpoint, s.name, s.map, s.player_count, port)
}

pub fn write_snapshots(w: &mut dyn Write, snaps: &[Snapshot], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for s in snaps {
                writeln!(w, "{}", snapshot_line(s))?;
                for p in &s.players {
                    writeln!(w, "    {} score={} time={:.0}s", p.name, p.score, p.duration)?;
                }
            }
        }
        OutputFormat::Json => writeln!(w, "{}", serde_json::to_string_pretty(snaps)?)?,
        OutputFormat::Jsonl => {
            for s in snaps {
                writeln!(w, "{}", serde_json::to_string(s)?)?;
            }
        }
    }
    Ok(())
}

/// One CSV row per server.
pub fn write_csv(path: &Path, snaps: &[Snapshot]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["endpoint", "name", "map", "player_count", "game_port", "players", "score_total"])?;
    for s in snaps {
        let players = s.players.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join("|");
        wtr.write_record([
            s.endpoint.to_string(),
            s.name.clone(),
            s.map.clone(),
            s.player_count.to_string(),
            s.game_port.map(|p| p.to_string()).unwrap_or_default(),
            players,
            s.score_total().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use census_core::PlayerSample;

    fn sample() -> Snapshot {
        Snapshot {
            endpoint: "10.0.0.1:27015".parse().unwrap(),
            name: "Night Owls".into(),
            map: "KF-Outpost".into(),
            player_count: 2,
            game_port: Some(7777),
            players: vec![
                PlayerSample { name: "Alice".into(), score: 10, duration: 61.0 },
                PlayerSample { name: "Bob".into(), score: 5, duration: 30.0 },
            ],
        }
    }

    #[test]
    fn jsonl_is_one_object_per_line() {
        let mut buf = Vec::new();
        write_snapshots(&mut buf, &[sample(), sample()], OutputFormat::Jsonl).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["map"], "KF-Outpost");
        assert_eq!(v["players"][1]["name"], "Bob");
    }

    #[test]
    fn csv_has_header_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poll.csv");
        write_csv(&path, &[sample()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("endpoint,name,map"));
        assert_eq!(lines.next().unwrap(), "10.0.0.1:27015,Night Owls,KF-Outpost,2,7777,Alice|Bob,15");
    }
}
