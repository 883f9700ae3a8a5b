use anyhow::{Context, Result};
use census_engine::ReconcileSettings;
use directory::{DirectoryOptions, PublicIpOptions};
use poller::PollOptions;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PATH: &str = "census.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
    pub public_ip: PublicIpConfig,
    pub poll: PollConfig,
    pub reconcile: ReconcileConfig,
    pub operators: OperatorsConfig,
    pub lease: LeaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig { path: PathBuf::from("census.db") }
    }
}

/// Server-list lookup. The API key has no default; without one the lookup fails.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DirectoryConfig {
    pub url: String,
    pub api_key: String,
    pub app_id: u32,
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            url: "https://api.steampowered.com/IGameServersService/GetServerList/v1/".into(),
            api_key: String::new(),
            app_id: 232090,
            limit: 50_000,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublicIpConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PublicIpConfig {
    fn default() -> Self {
        PublicIpConfig { enabled: true, url: "https://ifconfig.me/ip".into(), timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollConfig {
    pub concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Probe launches per second; 0 disables pacing.
    pub qps: u32,
    pub loopback_ip: IpAddr,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            concurrency: 150,
            timeout: Duration::from_secs(3),
            qps: 0,
            loopback_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconcileConfig {
    pub restart_high_score: i64,
    pub restart_low_score: i64,
    #[serde(with = "humantime_serde")]
    pub session_stale_after: Duration,
    #[serde(with = "humantime_serde")]
    pub server_lost_after: Duration,
    pub rollup_window_days: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let d = ReconcileSettings::default();
        ReconcileConfig {
            restart_high_score: d.restart_high_score,
            restart_low_score: d.restart_low_score,
            session_stale_after: d.session_stale_after,
            server_lost_after: d.server_lost_after,
            rollup_window_days: d.rollup_window_days,
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct OperatorsConfig {
    pub patterns: Vec<OperatorPattern>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorPattern {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LeaseConfig {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        LeaseConfig { ttl: Duration::from_secs(10 * 60) }
    }
}

impl Config {
    /// Load `path`, or `./census.yaml` when present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Path::new(DEFAULT_PATH);
                if !p.exists() {
                    return Ok(Config::default());
                }
                p.to_path_buf()
            }
        };
        let s = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn settings(&self) -> ReconcileSettings {
        let r = &self.reconcile;
        ReconcileSettings {
            restart_high_score: r.restart_high_score,
            restart_low_score: r.restart_low_score,
            session_stale_after: r.session_stale_after,
            server_lost_after: r.server_lost_after,
            rollup_window_days: r.rollup_window_days,
        }
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            timeout_ms: self.poll.timeout.as_millis() as u64,
            concurrency: self.poll.concurrency,
            qps: self.poll.qps,
            loopback_ip: self.poll.loopback_ip,
        }
    }

    pub fn directory_options(&self) -> DirectoryOptions {
        let d = &self.directory;
        DirectoryOptions {
            url: d.url.clone(),
            api_key: d.api_key.clone(),
            app_id: d.app_id,
            limit: d.limit,
            timeout_ms: d.timeout.as_millis() as u64,
            user_agent: user_agent(),
        }
    }

    pub fn public_ip_options(&self) -> Option<PublicIpOptions> {
        let p = &self.public_ip;
        p.enabled.then(|| PublicIpOptions {
            url: p.url.clone(),
            timeout_ms: p.timeout.as_millis() as u64,
            user_agent: user_agent(),
        })
    }
}

fn user_agent() -> String {
    format!("census/{}", census_core::version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = Config::parse("{}").unwrap();
        assert_eq!(cfg.database.path, PathBuf::from("census.db"));
        assert_eq!(cfg.poll.concurrency, 150);
        assert_eq!(cfg.directory_options().limit, 50_000);
        assert_eq!(cfg.poll_options().timeout_ms, 3000);
        assert_eq!(cfg.settings().restart_high_score, 500);
        assert_eq!(cfg.lease.ttl, Duration::from_secs(600));
        assert!(cfg.public_ip_options().is_some());
    }

    #[test]
    fn human_durations_and_patterns() {
        let cfg = Config::parse(
            r#"
directory:
  api_key: "abc"
  timeout: 20s
poll:
  timeout: 1500ms
  qps: 200
public_ip:
  enabled: false
reconcile:
  restart_high_score: 600
  session_stale_after: 10m
operators:
  patterns:
    - pattern: "night ?owls"
      label: "Night Owls"
"#,
        )
        .unwrap();
        assert_eq!(cfg.directory_options().timeout_ms, 20_000);
        assert_eq!(cfg.directory_options().api_key, "abc");
        assert_eq!(cfg.poll_options().timeout_ms, 1500);
        assert_eq!(cfg.poll.qps, 200);
        assert!(cfg.public_ip_options().is_none());
        let s = cfg.settings();
        assert_eq!((s.restart_high_score, s.restart_low_score), (600, 200));
        assert_eq!(s.session_stale_after, Duration::from_secs(600));
        assert_eq!(cfg.operators.patterns[0].label, "Night Owls");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
        let path = dir.path().join("census.yaml");
        std::fs::write(&path, "database:\n  path: /tmp/x.db\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().database.path, PathBuf::from("/tmp/x.db"));
    }
}
