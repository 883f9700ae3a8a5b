use anyhow::{Context, Result};
use census_core::Endpoint;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod cycle;
mod output;

use config::Config;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

#[derive(Debug, Parser)]
#[command(name = "census", version, about = "Game server census: poll, reconcile, roll up")]
struct Cli {
    /// Config file (YAML). If omitted, loads ./census.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. info or census_engine=debug
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Run one census cycle against the configured database
    Cycle,
    /// Query a single server and print its snapshot
    Probe {
        /// Server query address (ip:port)
        endpoint: String,
        /// Timeout per request in milliseconds (default: poll.timeout)
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Query a list of servers without touching the database
    Poll {
        /// File with newline-delimited ip:port entries (comments with # and blanks ignored)
        #[arg(long, value_name = "FILE")]
        targets: PathBuf,
        /// Max in-flight queries (default: poll.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false, requires = "out")]
        csv: bool,
    },
    /// Recompute every rollup table from the full history
    Backfill {
        /// Run even if the backfill already happened
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Export a history table to Parquet
    #[cfg(feature = "export")]
    Export {
        #[arg(long, value_parser = census_store::EXPORTABLE_TABLES)]
        table: String,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("census {}", census_core::version());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level).with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Version => {}
        Commands::Cycle => {
            if let Err(e) = cycle::run(&cfg) {
                tracing::error!("cycle aborted: {e:#}");
                return Err(e);
            }
        }
        Commands::Probe { endpoint, timeout_ms, format } => {
            let endpoint: Endpoint = endpoint.parse()?;
            let timeout_ms = timeout_ms.unwrap_or(cfg.poll_options().timeout_ms);
            let rt = cycle::runtime()?;
            let target = a2s_query::QueryTarget::direct(endpoint);
            let snap = rt
                .block_on(a2s_query::query_server(&target, timeout_ms))
                .with_context(|| format!("probing {endpoint}"))?;
            let stdout = std::io::stdout();
            output::write_snapshots(&mut stdout.lock(), std::slice::from_ref(&snap), format)?;
        }
        Commands::Poll { targets, concurrency, format, out, csv } => {
            let endpoints = read_targets(&targets)?;
            let mut opts = cfg.poll_options();
            if let Some(c) = concurrency {
                opts.concurrency = c;
            }
            let rt = cycle::runtime()?;
            let outcome = rt.block_on(async {
                let public_ip = match cfg.public_ip_options() {
                    Some(o) => directory::public_ip(&o).await,
                    None => None,
                };
                poller::poll_all(endpoints, public_ip, &opts).await
            });
            match out {
                Some(path) if csv => output::write_csv(&path, &outcome.snapshots)?,
                Some(path) => {
                    let mut w = BufWriter::new(std::fs::File::create(&path)?);
                    output::write_snapshots(&mut w, &outcome.snapshots, format)?;
                    w.flush()?;
                }
                None => {
                    let stdout = std::io::stdout();
                    output::write_snapshots(&mut stdout.lock(), &outcome.snapshots, format)?;
                }
            }
            eprintln!(
                "{} of {} servers answered, {} players",
                outcome.server_count(),
                outcome.attempted,
                outcome.player_total()
            );
        }
        Commands::Backfill { force } => {
            let db = census_store::Db::open_or_create(&cfg.database.path)?;
            let tx = db.conn.unchecked_transaction()?;
            let ran = census_engine::backfill(&db, force)?;
            tx.commit()?;
            if ran {
                for table in ["rollup_operator_daily", "rollup_map_daily", "rollup_server_daily", "rollup_player_daily", "rollup_traffic_daily"] {
                    println!("{table}: {} rows", db.count_rows(table)?);
                }
            } else {
                println!("rollups already backfilled (use --force to rebuild)");
            }
        }
        #[cfg(feature = "export")]
        Commands::Export { table, out } => {
            let db = census_store::Db::open_or_create(&cfg.database.path)?;
            let rows = census_store::export_table_to_parquet(&db.conn, &table, &out)?;
            println!("{rows} rows written to {}", out.display());
        }
    }
    Ok(())
}

fn read_targets(path: &Path) -> Result<Vec<Endpoint>> {
    let fh = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut endpoints = Vec::new();
    for line in BufReader::new(fh).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        endpoints.push(line.parse()?);
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_skip_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        std::fs::write(&path, "# fleet\n10.0.0.1:27015\n\n  10.0.0.2:27016  \n").unwrap();
        let eps = read_targets(&path).unwrap();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[1].query_port, 27016);
        std::fs::write(&path, "10.0.0.1\n").unwrap();
        assert!(read_targets(&path).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["census", "--log-level", "debug", "backfill", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Backfill { force: true }));
        assert!(Cli::try_parse_from(["census", "poll", "--targets", "t.txt", "--csv"]).is_err());
        let cli = Cli::try_parse_from(["census", "probe", "10.0.0.1:27015", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::Probe { format: OutputFormat::Json, .. }));
    }
}
