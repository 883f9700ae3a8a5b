use anyhow::{Context, Result};
use census_store::{DayRange, Db, Timestamp};
use time::{Date, OffsetDateTime};

/// meta_kv key set once the full-history backfill has run.
pub const BACKFILL_FLAG: &str = "rollups_backfilled";

/// Recompute every rollup from the whole history, once. `force` ignores the
/// persisted flag. Returns whether a rebuild happened.
pub fn backfill(db: &Db, force: bool) -> Result<bool> {
    if !force && db.meta_get(BACKFILL_FLAG)?.is_some() {
        return Ok(false);
    }
    db.rebuild_rollups(None).context("rollup backfill")?;
    db.meta_set(BACKFILL_FLAG, "1")?;
    tracing::info!(force, "rollups backfilled from full history");
    Ok(true)
}

/// Recompute the rollups of today and the `days` days before it.
pub fn refresh_recent(db: &Db, now: Timestamp, days: u32) -> Result<DayRange> {
    let range = trailing_days(now, days)?;
    db.rebuild_rollups(Some(&range)).with_context(|| format!("rollup refresh {}..{}", range.first, range.last))?;
    Ok(range)
}

/// Day keys (UTC) from `days` days before `now` up to the day of `now`.
pub fn trailing_days(now: Timestamp, days: u32) -> Result<DayRange> {
    let today = OffsetDateTime::from_unix_timestamp(now)?.date();
    let first = today
        .checked_sub(time::Duration::days(days as i64))
        .with_context(|| format!("{days} days before {today} is out of range"))?;
    Ok(DayRange { first: day_key(first), last: day_key(today) })
}

fn day_key(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}
