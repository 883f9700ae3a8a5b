//! SQLite persistence for the census: servers, sessions, history and rollups.

mod lease;
mod models;
mod open;
mod query;
mod rollup;
mod schema;
mod servers;
mod sessions;

#[cfg(feature = "parquet")]
mod arrow_schemas;
#[cfg(feature = "parquet")]
mod export_parquet;

pub use models::*;
pub use open::Db;

#[cfg(feature = "parquet")]
pub use export_parquet::{export_table_to_parquet, EXPORTABLE_TABLES};
