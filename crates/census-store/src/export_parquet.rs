use anyhow::Result;
use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rusqlite::{Connection, Row};
use std::sync::Arc;

use crate::arrow_schemas;

const CHUNK: usize = 10_000;

pub const EXPORTABLE_TABLES: [&str; 3] = ["session_history", "server_history", "global_stats"];

/// Write every row of a history table to a zstd-compressed parquet file.
/// Returns the number of rows written.
pub fn export_table_to_parquet(conn: &Connection, table: &str, out: &std::path::Path) -> Result<usize> {
    let schema = match table {
        "session_history" => arrow_schemas::session_history_schema(),
        "server_history" => arrow_schemas::server_history_schema(),
        "global_stats" => arrow_schemas::global_stats_schema(),
        other => anyhow::bail!("unsupported table: {other}"),
    };
    let schema = Arc::new(schema);
    let columns = schema.fields().iter().map(|f| f.name().as_str()).collect::<Vec<_>>().join(", ");
    let mut stmt = conn.prepare(&format!("SELECT {columns} FROM {table} ORDER BY id"))?;
    let mut rows = stmt.query([])?;

    let props = WriterProperties::builder().set_compression(Compression::ZSTD(ZstdLevel::default())).build();
    let file = std::fs::File::create(out)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let mut total = 0;
    loop {
        let mut batch = ColumnBatch::new(&schema);
        let mut count = 0;
        while count < CHUNK {
            let Some(row) = rows.next()? else { break };
            batch.push(row)?;
            count += 1;
        }
        if count == 0 {
            break;
        }
        total += count;
        writer.write(&RecordBatch::try_new(schema.clone(), batch.finish())?)?;
    }

    writer.close()?;
    tracing::info!(table, rows = total, path = %out.display(), "parquet export written");
    Ok(total)
}

enum Column {
    Int(Int64Builder),
    Float(Float64Builder),
    Text(StringBuilder),
}

struct ColumnBatch {
    columns: Vec<Column>,
}

impl ColumnBatch {
    fn new(schema: &Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| match f.data_type() {
                DataType::Float64 => Column::Float(Float64Builder::new()),
                DataType::Utf8 => Column::Text(StringBuilder::new()),
                _ => Column::Int(Int64Builder::new()),
            })
            .collect();
        ColumnBatch { columns }
    }

    fn push(&mut self, row: &Row) -> Result<()> {
        for (i, col) in self.columns.iter_mut().enumerate() {
            match col {
                Column::Int(b) => b.append_option(row.get::<_, Option<i64>>(i)?),
                Column::Float(b) => b.append_option(row.get::<_, Option<f64>>(i)?),
                Column::Text(b) => b.append_option(row.get::<_, Option<String>>(i)?),
            }
        }
        Ok(())
    }

    fn finish(self) -> Vec<ArrayRef> {
        self.columns
            .into_iter()
            .map(|col| -> ArrayRef {
                match col {
                    Column::Int(mut b) => Arc::new(b.finish()),
                    Column::Float(mut b) => Arc::new(b.finish()),
                    Column::Text(mut b) => Arc::new(b.finish()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;

    #[test]
    fn exports_server_history() {
        let db = Db::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "INSERT INTO maps(id, name) VALUES (1, 'KF-Outpost');
                 INSERT INTO servers(id, ip_address, query_port, name, current_map_id, map_start, last_seen, session_epoch)
                     VALUES (1, '10.0.0.1', 27015, 'alpha', 1, 0, 0, 'e');
                 INSERT INTO server_history(server_id, map_id, session_start, session_end, calculated_duration, reason, session_epoch)
                     VALUES (1, 1, 0, 60, 60, 'map_rotation', 'e'), (1, NULL, 60, 90, 30, 'connection_lost', 'e');",
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("server_history.parquet");
        assert_eq!(export_table_to_parquet(&db.conn, "server_history", &out).unwrap(), 2);
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
        assert!(export_table_to_parquet(&db.conn, "ports", &out).is_err());
    }
}
