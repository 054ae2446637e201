//! Flat CSV tables: checkpoint/final output and reading earlier output back.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools keep the
//! Korean column names and addresses intact.

use crate::error::Result;
use crate::models::{Record, Schema};
use chrono::Local;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which kind of flush a write is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushMarker {
    /// Periodic cumulative snapshot, tagged with a progress marker
    Checkpoint(String),
    Final,
}

impl FlushMarker {
    pub fn suffix(&self) -> &str {
        match self {
            FlushMarker::Checkpoint(tag) => tag,
            FlushMarker::Final => "final",
        }
    }
}

/// Durable destination for accumulated records
pub trait RecordSink: Send {
    /// Writes every record, padded to the full schema. Returns where it went.
    fn write(&mut self, marker: &FlushMarker, schema: &Schema, records: &[Record]) -> Result<PathBuf>;
}

/// Writes `<dir>/<prefix>_<YYYYmmdd_HHMMSS>_<marker>.csv` files
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    prefix: String,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
        }
    }

    fn path_for(&self, marker: &FlushMarker) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        self.dir
            .join(format!("{}_{}_{}.csv", self.prefix, timestamp, marker.suffix()))
    }
}

impl RecordSink for CsvSink {
    fn write(&mut self, marker: &FlushMarker, schema: &Schema, records: &[Record]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(marker);
        write_table(&path, schema.fields(), records)?;
        Ok(path)
    }
}

/// Renders a JSON value as a CSV cell. Null and missing fields are empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

pub fn write_table(path: &Path, header: &[String], records: &[Record]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    if header.is_empty() {
        file.flush()?;
        return Ok(());
    }
    file.write_all(BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header)?;
    for record in records {
        writer.write_record(
            header
                .iter()
                .map(|field| record.get(field).map(cell_text).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = records.len(), columns = header.len(), "wrote table");
    Ok(())
}

/// A CSV read back with every cell as text
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Record>,
}

pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (i, field) in header.iter().enumerate() {
            let cell = row.get(i).unwrap_or_default();
            record.insert(field.clone(), Value::String(cell.to_string()));
        }
        rows.push(record);
    }

    Ok(Table { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn cells_render_scalars_plainly() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!("역삼동")), "역삼동");
        assert_eq!(cell_text(&json!(12.5)), "12.5");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn heterogeneous_records_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![
            record(json!({"rid": 1, "room_name": "역삼 오피스텔"})),
            record(json!({"rid": 2, "state": "open"})),
        ];
        let mut schema = Schema::default();
        for r in &records {
            schema.observe(r);
        }

        write_table(&path, schema.fields(), &records).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes[BOM.len()..].to_vec()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, ["rid,room_name,state", "1,역삼 오피스텔,", "2,,open"]);
    }

    #[test]
    fn read_back_strips_bom_and_keeps_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.csv");
        let header = vec!["rid".to_string(), "using_fee".to_string()];
        write_table(&path, &header, &[record(json!({"rid": 10, "using_fee": 550000}))]).unwrap();

        let table = read_table(&path).unwrap();

        assert_eq!(table.header, header);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["rid"], json!("10"));
        assert_eq!(table.rows[0]["using_fee"], json!("550000"));
    }

    #[test]
    fn empty_schema_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), "naver_properties");

        let path = sink
            .write(&FlushMarker::Final, &Schema::default(), &[])
            .unwrap();

        assert!(path.to_string_lossy().ends_with("_final.csv"));
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }
}
