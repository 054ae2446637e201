//! Dropping repeated rows by a key column.

use crate::error::{Error, Result};
use crate::models::Record;
use crate::table::{cell_text, read_table, write_table};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    pub rows_in: usize,
    pub rows_out: usize,
}

impl DedupReport {
    pub fn removed(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// Keeps the first record for every value of `key`. Records with an empty
/// or missing key are always kept. Returns the survivors and how many were dropped.
pub fn dedup_records(records: Vec<Record>, key: &str) -> (Vec<Record>, usize) {
    let before = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| {
            let value = record.get(key).map(cell_text).unwrap_or_default();
            value.is_empty() || seen.insert(value)
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

pub fn dedup_file(input: &Path, output: &Path, key: &str) -> Result<DedupReport> {
    let table = read_table(input)?;
    if !table.header.iter().any(|h| h == key) {
        return Err(Error::Config(format!(
            "{} has no `{}` column",
            input.display(),
            key
        )));
    }

    let rows_in = table.rows.len();
    let (rows, removed) = dedup_records(table.rows, key);
    write_table(output, &table.header, &rows)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows_in,
        removed,
        "🧹 removed duplicates"
    );
    Ok(DedupReport {
        rows_in,
        rows_out: rows.len(),
    })
}
