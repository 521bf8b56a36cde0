//! Read-side views over a violation log: recent entries, per-type counts, export.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};

use super::{ViolationRecord, LOG_COLUMNS};

/// Per-type tally, most frequent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeCount {
    pub violation_type: String,
    pub count: usize,
}

/// The last `limit` records of the log, newest timestamp first.
pub fn recent(records: &[ViolationRecord], limit: usize) -> Vec<ViolationRecord> {
    let start = records.len().saturating_sub(limit);
    let mut tail = records[start..].to_vec();
    // stable: equal timestamps keep reverse insertion order
    tail.reverse();
    tail.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    tail
}

/// Count records per violation type. Ties are ordered by type name.
pub fn counts_by_type(records: &[ViolationRecord]) -> Vec<TypeCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.violation_type.as_str()).or_default() += 1;
    }
    let mut out: Vec<TypeCount> = counts
        .into_iter()
        .map(|(violation_type, count)| TypeCount {
            violation_type: violation_type.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

/// Serialize records as a complete CSV log (header included).
pub fn export_csv<W: Write>(records: &[ViolationRecord], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(LOG_COLUMNS)?;
    for record in records {
        writer.write_record([
            record.timestamp_field(),
            record.violation_type.clone(),
            record.confidence_field(),
        ])?;
    }
    writer.flush().context("flush exported violation log")?;
    Ok(())
}
