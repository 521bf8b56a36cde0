//! Violation log: append-only record of compliance failures.
//!
//! Records are created by the detection adapter, appended exactly once, never
//! mutated, and removed only by a bulk `clear`.
//!
//! The file-backed store self-heals destructively: if the existing file cannot be
//! parsed or its header is not the expected schema, the file is recreated holding
//! only the record being appended. Prior records are lost on that path.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDateTime, Timelike};

mod file_store;
mod memory;
pub mod report;
mod shared;

pub use file_store::CsvViolationLog;
pub use memory::InMemoryViolationLog;
pub use shared::SharedViolationLog;

/// Default backing file, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "violation_logs.csv";

pub const COLUMN_TIMESTAMP: &str = "Timestamp";
pub const COLUMN_VIOLATION: &str = "Violation";
pub const COLUMN_CONFIDENCE: &str = "Confidence";

/// Storage column order.
pub const LOG_COLUMNS: [&str; 3] = [COLUMN_TIMESTAMP, COLUMN_VIOLATION, COLUMN_CONFIDENCE];

/// `Timestamp` column format (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One logged compliance failure.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    pub timestamp: NaiveDateTime,
    pub violation_type: String,
    /// Always rounded to two decimal places.
    pub confidence: f64,
}

impl ViolationRecord {
    /// Build a record, truncating the timestamp to whole seconds and rounding confidence.
    pub fn new(
        timestamp: NaiveDateTime,
        violation_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            violation_type: violation_type.into(),
            confidence: round_confidence(confidence),
        }
    }

    /// Record stamped with the current local wall-clock time.
    pub fn now(violation_type: impl Into<String>, confidence: f64) -> Self {
        Self::new(Local::now().naive_local(), violation_type, confidence)
    }

    pub fn timestamp_field(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn confidence_field(&self) -> String {
        format!("{:.2}", self.confidence)
    }

    /// Errors when the record would not parse back after being written.
    pub fn ensure_storable(&self) -> Result<()> {
        if !self.confidence.is_finite() {
            return Err(anyhow!(
                "refusing to log {} with non-finite confidence {}",
                self.violation_type,
                self.confidence
            ));
        }
        Ok(())
    }

    /// Parse the three stored fields back into a record.
    pub fn from_fields(timestamp: &str, violation_type: &str, confidence: &str) -> Result<Self> {
        let ts = NaiveDateTime::parse_from_str(timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| anyhow!("invalid timestamp '{}': {}", timestamp, e))?;
        let conf: f64 = confidence
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid confidence '{}'", confidence))?;
        if !conf.is_finite() {
            return Err(anyhow!("invalid confidence '{}'", confidence));
        }
        Ok(Self::new(ts, violation_type, conf))
    }
}

/// Round to two decimal places.
pub fn round_confidence(confidence: f64) -> f64 {
    (confidence * 100.0).round() / 100.0
}

/// Append-only store of violation records.
///
/// Implementations do no locking of their own. Use `SharedViolationLog` when
/// several frame loops in one process write to the same store.
pub trait ViolationLogStore {
    /// Append one record after existing ones.
    fn append(&mut self, record: &ViolationRecord) -> Result<()>;

    /// All records in insertion order. A store that was never written is empty.
    ///
    /// Parse failures are returned to the caller; see `read_all_or_reset`.
    fn read_all(&self) -> Result<Vec<ViolationRecord>>;

    /// Remove every record. The next append starts a fresh log.
    fn clear(&mut self) -> Result<()>;

    /// Replace the contents with an empty log (header only for file stores).
    fn reset(&mut self) -> Result<()>;

    /// `read_all`, recovering from an unreadable log by resetting it to empty.
    fn read_all_or_reset(&mut self) -> Result<Vec<ViolationRecord>> {
        match self.read_all() {
            Ok(records) => Ok(records),
            Err(e) => {
                log::warn!("violation log unreadable, recreating empty log: {:#}", e);
                self.reset()?;
                Ok(Vec::new())
            }
        }
    }
}
