use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{
    ViolationLogStore, ViolationRecord, COLUMN_CONFIDENCE, COLUMN_TIMESTAMP, COLUMN_VIOLATION,
    LOG_COLUMNS,
};

/// Violation log backed by a flat CSV file with header `Timestamp,Violation,Confidence`.
pub struct CsvViolationLog {
    path: PathBuf,
}

/// Position of each schema column in an existing file's header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ColumnLayout {
    timestamp: usize,
    violation: usize,
    confidence: usize,
}

impl ColumnLayout {
    const STORAGE: ColumnLayout = ColumnLayout {
        timestamp: 0,
        violation: 1,
        confidence: 2,
    };

    /// Match a header against the schema. Column order is free, the set must be exact.
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        if header.len() != LOG_COLUMNS.len() {
            return Err(anyhow!(
                "expected columns {:?}, found {:?}",
                LOG_COLUMNS,
                header.iter().collect::<Vec<_>>()
            ));
        }
        let position = |name: &str| {
            header
                .iter()
                .position(|column| column.trim() == name)
                .ok_or_else(|| anyhow!("missing column '{}'", name))
        };
        Ok(Self {
            timestamp: position(COLUMN_TIMESTAMP)?,
            violation: position(COLUMN_VIOLATION)?,
            confidence: position(COLUMN_CONFIDENCE)?,
        })
    }

    fn parse(&self, row: &csv::StringRecord) -> Result<ViolationRecord> {
        let field = |index: usize| {
            row.get(index)
                .ok_or_else(|| anyhow!("row has {} fields", row.len()))
        };
        ViolationRecord::from_fields(
            field(self.timestamp)?,
            field(self.violation)?,
            field(self.confidence)?,
        )
    }

    fn row(&self, record: &ViolationRecord) -> [String; 3] {
        let mut row: [String; 3] = Default::default();
        row[self.timestamp] = record.timestamp_field();
        row[self.violation] = record.violation_type.clone();
        row[self.confidence] = record.confidence_field();
        row
    }
}

/// What the backing file looks like right now.
enum Inspection {
    Missing,
    Valid {
        layout: ColumnLayout,
        records: Vec<ViolationRecord>,
        ends_with_newline: bool,
    },
    Unusable(anyhow::Error),
}

impl CsvViolationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// I/O failures other than a missing file are returned as errors, never healed.
    fn inspect(&self) -> Result<Inspection> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Inspection::Missing),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read violation log {}", self.path.display())))
            }
        };
        Ok(match parse_log(&bytes) {
            Ok((layout, records)) => Inspection::Valid {
                layout,
                records,
                ends_with_newline: bytes.last() == Some(&b'\n'),
            },
            Err(e) => Inspection::Unusable(e),
        })
    }

    /// Truncate the file and write the header followed by `records`.
    fn rewrite(&self, records: &[ViolationRecord]) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create violation log {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(LOG_COLUMNS)?;
        for record in records {
            writer.write_record(ColumnLayout::STORAGE.row(record))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to write violation log {}", self.path.display()))?;
        Ok(())
    }

    fn append_row(
        &self,
        layout: ColumnLayout,
        record: &ViolationRecord,
        ends_with_newline: bool,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open violation log {}", self.path.display()))?;
        if !ends_with_newline {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(layout.row(record))?;
        writer
            .flush()
            .with_context(|| format!("failed to append to violation log {}", self.path.display()))?;
        Ok(())
    }
}

impl ViolationLogStore for CsvViolationLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        record.ensure_storable()?;
        match self.inspect()? {
            Inspection::Missing => self.rewrite(std::slice::from_ref(record)),
            Inspection::Valid {
                layout,
                ends_with_newline,
                ..
            } => self.append_row(layout, record, ends_with_newline),
            Inspection::Unusable(reason) => {
                log::warn!(
                    "violation log {} is corrupt or has the wrong schema ({:#}); recreating it, prior records are discarded",
                    self.path.display(),
                    reason
                );
                self.rewrite(std::slice::from_ref(record))
            }
        }
    }

    fn read_all(&self) -> Result<Vec<ViolationRecord>> {
        match self.inspect()? {
            Inspection::Missing => Ok(Vec::new()),
            Inspection::Valid { records, .. } => Ok(records),
            Inspection::Unusable(reason) => Err(reason.context(format!(
                "violation log {} is unreadable",
                self.path.display()
            ))),
        }
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to delete violation log {}", self.path.display()))),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.rewrite(&[])
    }
}

fn parse_log(bytes: &[u8]) -> Result<(ColumnLayout, Vec<ViolationRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);
    let header = reader.headers().context("read header")?.clone();
    if header.is_empty() {
        return Err(anyhow!("file has no header row"));
    }
    let layout = ColumnLayout::from_header(&header)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("row {}", index + 1))?;
        records.push(
            layout
                .parse(&row)
                .with_context(|| format!("row {}", index + 1))?,
        );
    }
    Ok((layout, records))
}
