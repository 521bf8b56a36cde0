use anyhow::Result;

use super::{ViolationLogStore, ViolationRecord};

/// Violation log kept in memory. Nothing survives the process.
#[derive(Clone, Debug, Default)]
pub struct InMemoryViolationLog {
    records: Vec<ViolationRecord>,
}

impl InMemoryViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ViolationLogStore for InMemoryViolationLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        record.ensure_storable()?;
        self.records.push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<ViolationRecord>> {
        Ok(self.records.clone())
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
