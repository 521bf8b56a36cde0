use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::{ViolationLogStore, ViolationRecord};

/// Cloneable handle that serializes access to one store.
///
/// Every clone writes through the same mutex, so appends from several frame loops
/// never interleave inside the backing file.
pub struct SharedViolationLog<S> {
    inner: Arc<Mutex<S>>,
}

impl<S: ViolationLogStore> SharedViolationLog<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("violation log lock poisoned"))
    }
}

impl<S> Clone for SharedViolationLog<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ViolationLogStore> ViolationLogStore for SharedViolationLog<S> {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        self.lock()?.append(record)
    }

    fn read_all(&self) -> Result<Vec<ViolationRecord>> {
        self.lock()?.read_all()
    }

    fn clear(&mut self) -> Result<()> {
        self.lock()?.clear()
    }

    fn reset(&mut self) -> Result<()> {
        self.lock()?.reset()
    }

    fn read_all_or_reset(&mut self) -> Result<Vec<ViolationRecord>> {
        self.lock()?.read_all_or_reset()
    }
}
