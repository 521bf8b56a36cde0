use anyhow::Result;

use crate::detect::{LabelTable, RawDetection};
use crate::frame::Frame;

/// Object detector backend.
///
/// A backend is constructed once at startup and owned by the detection adapter.
/// Its label table is fixed for the life of the backend.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class index to class name mapping for this model.
    fn labels(&self) -> &LabelTable;

    /// Run detection on one frame.
    ///
    /// Errors are inference failures. They are not retried by the caller.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
