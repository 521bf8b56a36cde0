mod backend;
pub mod backends;
mod labels;
mod registry;
mod result;
mod rule;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, StubBackend};
pub use labels::LabelTable;
pub use registry::{build_backend, BackendKind};
pub use result::{BoundingBox, Detection, RawDetection};
pub use rule::ViolationRule;
