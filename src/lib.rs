//! PPE Sentinel
//!
//! Watches a camera, video, stream, or still image for personal protective
//! equipment violations and keeps an append-only log of every one it sees.
//!
//! # Architecture
//!
//! A frame source hands frames, one at a time, to the detection adapter. The
//! adapter runs the detector once per frame, resolves class names, classifies
//! each detection with the active violation rule, and appends one record per
//! violation to the log store. Per-frame counts flow back to the monitor.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames, overlay rendering, snapshots
//! - `detect`: detector backends, label table, violation rule
//! - `adapter`: the per-frame detection pipeline
//! - `violation_log`: CSV-backed violation log with destructive self-heal
//! - `ingest`: frame sources (still image, video file, camera, stream, synthetic)
//! - `monitor`: the frame loop
//! - `config`: file and environment configuration

pub mod adapter;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod violation_log;

pub use adapter::{DetectionAdapter, FrameOutcome};
pub use config::{DetectorSettings, MonitorSettings, SentinelConfig, SourceSettings};
pub use detect::{
    build_backend, BackendKind, BoundingBox, Detection, DetectorBackend, LabelTable,
    RawDetection, ScriptedBackend, StubBackend, ViolationRule,
};
pub use frame::Frame;
pub use ingest::{file::FileConfig, stream::StreamConfig};
pub use ingest::{open_source, FrameSource, SourceSpec, SourceStats};
pub use ingest::{ScriptedSource, StillImageSource, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{v4l2::V4l2Config, v4l2::V4l2Source};
pub use monitor::{FrameReport, Monitor, SessionSummary, StopReason};
pub use violation_log::{
    CsvViolationLog, InMemoryViolationLog, SharedViolationLog, ViolationLogStore,
    ViolationRecord,
};
