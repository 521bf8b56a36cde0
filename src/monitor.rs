//! Frame loop: pull a frame, run the adapter, report, repeat.
//!
//! One frame is fully processed before the next is read. The stop flag is checked
//! once per iteration, so in-flight inference always completes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::adapter::{DetectionAdapter, FrameOutcome};
use crate::config::MonitorSettings;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::violation_log::ViolationLogStore;

/// Per-frame metrics handed to the caller after each processed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// 1-based index of the processed frame in this session.
    pub index: u64,
    /// Time spent in detection, logging, and overlay.
    pub processing: Duration,
    /// Detected objects on this frame.
    pub objects: usize,
    /// Violations on this frame (not cumulative).
    pub violations: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was raised.
    Stopped,
    /// The source reported end of stream.
    EndOfStream,
    /// Consecutive read failures exceeded the configured limit.
    StreamLost,
    /// `max_frames` frames were processed.
    FrameLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Stopped => "stopped",
            StopReason::EndOfStream => "end of stream",
            StopReason::StreamLost => "stream lost",
            StopReason::FrameLimit => "frame limit reached",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub frames: u64,
    pub violations: u64,
    /// Failed reads over the whole session, not only the final run of failures.
    pub read_failures: u64,
    /// Times the source went from healthy to unhealthy.
    pub health_warnings: u64,
    pub elapsed: Duration,
    /// Annotated copy of the last processed frame.
    pub last_annotated: Option<Frame>,
}

pub struct Monitor {
    settings: MonitorSettings,
    stop: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag (e.g. one set from a signal handler).
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run until stopped, exhausted, lost, or at the frame limit.
    ///
    /// Read failures are tolerated up to `max_read_failures` in a row. An
    /// inference or log failure ends the run with that error. Source health is
    /// checked after every read and each transition is logged.
    pub fn run<S, F>(
        &self,
        source: &mut dyn FrameSource,
        adapter: &mut DetectionAdapter<S>,
        mut on_frame: F,
    ) -> Result<SessionSummary>
    where
        S: ViolationLogStore,
        F: FnMut(&FrameReport, &FrameOutcome),
    {
        let started = Instant::now();
        let mut frames = 0u64;
        let mut violations = 0u64;
        let mut read_failures = 0u64;
        let mut consecutive_failures = 0u32;
        let mut health_warnings = 0u64;
        let mut healthy = true;
        let mut last_annotated = None;

        let reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break StopReason::Stopped;
            }
            if self.settings.max_frames.is_some_and(|max| frames >= max) {
                break StopReason::FrameLimit;
            }

            let read = source.next_frame();
            if source.is_healthy() != healthy {
                healthy = !healthy;
                let origin = source.stats().origin;
                if healthy {
                    log::info!("source {} is healthy again", origin);
                } else {
                    health_warnings += 1;
                    log::warn!("source {} reports unhealthy", origin);
                }
            }

            let frame = match read {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    frame
                }
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    consecutive_failures += 1;
                    read_failures += 1;
                    log::warn!(
                        "frame read failed ({}/{}): {:#}",
                        consecutive_failures,
                        self.settings.max_read_failures,
                        err
                    );
                    if consecutive_failures > self.settings.max_read_failures {
                        break StopReason::StreamLost;
                    }
                    self.pause();
                    continue;
                }
            };

            let frame_started = Instant::now();
            let outcome = adapter.process_frame(&frame)?;
            frames += 1;
            violations += outcome.violation_count as u64;

            let report = FrameReport {
                index: frames,
                processing: frame_started.elapsed(),
                objects: outcome.detections.len(),
                violations: outcome.violation_count,
            };
            log::debug!(
                "frame {}: {} objects, {} violations, {:.1} ms",
                report.index,
                report.objects,
                report.violations,
                report.processing.as_secs_f64() * 1000.0
            );
            on_frame(&report, &outcome);
            last_annotated = Some(outcome.annotated);

            self.pause();
        };

        let summary = SessionSummary {
            reason,
            frames,
            violations,
            read_failures,
            health_warnings,
            elapsed: started.elapsed(),
            last_annotated,
        };
        let stats = source.stats();
        log::info!(
            "session ended ({}): {} frames, {} violations, {} read failures, {} health warnings from {}",
            summary.reason,
            summary.frames,
            summary.violations,
            summary.read_failures,
            summary.health_warnings,
            stats.origin
        );
        Ok(summary)
    }

    fn pause(&self) {
        if !self.settings.frame_delay.is_zero() {
            std::thread::sleep(self.settings.frame_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LabelTable, ScriptedBackend, ViolationRule};
    use crate::ingest::ScriptedSource;
    use crate::violation_log::InMemoryViolationLog;

    fn settings(max_read_failures: u32) -> MonitorSettings {
        MonitorSettings {
            max_read_failures,
            frame_delay: Duration::ZERO,
            max_frames: None,
        }
    }

    fn frame() -> Frame {
        Frame::filled(16, 16, [10, 10, 10]).unwrap()
    }

    fn adapter(backend: ScriptedBackend) -> DetectionAdapter<InMemoryViolationLog> {
        DetectionAdapter::new(
            Box::new(backend),
            ViolationRule::default(),
            InMemoryViolationLog::new(),
        )
    }

    fn labels() -> LabelTable {
        LabelTable::new(["Helmet", "NO-Helmet", "NO-Mask"])
    }

    #[test]
    fn stops_after_limit_plus_one_consecutive_failures() -> Result<()> {
        let mut source = ScriptedSource::new().then_failures(10).then_frame(frame());
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let summary = Monitor::new(settings(3)).run(&mut source, &mut adapter, |_, _| {})?;

        assert_eq!(summary.reason, StopReason::StreamLost);
        assert_eq!(summary.read_failures, 4);
        assert_eq!(summary.frames, 0);
        assert_eq!(source.reads(), 4);
        Ok(())
    }

    #[test]
    fn successful_read_resets_failure_counter() -> Result<()> {
        let mut source = ScriptedSource::new()
            .then_failures(3)
            .then_frame(frame())
            .then_failures(3)
            .then_frame(frame());
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let summary = Monitor::new(settings(3)).run(&mut source, &mut adapter, |_, _| {})?;

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.read_failures, 6);
        Ok(())
    }

    #[test]
    fn raised_stop_flag_prevents_reading() -> Result<()> {
        let mut source = ScriptedSource::new().then_frames(&frame(), 5);
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let monitor = Monitor::new(settings(10));
        monitor.stop_handle().store(true, Ordering::SeqCst);

        let summary = monitor.run(&mut source, &mut adapter, |_, _| {})?;
        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(source.reads(), 0);
        Ok(())
    }

    #[test]
    fn stop_flag_set_mid_run_finishes_current_frame() -> Result<()> {
        let mut source = ScriptedSource::new().then_frames(&frame(), 5);
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let monitor = Monitor::new(settings(10));
        let stop = monitor.stop_handle();

        let summary = monitor.run(&mut source, &mut adapter, |report, _| {
            if report.index == 2 {
                stop.store(true, Ordering::SeqCst);
            }
        })?;
        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.frames, 2);
        Ok(())
    }

    #[test]
    fn reports_per_frame_violation_counts() -> Result<()> {
        let backend = ScriptedBackend::new(labels())
            .then_detect_named(&[("NO-Helmet", 0.8), ("NO-Mask", 0.7)])
            .then_detect_named(&[("Helmet", 0.9)])
            .then_detect_named(&[("NO-Mask", 0.6)]);
        let mut source = ScriptedSource::new().then_frames(&frame(), 3);
        let mut adapter = adapter(backend);
        let mut per_frame = Vec::new();

        let summary = Monitor::new(settings(10)).run(&mut source, &mut adapter, |report, _| {
            per_frame.push((report.objects, report.violations));
        })?;

        assert_eq!(per_frame, vec![(2, 2), (1, 0), (1, 1)]);
        assert_eq!(summary.violations, 3);
        assert_eq!(adapter.store().len(), 3);
        assert!(summary.last_annotated.is_some());
        Ok(())
    }

    #[test]
    fn inference_failure_ends_run_with_error() {
        let backend = ScriptedBackend::new(labels())
            .then_detect(Vec::new())
            .then_fail("accelerator lost");
        let mut source = ScriptedSource::new().then_frames(&frame(), 3);
        let mut adapter = adapter(backend);

        let err = Monitor::new(settings(10))
            .run(&mut source, &mut adapter, |_, _| {})
            .unwrap_err();
        assert!(err.to_string().contains("accelerator lost"));
        assert_eq!(source.reads(), 2);
    }

    #[test]
    fn health_transitions_are_counted_once_each() -> Result<()> {
        let mut source = ScriptedSource::new()
            .then_frame(frame())
            .then_unhealthy()
            .then_failures(2)
            .then_frame(frame())
            .then_healthy()
            .then_frame(frame())
            .then_unhealthy()
            .then_frame(frame());
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let summary = Monitor::new(settings(3)).run(&mut source, &mut adapter, |_, _| {})?;

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.read_failures, 2);
        assert_eq!(summary.health_warnings, 2);
        Ok(())
    }

    #[test]
    fn healthy_source_raises_no_warnings() -> Result<()> {
        let mut source = ScriptedSource::new().then_frames(&frame(), 3);
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let summary = Monitor::new(settings(3)).run(&mut source, &mut adapter, |_, _| {})?;
        assert_eq!(summary.health_warnings, 0);
        Ok(())
    }

    #[test]
    fn frame_limit_caps_session() -> Result<()> {
        let mut source = ScriptedSource::new().then_frames(&frame(), 10);
        let mut adapter = adapter(ScriptedBackend::new(labels()));
        let summary = Monitor::new(MonitorSettings {
            max_frames: Some(4),
            ..settings(10)
        })
        .run(&mut source, &mut adapter, |_, _| {})?;

        assert_eq!(summary.reason, StopReason::FrameLimit);
        assert_eq!(summary.frames, 4);
        Ok(())
    }
}
