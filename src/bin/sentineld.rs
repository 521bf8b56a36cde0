//! sentineld - PPE compliance monitor
//!
//! This daemon:
//! 1. Loads configuration (file, environment, flags)
//! 2. Builds the detector backend, failing before any source opens if the model is missing
//! 3. Opens the frame source (still image, video file, camera, stream, or stub://)
//! 4. Runs every frame through the detection adapter, logging violations to CSV
//! 5. Stops on Ctrl-C, end of stream, repeated read failures, or --max-frames

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use ppe_sentinel::{
    build_backend, open_source, BackendKind, CsvViolationLog, DetectionAdapter, Monitor,
    SentinelConfig, SourceSpec,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: image/video path, camera index or /dev/video*, rtsp:// or http(s):// URL, stub://name.
    #[arg(long)]
    source: Option<String>,
    /// Detector backend (stub|tract).
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Model artifact for model-backed detectors.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Class label file, one name per line.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Violation log CSV file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Write the latest annotated frame here.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut SentinelConfig) -> Result<()> {
        if let Some(source) = &self.source {
            cfg.source.spec = source.clone();
        }
        if let Some(backend) = self.backend {
            cfg.detector.backend = backend;
        }
        if let Some(model) = &self.model {
            cfg.detector.model_path = Some(model.clone());
        }
        if let Some(labels) = &self.labels {
            cfg.detector.labels_path = Some(labels.clone());
        }
        if let Some(log_file) = &self.log_file {
            cfg.log_path = log_file.clone();
        }
        if let Some(max_frames) = self.max_frames {
            if max_frames == 0 {
                return Err(anyhow!("--max-frames must be greater than zero"));
            }
            cfg.monitor.max_frames = Some(max_frames);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        SentinelConfig::load_from(args.config.as_deref())?
    };
    args.apply(&mut cfg)?;

    let backend = {
        let _stage = ui.stage("Load detector");
        build_backend(&cfg.detector)?
    };

    let spec = SourceSpec::parse(&cfg.source.spec)?;
    let mut source = {
        let _stage = ui.stage(&format!("Open {}", spec));
        open_source(&spec, &cfg.source)?
    };

    let store = CsvViolationLog::new(&cfg.log_path);
    let mut adapter = DetectionAdapter::new(backend, cfg.violation_rule.clone(), store);

    let monitor = Monitor::new(cfg.monitor.clone());
    let stop = monitor.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    log::info!(
        "sentineld running. source={} backend={} log={}",
        spec,
        adapter.backend().name(),
        adapter.store().path().display()
    );

    let mut progress = ui.frames(&spec.to_string());
    let snapshot = args.snapshot.as_deref();
    let summary = monitor.run(source.as_mut(), &mut adapter, |report, outcome| {
        progress.frame(report.objects, report.violations, report.processing);
        if report.violations > 0 {
            if let Some(path) = snapshot {
                if let Err(e) = outcome.annotated.save(path) {
                    log::warn!("failed to write snapshot {}: {:#}", path.display(), e);
                }
            }
        }
    })?;
    progress.finish(&summary.reason.to_string());

    if let (Some(path), Some(frame)) = (snapshot, summary.last_annotated.as_ref()) {
        frame.save(path)?;
        log::info!("latest annotated frame written to {}", path.display());
    }

    log::info!(
        "sentineld stopped ({}): {} frames, {} violations, {} read failures, {} health warnings in {:.1}s",
        summary.reason,
        summary.frames,
        summary.violations,
        summary.read_failures,
        summary.health_warnings,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}
