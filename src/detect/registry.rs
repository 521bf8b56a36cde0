use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::LabelTable;

/// Detector backends that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Stub, BackendKind::Tract];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Stub => "stub",
            BackendKind::Tract => "tract",
        }
    }

    /// True when the backend was compiled in.
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::Stub => true,
            BackendKind::Tract => cfg!(feature = "backend-tract"),
        }
    }

    /// True when the backend cannot start without a model artifact on disk.
    pub fn requires_model(self) -> bool {
        matches!(self, BackendKind::Tract)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                anyhow!(
                    "unknown detector backend '{}' (expected one of: stub, tract)",
                    value
                )
            })
    }
}

/// Construct the configured backend.
///
/// A missing model artifact is reported here, before any frame source is opened,
/// and before a missing backend feature.
pub fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let kind = settings.backend;
    if kind.requires_model() {
        let model_path = settings
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("detector backend '{}' requires a model path", kind))?;
        if !model_path.exists() {
            return Err(anyhow!("model file not found at {}", model_path.display()));
        }
    }
    if !kind.is_available() {
        return Err(anyhow!(
            "detector backend '{}' requires the backend-{} feature",
            kind,
            kind
        ));
    }

    let labels = match &settings.labels_path {
        Some(path) => LabelTable::load(path)?,
        None => LabelTable::ppe_default(),
    };

    let mut backend: Box<dyn DetectorBackend> = match kind {
        BackendKind::Stub => Box::new(StubBackend::with_labels(labels)),
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("detector backend 'tract' requires a model path"))?;
            Box::new(
                crate::detect::backends::TractBackend::new(model_path, labels, settings.input_size)?
                    .with_thresholds(settings.confidence_threshold, settings.iou_threshold),
            )
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => {
            return Err(anyhow!("detector backend 'tract' requires the backend-tract feature"))
        }
    };

    backend.warm_up()?;
    log::info!(
        "detector backend '{}' ready ({} classes)",
        backend.name(),
        backend.labels().len()
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: BackendKind) -> DetectorSettings {
        DetectorSettings {
            backend: kind,
            ..DetectorSettings::default()
        }
    }

    #[test]
    fn parses_backend_names() -> Result<()> {
        assert_eq!("stub".parse::<BackendKind>()?, BackendKind::Stub);
        assert_eq!(" TRACT ".parse::<BackendKind>()?, BackendKind::Tract);
        assert!("opencv".parse::<BackendKind>().is_err());
        Ok(())
    }

    #[test]
    fn stub_backend_builds_without_model() -> Result<()> {
        let backend = build_backend(&settings(BackendKind::Stub))?;
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.labels(), &LabelTable::ppe_default());
        Ok(())
    }

    #[test]
    fn stub_backend_uses_labels_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let labels = dir.path().join("labels.txt");
        std::fs::write(&labels, "Helmet\nNO-Helmet\n")?;
        let backend = build_backend(&DetectorSettings {
            labels_path: Some(labels),
            ..settings(BackendKind::Stub)
        })?;
        assert_eq!(backend.labels().len(), 2);
        Ok(())
    }

    #[test]
    fn model_backend_fails_without_artifact() {
        let err = build_backend(&DetectorSettings {
            model_path: Some("/nonexistent/best.onnx".into()),
            ..settings(BackendKind::Tract)
        })
        .err()
        .expect("missing model");
        assert!(err.to_string().contains("model file not found"), "{err}");
    }

    #[test]
    fn model_backend_requires_model_path() {
        let err = build_backend(&DetectorSettings {
            model_path: None,
            ..settings(BackendKind::Tract)
        })
        .err()
        .expect("missing model path");
        assert!(err.to_string().contains("requires a model path"), "{err}");
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn present_model_without_feature_names_the_feature() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let model = dir.path().join("best.onnx");
        std::fs::write(&model, b"onnx")?;
        let err = build_backend(&DetectorSettings {
            model_path: Some(model),
            ..settings(BackendKind::Tract)
        })
        .err()
        .expect("feature error");
        assert!(err.to_string().contains("backend-tract"), "{err}");
        Ok(())
    }
}
