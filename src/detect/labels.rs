use std::borrow::Cow;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class labels of the PPE model the dashboard ships with, in model index order.
const PPE_LABELS: &[&str] = &[
    "Hardhat",
    "Mask",
    "NO-Hardhat",
    "NO-Mask",
    "NO-Safety Vest",
    "Person",
    "Safety Cone",
    "Safety Vest",
    "machinery",
    "vehicle",
];

/// Fixed mapping from model class index to class name.
///
/// Loaded once alongside the detector and never changed during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Label table of the bundled PPE model.
    pub fn ppe_default() -> Self {
        Self::new(PPE_LABELS.iter().copied())
    }

    /// Load a labels file: one class name per line, index = line number.
    ///
    /// Blank lines in the middle are rejected since they would shift every later index.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid labels file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let lines: Vec<&str> = raw.trim_end().lines().map(str::trim).collect();
        if lines.is_empty() || (lines.len() == 1 && lines[0].is_empty()) {
            return Err(anyhow!("labels file contains no class names"));
        }
        if let Some(index) = lines.iter().position(|line| line.is_empty()) {
            return Err(anyhow!("blank class name at index {}", index));
        }
        Ok(Self::new(lines))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// Resolve an index to a name. Unknown indices become `class_<id>`.
    pub fn resolve(&self, class_id: usize) -> Cow<'_, str> {
        match self.get(class_id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("class_{}", class_id)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::ppe_default()
    }
}
