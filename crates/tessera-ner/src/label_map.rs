//! Label ↔ id mapping read from a `label2id` JSON file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{ConfigError, Result};

pub const START_TAG: &str = "<START>";
pub const STOP_TAG: &str = "<STOP>";

/// Bidirectional label map.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    to_id: BTreeMap<String, usize>,
    to_label: HashMap<usize, String>,
}

impl LabelMap {
    /// Reads a JSON object of label → integer id.
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let to_id: BTreeMap<String, usize> =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: display.clone(),
                source,
            })?;
        if to_id.is_empty() {
            return Err(ConfigError::EmptyLabelMap { path: display });
        }
        Self::from_map(to_id, &display)
    }

    fn from_map(to_id: BTreeMap<String, usize>, path: &str) -> Result<Self> {
        let mut to_label = HashMap::with_capacity(to_id.len());
        for (label, &id) in &to_id {
            if let Some(previous) = to_label.insert(id, label.clone()) {
                return Err(ConfigError::InvalidLabelMap {
                    path: path.to_string(),
                    reason: format!("labels {previous:?} and {label:?} share id {id}"),
                });
            }
        }
        Ok(Self { to_id, to_label })
    }

    /// Adds `<START>` at max+1 and `<STOP>` at max+2 for the CRF.
    #[must_use]
    pub fn with_crf_tags(mut self) -> Self {
        let max = self.to_id.values().copied().max().unwrap_or_default();
        for (offset, tag) in [(1, START_TAG), (2, STOP_TAG)] {
            self.to_id.insert(tag.to_string(), max + offset);
            self.to_label.insert(max + offset, tag.to_string());
        }
        self
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.to_id.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.to_label.get(&id).map(String::as_str)
    }

    /// Number of labels, `<START>`/`<STOP>` included when present.
    pub fn len(&self) -> usize {
        self.to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_id.is_empty()
    }

    /// Ids of `<START>` and `<STOP>`, if the CRF tags were added.
    pub fn crf_tags(&self) -> Option<(usize, usize)> {
        Some((self.id(START_TAG)?, self.id(STOP_TAG)?))
    }
}
