//! The build model: which files are compiled under which condition.

use crate::writer::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maps source files to the presence condition under which they are built.
///
/// Conditions are opaque strings to the pipeline core; their structure is the
/// extractor's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildModel {
    /// Presence condition per file, relative to the source tree.
    pub file_conditions: BTreeMap<PathBuf, String>,
}

impl BuildModel {
    /// Create an empty build model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presence condition for a file.
    pub fn insert(&mut self, file: impl Into<PathBuf>, condition: impl Into<String>) {
        self.file_conditions.insert(file.into(), condition.into());
    }

    /// Look up the presence condition for a file.
    pub fn condition_of(&self, file: &Path) -> Option<&str> {
        self.file_conditions.get(file).map(String::as_str)
    }

    /// Number of files in the model.
    pub fn len(&self) -> usize {
        self.file_conditions.len()
    }

    /// Whether the model has no files.
    pub fn is_empty(&self) -> bool {
        self.file_conditions.is_empty()
    }
}

impl Record for BuildModel {
    fn to_record(&self) -> String {
        format!("BuildModel with {} files", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut model = BuildModel::new();
        model.insert("drivers/usb/core.c", "CONFIG_USB");

        assert_eq!(model.len(), 1);
        assert_eq!(
            model.condition_of(Path::new("drivers/usb/core.c")),
            Some("CONFIG_USB")
        );
        assert_eq!(model.condition_of(Path::new("missing.c")), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut model = BuildModel::new();
        model.insert("a.c", "CONFIG_A");
        model.insert("b.c", "CONFIG_B && CONFIG_C");

        let json = serde_json::to_string(&model).unwrap();
        let back: BuildModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
