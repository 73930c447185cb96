//! The code model: one parsed source file per code-extraction target.

use crate::writer::Record;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A code fragment with its presence condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeElement {
    /// Kind of element, e.g. `function` or `block`.
    pub kind: String,

    /// Condition under which this element is compiled.
    pub condition: String,

    /// First line of the element in the source file.
    pub line_start: usize,

    /// Last line of the element in the source file.
    pub line_end: usize,
}

/// One source file of the code model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path of the file, relative to the source tree.
    pub path: PathBuf,

    /// Top-level code elements found in the file.
    #[serde(default)]
    pub elements: Vec<CodeElement>,
}

impl SourceFile {
    /// Create a source file with no elements.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            elements: Vec::new(),
        }
    }

    /// Number of top-level elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the file has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Record for SourceFile {
    fn to_record(&self) -> String {
        format!("{} ({} elements)", self.path.display(), self.len())
    }
}
