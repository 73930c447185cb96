//! Line-oriented result writers for analysis artifacts.
//!
//! Every result value renders to a single record line via [`Record`]. A
//! [`WriterFactory`] turns an artifact path into a [`RecordWriter`]; the
//! default [`TextWriterFactory`] writes newline-terminated records to a
//! temporary file and renames it into place on [`RecordWriter::finish`], so
//! observers scanning the output directory never see a half-written artifact.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A value that can be rendered as one line of an analysis artifact.
///
/// String results render verbatim, one line each, in production order.
pub trait Record: Send + 'static {
    /// Render this value as a single record line (without the newline).
    fn to_record(&self) -> String;
}

impl Record for String {
    fn to_record(&self) -> String {
        self.clone()
    }
}

impl Record for &'static str {
    fn to_record(&self) -> String {
        (*self).to_string()
    }
}

impl Record for () {
    fn to_record(&self) -> String {
        String::new()
    }
}

impl<T: Record + Send + Sync> Record for Arc<T> {
    fn to_record(&self) -> String {
        self.as_ref().to_record()
    }
}

/// A sink for record lines backing one output artifact.
pub trait RecordWriter: Send {
    /// Append one record line.
    fn write_record(&mut self, record: &str) -> Result<()>;

    /// Flush and publish the artifact, returning its final path.
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

/// Creates [`RecordWriter`]s for artifact paths.
pub trait WriterFactory: Send + Sync {
    /// File extension of the produced artifacts (without the dot).
    fn extension(&self) -> &str;

    /// Open a writer for the artifact at `path`.
    fn create(&self, path: &Path) -> Result<Box<dyn RecordWriter>>;
}

/// Plain-text writer factory: one record per line, `.txt` artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextWriterFactory;

impl WriterFactory for TextWriterFactory {
    fn extension(&self) -> &str {
        "txt"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn RecordWriter>> {
        Ok(Box::new(TextWriter::create(path)?))
    }
}

/// Buffered line writer that publishes atomically via rename.
struct TextWriter {
    out: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl TextWriter {
    fn create(path: &Path) -> Result<Self> {
        let tmp_path = path.with_extension("part");
        let file = File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;

        Ok(Self {
            out: BufWriter::new(file),
            tmp_path,
            final_path: path.to_path_buf(),
        })
    }
}

impl RecordWriter for TextWriter {
    fn write_record(&mut self, record: &str) -> Result<()> {
        self.out.write_all(record.as_bytes())?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        let mut inner = self.out;
        inner.flush()?;
        drop(inner);

        std::fs::rename(&self.tmp_path, &self.final_path)
            .with_context(|| format!("failed to publish {}", self.final_path.display()))?;
        Ok(self.final_path)
    }
}

/// Build the path for an artifact named `<stage>_<suffix>_<timestamp>.<ext>`.
///
/// If the path already exists (two artifacts within the same second), a
/// numeric suffix is appended until the name is free.
pub fn artifact_path(dir: &Path, stage: &str, suffix: &str, ext: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let base = format!("{}_{}_{}", stage, suffix, timestamp);

    let mut path = dir.join(format!("{}.{}", base, ext));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.{}", base, counter, ext));
        counter += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_string_record_verbatim() {
        let value = "Result1".to_string();
        assert_eq!(value.to_record(), "Result1");
    }

    #[test]
    fn test_arc_record_delegates() {
        let value = Arc::new("Result2".to_string());
        assert_eq!(value.to_record(), "Result2");
    }

    #[test]
    fn test_text_writer_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        let factory = TextWriterFactory;
        let mut writer = factory.create(&path).unwrap();
        writer.write_record("Result1").unwrap();
        writer.write_record("Result2").unwrap();
        let published = writer.finish().unwrap();

        assert_eq!(published, path);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Result1\nResult2\n");
    }

    #[test]
    fn test_text_writer_atomic_publish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        let factory = TextWriterFactory;
        let mut writer = factory.create(&path).unwrap();
        writer.write_record("Result1").unwrap();

        // Not visible until finish().
        assert!(!path.exists());
        writer.finish().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_artifact_path_shape() {
        let dir = TempDir::new().unwrap();
        let path = artifact_path(dir.path(), "Simple", "result", "txt");

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("Simple_result_"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_artifact_path_collision() {
        let dir = TempDir::new().unwrap();
        let first = artifact_path(dir.path(), "Simple", "result", "txt");
        std::fs::write(&first, "x").unwrap();

        let second = artifact_path(dir.path(), "Simple", "result", "txt");
        assert_ne!(first, second);
    }
}
