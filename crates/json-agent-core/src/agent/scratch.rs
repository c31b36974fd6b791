//! Scratch files shared with path-based agents
//!
//! A [`ScratchFile`] is a uniquely named `.json` file that lives exactly as
//! long as the value owning it. Dropping it removes the file on every exit
//! path; removal failures are logged and never surfaced.

use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Indentation used when writing documents for the agent
pub const DEFAULT_INDENT: usize = 2;

/// A per-call temporary JSON file, deleted on drop
#[derive(Debug)]
pub struct ScratchFile {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl ScratchFile {
    /// Create a scratch file holding `document`, in `dir` or the system temp dir
    pub fn create(dir: Option<&Path>, document: &Value) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("json-agent-").suffix(".json");

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let path = file.path().to_path_buf();

        let scratch = Self {
            file: Some(file),
            path,
        };
        scratch.write(document, DEFAULT_INDENT)?;
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current content back as JSON
    pub fn read(&self) -> std::io::Result<Value> {
        read_json_file(&self.path)
    }

    /// Replace the content with `document`
    pub fn write(&self, document: &Value, indent: usize) -> std::io::Result<()> {
        write_json_file(&self.path, document, indent)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// Read a JSON document from `path`
pub fn read_json_file(path: &Path) -> std::io::Result<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Write `document` to `path` pretty-printed with `indent` spaces
pub fn write_json_file(path: &Path, document: &Value, indent: usize) -> std::io::Result<()> {
    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(document, &mut serializer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(&buf)?;
    file.flush()
}
