//! Loading raw API documents from disk or memory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::document::RawDocument;
use super::error::SchemaError;

/// Source of raw, unresolved documents addressed by location.
///
/// The resolver asks the loader for every external document a `$ref`
/// points at, so implementations must be safe to call repeatedly.
pub trait DocumentLoader: Send + Sync {
    /// Loads and parses the document at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`], [`SchemaError::Io`] or
    /// [`SchemaError::Parse`] when the document cannot be produced.
    fn load(&self, location: &str) -> Result<RawDocument, SchemaError>;
}

/// Reads documents from the local filesystem.
///
/// `.json` files are parsed as JSON; everything else as YAML.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load(&self, location: &str) -> Result<RawDocument, SchemaError> {
        let text = std::fs::read_to_string(location).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SchemaError::NotFound {
                    location: location.to_string(),
                }
            } else {
                SchemaError::Io {
                    location: location.to_string(),
                    source,
                }
            }
        })?;
        debug!(location, bytes = text.len(), "read API document");

        let is_json = Path::new(location)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            serde_json::from_str(&text).map_err(|e| SchemaError::Parse {
                location: location.to_string(),
                message: e.to_string(),
            })?
        } else {
            parse_yaml(location, &text)?
        };
        Ok(RawDocument::new(location, content))
    }
}

/// Serves documents from an in-memory map. Locations are matched verbatim.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, Value>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the document at `location`.
    #[must_use]
    pub fn with(mut self, location: impl Into<String>, content: Value) -> Self {
        self.documents.insert(location.into(), content);
        self
    }
}

impl DocumentLoader for MemoryLoader {
    fn load(&self, location: &str) -> Result<RawDocument, SchemaError> {
        self.documents
            .get(location)
            .map(|content| RawDocument::new(location, content.clone()))
            .ok_or_else(|| SchemaError::NotFound {
                location: location.to_string(),
            })
    }
}

/// Parses YAML text into a JSON value.
///
/// Goes through `serde_yaml::Value` first so that non-string mapping keys
/// (such as unquoted response codes) become JSON object keys.
///
/// # Errors
///
/// Returns [`SchemaError::Parse`] on malformed YAML or keys that cannot be
/// represented in JSON.
pub fn parse_yaml(location: &str, text: &str) -> Result<Value, SchemaError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| SchemaError::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })?;
    serde_json::to_value(yaml).map_err(|e| SchemaError::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })
}

/// Resolves `relative` against the directory containing `base`.
///
/// Absolute paths are returned unchanged. `.` and `..` segments are folded
/// lexically so the same file always maps to the same location key.
pub(crate) fn join_location(base: &str, relative: &str) -> String {
    let relative_path = Path::new(relative);
    if relative_path.is_absolute() {
        return relative.to_string();
    }
    let parent = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    normalize(&parent.join(relative_path))
        .to_string_lossy()
        .into_owned()
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
