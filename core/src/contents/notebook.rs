//! Notebook-format codec
//!
//! Decoding, structural validation and trust marking of notebook documents.
//! Validation problems are advisory: they travel with the response as a
//! message and never abort a read or a save.

use serde_json::Value;
use thiserror::Error;

/// Notebook format major version produced and accepted
pub const NBFORMAT_VERSION: u64 = 4;

/// A decoded notebook document
pub type NotebookDocument = Value;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notebook validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("notebook is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("notebook is not valid JSON: {0}")]
    Json(String),

    #[error("unsupported notebook format version {found}, expected {expected}")]
    Version { found: u64, expected: u64 },
}

/// Notebook-format collaborator
pub trait NotebookCodec: Send + Sync {
    fn decode(&self, bytes: &[u8], version: u64) -> Result<NotebookDocument, DecodeError>;

    fn validate(&self, document: &NotebookDocument) -> Result<(), ValidationError>;

    /// Mark the document's cells trusted for the requesting path
    fn mark_trusted(&self, document: &mut NotebookDocument, path: &str);
}

/// JSON notebook codec for nbformat 4 documents
#[derive(Debug, Clone, Default)]
pub struct JsonNotebookCodec;

impl JsonNotebookCodec {
    pub fn new() -> Self {
        Self
    }
}

impl NotebookCodec for JsonNotebookCodec {
    fn decode(&self, bytes: &[u8], version: u64) -> Result<NotebookDocument, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))?;
        let document: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

        match document.get("nbformat").and_then(Value::as_u64) {
            Some(found) if found != version => Err(DecodeError::Version {
                found,
                expected: version,
            }),
            _ => Ok(document),
        }
    }

    fn validate(&self, document: &NotebookDocument) -> Result<(), ValidationError> {
        let object = document
            .as_object()
            .ok_or_else(|| ValidationError("notebook must be a JSON object".to_string()))?;

        for key in ["nbformat", "nbformat_minor"] {
            if !object.get(key).map(Value::is_u64).unwrap_or(false) {
                return Err(ValidationError(format!("'{}' must be an integer", key)));
            }
        }

        if !object.get("metadata").map(Value::is_object).unwrap_or(false) {
            return Err(ValidationError("'metadata' must be an object".to_string()));
        }

        let cells = object
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError("'cells' must be an array".to_string()))?;

        for (index, cell) in cells.iter().enumerate() {
            let cell_type = cell.get("cell_type").and_then(Value::as_str);
            if !matches!(cell_type, Some("code" | "markdown" | "raw")) {
                return Err(ValidationError(format!("cell {} has no valid 'cell_type'", index)));
            }
            if cell.get("source").is_none() {
                return Err(ValidationError(format!("cell {} has no 'source'", index)));
            }
        }

        Ok(())
    }

    fn mark_trusted(&self, document: &mut NotebookDocument, path: &str) {
        let Some(cells) = document.get_mut("cells").and_then(Value::as_array_mut) else {
            return;
        };

        for cell in cells.iter_mut() {
            if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
                continue;
            }
            if let Some(cell) = cell.as_object_mut() {
                let metadata = cell
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(metadata) = metadata.as_object_mut() {
                    metadata.insert("trusted".to_string(), Value::Bool(true));
                }
            }
        }
        tracing::trace!(path, "marked notebook cells trusted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "nbformat": 4,
            "nbformat_minor": 5,
            "metadata": {},
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": "# Title"},
                {"cell_type": "code", "metadata": {}, "source": "1 + 1", "outputs": [], "execution_count": null}
            ]
        })
    }

    #[test]
    fn test_decode_and_validate() {
        let codec = JsonNotebookCodec::new();
        let bytes = serde_json::to_vec(&sample()).unwrap();
        let document = codec.decode(&bytes, NBFORMAT_VERSION).unwrap();
        assert!(codec.validate(&document).is_ok());
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let codec = JsonNotebookCodec::new();
        let bytes = br#"{"nbformat": 3, "nbformat_minor": 0, "metadata": {}, "worksheets": []}"#;
        let err = codec.decode(bytes, NBFORMAT_VERSION).unwrap_err();
        assert_eq!(err, DecodeError::Version { found: 3, expected: 4 });

        assert!(matches!(codec.decode(b"not json", 4), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_validate_reports_structure() {
        let codec = JsonNotebookCodec::new();
        let mut broken = sample();
        broken["cells"][1].as_object_mut().unwrap().remove("source");

        let err = codec.validate(&broken).unwrap_err();
        assert_eq!(err.0, "cell 1 has no 'source'");

        let err = codec.validate(&json!({"nbformat": 4, "nbformat_minor": 5, "metadata": {}})).unwrap_err();
        assert_eq!(err.0, "'cells' must be an array");
    }

    #[test]
    fn test_mark_trusted_only_code_cells() {
        let codec = JsonNotebookCodec::new();
        let mut document = sample();
        codec.mark_trusted(&mut document, "cloud/owned/alice/nb.ipynb");

        assert_eq!(document["cells"][1]["metadata"]["trusted"], json!(true));
        assert!(document["cells"][0]["metadata"].get("trusted").is_none());
    }
}
