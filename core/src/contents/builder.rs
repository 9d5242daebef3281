//! Assembly of leaf models from catalog records and array contents

use crate::contents::catalog::ArrayRecord;
use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::lifecycle::ArrayContents;
use crate::contents::model::{Content, ContentModel, ContentType};
use crate::contents::notebook::{NotebookCodec, NBFORMAT_VERSION};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub struct ModelBuilder {
    codec: Arc<dyn NotebookCodec>,
}

impl ModelBuilder {
    pub fn new(codec: Arc<dyn NotebookCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &dyn NotebookCodec {
        self.codec.as_ref()
    }

    /// Leaf model without content
    pub fn leaf(&self, path: &str, kind: ContentType) -> ContentModel {
        let mut model = ContentModel::base(path, kind);
        if kind == ContentType::Notebook {
            model.format = Some("json".to_string());
        }
        model
    }

    /// Leaf model with content.
    ///
    /// Stored `type` metadata overrides the requested kind for files, so a
    /// notebook fetched as a file still comes back decoded. A malformed
    /// notebook is returned as-is with the validation problem in `message`.
    pub fn leaf_with_content(
        &self,
        path: &str,
        requested: ContentType,
        record: &ArrayRecord,
        contents: ArrayContents,
        format: Option<&str>,
    ) -> ContentsResult<ContentModel> {
        let metadata = &contents.metadata;

        let mut kind = requested;
        if requested == ContentType::File {
            if let Some(stored) = metadata.content_type().and_then(|t| t.parse::<ContentType>().ok()) {
                kind = stored;
            }
        }

        let mut model = self.leaf(path, kind);
        model.last_modified = record.last_accessed;
        model.writable = record.is_writable();

        if kind == ContentType::Notebook {
            if contents.is_unwritten() {
                model.content = Some(Content::Notebook(Value::Array(Vec::new())));
                return Ok(model);
            }

            let mut document = self.codec.decode(&contents.bytes, NBFORMAT_VERSION).map_err(|e| {
                ContentsError::Serialization(format!("Error decoding notebook {}: {}", path, e))
            })?;
            self.codec.mark_trusted(&mut document, path);
            if let Err(invalid) = self.codec.validate(&document) {
                warn!(path, error = %invalid, "notebook failed validation");
                model.message = Some(invalid.to_string());
            }
            model.content = Some(Content::Notebook(document));
            return Ok(model);
        }

        model.mimetype = metadata.mimetype().map(str::to_string);
        let format = metadata.format().or(format);
        let (content, format) = file_content(contents.bytes, format);
        model.content = Some(content);
        model.format = format;
        Ok(model)
    }
}

/// Text when the bytes are UTF-8 and text (or nothing) was asked for, raw
/// bytes otherwise
pub fn file_content(bytes: Vec<u8>, format: Option<&str>) -> (Content, Option<String>) {
    let bytes = match format {
        None | Some("text") => match String::from_utf8(bytes) {
            Ok(text) => return (Content::Text(text), Some("text".to_string())),
            Err(err) => err.into_bytes(),
        },
        Some(_) => bytes,
    };
    (Content::Bytes(bytes), Some("bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::notebook::JsonNotebookCodec;
    use crate::contents::storage::{ArrayMetadata, META_FILE_SIZE, META_FORMAT, META_MIMETYPE, META_TYPE};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn builder() -> ModelBuilder {
        ModelBuilder::new(Arc::new(JsonNotebookCodec::new()))
    }

    fn record(actions: &[&str]) -> ArrayRecord {
        ArrayRecord {
            name: "nb".to_string(),
            namespace: "alice".to_string(),
            last_accessed: Utc::now(),
            allowed_actions: actions.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn contents(bytes: &[u8], entries: &[(&str, Value)]) -> ArrayContents {
        let mut metadata = ArrayMetadata::new();
        for (key, value) in entries {
            metadata.insert(*key, value.clone());
        }
        ArrayContents {
            bytes: bytes.to_vec(),
            metadata,
        }
    }

    #[test]
    fn test_notebook_is_decoded_and_trusted() {
        let document = json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{"cell_type": "code", "metadata": {}, "source": "x", "outputs": []}]
        });
        let bytes = serde_json::to_vec(&document).unwrap();
        let stored = contents(&bytes, &[(META_FILE_SIZE, json!(bytes.len())), (META_TYPE, json!("notebook"))]);

        let model = builder()
            .leaf_with_content("cloud/owned/alice/nb.ipynb", ContentType::Notebook, &record(&["read"]), stored, None)
            .unwrap();

        assert_eq!(model.format.as_deref(), Some("json"));
        assert!(!model.writable);
        assert!(model.message.is_none());
        match model.content {
            Some(Content::Notebook(doc)) => assert_eq!(doc["cells"][0]["metadata"]["trusted"], json!(true)),
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_invalid_notebook_carries_message() {
        let bytes = br#"{"nbformat": 4, "nbformat_minor": 5, "metadata": {}}"#;
        let stored = contents(bytes, &[(META_FILE_SIZE, json!(bytes.len()))]);

        let model = builder()
            .leaf_with_content("nb.ipynb", ContentType::Notebook, &record(&["read", "write"]), stored, None)
            .unwrap();
        assert!(model.writable);
        assert_eq!(
            model.message.as_deref(),
            Some("Notebook validation failed: 'cells' must be an array")
        );
    }

    #[test]
    fn test_unwritten_notebook_is_empty() {
        let model = builder()
            .leaf_with_content("nb.ipynb", ContentType::Notebook, &record(&[]), ArrayContents::default(), None)
            .unwrap();
        assert_eq!(model.content, Some(Content::Notebook(json!([]))));
    }

    #[test]
    fn test_undecodable_notebook_fails() {
        let stored = contents(b"not json", &[(META_FILE_SIZE, json!(8))]);
        let err = builder()
            .leaf_with_content("nb.ipynb", ContentType::Notebook, &record(&[]), stored, None)
            .unwrap_err();
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_file_uses_stored_metadata() {
        let stored = contents(
            b"a,b",
            &[
                (META_FILE_SIZE, json!(3)),
                (META_MIMETYPE, json!("text/csv")),
                (META_FORMAT, json!("text")),
                (META_TYPE, json!("file")),
            ],
        );
        let model = builder()
            .leaf_with_content("cloud/owned/alice/data.csv", ContentType::File, &record(&["write"]), stored, None)
            .unwrap();
        assert_eq!(model.kind, ContentType::File);
        assert_eq!(model.mimetype.as_deref(), Some("text/csv"));
        assert_eq!(model.content, Some(Content::Text("a,b".to_string())));
    }

    #[test]
    fn test_file_content_formats() {
        assert_eq!(
            file_content(vec![0xff, 0x00], None),
            (Content::Bytes(vec![0xff, 0x00]), Some("bytes".to_string()))
        );
        assert_eq!(
            file_content(b"hi".to_vec(), Some("bytes")),
            (Content::Bytes(b"hi".to_vec()), Some("bytes".to_string()))
        );
    }
}
