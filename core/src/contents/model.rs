//! Uniform file / notebook / directory records consumed by the frontend

use crate::contents::error::{ContentsError, ContentsResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Timestamp reported when the real one is unknown (one day after the epoch)
pub fn dummy_created_date() -> DateTime<Utc> {
    Utc.timestamp_opt(86_400, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub const NOTEBOOK_MIME: &str = "application/x-ipynb+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    File,
    Notebook,
    Directory,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::File => "file",
            ContentType::Notebook => "notebook",
            ContentType::Directory => "directory",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ContentsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ContentType::File),
            "notebook" => Ok(ContentType::Notebook),
            "directory" => Ok(ContentType::Directory),
            other => Err(ContentsError::bad_request(format!(
                "Unhandled contents type: {}",
                other
            ))),
        }
    }
}

/// Payload of a [`ContentModel`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Directory(Vec<ContentModel>),
    Notebook(Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// Response unit for every get / save
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentModel {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub writable: bool,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub content: Option<Content>,
    pub format: Option<String>,
    pub mimetype: Option<String>,
    /// Advisory text, e.g. a notebook validation warning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContentModel {
    /// Leaf model with default fields: writable, dummy timestamps, no content
    pub fn base(path: &str, kind: ContentType) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            name,
            path: path.to_string(),
            kind,
            writable: true,
            created: dummy_created_date(),
            last_modified: dummy_created_date(),
            content: None,
            format: None,
            mimetype: None,
            message: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        let mut model = Self::base(path, ContentType::Directory);
        model.format = Some("json".to_string());
        model
    }

    /// Attach a directory listing
    pub fn with_children(mut self, children: Vec<ContentModel>) -> Self {
        self.format = Some("json".to_string());
        self.content = Some(Content::Directory(children));
        self
    }

    pub fn children(&self) -> Option<&[ContentModel]> {
        match &self.content {
            Some(Content::Directory(children)) => Some(children),
            _ => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ContentType::Directory
    }
}

/// Model submitted by the frontend on save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveModel {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<Value>,
    pub format: Option<String>,
    pub mimetype: Option<String>,
}

impl SaveModel {
    pub fn notebook(content: Value) -> Self {
        Self {
            kind: Some(ContentType::Notebook.as_str().to_string()),
            content: Some(content),
            format: Some("json".to_string()),
            mimetype: None,
        }
    }

    pub fn text_file(text: impl Into<String>, mimetype: Option<String>) -> Self {
        Self {
            kind: Some(ContentType::File.as_str().to_string()),
            content: Some(Value::String(text.into())),
            format: Some("text".to_string()),
            mimetype,
        }
    }

    /// Check the fields every save needs, before any backend call
    pub fn validate(&self) -> ContentsResult<ContentType> {
        let kind: ContentType = self
            .kind
            .as_deref()
            .ok_or_else(|| ContentsError::bad_request("No file type provided"))?
            .parse()?;

        if self.content.is_none() && kind != ContentType::Directory {
            return Err(ContentsError::bad_request("No file content provided"));
        }

        Ok(kind)
    }

    /// A notebook is saved for the first time when the frontend has not yet
    /// filled in its kernel language info
    pub fn is_new_notebook(&self) -> bool {
        self.content
            .as_ref()
            .and_then(|content| content.get("metadata"))
            .and_then(|metadata| metadata.get("language_info"))
            .is_none()
    }

    /// Raw bytes of a file save: text is stored as UTF-8, an array of
    /// numbers as the bytes themselves
    pub fn file_bytes(&self) -> ContentsResult<Vec<u8>> {
        match &self.content {
            Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|byte| u8::try_from(byte).ok())
                        .ok_or_else(|| ContentsError::bad_request("File content must be text or bytes"))
                })
                .collect(),
            Some(_) => Err(ContentsError::bad_request("File content must be text or bytes")),
            None => Err(ContentsError::bad_request("No file content provided")),
        }
    }
}

/// Checkpoint record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointModel {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}
