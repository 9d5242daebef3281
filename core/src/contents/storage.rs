//! Backend array store interface
//!
//! Each leaf is backed by a one-dimensional sparse array of bytes indexed by
//! position, plus a small metadata map. The store is addressed by
//! [`ArrayUri`] once an array is registered, and by [`StorageLocation`] when
//! it is first created.

use crate::contents::error::StorageError;
use crate::contents::resolver::{ArrayUri, StorageLocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const META_FILE_SIZE: &str = "file_size";
pub const META_MIMETYPE: &str = "mimetype";
pub const META_FORMAT: &str = "format";
pub const META_TYPE: &str = "type";

/// Schema every notebook array is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub sparse: bool,
    pub dimension: Dimension,
    pub attribute: Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub domain: (u64, u64),
    pub tile: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub dtype: String,
    pub filters: Vec<String>,
}

impl ArraySchema {
    /// 1-D sparse byte array: `position` over `[0, u64::MAX - 1025]` with
    /// 1024-byte tiles, one zstd-filtered `uint8` attribute `contents`
    pub fn notebook() -> Self {
        Self {
            sparse: true,
            dimension: Dimension {
                name: "position".to_string(),
                domain: (0, u64::MAX - 1025),
                tile: 1024,
            },
            attribute: Attribute {
                name: "contents".to_string(),
                dtype: "uint8".to_string(),
                filters: vec!["zstd".to_string()],
            },
        }
    }
}

/// Metadata map of one array, with typed access to the recognised keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayMetadata(BTreeMap<String, Value>);

impl ArrayMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge `other` over `self`; keys absent from `other` are kept
    pub fn merge(&mut self, other: ArrayMetadata) {
        self.0.extend(other.0);
    }

    /// Absent means nothing has been written yet
    pub fn file_size(&self) -> Option<u64> {
        self.0.get(META_FILE_SIZE).and_then(Value::as_u64)
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.str_value(META_MIMETYPE)
    }

    pub fn format(&self) -> Option<&str> {
        self.str_value(META_FORMAT)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.str_value(META_TYPE)
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Scoped handle on one open array.
///
/// Callers must [`close`](ArrayHandle::close) the handle on every exit path.
#[async_trait]
pub trait ArrayHandle: Send {
    /// Bytes at positions `[start, end)`
    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` at positions `[0, bytes.len())`
    async fn write_range(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    async fn metadata(&mut self) -> Result<ArrayMetadata, StorageError>;

    /// Set the given keys, leaving all other keys untouched
    async fn set_metadata(&mut self, metadata: ArrayMetadata) -> Result<(), StorageError>;

    async fn close(&mut self) -> Result<(), StorageError>;
}

/// Backend array store collaborator
#[async_trait]
pub trait ArrayStore: Send + Sync {
    /// Create an empty array. Fails with [`StorageError::AlreadyExists`] when
    /// the namespace already has an array with the location's registered name.
    async fn create(&self, location: &StorageLocation, schema: &ArraySchema) -> Result<(), StorageError>;

    async fn open_for_read(&self, uri: &ArrayUri) -> Result<Box<dyn ArrayHandle>, StorageError>;

    async fn open_for_write(&self, uri: &ArrayUri) -> Result<Box<dyn ArrayHandle>, StorageError>;
}
