//! Remote catalog interface
//!
//! The catalog knows which arrays exist, who owns them, who may write them
//! and under which display name they are registered. It never holds content.

use crate::contents::error::CatalogError;
use crate::contents::resolver::ArrayUri;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Catalog representation of one stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRecord {
    pub name: String,
    pub namespace: String,
    pub last_accessed: DateTime<Utc>,
    pub allowed_actions: BTreeSet<String>,
}

impl ArrayRecord {
    pub fn is_writable(&self) -> bool {
        self.allowed_actions.contains("write")
    }

    pub fn uri(&self) -> ArrayUri {
        ArrayUri::new(self.namespace.as_str(), self.name.as_str())
    }
}

/// Profile of the user the catalog session belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub organizations: Vec<String>,
    pub default_storage_prefix: Option<String>,
    #[serde(default)]
    pub enabled_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub name: String,
    pub default_storage_prefix: Option<String>,
}

/// Catalog service collaborator
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Listing operations, filtered by tag and optionally by namespace
    async fn list_owned(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError>;
    async fn list_shared(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError>;
    async fn list_public(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError>;

    /// Record operations
    async fn info(&self, uri: &ArrayUri) -> Result<ArrayRecord, CatalogError>;
    async fn update_tags(&self, uri: &ArrayUri, name: &str, tags: &[String]) -> Result<(), CatalogError>;
    async fn deregister(&self, uri: &ArrayUri) -> Result<(), CatalogError>;
    async fn rename_leaf(&self, uri: &ArrayUri, new_name: &str) -> Result<(), CatalogError>;

    /// Profile operations
    async fn current_user_profile(&self) -> Result<UserProfile, CatalogError>;
    async fn organization_profile(&self, name: &str) -> Result<OrganizationProfile, CatalogError>;
}
