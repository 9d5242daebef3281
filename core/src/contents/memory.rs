//! In-process cloud: catalog and array store in one
//!
//! Keeps a registry of `<namespace>/<name>` entries pointing at stored
//! arrays. Renames and deregistrations only touch the registry, the stored
//! bytes stay where they were created. The whole state can be snapshotted to
//! JSON so a command line session can pick up where the last one left off.

use crate::contents::catalog::{ArrayRecord, Catalog, OrganizationProfile, UserProfile};
use crate::contents::error::{CatalogError, ContentsResult, StorageError};
use crate::contents::resolver::{ArrayUri, StorageLocation};
use crate::contents::storage::{ArrayHandle, ArrayMetadata, ArraySchema, ArrayStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

const NOT_FOUND: &str = "Array or Namespace Not found";

/// How an array is visible to the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// In the user's own namespace or one of their organizations
    Owned,
    /// Someone else's, shared with the user
    Shared,
    /// Someone else's, readable by everyone
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredArray {
    namespace: String,
    location: String,
    schema: ArraySchema,
    tags: Vec<String>,
    data: Vec<u8>,
    metadata: ArrayMetadata,
    visibility: Visibility,
    allowed_actions: BTreeSet<String>,
    last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CloudState {
    user: UserProfile,
    organizations: BTreeMap<String, OrganizationProfile>,
    arrays: BTreeMap<String, StoredArray>,
    /// `<namespace>/<name>` to array id, in registration order per key
    registry: BTreeMap<String, String>,
    #[serde(default)]
    catalog_failure: Option<String>,
    /// Fails reads and writes through open handles; opening still succeeds
    #[serde(default, skip_serializing)]
    handle_failure: Option<String>,
}

impl CloudState {
    fn lookup(&self, uri: &ArrayUri) -> Option<(&String, &StoredArray)> {
        let id = self.registry.get(&uri.to_string())?;
        self.arrays.get(id).map(|array| (id, array))
    }

    fn owns_namespace(&self, namespace: &str) -> bool {
        self.user.username == namespace || self.user.organizations.iter().any(|org| org == namespace)
    }

    fn check_catalog(&self) -> Result<(), CatalogError> {
        match &self.catalog_failure {
            Some(message) => Err(CatalogError::Service(message.clone())),
            None => Ok(()),
        }
    }

    fn records(&self, visibility: Visibility, tag: &str, namespace: Option<&str>) -> Vec<ArrayRecord> {
        self.registry
            .iter()
            .filter_map(|(key, id)| {
                let array = self.arrays.get(id)?;
                let name = key.rsplit('/').next()?;
                let visible = array.visibility == visibility
                    && array.tags.iter().any(|t| t == tag)
                    && namespace.map(|ns| ns == array.namespace).unwrap_or(true);
                visible.then(|| record(name, array))
            })
            .collect()
    }
}

fn record(name: &str, array: &StoredArray) -> ArrayRecord {
    ArrayRecord {
        name: name.to_string(),
        namespace: array.namespace.clone(),
        last_accessed: array.last_accessed,
        allowed_actions: array.allowed_actions.clone(),
    }
}

fn read_write_actions() -> BTreeSet<String> {
    ["read", "write"].iter().map(|a| a.to_string()).collect()
}

/// In-process [`Catalog`] and [`ArrayStore`]
#[derive(Debug, Clone)]
pub struct MemoryCloud {
    state: Arc<RwLock<CloudState>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryCloud {
    pub fn new(user: UserProfile) -> Self {
        Self::from_state(CloudState {
            user,
            organizations: BTreeMap::new(),
            arrays: BTreeMap::new(),
            registry: BTreeMap::new(),
            catalog_failure: None,
            handle_failure: None,
        })
    }

    fn from_state(state: CloudState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add an organization profile; the user is not made a member
    pub fn add_organization(&self, name: &str, default_storage_prefix: Option<&str>) -> Result<(), StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        state.organizations.insert(
            name.to_string(),
            OrganizationProfile {
                name: name.to_string(),
                default_storage_prefix: default_storage_prefix.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Register an empty, tagged array directly, bypassing storage prefixes.
    /// Used to seed arrays owned by other namespaces.
    pub fn register(
        &self,
        uri: &ArrayUri,
        visibility: Visibility,
        tag: &str,
        writable: bool,
    ) -> Result<(), StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        let key = uri.to_string();
        if state.registry.contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }

        let mut allowed_actions = read_write_actions();
        if !writable {
            allowed_actions.remove("write");
        }

        let id = Uuid::new_v4().to_string();
        state.arrays.insert(
            id.clone(),
            StoredArray {
                namespace: uri.namespace.clone(),
                location: uri.name.clone(),
                schema: ArraySchema::notebook(),
                tags: vec![tag.to_string()],
                data: Vec::new(),
                metadata: ArrayMetadata::new(),
                visibility,
                allowed_actions,
                last_accessed: Utc::now(),
            },
        );
        state.registry.insert(key, id);
        Ok(())
    }

    /// Make every catalog call fail with `message` until cleared
    pub fn set_catalog_failure(&self, message: Option<&str>) -> Result<(), StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        state.catalog_failure = message.map(str::to_string);
        Ok(())
    }

    /// Make every read or write through a handle fail with `message` until
    /// cleared
    pub fn set_handle_failure(&self, message: Option<&str>) -> Result<(), StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        state.handle_failure = message.map(str::to_string);
        Ok(())
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Physical location of a registered array
    pub fn location_of(&self, uri: &ArrayUri) -> Option<String> {
        let state = self.read().ok()?;
        state.lookup(uri).map(|(_, array)| array.location.clone())
    }

    pub async fn load_snapshot(path: impl AsRef<Path>) -> ContentsResult<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let state: CloudState = serde_json::from_slice(&bytes)?;
        Ok(Self::from_state(state))
    }

    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> ContentsResult<()> {
        let bytes = {
            let state = self.read().map_err(crate::contents::ContentsError::Serialization)?;
            serde_json::to_vec_pretty(&*state)?
        };
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CloudState>, String> {
        self.state.read().map_err(|_| "cloud state lock poisoned".to_string())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CloudState>, String> {
        self.state.write().map_err(|_| "cloud state lock poisoned".to_string())
    }

    fn open(&self, uri: &ArrayUri, for_write: bool) -> Result<Box<dyn ArrayHandle>, StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        let id = match state.lookup(uri) {
            Some((id, array)) => {
                if for_write && !array.allowed_actions.contains("write") {
                    return Err(StorageError::Backend(format!("write not permitted on {}", uri)));
                }
                id.clone()
            }
            None => return Err(StorageError::NotFound(uri.to_string())),
        };
        if let Some(array) = state.arrays.get_mut(&id) {
            array.last_accessed = Utc::now();
        }
        debug!(%uri, for_write, "opened array");

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            state: Arc::clone(&self.state),
            open_handles: Arc::clone(&self.open_handles),
            id,
            for_write,
            open: true,
        }))
    }
}

#[async_trait]
impl Catalog for MemoryCloud {
    async fn list_owned(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        Ok(state.records(Visibility::Owned, tag, namespace))
    }

    async fn list_shared(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        Ok(state.records(Visibility::Shared, tag, namespace))
    }

    async fn list_public(&self, tag: &str, namespace: Option<&str>) -> Result<Vec<ArrayRecord>, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        Ok(state.records(Visibility::Public, tag, namespace))
    }

    async fn info(&self, uri: &ArrayUri) -> Result<ArrayRecord, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        state
            .lookup(uri)
            .map(|(_, array)| record(&uri.name, array))
            .ok_or_else(|| CatalogError::NotFound(NOT_FOUND.to_string()))
    }

    async fn update_tags(&self, uri: &ArrayUri, name: &str, tags: &[String]) -> Result<(), CatalogError> {
        let mut state = self.write().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        let id = state
            .registry
            .remove(&uri.to_string())
            .ok_or_else(|| CatalogError::NotFound(NOT_FOUND.to_string()))?;
        if let Some(array) = state.arrays.get_mut(&id) {
            array.tags = tags.to_vec();
        }
        state.registry.insert(uri.with_name(name).to_string(), id);
        Ok(())
    }

    async fn deregister(&self, uri: &ArrayUri) -> Result<(), CatalogError> {
        let mut state = self.write().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        state
            .registry
            .remove(&uri.to_string())
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound(NOT_FOUND.to_string()))
    }

    async fn rename_leaf(&self, uri: &ArrayUri, new_name: &str) -> Result<(), CatalogError> {
        let mut state = self.write().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        let target = uri.with_name(new_name).to_string();
        if state.registry.contains_key(&target) {
            return Err(CatalogError::Service(format!("{} already exists", target)));
        }
        let id = state
            .registry
            .remove(&uri.to_string())
            .ok_or_else(|| CatalogError::NotFound(NOT_FOUND.to_string()))?;
        state.registry.insert(target, id);
        Ok(())
    }

    async fn current_user_profile(&self) -> Result<UserProfile, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        Ok(state.user.clone())
    }

    async fn organization_profile(&self, name: &str) -> Result<OrganizationProfile, CatalogError> {
        let state = self.read().map_err(CatalogError::Service)?;
        state.check_catalog()?;
        state
            .organizations
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(NOT_FOUND.to_string()))
    }
}

#[async_trait]
impl ArrayStore for MemoryCloud {
    async fn create(&self, location: &StorageLocation, schema: &ArraySchema) -> Result<(), StorageError> {
        let mut state = self.write().map_err(StorageError::Backend)?;
        if !state.owns_namespace(&location.namespace) {
            return Err(StorageError::Backend(format!(
                "not permitted to create arrays in {}",
                location.namespace
            )));
        }

        let uri = ArrayUri::new(location.namespace.as_str(), location.registered_name());
        let key = uri.to_string();
        if state.registry.contains_key(&key) {
            return Err(StorageError::AlreadyExists(key));
        }

        let id = Uuid::new_v4().to_string();
        state.arrays.insert(
            id.clone(),
            StoredArray {
                namespace: location.namespace.clone(),
                location: location.location.clone(),
                schema: schema.clone(),
                tags: Vec::new(),
                data: Vec::new(),
                metadata: ArrayMetadata::new(),
                visibility: Visibility::Owned,
                allowed_actions: read_write_actions(),
                last_accessed: Utc::now(),
            },
        );
        state.registry.insert(key, id);
        debug!(%location, "created array");
        Ok(())
    }

    async fn open_for_read(&self, uri: &ArrayUri) -> Result<Box<dyn ArrayHandle>, StorageError> {
        self.open(uri, false)
    }

    async fn open_for_write(&self, uri: &ArrayUri) -> Result<Box<dyn ArrayHandle>, StorageError> {
        self.open(uri, true)
    }
}

/// Handle on one array of a [`MemoryCloud`]
struct MemoryHandle {
    state: Arc<RwLock<CloudState>>,
    open_handles: Arc<AtomicUsize>,
    id: String,
    for_write: bool,
    open: bool,
}

impl MemoryHandle {
    fn with_array<R>(&self, f: impl FnOnce(&mut StoredArray) -> R) -> Result<R, StorageError> {
        if !self.open {
            return Err(StorageError::Backend("array handle is closed".to_string()));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::Backend("cloud state lock poisoned".to_string()))?;
        if let Some(message) = &state.handle_failure {
            return Err(StorageError::Backend(message.clone()));
        }
        state
            .arrays
            .get_mut(&self.id)
            .map(f)
            .ok_or_else(|| StorageError::NotFound(self.id.clone()))
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.for_write {
            Ok(())
        } else {
            Err(StorageError::Backend("array opened for reading".to_string()))
        }
    }
}

#[async_trait]
impl ArrayHandle for MemoryHandle {
    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, StorageError> {
        self.with_array(|array| {
            let start = (start as usize).min(array.data.len());
            let end = (end as usize).clamp(start, array.data.len());
            array.data[start..end].to_vec()
        })
    }

    async fn write_range(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_writable()?;
        self.with_array(|array| {
            // Sparse cells past the written range keep their old values.
            if array.data.len() < bytes.len() {
                array.data.resize(bytes.len(), 0);
            }
            array.data[..bytes.len()].copy_from_slice(bytes);
            array.last_accessed = Utc::now();
        })
    }

    async fn metadata(&mut self) -> Result<ArrayMetadata, StorageError> {
        self.with_array(|array| array.metadata.clone())
    }

    async fn set_metadata(&mut self, metadata: ArrayMetadata) -> Result<(), StorageError> {
        self.check_writable()?;
        self.with_array(|array| array.metadata.merge(metadata))
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if self.open {
            self.open = false;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
