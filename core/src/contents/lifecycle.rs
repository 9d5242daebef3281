//! Array lifecycle: create, write, read, delete and rename of backend arrays
//!
//! Handles are scoped to a single operation and closed on every exit path.
//! The only retry in the crate lives here: a bounded loop over name
//! collisions on create.

use crate::contents::catalog::{ArrayRecord, Catalog};
use crate::contents::error::{CatalogError, ContentsError, ContentsResult, StorageError};
use crate::contents::model::ContentType;
use crate::contents::resolver::ArrayUri;
use crate::contents::storage::{
    ArrayHandle, ArrayMetadata, ArraySchema, ArrayStore, META_FILE_SIZE, META_FORMAT, META_MIMETYPE, META_TYPE,
};
use crate::contents::ContentsSettings;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Joins a basename and its collision counter
const COUNTER_SEPARATOR: char = '-';

/// Optional metadata refreshed by a write; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafMetadata {
    pub mimetype: Option<String>,
    pub format: Option<String>,
    pub kind: Option<ContentType>,
}

/// Raw payload and metadata of one array
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayContents {
    pub bytes: Vec<u8>,
    pub metadata: ArrayMetadata,
}

impl ArrayContents {
    /// Created but never written
    pub fn is_unwritten(&self) -> bool {
        self.metadata.file_size().is_none()
    }
}

pub struct ArrayLifecycle {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ArrayStore>,
    settings: ContentsSettings,
}

impl ArrayLifecycle {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn ArrayStore>, settings: ContentsSettings) -> Self {
        Self {
            catalog,
            store,
            settings,
        }
    }

    /// Create an empty, tagged array at `uri`, or at the next free name when
    /// `uri` is taken. Returns the final URI and name.
    pub async fn create(&self, uri: &ArrayUri) -> ContentsResult<(ArrayUri, String)> {
        let prefix = self.storage_prefix(&uri.namespace).await?;
        let schema = ArraySchema::notebook();

        let mut candidate = uri.clone();
        let mut collisions = 0u32;
        loop {
            let location = candidate.storage_location(&prefix);
            match self.store.create(&location, &schema).await {
                Ok(()) => break,
                Err(StorageError::AlreadyExists(existing)) => {
                    collisions += 1;
                    if collisions >= self.settings.create_retry_budget {
                        return Err(ContentsError::CreateExhausted {
                            name: uri.name.clone(),
                            attempts: collisions,
                        });
                    }
                    let next = increment_filename(&candidate.name);
                    warn!(%existing, next = %next, "name already taken, retrying create");
                    candidate = candidate.with_name(next);
                }
                Err(err) => {
                    return Err(ContentsError::storage(format!("Error creating file {}", candidate), err));
                }
            }
        }

        let tags = vec![self.settings.notebook_tag.clone()];
        self.catalog
            .update_tags(&candidate, &candidate.name, &tags)
            .await
            .map_err(|e| ContentsError::catalog(format!("Error registering {}", candidate), e))?;

        info!(uri = %candidate, "created array");
        let name = candidate.name.clone();
        Ok((candidate, name))
    }

    /// Overwrite the content of `uri`. When `is_new_leaf` the array is
    /// created first and its final name, which may differ from `uri.name`,
    /// is returned.
    pub async fn write(
        &self,
        uri: &ArrayUri,
        bytes: &[u8],
        metadata: LeafMetadata,
        is_new_leaf: bool,
    ) -> ContentsResult<Option<String>> {
        let (target, final_name) = if is_new_leaf {
            let (created, name) = self.create(uri).await?;
            (created, Some(name))
        } else {
            (uri.clone(), None)
        };

        let context = || format!("Error writing {}", target);
        let mut handle = self
            .store
            .open_for_write(&target)
            .await
            .map_err(|e| ContentsError::storage(context(), e))?;

        let written = write_into(handle.as_mut(), bytes, metadata).await;
        let closed = handle.close().await;
        written.map_err(|e| ContentsError::storage(context(), e))?;
        closed.map_err(|e| ContentsError::storage(context(), e))?;

        debug!(uri = %target, size = bytes.len(), "wrote array");
        Ok(final_name)
    }

    /// Content and metadata of `uri`; an unwritten array reads as empty
    pub async fn read(&self, uri: &ArrayUri) -> ContentsResult<ArrayContents> {
        let context = || format!("Error reading {}", uri);
        let mut handle = self
            .store
            .open_for_read(uri)
            .await
            .map_err(|e| ContentsError::storage(context(), e))?;

        let contents = read_from(handle.as_mut()).await;
        let closed = handle.close().await;
        let contents = contents.map_err(|e| ContentsError::storage(context(), e))?;
        closed.map_err(|e| ContentsError::storage(context(), e))?;

        Ok(contents)
    }

    /// Stored `type` metadata of `uri`
    pub async fn content_type(&self, uri: &ArrayUri) -> Result<Option<String>, StorageError> {
        let mut handle = self.store.open_for_read(uri).await?;
        let metadata = handle.metadata().await;
        let closed = handle.close().await;
        let metadata = metadata?;
        closed?;
        Ok(metadata.content_type().map(str::to_string))
    }

    pub async fn info(&self, uri: &ArrayUri) -> ContentsResult<ArrayRecord> {
        self.catalog
            .info(uri)
            .await
            .map_err(|e| ContentsError::catalog(format!("Error fetching notebook info for {}", uri), e))
    }

    /// Whether the catalog knows `uri`; only not-found reads as absent
    pub async fn try_exists(&self, uri: &ArrayUri) -> ContentsResult<bool> {
        match self.catalog.info(uri).await {
            Ok(_) => Ok(true),
            Err(CatalogError::NotFound(_)) => Ok(false),
            Err(err) => Err(ContentsError::catalog(format!("Error checking existence of {}", uri), err)),
        }
    }

    /// Like [`try_exists`](Self::try_exists), with other failures logged and
    /// read as absent
    pub async fn exists(&self, uri: &ArrayUri) -> bool {
        match self.try_exists(uri).await {
            Ok(found) => found,
            Err(err) => {
                warn!(%uri, error = %err, "existence check failed");
                false
            }
        }
    }

    /// Deregister `uri`; the stored bytes are left in place
    pub async fn delete(&self, uri: &ArrayUri) -> ContentsResult<()> {
        self.catalog
            .deregister(uri)
            .await
            .map_err(|e| ContentsError::catalog(format!("Error deregistering {}", uri), e))?;
        info!(%uri, "deregistered array");
        Ok(())
    }

    /// Change the name the catalog lists `uri` under
    pub async fn rename(&self, uri: &ArrayUri, new_name: &str) -> ContentsResult<()> {
        self.catalog
            .rename_leaf(uri, new_name)
            .await
            .map_err(|e| ContentsError::catalog(format!("Error renaming {}", uri), e))?;
        info!(%uri, new_name, "renamed array");
        Ok(())
    }

    /// Default storage prefix of `namespace`, from the user's own profile or
    /// from the organization's
    async fn storage_prefix(&self, namespace: &str) -> ContentsResult<String> {
        let profile = self
            .catalog
            .current_user_profile()
            .await
            .map_err(|e| ContentsError::bad_request(format!("Error fetching user default storage path: {}", e)))?;

        let prefix = if profile.username == namespace {
            profile.default_storage_prefix
        } else {
            self.catalog
                .organization_profile(namespace)
                .await
                .map_err(|e| {
                    ContentsError::bad_request(format!(
                        "Error fetching default storage path for organization {}: {}",
                        namespace, e
                    ))
                })?
                .default_storage_prefix
        };

        prefix.ok_or_else(|| {
            ContentsError::bad_request(format!(
                "You must set the default storage prefix path for notebooks in {} profile settings",
                namespace
            ))
        })
    }
}

async fn write_into(
    handle: &mut dyn ArrayHandle,
    bytes: &[u8],
    metadata: LeafMetadata,
) -> Result<(), StorageError> {
    handle.write_range(bytes).await?;

    // file_size goes in after the content so readers never see a short payload
    let mut update = ArrayMetadata::new();
    update.insert(META_FILE_SIZE, bytes.len() as u64);
    if let Some(mimetype) = metadata.mimetype {
        update.insert(META_MIMETYPE, mimetype);
    }
    if let Some(format) = metadata.format {
        update.insert(META_FORMAT, format);
    }
    if let Some(kind) = metadata.kind {
        update.insert(META_TYPE, kind.as_str());
    }
    handle.set_metadata(update).await
}

async fn read_from(handle: &mut dyn ArrayHandle) -> Result<ArrayContents, StorageError> {
    let metadata = handle.metadata().await?;
    let bytes = match metadata.file_size() {
        Some(size) => handle.read_range(0, size).await?,
        None => Vec::new(),
    };
    Ok(ArrayContents { bytes, metadata })
}

/// Next candidate name after a collision: `nb.ipynb` -> `nb-1.ipynb`,
/// `nb-1.ipynb` -> `nb-2.ipynb`.
///
/// The counter is the text after the last `-` of the basename, and only when
/// it is all digits; anything else gets a fresh `-1`. For `.ipynb` names the
/// extension is the last dot-suffix, otherwise everything from the first dot.
pub fn increment_filename(filename: &str) -> String {
    let (basename, extension) = match filename.rsplit_once('.') {
        Some((base, "ipynb")) => (base, &filename[base.len()..]),
        _ => match filename.split_once('.') {
            Some((base, _)) => (base, &filename[base.len()..]),
            None => (filename, ""),
        },
    };

    let counted = basename.rsplit_once(COUNTER_SEPARATOR).and_then(|(stem, digits)| {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok().map(|counter| (stem, counter))
    });

    let (stem, counter) = counted.unwrap_or((basename, 0));
    format!("{}{}{}{}", stem, COUNTER_SEPARATOR, counter + 1, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::catalog::UserProfile;
    use crate::contents::memory::{MemoryCloud, Visibility};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn cloud_with_prefix(prefix: Option<&str>) -> MemoryCloud {
        MemoryCloud::new(UserProfile {
            username: "alice".to_string(),
            organizations: vec!["orgA".to_string()],
            default_storage_prefix: prefix.map(str::to_string),
            enabled_features: vec![],
        })
    }

    fn lifecycle(cloud: &MemoryCloud) -> ArrayLifecycle {
        ArrayLifecycle::new(
            Arc::new(cloud.clone()),
            Arc::new(cloud.clone()),
            ContentsSettings::default(),
        )
    }

    #[test]
    fn test_increment_filename() {
        assert_eq!(increment_filename("foo.ipynb"), "foo-1.ipynb");
        assert_eq!(increment_filename("foo-1.ipynb"), "foo-2.ipynb");
        assert_eq!(increment_filename("nb-9"), "nb-10");
        assert_eq!(increment_filename("nb"), "nb-1");
        assert_eq!(increment_filename("data.tar.gz"), "data-1.tar.gz");
        assert_eq!(increment_filename("my.analysis.ipynb"), "my.analysis-1.ipynb");
    }

    #[test]
    fn test_increment_filename_with_inner_counter() {
        // Only an all-digit tail counts; `old` is part of the basename
        assert_eq!(increment_filename("run-2-old.ipynb"), "run-2-old-1.ipynb");
        assert_eq!(increment_filename("run-2.ipynb"), "run-3.ipynb");
        assert_eq!(increment_filename("run-.ipynb"), "run--1.ipynb");
        assert_eq!(increment_filename("run-+2.ipynb"), "run-+2-1.ipynb");
    }

    #[tokio::test]
    async fn test_create_registers_with_tag_below_prefix() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);

        let (uri, name) = lifecycle.create(&ArrayUri::new("alice", "nb")).await.unwrap();
        assert_eq!(uri, ArrayUri::new("alice", "nb"));
        assert_eq!(name, "nb");
        assert_eq!(cloud.location_of(&uri).as_deref(), Some("s3://bucket/alice/nb"));

        let owned = cloud.list_owned("__jupyter-notebook", None).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "nb");
    }

    #[tokio::test]
    async fn test_create_increments_on_collision() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);

        let requested = ArrayUri::new("alice", "foo");
        lifecycle.create(&requested).await.unwrap();

        let (_, second) = lifecycle.create(&requested).await.unwrap();
        assert_eq!(second, "foo-1");
        let (_, third) = lifecycle.create(&requested).await.unwrap();
        assert_eq!(third, "foo-2");
    }

    #[tokio::test]
    async fn test_create_exhausts_retry_budget() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);

        for name in ["foo", "foo-1", "foo-2", "foo-3", "foo-4"] {
            cloud
                .register(&ArrayUri::new("alice", name), Visibility::Owned, "__jupyter-notebook", true)
                .unwrap();
        }

        let err = lifecycle.create(&ArrayUri::new("alice", "foo")).await.unwrap_err();
        assert_matches!(err, ContentsError::CreateExhausted { attempts: 5, .. });
    }

    #[tokio::test]
    async fn test_create_without_storage_prefix() {
        let cloud = cloud_with_prefix(None);
        cloud.add_organization("orgA", Some("s3://bucket/orga/")).unwrap();
        let lifecycle = lifecycle(&cloud);

        let err = lifecycle.create(&ArrayUri::new("alice", "nb")).await.unwrap_err();
        assert_eq!(err.status(), 400);

        // Organization namespaces use the organization's prefix
        let (uri, _) = lifecycle.create(&ArrayUri::new("orgA", "nb")).await.unwrap();
        assert_eq!(cloud.location_of(&uri).as_deref(), Some("s3://bucket/orga/nb"));
    }

    #[tokio::test]
    async fn test_create_surfaces_other_storage_errors() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        cloud.add_organization("bob", Some("s3://bucket/bob/")).unwrap();
        let lifecycle = lifecycle(&cloud);

        let err = lifecycle.create(&ArrayUri::new("bob", "nb")).await.unwrap_err();
        assert_matches!(err, ContentsError::Storage { source: StorageError::Backend(_), .. });
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "data.csv");

        let payload = b"a,b\n1,2\n".to_vec();
        let metadata = LeafMetadata {
            mimetype: Some("text/csv".to_string()),
            format: Some("text".to_string()),
            kind: Some(ContentType::File),
        };
        let final_name = lifecycle.write(&uri, &payload, metadata, true).await.unwrap();
        assert_eq!(final_name.as_deref(), Some("data.csv"));

        let contents = lifecycle.read(&uri).await.unwrap();
        assert_eq!(contents.bytes, payload);
        assert_eq!(contents.metadata.file_size(), Some(payload.len() as u64));
        assert_eq!(contents.metadata.mimetype(), Some("text/csv"));
    }

    #[tokio::test]
    async fn test_write_merges_metadata() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "notes.txt");

        let first = LeafMetadata {
            mimetype: Some("text/plain".to_string()),
            format: Some("text".to_string()),
            kind: Some(ContentType::File),
        };
        lifecycle.write(&uri, b"first version", first, true).await.unwrap();
        let again = lifecycle.write(&uri, b"second", LeafMetadata::default(), false).await.unwrap();
        assert_eq!(again, None);

        let contents = lifecycle.read(&uri).await.unwrap();
        assert_eq!(contents.bytes, b"second".to_vec());
        assert_eq!(contents.metadata.file_size(), Some(6));
        assert_eq!(contents.metadata.mimetype(), Some("text/plain"));
        assert_eq!(contents.metadata.content_type(), Some("file"));
    }

    #[tokio::test]
    async fn test_read_unwritten_array_is_empty() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);

        let (uri, _) = lifecycle.create(&ArrayUri::new("alice", "blank")).await.unwrap();
        let contents = lifecycle.read(&uri).await.unwrap();
        assert!(contents.is_unwritten());
        assert!(contents.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_rename() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "nb");
        lifecycle.write(&uri, b"{}", LeafMetadata::default(), true).await.unwrap();

        lifecycle.rename(&uri, "renamed").await.unwrap();
        assert!(!lifecycle.exists(&uri).await);
        let renamed = uri.with_name("renamed");
        assert!(lifecycle.exists(&renamed).await);
        assert_eq!(lifecycle.read(&renamed).await.unwrap().bytes, b"{}".to_vec());

        lifecycle.delete(&renamed).await.unwrap();
        assert!(!lifecycle.exists(&renamed).await);
        assert_eq!(lifecycle.delete(&renamed).await.unwrap_err().status(), 404);
    }

    #[tokio::test]
    async fn test_content_type_lookup() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "nb");
        let metadata = LeafMetadata {
            kind: Some(ContentType::Notebook),
            ..Default::default()
        };
        lifecycle.write(&uri, b"{}", metadata, true).await.unwrap();

        assert_eq!(lifecycle.content_type(&uri).await.unwrap().as_deref(), Some("notebook"));
        assert!(lifecycle.content_type(&uri.with_name("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_try_exists_surfaces_catalog_failures() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "nb");
        lifecycle.write(&uri, b"{}", LeafMetadata::default(), true).await.unwrap();

        assert!(lifecycle.try_exists(&uri).await.unwrap());
        assert!(!lifecycle.try_exists(&uri.with_name("missing")).await.unwrap());

        cloud.set_catalog_failure(Some("timeout")).unwrap();
        let err = lifecycle.try_exists(&uri).await.unwrap_err();
        assert_matches!(err, ContentsError::Catalog { source: CatalogError::Service(_), .. });
        assert_eq!(err.status(), 500);
        assert!(!lifecycle.exists(&uri).await);
    }

    #[tokio::test]
    async fn test_handles_closed_when_operations_fail() {
        let cloud = cloud_with_prefix(Some("s3://bucket/alice/"));
        let lifecycle = lifecycle(&cloud);
        let uri = ArrayUri::new("alice", "nb");
        lifecycle.write(&uri, b"{}", LeafMetadata::default(), true).await.unwrap();
        assert_eq!(cloud.open_handles(), 0);

        cloud.set_handle_failure(Some("connection reset")).unwrap();

        let err = lifecycle.write(&uri, b"[]", LeafMetadata::default(), false).await.unwrap_err();
        assert_matches!(err, ContentsError::Storage { source: StorageError::Backend(_), .. });
        assert_eq!(cloud.open_handles(), 0);

        assert!(lifecycle.read(&uri).await.is_err());
        assert_eq!(cloud.open_handles(), 0);

        assert!(lifecycle.content_type(&uri).await.is_err());
        assert_eq!(cloud.open_handles(), 0);

        cloud.set_handle_failure(None).unwrap();
        assert_eq!(lifecycle.read(&uri).await.unwrap().bytes, b"{}".to_vec());
        assert_eq!(cloud.open_handles(), 0);
    }
}
