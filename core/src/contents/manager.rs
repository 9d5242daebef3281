//! Front-facing contents manager
//!
//! Every public operation classifies its path once and then takes one of two
//! branches: the local delegate for ordinary paths, or the remote pipeline
//! (resolver, synthesizer, lifecycle, builder) for paths under `cloud/`.

use crate::contents::builder::ModelBuilder;
use crate::contents::catalog::Catalog;
use crate::contents::checkpoints::{Checkpoints, CloudCheckpoints, FileCheckpoints, CHECKPOINT_ID};
use crate::contents::directory::DirectorySynthesizer;
use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::lifecycle::{ArrayLifecycle, LeafMetadata};
use crate::contents::local::{FileContentsStore, LocalContents};
use crate::contents::model::{CheckpointModel, Content, ContentModel, ContentType, SaveModel};
use crate::contents::notebook::NotebookCodec;
use crate::contents::path::{PathKind, VirtualPath, NOTEBOOK_EXT};
use crate::contents::resolver::resolve;
use crate::contents::storage::ArrayStore;
use crate::contents::ContentsSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

pub struct ContentsManager {
    local: Arc<dyn LocalContents>,
    catalog: Arc<dyn Catalog>,
    lifecycle: ArrayLifecycle,
    directories: DirectorySynthesizer,
    builder: ModelBuilder,
    checkpoints: Arc<dyn Checkpoints>,
    settings: ContentsSettings,
}

impl ContentsManager {
    pub fn new(
        local: Arc<dyn LocalContents>,
        checkpoints: Arc<dyn Checkpoints>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ArrayStore>,
        codec: Arc<dyn NotebookCodec>,
        settings: ContentsSettings,
    ) -> Self {
        Self {
            lifecycle: ArrayLifecycle::new(catalog.clone(), store, settings.clone()),
            directories: DirectorySynthesizer::new(catalog.clone(), settings.notebook_tag.clone()),
            builder: ModelBuilder::new(codec),
            checkpoints: Arc::new(CloudCheckpoints::new(checkpoints)),
            local,
            catalog,
            settings,
        }
    }

    /// Manager with a file system local delegate and file checkpoints below
    /// `root_dir`
    pub fn with_root_dir(
        root_dir: impl Into<PathBuf>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ArrayStore>,
        codec: Arc<dyn NotebookCodec>,
        settings: ContentsSettings,
    ) -> Self {
        let root_dir = root_dir.into();
        let local = Arc::new(FileContentsStore::new(root_dir.clone(), codec.clone()));
        let checkpoints = Arc::new(FileCheckpoints::new(root_dir));
        Self::new(local, checkpoints, catalog, store, codec, settings)
    }

    pub fn settings(&self) -> &ContentsSettings {
        &self.settings
    }

    /// Model of `path`, with content when `content` is set
    pub async fn get(
        &self,
        path: &str,
        content: bool,
        kind: Option<ContentType>,
        format: Option<&str>,
    ) -> ContentsResult<ContentModel> {
        let path = VirtualPath::parse(path);
        debug!(%path, content, ?kind, "get");

        if !path.is_remote() {
            let mut model = self.local.get(&path, content, kind, format).await?;
            if path.is_root() && content && self.cloud_enabled().await? {
                let cloud = self.directories.list(&PathKind::CloudRoot, true).await?;
                if let Some(Content::Directory(children)) = model.content.as_mut() {
                    children.push(cloud);
                }
            }
            return Ok(model);
        }

        let kind = match kind {
            Some(kind) => kind,
            None => self.classify_type(&path).await?,
        };
        match kind {
            ContentType::Directory => self.directories.list(&path.kind(), content).await,
            leaf => self.remote_leaf(&path, leaf, content, format).await,
        }
    }

    async fn remote_leaf(
        &self,
        path: &VirtualPath,
        kind: ContentType,
        content: bool,
        format: Option<&str>,
    ) -> ContentsResult<ContentModel> {
        let display = path.to_string();
        if !content {
            return Ok(self.builder.leaf(&display, kind));
        }

        let uri = resolve(&path.without_notebook_ext())?;
        let record = self.lifecycle.info(&uri).await?;
        let contents = self.lifecycle.read(&uri).await?;
        self.builder.leaf_with_content(&display, kind, &record, contents, format)
    }

    /// Save `model` at `path`; returns the content-less model of what was
    /// saved, at its final path
    pub async fn save(&self, model: &SaveModel, path: &str) -> ContentsResult<ContentModel> {
        let kind = model.validate()?;
        let path = VirtualPath::parse(path);
        debug!(%path, %kind, "save");

        if !path.is_remote() {
            return self.local.save(model, &path).await;
        }

        let (saved_path, message) = match self.save_remote(model, kind, &path).await {
            Ok(saved) => saved,
            Err(err) => {
                error!(%path, error = %err, "Error while saving file");
                return Err(err);
            }
        };

        let mut saved = self.get(&saved_path.to_string(), false, Some(kind), None).await?;
        saved.message = message;
        Ok(saved)
    }

    async fn save_remote(
        &self,
        model: &SaveModel,
        kind: ContentType,
        path: &VirtualPath,
    ) -> ContentsResult<(VirtualPath, Option<String>)> {
        let uri = resolve(&path.without_notebook_ext())?;
        let metadata = LeafMetadata {
            mimetype: model.mimetype.clone(),
            format: model.format.clone(),
            kind: Some(kind),
        };

        match kind {
            ContentType::Directory => Err(ContentsError::bad_request(
                "Trying to create unsupported type: directory in cloud",
            )),
            ContentType::Notebook => {
                let document = model
                    .content
                    .as_ref()
                    .ok_or_else(|| ContentsError::bad_request("No file content provided"))?;
                let bytes = serde_json::to_vec(document)?;
                let final_name = self
                    .lifecycle
                    .write(&uri, &bytes, metadata, model.is_new_notebook())
                    .await?;

                let message = self.builder.codec().validate(document).err().map(|e| e.to_string());
                let saved = match final_name {
                    Some(name) => path.with_file_name(&format!("{}{}", name, NOTEBOOK_EXT)),
                    None => path.clone(),
                };
                Ok((saved, message))
            }
            ContentType::File => {
                let bytes = model.file_bytes()?;
                let is_new_leaf = !self.lifecycle.try_exists(&uri).await?;
                let final_name = self.lifecycle.write(&uri, &bytes, metadata, is_new_leaf).await?;

                let saved = match final_name {
                    Some(name) if path.has_notebook_ext() => {
                        path.with_file_name(&format!("{}{}", name, NOTEBOOK_EXT))
                    }
                    Some(name) => path.with_file_name(&name),
                    None => path.clone(),
                };
                Ok((saved, None))
            }
        }
    }

    pub async fn delete(&self, path: &str) -> ContentsResult<()> {
        let path = VirtualPath::parse(path);
        debug!(%path, "delete");

        if !path.is_remote() {
            return self.local.delete(&path).await;
        }
        if path.is_remote_dir() {
            return Err(ContentsError::bad_request(format!("Cannot delete synthetic directory {}", path)));
        }
        let uri = resolve(&path.without_notebook_ext())?;
        self.lifecycle.delete(&uri).await
    }

    /// Rename a leaf. Remote renames change the catalog name only, so the
    /// new path must stay in the same namespace.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> ContentsResult<()> {
        let old_path = VirtualPath::parse(old_path);
        let new_path = VirtualPath::parse(new_path);
        debug!(%old_path, %new_path, "rename");

        match (old_path.is_remote(), new_path.is_remote()) {
            (false, false) => {
                self.local.rename(&old_path, &new_path).await?;
                self.checkpoints
                    .rename_checkpoint(CHECKPOINT_ID, &old_path, &new_path)
                    .await
            }
            (true, true) => {
                if old_path.is_remote_dir() || new_path.is_remote_dir() {
                    return Err(ContentsError::bad_request("Cannot rename synthetic directories"));
                }
                let old_uri = resolve(&old_path.without_notebook_ext())?;
                let new_uri = resolve(&new_path.without_notebook_ext())?;
                if old_uri.namespace != new_uri.namespace {
                    return Err(ContentsError::bad_request(format!(
                        "Cannot move {} to another namespace",
                        old_path
                    )));
                }
                self.lifecycle.rename(&old_uri, &new_uri.name).await
            }
            _ => Err(ContentsError::bad_request(format!(
                "Cannot move {} between local and cloud storage",
                old_path
            ))),
        }
    }

    pub async fn dir_exists(&self, path: &str) -> ContentsResult<bool> {
        let path = VirtualPath::parse(path);
        if path.is_remote() {
            return Ok(path.is_remote_dir());
        }
        self.local.dir_exists(&path).await
    }

    pub async fn file_exists(&self, path: &str) -> ContentsResult<bool> {
        let path = VirtualPath::parse(path);
        if !path.is_remote() {
            return self.local.file_exists(&path).await;
        }
        if path.is_remote_dir() {
            return Ok(false);
        }
        let uri = resolve(&path.without_notebook_ext())?;
        Ok(self.lifecycle.exists(&uri).await)
    }

    /// Remote paths are never hidden
    pub async fn is_hidden(&self, path: &str) -> ContentsResult<bool> {
        let path = VirtualPath::parse(path);
        if path.is_remote() {
            return Ok(false);
        }
        self.local.is_hidden(&path).await
    }

    /// Kind of the item at `path` when the caller did not say
    pub async fn classify_type(&self, path: &VirtualPath) -> ContentsResult<ContentType> {
        if !path.is_remote() {
            if path.has_notebook_ext() {
                return Ok(ContentType::Notebook);
            }
            if self.local.dir_exists(path).await? {
                return Ok(ContentType::Directory);
            }
            return Ok(ContentType::File);
        }

        if path.is_remote_dir() {
            return Ok(ContentType::Directory);
        }

        let uri = resolve(&path.without_notebook_ext())?;
        match self.lifecycle.content_type(&uri).await {
            Ok(Some(stored)) => match stored.parse() {
                Ok(kind) => Ok(kind),
                Err(unknown) => {
                    debug!(%path, error = %unknown, "unrecognised stored type, classified as file");
                    Ok(ContentType::File)
                }
            },
            Ok(None) if path.has_notebook_ext() => Ok(ContentType::Notebook),
            Ok(None) => Ok(ContentType::File),
            Err(unreadable) => {
                debug!(%path, error = %unreadable, "no readable metadata, classified as directory");
                Ok(ContentType::Directory)
            }
        }
    }

    /// Whether the current user's profile enables the cloud node
    pub async fn cloud_enabled(&self) -> ContentsResult<bool> {
        let profile = self
            .catalog
            .current_user_profile()
            .await
            .map_err(|e| ContentsError::bad_request(format!("Error fetching user profile: {}", e)))?;
        Ok(profile.enabled_features.iter().any(|f| f == &self.settings.cloud_feature))
    }

    pub async fn create_checkpoint(&self, path: &str) -> ContentsResult<CheckpointModel> {
        self.checkpoints.create_checkpoint(&VirtualPath::parse(path)).await
    }

    pub async fn list_checkpoints(&self, path: &str) -> ContentsResult<Vec<CheckpointModel>> {
        self.checkpoints.list_checkpoints(&VirtualPath::parse(path)).await
    }

    pub async fn restore_checkpoint(&self, checkpoint_id: &str, path: &str) -> ContentsResult<()> {
        self.checkpoints
            .restore_checkpoint(checkpoint_id, &VirtualPath::parse(path))
            .await
    }

    pub async fn delete_checkpoint(&self, checkpoint_id: &str, path: &str) -> ContentsResult<()> {
        self.checkpoints
            .delete_checkpoint(checkpoint_id, &VirtualPath::parse(path))
            .await
    }
}
