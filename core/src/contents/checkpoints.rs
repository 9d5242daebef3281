//! Checkpoints
//!
//! Local files get one checkpoint each, kept next to them in
//! `.ipynb_checkpoints/`. Remote leaves have no checkpoints: creating one
//! returns a fixed sentinel and every other call is a no-op.

use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::local::CHECKPOINT_DIR;
use crate::contents::model::{dummy_created_date, CheckpointModel};
use crate::contents::path::VirtualPath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Id of the single checkpoint a local file can have
pub const CHECKPOINT_ID: &str = "checkpoint";

/// Id returned when checkpointing a remote leaf
pub const UNSUPPORTED_CHECKPOINT_ID: &str = "checkpoints-not-supported";

#[async_trait]
pub trait Checkpoints: Send + Sync {
    async fn create_checkpoint(&self, path: &VirtualPath) -> ContentsResult<CheckpointModel>;

    async fn list_checkpoints(&self, path: &VirtualPath) -> ContentsResult<Vec<CheckpointModel>>;

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()>;

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()>;

    async fn rename_checkpoint(
        &self,
        checkpoint_id: &str,
        old_path: &VirtualPath,
        new_path: &VirtualPath,
    ) -> ContentsResult<()>;
}

/// File copies below a root directory
pub struct FileCheckpoints {
    root_dir: PathBuf,
}

impl FileCheckpoints {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn file_path(&self, path: &VirtualPath) -> PathBuf {
        path.segments().iter().fold(self.root_dir.clone(), |os_path, segment| os_path.join(segment))
    }

    /// `<dir>/.ipynb_checkpoints/<stem>-<id><ext>`
    fn checkpoint_path(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| ContentsError::InvalidPath("the root directory has no checkpoints".to_string()))?;
        let (stem, ext) = match name.rfind('.') {
            Some(index) if index > 0 => name.split_at(index),
            _ => (name, ""),
        };

        let parent = VirtualPath::from_segments(path.segments()[..path.segments().len() - 1].iter().cloned());
        Ok(self
            .file_path(&parent)
            .join(CHECKPOINT_DIR)
            .join(format!("{}-{}{}", stem, checkpoint_id, ext)))
    }

    async fn checkpoint_model(&self, checkpoint_id: &str, checkpoint_path: &Path) -> ContentsResult<CheckpointModel> {
        let metadata = fs::metadata(checkpoint_path).await?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| dummy_created_date());
        Ok(CheckpointModel {
            id: checkpoint_id.to_string(),
            last_modified,
        })
    }
}

#[async_trait]
impl Checkpoints for FileCheckpoints {
    async fn create_checkpoint(&self, path: &VirtualPath) -> ContentsResult<CheckpointModel> {
        let source = self.file_path(path);
        let target = self.checkpoint_path(CHECKPOINT_ID, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, &target).await?;
        debug!(%path, "created checkpoint");
        self.checkpoint_model(CHECKPOINT_ID, &target).await
    }

    async fn list_checkpoints(&self, path: &VirtualPath) -> ContentsResult<Vec<CheckpointModel>> {
        let target = self.checkpoint_path(CHECKPOINT_ID, path)?;
        if !fs::try_exists(&target).await? {
            return Ok(Vec::new());
        }
        Ok(vec![self.checkpoint_model(CHECKPOINT_ID, &target).await?])
    }

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()> {
        let source = self.checkpoint_path(checkpoint_id, path)?;
        if !fs::try_exists(&source).await? {
            return Err(ContentsError::NotFound(format!("checkpoint {} for {}", checkpoint_id, path)));
        }
        fs::copy(&source, self.file_path(path)).await?;
        debug!(%path, checkpoint_id, "restored checkpoint");
        Ok(())
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()> {
        let target = self.checkpoint_path(checkpoint_id, path)?;
        if !fs::try_exists(&target).await? {
            return Err(ContentsError::NotFound(format!("checkpoint {} for {}", checkpoint_id, path)));
        }
        fs::remove_file(&target).await?;
        Ok(())
    }

    async fn rename_checkpoint(
        &self,
        checkpoint_id: &str,
        old_path: &VirtualPath,
        new_path: &VirtualPath,
    ) -> ContentsResult<()> {
        let old_target = self.checkpoint_path(checkpoint_id, old_path)?;
        if !fs::try_exists(&old_target).await? {
            return Ok(());
        }
        let new_target = self.checkpoint_path(checkpoint_id, new_path)?;
        if let Some(parent) = new_target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&old_target, &new_target).await?;
        Ok(())
    }
}

/// Routes local paths to a local checkpoint store and answers remote paths
/// with the unsupported sentinel
pub struct CloudCheckpoints {
    local: Arc<dyn Checkpoints>,
}

impl CloudCheckpoints {
    pub fn new(local: Arc<dyn Checkpoints>) -> Self {
        Self { local }
    }

    pub fn unsupported() -> CheckpointModel {
        CheckpointModel {
            id: UNSUPPORTED_CHECKPOINT_ID.to_string(),
            last_modified: dummy_created_date(),
        }
    }
}

#[async_trait]
impl Checkpoints for CloudCheckpoints {
    async fn create_checkpoint(&self, path: &VirtualPath) -> ContentsResult<CheckpointModel> {
        if path.is_remote() {
            return Ok(Self::unsupported());
        }
        self.local.create_checkpoint(path).await
    }

    async fn list_checkpoints(&self, path: &VirtualPath) -> ContentsResult<Vec<CheckpointModel>> {
        if path.is_remote() {
            return Ok(Vec::new());
        }
        self.local.list_checkpoints(path).await
    }

    async fn restore_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()> {
        if path.is_remote() {
            return Ok(());
        }
        self.local.restore_checkpoint(checkpoint_id, path).await
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str, path: &VirtualPath) -> ContentsResult<()> {
        if path.is_remote() {
            return Ok(());
        }
        self.local.delete_checkpoint(checkpoint_id, path).await
    }

    async fn rename_checkpoint(
        &self,
        checkpoint_id: &str,
        old_path: &VirtualPath,
        new_path: &VirtualPath,
    ) -> ContentsResult<()> {
        if old_path.is_remote() || new_path.is_remote() {
            return Ok(());
        }
        self.local.rename_checkpoint(checkpoint_id, old_path, new_path).await
    }
}
