//! Local delegate: every path outside `cloud/`
//!
//! [`FileContentsStore`] serves files, notebooks and directories below a root
//! directory on the local file system.

use crate::contents::builder::file_content;
use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::model::{dummy_created_date, Content, ContentModel, ContentType, SaveModel};
use crate::contents::notebook::{NotebookCodec, NBFORMAT_VERSION};
use crate::contents::path::VirtualPath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory holding local checkpoints; never listed and never blocks a delete
pub const CHECKPOINT_DIR: &str = ".ipynb_checkpoints";

/// Contents contract for local paths
#[async_trait]
pub trait LocalContents: Send + Sync {
    async fn get(
        &self,
        path: &VirtualPath,
        content: bool,
        kind: Option<ContentType>,
        format: Option<&str>,
    ) -> ContentsResult<ContentModel>;

    async fn save(&self, model: &SaveModel, path: &VirtualPath) -> ContentsResult<ContentModel>;

    async fn delete(&self, path: &VirtualPath) -> ContentsResult<()>;

    async fn rename(&self, old_path: &VirtualPath, new_path: &VirtualPath) -> ContentsResult<()>;

    async fn dir_exists(&self, path: &VirtualPath) -> ContentsResult<bool>;

    async fn file_exists(&self, path: &VirtualPath) -> ContentsResult<bool>;

    async fn is_hidden(&self, path: &VirtualPath) -> ContentsResult<bool>;
}

/// [`LocalContents`] over `tokio::fs`
pub struct FileContentsStore {
    root_dir: PathBuf,
    codec: Arc<dyn NotebookCodec>,
}

impl FileContentsStore {
    pub fn new(root_dir: impl Into<PathBuf>, codec: Arc<dyn NotebookCodec>) -> Self {
        Self {
            root_dir: root_dir.into(),
            codec,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// File system path of `path`; `..` segments are refused
    pub fn os_path(&self, path: &VirtualPath) -> ContentsResult<PathBuf> {
        if path.segments().iter().any(|segment| segment == "..") {
            return Err(ContentsError::InvalidPath(format!("{} is outside the root directory", path)));
        }
        Ok(path.segments().iter().fold(self.root_dir.clone(), |os_path, segment| os_path.join(segment)))
    }

    fn base_model(&self, path: &VirtualPath, kind: ContentType, metadata: &Metadata) -> ContentModel {
        let mut model = ContentModel::base(&path.to_string(), kind);
        model.created = timestamp(metadata.created());
        model.last_modified = timestamp(metadata.modified());
        model.writable = !metadata.permissions().readonly();
        match kind {
            ContentType::Directory | ContentType::Notebook => model.format = Some("json".to_string()),
            ContentType::File => {
                model.mimetype = mime_guess::from_path(path.to_string())
                    .first()
                    .map(|mime| mime.essence_str().to_string());
            }
        }
        model
    }

    async fn directory_model(
        &self,
        path: &VirtualPath,
        os_path: &Path,
        metadata: &Metadata,
        content: bool,
    ) -> ContentsResult<ContentModel> {
        let model = self.base_model(path, ContentType::Directory, metadata);
        if !content {
            return Ok(model);
        }

        let mut children = Vec::new();
        let mut entries = fs::read_dir(os_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let child_metadata = match entry.metadata().await {
                Ok(child_metadata) => child_metadata,
                Err(err) => {
                    warn!(%name, error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let child_path = path.join(&name);
            let kind = if child_metadata.is_dir() {
                ContentType::Directory
            } else if child_path.has_notebook_ext() {
                ContentType::Notebook
            } else {
                ContentType::File
            };
            children.push(self.base_model(&child_path, kind, &child_metadata));
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(model.with_children(children))
    }

    async fn entry_metadata(&self, path: &VirtualPath, os_path: &Path) -> ContentsResult<Metadata> {
        fs::metadata(os_path).await.map_err(|e| io_error(path, e))
    }
}

#[async_trait]
impl LocalContents for FileContentsStore {
    async fn get(
        &self,
        path: &VirtualPath,
        content: bool,
        kind: Option<ContentType>,
        format: Option<&str>,
    ) -> ContentsResult<ContentModel> {
        debug!(%path, content, "local get");
        let os_path = self.os_path(path)?;
        let metadata = self.entry_metadata(path, &os_path).await?;

        if metadata.is_dir() {
            if matches!(kind, Some(ContentType::File | ContentType::Notebook)) {
                return Err(ContentsError::bad_request(format!("{} is a directory", path)));
            }
            return self.directory_model(path, &os_path, &metadata, content).await;
        }

        let kind = match kind {
            Some(ContentType::Directory) => {
                return Err(ContentsError::bad_request(format!("{} is not a directory", path)));
            }
            Some(kind) => kind,
            None if path.has_notebook_ext() => ContentType::Notebook,
            None => ContentType::File,
        };

        let mut model = self.base_model(path, kind, &metadata);
        if !content {
            return Ok(model);
        }

        let bytes = fs::read(&os_path).await.map_err(|e| io_error(path, e))?;
        if kind == ContentType::Notebook {
            let mut document = self
                .codec
                .decode(&bytes, NBFORMAT_VERSION)
                .map_err(|e| ContentsError::bad_request(format!("Unreadable Notebook: {} {}", path, e)))?;
            self.codec.mark_trusted(&mut document, &path.to_string());
            if let Err(invalid) = self.codec.validate(&document) {
                model.message = Some(invalid.to_string());
            }
            model.content = Some(Content::Notebook(document));
        } else {
            let (content, format) = file_content(bytes, format);
            model.content = Some(content);
            model.format = format;
        }
        Ok(model)
    }

    async fn save(&self, model: &SaveModel, path: &VirtualPath) -> ContentsResult<ContentModel> {
        let kind = model.validate()?;
        let os_path = self.os_path(path)?;

        let mut message = None;
        match kind {
            ContentType::Directory => fs::create_dir_all(&os_path).await?,
            ContentType::Notebook => {
                let document = model
                    .content
                    .as_ref()
                    .ok_or_else(|| ContentsError::bad_request("No file content provided"))?;
                message = self.codec.validate(document).err().map(|e| e.to_string());
                let bytes = serde_json::to_vec_pretty(document)?;
                fs::write(&os_path, bytes).await.map_err(|e| io_error(path, e))?;
            }
            ContentType::File => {
                let bytes = model.file_bytes()?;
                fs::write(&os_path, bytes).await.map_err(|e| io_error(path, e))?;
            }
        }
        info!(%path, %kind, "saved local file");

        let mut saved = self.get(path, false, Some(kind), None).await?;
        saved.message = message;
        Ok(saved)
    }

    async fn delete(&self, path: &VirtualPath) -> ContentsResult<()> {
        let os_path = self.os_path(path)?;
        let metadata = self.entry_metadata(path, &os_path).await?;

        if metadata.is_dir() {
            let mut entries = fs::read_dir(&os_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name() != CHECKPOINT_DIR {
                    return Err(ContentsError::bad_request(format!("Directory {} not empty", path)));
                }
            }
            fs::remove_dir_all(&os_path).await?;
        } else {
            fs::remove_file(&os_path).await?;
        }
        info!(%path, "deleted local file");
        Ok(())
    }

    async fn rename(&self, old_path: &VirtualPath, new_path: &VirtualPath) -> ContentsResult<()> {
        if old_path == new_path {
            return Ok(());
        }
        let old_os_path = self.os_path(old_path)?;
        let new_os_path = self.os_path(new_path)?;

        if fs::try_exists(&new_os_path).await? {
            return Err(ContentsError::bad_request(format!("File already exists: {}", new_path)));
        }
        fs::rename(&old_os_path, &new_os_path)
            .await
            .map_err(|e| io_error(old_path, e))?;
        info!(%old_path, %new_path, "renamed local file");
        Ok(())
    }

    async fn dir_exists(&self, path: &VirtualPath) -> ContentsResult<bool> {
        let os_path = self.os_path(path)?;
        match fs::metadata(&os_path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn file_exists(&self, path: &VirtualPath) -> ContentsResult<bool> {
        let os_path = self.os_path(path)?;
        match fs::metadata(&os_path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn is_hidden(&self, path: &VirtualPath) -> ContentsResult<bool> {
        Ok(path.is_hidden())
    }
}

fn timestamp(time: std::io::Result<std::time::SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_else(|_| dummy_created_date())
}

fn io_error(path: &VirtualPath, err: std::io::Error) -> ContentsError {
    if err.kind() == ErrorKind::NotFound {
        ContentsError::NotFound(path.to_string())
    } else {
        ContentsError::Io(err)
    }
}
