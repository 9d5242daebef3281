// 将main.rs中的核心功能提取到lib.rs，便于测试
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nbcloud_core::contents::{
    Content, ContentModel, ContentType, ContentsManager, ContentsResult, ContentsSettings, JsonNotebookCodec,
    MemoryCloud, SaveModel, UserProfile, VirtualPath,
};
use nbcloud_shared::ContentsConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// nbcloud 笔记本内容命令行工具
#[derive(Parser, Debug, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// 子命令
    #[clap(subcommand)]
    pub command: Command,

    /// 配置文件路径
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 日志级别 (trace, debug, info, warn, error)
    #[clap(short, long, default_value = "info")]
    pub log_level: String,

    /// 启用调试日志（相当于 --log-level=debug）
    #[clap(short, long)]
    pub verbose: bool,
}

/// 命令集
#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// 列出目录内容
    Ls {
        /// 路径，`cloud/...` 为云端路径
        #[clap(default_value = "")]
        path: String,
    },

    /// 显示文件或笔记本内容
    Cat {
        path: String,
    },

    /// 上传本地文件
    Put {
        /// 本地文件路径
        file: PathBuf,

        /// 目标路径
        path: String,

        /// 作为笔记本保存
        #[clap(long)]
        notebook: bool,
    },

    /// 删除文件
    Rm {
        path: String,
    },

    /// 重命名文件
    Mv {
        old_path: String,
        new_path: String,
    },

    /// 检查路径是否存在
    Exists {
        path: String,
    },

    /// 显示日志
    Logs {
        /// 显示最后几行
        #[clap(short, long, default_value = "20")]
        tail: usize,
    },

    /// 创建默认配置文件
    Init {
        /// 输出路径
        #[clap(default_value = "nbcloud.toml")]
        path: PathBuf,
    },
}

impl Command {
    /// Whether the command changes the cloud and needs its snapshot saved
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Put { .. } | Command::Rm { .. } | Command::Mv { .. })
    }
}

/// 加载配置
pub fn load_config(cli: &Cli) -> Result<ContentsConfig> {
    if let Some(config_path) = &cli.config {
        // 使用指定的配置文件
        ContentsConfig::from_file(config_path)
    } else if let Some(config_path) = ContentsConfig::find_config_file() {
        // 使用自动找到的配置文件
        ContentsConfig::from_file(config_path)
    } else {
        // 使用默认配置
        Ok(ContentsConfig::default())
    }
}

/// Development cloud: restored from the snapshot in the data directory, or
/// a fresh one for the configured user
pub async fn open_cloud(config: &ContentsConfig) -> Result<MemoryCloud> {
    let snapshot = config.cloud_snapshot_path();
    if snapshot.exists() {
        debug!(snapshot = %snapshot.display(), "restoring development cloud");
        return MemoryCloud::load_snapshot(&snapshot)
            .await
            .with_context(|| format!("无法读取云端快照: {:?}", snapshot));
    }

    let user = &config.dev_user;
    let cloud = MemoryCloud::new(UserProfile {
        username: user.username.clone(),
        organizations: user.organizations.clone(),
        default_storage_prefix: user.storage_prefix.clone(),
        enabled_features: vec![config.cloud_feature.clone()],
    });
    for organization in &user.organizations {
        cloud
            .add_organization(organization, user.storage_prefix.as_deref())
            .map_err(|e| anyhow::anyhow!("无法添加组织 {}: {}", organization, e))?;
    }
    info!(username = %user.username, "created development cloud");
    Ok(cloud)
}

pub async fn save_cloud(config: &ContentsConfig, cloud: &MemoryCloud) -> Result<()> {
    config.create_data_dir()?;
    let snapshot = config.cloud_snapshot_path();
    cloud
        .save_snapshot(&snapshot)
        .await
        .with_context(|| format!("无法保存云端快照: {:?}", snapshot))
}

pub fn build_manager(config: &ContentsConfig, cloud: &MemoryCloud) -> ContentsManager {
    ContentsManager::with_root_dir(
        config.root_dir.clone(),
        Arc::new(cloud.clone()),
        Arc::new(cloud.clone()),
        Arc::new(JsonNotebookCodec::new()),
        ContentsSettings::from(config),
    )
}

/// Save model for a local file being uploaded
pub fn save_model_for_file(file: &Path, bytes: Vec<u8>, notebook: bool) -> Result<SaveModel> {
    if notebook {
        let document: Value =
            serde_json::from_slice(&bytes).with_context(|| format!("不是有效的笔记本: {:?}", file))?;
        return Ok(SaveModel::notebook(document));
    }

    let mimetype = mime_guess::from_path(file).first().map(|mime| mime.essence_str().to_string());
    match String::from_utf8(bytes) {
        Ok(text) => Ok(SaveModel::text_file(text, mimetype)),
        Err(err) => Ok(SaveModel {
            kind: Some("file".to_string()),
            content: Some(Value::Array(err.into_bytes().into_iter().map(Value::from).collect())),
            format: Some("bytes".to_string()),
            mimetype,
        }),
    }
}

/// Save an uploaded model at `path`.
///
/// A notebook that has already been run carries `language_info`, which marks
/// it as existing. When nothing is stored at a cloud `path` yet it is first
/// saved without that key, so the leaf gets created, then saved again in full
/// at the final path.
pub async fn upload(manager: &ContentsManager, model: &SaveModel, path: &str) -> ContentsResult<ContentModel> {
    let is_notebook = model.kind.as_deref() == Some(ContentType::Notebook.as_str());
    if is_notebook
        && !model.is_new_notebook()
        && VirtualPath::parse(path).is_remote()
        && !manager.file_exists(path).await?
    {
        let created = manager.save(&without_language_info(model), path).await?;
        debug!(path = %created.path, "created notebook leaf for upload");
        return manager.save(model, &created.path).await;
    }
    manager.save(model, path).await
}

fn without_language_info(model: &SaveModel) -> SaveModel {
    let mut fresh = model.clone();
    if let Some(metadata) = fresh
        .content
        .as_mut()
        .and_then(|content| content.get_mut("metadata"))
        .and_then(Value::as_object_mut)
    {
        metadata.remove("language_info");
    }
    fresh
}

/// One line per entry of a directory model
pub fn format_listing(model: &ContentModel) -> String {
    let Some(children) = model.children() else {
        return format!("{}\t{}", model.kind, model.path);
    };
    children
        .iter()
        .map(|child| {
            let access = if child.writable { "rw" } else { "r-" };
            format!(
                "{}\t{}\t{}\t{}",
                child.kind,
                access,
                child.last_modified.format("%Y-%m-%d %H:%M"),
                child.path
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Printable body of a leaf model
pub fn format_content(model: &ContentModel) -> Result<String> {
    let body = match &model.content {
        Some(Content::Notebook(document)) => serde_json::to_string_pretty(document)?,
        Some(Content::Text(text)) => text.clone(),
        Some(Content::Bytes(bytes)) => format!("<{} bytes>", bytes.len()),
        Some(Content::Directory(_)) => format_listing(model),
        None => String::new(),
    };
    Ok(match &model.message {
        Some(message) => format!("{}\n# {}", body, message),
        None => body,
    })
}
