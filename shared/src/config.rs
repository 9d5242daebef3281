use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// 内容管理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsConfig {
    /// 本地笔记本根目录（`cloud/` 以外的路径）
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// 创建数组时附加的标签，也是所有列表查询的唯一过滤条件
    #[serde(default = "default_notebook_tag")]
    pub notebook_tag: String,

    /// 名称冲突时最多允许的连续重试次数
    #[serde(default = "default_create_retry_budget")]
    pub create_retry_budget: u32,

    /// 启用根目录 `cloud` 节点所需的用户特性标志
    #[serde(default = "default_cloud_feature")]
    pub cloud_feature: String,

    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 数据目录，开发用云端快照保存在这里
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 开发用云端报告的用户身份
    #[serde(default)]
    pub dev_user: DevUserConfig,
}

/// Identity served by the development cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevUserConfig {
    #[serde(default = "default_dev_username")]
    pub username: String,

    #[serde(default)]
    pub organizations: Vec<String>,

    /// Default storage prefix for new notebooks of this user.
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: Option<String>,
}

// 默认配置值函数
fn default_root_dir() -> PathBuf {
    PathBuf::from("./")
}

fn default_notebook_tag() -> String {
    "__jupyter-notebook".to_string()
}

fn default_create_retry_budget() -> u32 {
    5
}

fn default_cloud_feature() -> String {
    "notebook_sharing".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nbcloud")
}

fn default_dev_username() -> String {
    "dev".to_string()
}

fn default_storage_prefix() -> Option<String> {
    Some("mem://notebooks/".to_string())
}

impl Default for DevUserConfig {
    fn default() -> Self {
        Self {
            username: default_dev_username(),
            organizations: Vec::new(),
            storage_prefix: default_storage_prefix(),
        }
    }
}

impl Default for ContentsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            notebook_tag: default_notebook_tag(),
            create_retry_budget: default_create_retry_budget(),
            cloud_feature: default_cloud_feature(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            dev_user: DevUserConfig::default(),
        }
    }
}

impl ContentsConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;

        let config: ContentsConfig = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("无法创建目录: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).with_context(|| "无法序列化配置")?;

        std::fs::write(&path, content)
            .with_context(|| format!("无法写入配置文件: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// 开发用云端快照文件路径
    pub fn cloud_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("cloud.json")
    }

    /// 创建数据目录
    pub fn create_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("无法创建数据目录: {:?}", self.data_dir))?;
        Ok(())
    }

    /// 尝试查找配置文件
    pub fn find_config_file() -> Option<PathBuf> {
        // 1. 当前目录下的nbcloud.toml
        let current_dir = Path::new("nbcloud.toml");
        if current_dir.exists() {
            info!("使用自动检测的配置文件: {}", current_dir.display());
            return Some(current_dir.to_path_buf());
        }

        // 2. 用户配置目录
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nbcloud").join("config.toml");
            if user_config.exists() {
                info!("使用用户配置目录配置文件: {}", user_config.display());
                return Some(user_config);
            }
        }

        // 3. 系统配置目录
        #[cfg(not(windows))]
        {
            let system_config = Path::new("/etc/nbcloud/config.toml");
            if system_config.exists() {
                info!("使用系统配置目录配置文件: {}", system_config.display());
                return Some(system_config.to_path_buf());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ContentsConfig::default();
        assert_eq!(config.notebook_tag, "__jupyter-notebook");
        assert_eq!(config.create_retry_budget, 5);
        assert_eq!(config.cloud_feature, "notebook_sharing");
        assert_eq!(config.dev_user.username, "dev");
        assert!(config.cloud_snapshot_path().ends_with("cloud.json"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nbcloud.toml");
        std::fs::write(
            &path,
            "create_retry_budget = 2\n[dev_user]\nusername = \"alice\"\norganizations = [\"orgA\"]\n",
        )
        .unwrap();

        let config = ContentsConfig::from_file(&path).unwrap();
        assert_eq!(config.create_retry_budget, 2);
        assert_eq!(config.notebook_tag, "__jupyter-notebook");
        assert_eq!(config.dev_user.username, "alice");
        assert_eq!(config.dev_user.organizations, vec!["orgA".to_string()]);
        assert_eq!(config.dev_user.storage_prefix.as_deref(), Some("mem://notebooks/"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = ContentsConfig::default();
        config.log_level = "debug".to_string();

        config.save_to_file(&path).unwrap();
        let loaded = ContentsConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
