//! Notebook contents over a cloud catalog
//!
//! Paths starting with `cloud/` are served from backend arrays registered in
//! a remote catalog; every other path goes to a local delegate. Below
//! `cloud/` the tree is synthetic:
//!
//! ```text
//! cloud/                      root, one node per category
//! cloud/<category>/           owned | shared | public, one node per namespace
//! cloud/<category>/<ns>/      one leaf per catalog record
//! cloud/<category>/<ns>/<leaf>.ipynb
//! ```
//!
//! Only the trailing `<ns>/<leaf>` pair addresses the backend.

pub mod builder;
pub mod catalog;
pub mod checkpoints;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod local;
pub mod manager;
pub mod memory;
pub mod model;
pub mod notebook;
pub mod path;
pub mod resolver;
pub mod storage;


use nbcloud_shared::ContentsConfig;

pub use catalog::{ArrayRecord, Catalog, OrganizationProfile, UserProfile};
pub use checkpoints::{Checkpoints, CloudCheckpoints, FileCheckpoints};
pub use error::{CatalogError, ContentsError, ContentsResult, StorageError};
pub use lifecycle::{increment_filename, ArrayLifecycle};
pub use local::{FileContentsStore, LocalContents};
pub use manager::ContentsManager;
pub use memory::{MemoryCloud, Visibility};
pub use model::{CheckpointModel, Content, ContentModel, ContentType, SaveModel};
pub use notebook::{JsonNotebookCodec, NotebookCodec, ValidationError};
pub use path::{Category, PathKind, VirtualPath};
pub use resolver::{resolve, ArrayUri};
pub use storage::{ArrayHandle, ArrayMetadata, ArraySchema, ArrayStore};

/// Settings the contents core needs, independent of where they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsSettings {
    /// Attached to every created array; the only filter of every listing
    pub notebook_tag: String,
    /// Consecutive name collisions tolerated by create
    pub create_retry_budget: u32,
    /// Profile feature enabling the `cloud` node in the root listing
    pub cloud_feature: String,
}

impl Default for ContentsSettings {
    fn default() -> Self {
        Self {
            notebook_tag: "__jupyter-notebook".to_string(),
            create_retry_budget: 5,
            cloud_feature: "notebook_sharing".to_string(),
        }
    }
}

impl From<&ContentsConfig> for ContentsSettings {
    fn from(config: &ContentsConfig) -> Self {
        Self {
            notebook_tag: config.notebook_tag.clone(),
            create_retry_budget: config.create_retry_budget,
            cloud_feature: config.cloud_feature.clone(),
        }
    }
}
