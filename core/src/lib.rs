// Config module lives in nbcloud-shared
pub mod contents;
pub mod logger;

// Re-export most common types for convenience
pub use contents::{
    ContentModel, ContentType, ContentsError, ContentsManager, ContentsResult, ContentsSettings, MemoryCloud,
    SaveModel, VirtualPath,
};

// Re-export log macros
pub use tracing::{debug, error, info, trace, warn};
