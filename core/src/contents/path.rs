//! Virtual path parsing and classification
//!
//! Paths coming from the frontend are parsed once into a [`VirtualPath`], a
//! list of non-empty segments split on both `/` and the platform separator.
//! Everything downstream works on segments only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First segment of every remote path
pub const CLOUD_ROOT: &str = "cloud";

/// Extension the frontend needs to recognise a notebook
pub const NOTEBOOK_EXT: &str = ".ipynb";

/// Listing scope under the cloud root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Owned,
    Shared,
    Public,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Owned, Category::Shared, Category::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Owned => "owned",
            Category::Shared => "shared",
            Category::Public => "public",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owned" => Ok(Category::Owned),
            "shared" => Ok(Category::Shared),
            "public" => Ok(Category::Public),
            _ => Err(()),
        }
    }
}

/// What a path denotes, decided from its segments alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// Handled by the local delegate
    Local,
    /// `cloud`
    CloudRoot,
    /// `cloud/<category>`
    Category(Category),
    /// `cloud/<category>/<namespace>`
    Namespace { category: Category, namespace: String },
    /// Anything deeper, or a remote path not matching the directory shapes
    Leaf,
}

impl PathKind {
    pub fn is_remote_dir(&self) -> bool {
        matches!(
            self,
            PathKind::CloudRoot | PathKind::Category(_) | PathKind::Namespace { .. }
        )
    }
}

/// Normalized virtual path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// Parse a frontend path. Empty and `.` segments are dropped, so `""`,
    /// `"."` and `"/"` all denote the local root.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split(|c: char| c == '/' || c == std::path::MAIN_SEPARATOR)
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True iff the first segment is `cloud`
    pub fn is_remote(&self) -> bool {
        self.segments.first().map(String::as_str) == Some(CLOUD_ROOT)
    }

    /// True for `cloud`, `cloud/<category>` and `cloud/<category>/<namespace>`
    pub fn is_remote_dir(&self) -> bool {
        self.kind().is_remote_dir()
    }

    pub fn kind(&self) -> PathKind {
        if !self.is_remote() {
            return PathKind::Local;
        }

        let category = self.segments.get(1).and_then(|s| s.parse::<Category>().ok());
        match (self.segments.len(), category) {
            (1, _) => PathKind::CloudRoot,
            (2, Some(category)) => PathKind::Category(category),
            (3, Some(category)) => PathKind::Namespace {
                category,
                namespace: self.segments[2].clone(),
            },
            _ => PathKind::Leaf,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn has_notebook_ext(&self) -> bool {
        self.file_name()
            .map(|name| name.ends_with(NOTEBOOK_EXT))
            .unwrap_or(false)
    }

    /// Same path with a trailing `.ipynb` removed from the last segment
    pub fn without_notebook_ext(&self) -> VirtualPath {
        match self.file_name().and_then(|name| name.strip_suffix(NOTEBOOK_EXT)) {
            Some(stem) => self.with_file_name(stem),
            None => self.clone(),
        }
    }

    /// Replace the last segment
    pub fn with_file_name(&self, name: &str) -> VirtualPath {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => *last = name.to_string(),
            None => segments.push(name.to_string()),
        }
        Self { segments }
    }

    pub fn join(&self, segment: &str) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Hidden when any segment starts with a dot
    pub fn is_hidden(&self) -> bool {
        self.segments.iter().any(|segment| segment.starts_with('.'))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl From<&str> for VirtualPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_separators() {
        assert!(VirtualPath::parse("").is_root());
        assert!(VirtualPath::parse(".").is_root());
        assert!(VirtualPath::parse("/").is_root());

        let path = VirtualPath::parse("/cloud//owned/alice/");
        assert_eq!(path.segments(), &["cloud", "owned", "alice"]);
        assert_eq!(path.to_string(), "cloud/owned/alice");
    }

    #[test]
    fn test_is_remote() {
        assert!(VirtualPath::parse("cloud").is_remote());
        assert!(VirtualPath::parse("cloud/owned/alice/nb.ipynb").is_remote());
        assert!(VirtualPath::parse("/cloud/shared").is_remote());

        assert!(!VirtualPath::parse("").is_remote());
        assert!(!VirtualPath::parse("clouds/owned").is_remote());
        assert!(!VirtualPath::parse("work/cloud").is_remote());
        assert!(!VirtualPath::parse("notes.ipynb").is_remote());
    }

    #[test]
    fn test_is_remote_dir() {
        assert!(VirtualPath::parse("cloud").is_remote_dir());
        assert!(VirtualPath::parse("cloud/owned").is_remote_dir());
        assert!(VirtualPath::parse("cloud/public").is_remote_dir());
        assert!(VirtualPath::parse("cloud/owned/alice").is_remote_dir());

        assert!(!VirtualPath::parse("cloud/owned/alice/nb.ipynb").is_remote_dir());
        assert!(!VirtualPath::parse("cloud/elsewhere").is_remote_dir());
        assert!(!VirtualPath::parse("cloud/elsewhere/alice").is_remote_dir());
        assert!(!VirtualPath::parse("owned/alice").is_remote_dir());
    }

    #[test]
    fn test_kind() {
        assert_eq!(VirtualPath::parse("docs/a.txt").kind(), PathKind::Local);
        assert_eq!(VirtualPath::parse("cloud").kind(), PathKind::CloudRoot);
        assert_eq!(
            VirtualPath::parse("cloud/shared").kind(),
            PathKind::Category(Category::Shared)
        );
        assert_eq!(
            VirtualPath::parse("cloud/owned/alice").kind(),
            PathKind::Namespace {
                category: Category::Owned,
                namespace: "alice".to_string()
            }
        );
        assert_eq!(VirtualPath::parse("cloud/owned/alice/nb").kind(), PathKind::Leaf);
        assert_eq!(VirtualPath::parse("cloud/alice").kind(), PathKind::Leaf);
    }

    #[test]
    fn test_notebook_extension() {
        let path = VirtualPath::parse("cloud/owned/alice/nb.ipynb");
        assert!(path.has_notebook_ext());
        assert_eq!(path.without_notebook_ext().to_string(), "cloud/owned/alice/nb");

        let plain = VirtualPath::parse("cloud/owned/alice/data.csv");
        assert_eq!(plain.without_notebook_ext(), plain);
    }

    #[test]
    fn test_hidden_and_rename() {
        assert!(VirtualPath::parse("work/.secret/a.txt").is_hidden());
        assert!(!VirtualPath::parse("work/a.txt").is_hidden());

        let renamed = VirtualPath::parse("cloud/owned/alice/nb.ipynb").with_file_name("nb-1.ipynb");
        assert_eq!(renamed.to_string(), "cloud/owned/alice/nb-1.ipynb");
    }
}
