//! Virtual path to backend array identifier resolution

use crate::contents::error::{ContentsError, ContentsResult};
use crate::contents::path::VirtualPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend identifier of one stored leaf: `<namespace>/<name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayUri {
    pub namespace: String,
    pub name: String,
}

impl ArrayUri {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Same namespace, different leaf name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: name.into(),
        }
    }

    /// Physical location an array is created at, below a namespace's
    /// default storage prefix
    pub fn storage_location(&self, prefix: &str) -> StorageLocation {
        StorageLocation {
            namespace: self.namespace.clone(),
            location: format!("{}{}", prefix, self.name),
        }
    }
}

impl fmt::Display for ArrayUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Where the array store physically creates an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub namespace: String,
    pub location: String,
}

impl StorageLocation {
    /// Name the catalog registers the array under: the last component of the
    /// location
    pub fn registered_name(&self) -> &str {
        self.location
            .rsplit('/')
            .next()
            .unwrap_or(self.location.as_str())
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.location)
    }
}

/// Resolve a virtual path to its backend URI.
///
/// Only the trailing `(namespace, name)` pair matters; the leading
/// `cloud/<category>` segments are routing information for the classifier.
pub fn resolve(path: &VirtualPath) -> ContentsResult<ArrayUri> {
    match path.segments() {
        [.., namespace, name] => Ok(ArrayUri::new(namespace.as_str(), name.as_str())),
        _ => Err(ContentsError::InvalidPath(format!(
            "'{}' needs at least a namespace and a name",
            path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_trailing_pair() {
        let uri = resolve(&VirtualPath::parse("cloud/owned/alice/x")).unwrap();
        assert_eq!(uri, ArrayUri::new("alice", "x"));
        assert_eq!(uri.to_string(), "alice/x");

        let other = resolve(&VirtualPath::parse("x/y/alice/x")).unwrap();
        assert_eq!(uri, other);

        let short = resolve(&VirtualPath::parse("alice/x")).unwrap();
        assert_eq!(uri, short);
    }

    #[test]
    fn test_resolve_too_short() {
        let err = resolve(&VirtualPath::parse("cloud")).unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(resolve(&VirtualPath::parse("")).is_err());
    }

    #[test]
    fn test_storage_location() {
        let uri = ArrayUri::new("alice", "nb");
        let location = uri.storage_location("s3://bucket/notebooks/");
        assert_eq!(location.location, "s3://bucket/notebooks/nb");
        assert_eq!(location.registered_name(), "nb");
        assert_eq!(uri.with_name("nb-1").to_string(), "alice/nb-1");
    }
}
