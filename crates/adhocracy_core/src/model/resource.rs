//! Resource identity and kinds.
//!
//! # Invariants
//! - `ResourcePath` always starts and ends with `/`.
//! - Every non-root segment matches `[A-Za-z0-9_.@:-]+`.
//! - The parent of a resource is derived from its path, never stored apart
//!   from it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.@:-]+$").expect("valid path segment regex"));

/// Prefix used for auto-named item versions.
pub const VERSION_NAME_PREFIX: &str = "VERSION_";

/// Errors raised while parsing or building resource paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    NotAbsolute(String),
    InvalidSegment { path: String, segment: String },
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAbsolute(path) => write!(f, "resource path must start with `/`: `{path}`"),
            Self::InvalidSegment { path, segment } => {
                write!(f, "invalid segment `{segment}` in resource path `{path}`")
            }
        }
    }
}

impl Error for PathError {}

/// Absolute, slash-terminated location of a resource in the content tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The root pool.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parses `/a/b` or `/a/b/` into a normalized path.
    pub fn parse(value: &str) -> Result<Self, PathError> {
        let trimmed = value.trim();
        if !trimmed.starts_with('/') {
            return Err(PathError::NotAbsolute(trimmed.to_string()));
        }
        let mut normalized = String::from("/");
        for segment in trimmed.split('/').filter(|segment| !segment.is_empty()) {
            if !SEGMENT_RE.is_match(segment) {
                return Err(PathError::InvalidSegment {
                    path: trimmed.to_string(),
                    segment: segment.to_string(),
                });
            }
            normalized.push_str(segment);
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let without_slash = &self.0[..self.0.len() - 1];
        let cut = without_slash.rfind('/').map_or(0, |index| index + 1);
        Some(Self(without_slash[..cut].to_string()))
    }

    /// Builds the path of a direct child named `name`.
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        if !SEGMENT_RE.is_match(name) {
            return Err(PathError::InvalidSegment {
                path: self.0.clone(),
                segment: name.to_string(),
            });
        }
        Ok(Self(format!("{}{name}/", self.0)))
    }

    /// Whether `self` is a strict ancestor of `other` in the content tree.
    pub fn is_ancestor_of(&self, other: &ResourcePath) -> bool {
        self != other && other.0.starts_with(self.0.as_str())
    }

    /// Ancestors of this path from the direct parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = ResourcePath> {
        std::iter::successors(self.parent(), |path| path.parent())
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourcePath> for String {
    fn from(value: ResourcePath) -> Self {
        value.0
    }
}

/// Structural role of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Container without versioning.
    Pool,
    /// Versioned container owning item versions and tags.
    Item,
    /// One immutable revision of an item.
    ItemVersion,
    /// Leaf resource that may hold sheet references.
    Simple,
}

impl ResourceKind {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Item => "item",
            Self::ItemVersion => "item_version",
            Self::Simple => "simple",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "pool" => Some(Self::Pool),
            "item" => Some(Self::Item),
            "item_version" => Some(Self::ItemVersion),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }

    /// Only items and pools may contain children.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Pool | Self::Item)
    }
}

/// Stored resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub path: ResourcePath,
    pub kind: ResourceKind,
    /// Dotted content type identifier, e.g. `adhocracy_core.resources.paragraph.IParagraph`.
    pub content_type: String,
    /// Principal path that created the resource.
    pub creator: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
}

impl Resource {
    pub fn parent(&self) -> Option<ResourcePath> {
        self.path.parent()
    }

    pub fn is_item_version(&self) -> bool {
        self.kind == ResourceKind::ItemVersion
    }
}

/// Formats the auto-generated name of the `number`-th version of an item.
pub fn version_name(number: u32) -> String {
    format!("{VERSION_NAME_PREFIX}{number:07}")
}

#[cfg(test)]
mod tests {
    use super::{version_name, PathError, ResourceKind, ResourcePath};

    #[test]
    fn parse_normalizes_trailing_slash_and_duplicates() {
        let path = ResourcePath::parse("/organisation//proposal").unwrap();
        assert_eq!(path.as_str(), "/organisation/proposal/");
        assert_eq!(path.name(), "proposal");
    }

    #[test]
    fn parse_rejects_relative_and_bad_segments() {
        assert!(matches!(
            ResourcePath::parse("proposal/"),
            Err(PathError::NotAbsolute(_))
        ));
        assert!(matches!(
            ResourcePath::parse("/pro posal/"),
            Err(PathError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn parent_chain_walks_up_to_root() {
        let path = ResourcePath::parse("/a/b/c/").unwrap();
        let ancestors: Vec<String> = path.ancestors().map(String::from).collect();
        assert_eq!(ancestors, vec!["/a/b/", "/a/", "/"]);
        assert_eq!(ResourcePath::root().parent(), None);
    }

    #[test]
    fn ancestor_check_is_strict() {
        let item = ResourcePath::parse("/a/item/").unwrap();
        let version = item.child("VERSION_0000001").unwrap();
        assert!(item.is_ancestor_of(&version));
        assert!(!item.is_ancestor_of(&item));
        assert!(!version.is_ancestor_of(&item));
        let sibling = ResourcePath::parse("/a/item2/").unwrap();
        assert!(!item.is_ancestor_of(&sibling));
    }

    #[test]
    fn version_names_are_zero_padded() {
        assert_eq!(version_name(0), "VERSION_0000000");
        assert_eq!(version_name(12), "VERSION_0000012");
    }

    #[test]
    fn kind_db_mapping_is_symmetric() {
        for kind in [
            ResourceKind::Pool,
            ResourceKind::Item,
            ResourceKind::ItemVersion,
            ResourceKind::Simple,
        ] {
            assert_eq!(ResourceKind::from_db_str(kind.as_db_str()), Some(kind));
        }
    }
}
