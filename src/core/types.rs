//! core::types
//!
//! Strong types for the object-model domain.
//!
//! # Types
//!
//! - [`ObjectId`] - Git object identifier (SHA-1, 40 hex chars)
//! - [`BranchName`] - Validated git branch name
//! - [`RepoPath`] - Validated `/`-separated logical path inside the tree
//! - [`FileEntry`] - Transient edit-request DTO (path + content bytes)
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values cannot
//! be represented, so the git layer never has to re-check path or ref shape.
//!
//! ```
//! use gitsync::core::types::{BranchName, ObjectId, RepoPath};
//!
//! let branch = BranchName::new("content/main").unwrap();
//! let id = ObjectId::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let path = RepoPath::new("playbooks/alerts/triage.json").unwrap();
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(ObjectId::new("not-a-sha").is_err());
//! assert!(RepoPath::new("/leading/slash").is_err());
//! # let _ = (branch, id, path);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid repository path: {0}")]
    InvalidPath(String),
}

/// A git object identifier: the SHA-1 of an object's canonical
/// serialization, as 40 lowercase hex characters.
///
/// Two objects with identical serialized bytes have identical ids; the
/// object store never holds duplicates under different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Create a validated object id. Uppercase hex is normalized to
    /// lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidObjectId` unless the input is exactly
    /// 40 hex characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.len() != 40 {
            return Err(TypeError::InvalidObjectId(format!(
                "expected 40 hex characters, got {}",
                id.len()
            )));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidObjectId(
                "contains non-hex characters".into(),
            ));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get an abbreviated form (first `len` characters).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated git branch name.
///
/// Branch names must conform to git's refname rules (see
/// `git check-ref-format`):
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`, or end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, spaces, control characters,
///   or any of `~ ^ : \ ? * [`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates git's
    /// refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '.' or '-'".into(),
            ));
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '.lock' or '/'".into(),
            ));
        }
        for fragment in ["..", "@{", "//"] {
            if name.contains(fragment) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{fragment}'"
                )));
            }
        }
        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        for c in INVALID_CHARS {
            if name.contains(c) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{c}'"
                )));
            }
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot contain control characters".into(),
            ));
        }
        for component in name.split('/') {
            if component.starts_with('.') {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot start with '.'".into(),
                ));
            }
            if component.ends_with(".lock") {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot end with '.lock'".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated logical path inside a tree: `/`-separated, relative to the
/// repository root.
///
/// Paths carry no further structure; grouping conventions (category
/// prefixes and the like) are owned by the calling content layer.
///
/// Rules:
/// - Cannot be empty
/// - No leading or trailing `/`, no empty segments (`a//b`)
/// - No `.` or `..` segments
/// - No NUL or other control characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a validated repository path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if any rule above is violated.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(TypeError::InvalidPath(
                "path cannot start or end with '/'".into(),
            ));
        }
        if path.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidPath(
                "path cannot contain control characters".into(),
            ));
        }
        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(TypeError::InvalidPath(
                    "path cannot contain empty segments".into(),
                ));
            }
            if segment == "." || segment == ".." {
                return Err(TypeError::InvalidPath(
                    "path cannot contain '.' or '..' segments".into(),
                ));
            }
        }
        Ok(())
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path split into its `/`-separated segments. Always non-empty.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').collect()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An edit request: one logical file destined for the tree.
///
/// Transient - this is not a git object. Content is raw bytes; text callers
/// are expected to pass UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Logical path, `/`-separated. Relative to the repository root for
    /// unscoped updates, or to the scope path for scoped updates.
    pub path: RepoPath,
    /// File content, passed through unmodified.
    pub content: Vec<u8>,
}

impl FileEntry {
    /// Build an entry from a raw path string and content bytes.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if the path fails validation.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        Ok(Self {
            path: RepoPath::new(path)?,
            content: content.into(),
        })
    }
}
