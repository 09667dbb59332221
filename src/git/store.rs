//! git::store
//!
//! Content-addressed object storage over the git object database.
//!
//! The store is an arena of immutable objects keyed by their content hash:
//! writing is idempotent (re-putting identical content returns the same id
//! without growing storage) and there are no update or delete operations.
//! Objects persist for the lifetime of the local working copy; garbage
//! collection is out of scope.

use chrono::{DateTime, Utc};

use crate::core::types::ObjectId;
use crate::git::errors::GitError;

/// Tree entry mode for a regular file.
pub(crate) const MODE_BLOB: i32 = 0o100_644;
/// Tree entry mode for a subdirectory.
pub(crate) const MODE_TREE: i32 = 0o040_000;

/// Convert a validated [`ObjectId`] into a raw git2 oid.
pub(crate) fn git_oid(id: &ObjectId) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(id.as_str()).map_err(|e| GitError::from_git2(e, id.as_str()))
}

/// Convert a raw git2 oid into a validated [`ObjectId`].
pub(crate) fn object_id(oid: git2::Oid) -> Result<ObjectId, GitError> {
    Ok(ObjectId::new(oid.to_string())?)
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit id
    pub id: ObjectId,
    /// The id of the tree the commit snapshots
    pub tree_id: ObjectId,
    /// First line of the commit message
    pub summary: String,
    /// Full commit message
    pub message: String,
    /// Author name
    pub author_name: String,
    /// Author email
    pub author_email: String,
    /// Author timestamp
    pub author_time: DateTime<Utc>,
}

/// Content-addressed storage of blobs, trees and commits.
///
/// A thin, typed layer over the repository's object database. `put` is
/// idempotent and `get` operations fail with [`GitError::NotFound`] when the
/// object is absent; nothing is ever updated or deleted.
#[derive(Clone, Copy)]
pub struct ObjectStore<'r> {
    repo: &'r git2::Repository,
}

impl std::fmt::Debug for ObjectStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl<'r> ObjectStore<'r> {
    pub fn new(repo: &'r git2::Repository) -> Self {
        Self { repo }
    }

    /// Store content as a blob and return its id.
    ///
    /// Identical content always maps to the identical id; storage does not
    /// grow when the blob already exists.
    pub fn put_blob(&self, content: &[u8]) -> Result<ObjectId, GitError> {
        let oid = self.repo.blob(content)?;
        object_id(oid)
    }

    /// Read a blob's bytes.
    ///
    /// # Errors
    ///
    /// [`GitError::NotFound`] if no blob with this id exists.
    pub fn blob_bytes(&self, id: &ObjectId) -> Result<Vec<u8>, GitError> {
        Ok(self.blob(id)?.content().to_vec())
    }

    /// Look up a blob by id.
    pub fn blob(&self, id: &ObjectId) -> Result<git2::Blob<'r>, GitError> {
        self.repo
            .find_blob(git_oid(id)?)
            .map_err(|e| GitError::from_git2(e, id.as_str()))
    }

    /// Look up a tree by id.
    pub fn tree(&self, id: &ObjectId) -> Result<git2::Tree<'r>, GitError> {
        self.repo
            .find_tree(git_oid(id)?)
            .map_err(|e| GitError::from_git2(e, id.as_str()))
    }

    /// Look up a commit by id.
    pub fn commit(&self, id: &ObjectId) -> Result<git2::Commit<'r>, GitError> {
        self.repo
            .find_commit(git_oid(id)?)
            .map_err(|e| GitError::from_git2(e, id.as_str()))
    }

    /// Whether an object with this id exists in the store.
    pub fn contains(&self, id: &ObjectId) -> Result<bool, GitError> {
        Ok(self.repo.odb()?.exists(git_oid(id)?))
    }

    /// Write the canonical empty tree and return its id.
    pub fn empty_tree(&self) -> Result<ObjectId, GitError> {
        let oid = self.repo.treebuilder(None)?.write()?;
        object_id(oid)
    }

    /// A tree builder seeded from `base`, or empty when `base` is `None`.
    pub(crate) fn treebuilder(
        &self,
        base: Option<&git2::Tree<'_>>,
    ) -> Result<git2::TreeBuilder<'r>, GitError> {
        Ok(self.repo.treebuilder(base)?)
    }

    /// Get information about a commit.
    pub fn commit_info(&self, id: &ObjectId) -> Result<CommitInfo, GitError> {
        let commit = self.commit(id)?;
        let author = commit.author();
        let author_time = DateTime::from_timestamp(author.when().seconds(), 0)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .with_timezone(&Utc);

        Ok(CommitInfo {
            id: id.clone(),
            tree_id: object_id(commit.tree_id())?,
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            author_time,
        })
    }
}
