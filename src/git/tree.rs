//! git::tree
//!
//! Copy-on-write tree editing and read-side path traversal.
//!
//! Trees are persistent values: an edit never mutates an existing tree, it
//! allocates a fresh tree at every level along the edited path and reuses
//! every sibling entry by reference. The old root stays valid and
//! addressable for as long as something references its id.
//!
//! # Update semantics
//!
//! [`TreeEditor::update`] has two modes, selected by the `scope` argument:
//!
//! - **Unscoped** (`scope = None`): each file's path is resolved
//!   independently against the root; existing files at the same path are
//!   overwritten in place, missing files are added, and nothing else is
//!   touched. Nothing is ever deleted.
//! - **Scoped** (`scope = Some(path)`): the subtree rooted at `path` is
//!   replaced entirely by a fresh tree built solely from the given files
//!   (whose paths are relative to `path`). Anything previously under the
//!   scope that is not in `files` is gone. Used to republish an entity's
//!   full file set. Paths outside the scope are untouched.
//!
//! Both modes recurse bottom-up, bounded by path depth: the deepest tree is
//! synthesized first, then each ancestor is rewritten with the single child
//! entry updated. Every newly created blob and tree is persisted before it
//! is linked into a parent.
//!
//! # Structural conflicts
//!
//! A path that needs a directory where a file already exists (or the
//! reverse, writing a file over an existing directory) is rejected with
//! [`GitError::StructuralConflict`] rather than silently changing an
//! entry's type.

use std::cell::RefCell;

use tracing::debug;

use crate::core::types::{FileEntry, ObjectId, RepoPath};
use crate::git::errors::GitError;
use crate::git::store::{git_oid, object_id, ObjectStore, MODE_BLOB, MODE_TREE};

/// Recursive, copy-on-write tree mutation.
#[derive(Debug, Clone, Copy)]
pub struct TreeEditor<'r> {
    store: ObjectStore<'r>,
}

impl<'r> TreeEditor<'r> {
    pub fn new(store: ObjectStore<'r>) -> Self {
        Self { store }
    }

    /// Apply `files` to the tree at `root` and return the new root id.
    ///
    /// See the module docs for the unscoped/scoped semantics. Edits issued
    /// in sequence compose: each call's output id is the next call's input.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotFound`] if `root` is not a tree in the store
    /// - [`GitError::StructuralConflict`] on a file/directory type clash
    pub fn update(
        &self,
        root: &ObjectId,
        files: &[FileEntry],
        scope: Option<&RepoPath>,
    ) -> Result<ObjectId, GitError> {
        let root_tree = self.store.tree(root)?;

        let new_root = match scope {
            None => {
                let mut current = root_tree;
                for file in files {
                    let oid =
                        self.insert_file(Some(&current), &file.path.segments(), &file.content)?;
                    current = self.store.tree(&object_id(oid)?)?;
                }
                current.id()
            }
            Some(path) => {
                debug!(scope = %path, files = files.len(), "replacing subtree");
                self.replace_subtree(Some(&root_tree), &path.segments(), files)?
            }
        };

        object_id(new_root)
    }

    /// Write `content` at `segments`, rewriting the ancestor chain.
    ///
    /// Walks down level by level, then unwinds: the blob is inserted into a
    /// builder seeded from the deepest existing tree (or an empty one), and
    /// each parent is rebuilt with just that one child entry updated.
    fn insert_file(
        &self,
        tree: Option<&git2::Tree<'_>>,
        segments: &[&str],
        content: &[u8],
    ) -> Result<git2::Oid, GitError> {
        // RepoPath guarantees at least one segment.
        let (name, rest) = segments
            .split_first()
            .ok_or_else(|| GitError::Internal {
                message: "empty path in tree edit".into(),
            })?;

        let mut builder = self.store.treebuilder(tree)?;

        if rest.is_empty() {
            if let Some(entry) = builder.get(*name)? {
                if entry.kind() == Some(git2::ObjectType::Tree) {
                    return Err(GitError::StructuralConflict {
                        path: (*name).to_string(),
                        message: "a directory exists where a file would be written".into(),
                    });
                }
            }
            let blob = self.store.put_blob(content)?;
            builder.insert(*name, git_oid(&blob)?, MODE_BLOB)?;
        } else {
            let child = match builder.get(*name)? {
                Some(entry) if entry.kind() == Some(git2::ObjectType::Tree) => {
                    Some(self.store.tree(&object_id(entry.id())?)?)
                }
                Some(_) => {
                    return Err(GitError::StructuralConflict {
                        path: (*name).to_string(),
                        message: "a file exists where a directory is expected".into(),
                    });
                }
                None => None,
            };
            let subtree = self.insert_file(child.as_ref(), rest, content)?;
            builder.insert(*name, subtree, MODE_TREE)?;
        }

        Ok(builder.write()?)
    }

    /// Descend along `segments` and replace the subtree at the end with a
    /// tree built purely from `files`, rewriting each ancestor on the way
    /// back up. Missing intermediate directories are created; siblings are
    /// carried over by reference.
    fn replace_subtree(
        &self,
        tree: Option<&git2::Tree<'_>>,
        segments: &[&str],
        files: &[FileEntry],
    ) -> Result<git2::Oid, GitError> {
        let Some((name, rest)) = segments.split_first() else {
            // Scope reached: synthesize a brand-new tree from the files,
            // ignoring whatever was here before.
            let mut oid = git_oid(&self.store.empty_tree()?)?;
            for file in files {
                let base = self.store.tree(&object_id(oid)?)?;
                oid = self.insert_file(Some(&base), &file.path.segments(), &file.content)?;
            }
            return Ok(oid);
        };

        let child = match tree.and_then(|t| t.get_name(*name)) {
            Some(entry) if entry.kind() == Some(git2::ObjectType::Tree) => {
                Some(self.store.tree(&object_id(entry.id())?)?)
            }
            Some(_) => {
                return Err(GitError::StructuralConflict {
                    path: (*name).to_string(),
                    message: "a file exists where a directory is expected".into(),
                });
            }
            None => None,
        };

        let new_child = self.replace_subtree(child.as_ref(), rest, files)?;

        let mut builder = self.store.treebuilder(tree)?;
        builder.insert(*name, new_child, MODE_TREE)?;
        Ok(builder.write()?)
    }
}

/// The object a path resolved to.
#[derive(Debug)]
pub enum Resolved<'r> {
    /// A regular file.
    Blob(git2::Blob<'r>),
    /// A subdirectory.
    Tree(git2::Tree<'r>),
}

/// Read-side traversal of committed trees.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'r> {
    store: ObjectStore<'r>,
}

impl<'r> PathResolver<'r> {
    pub fn new(store: ObjectStore<'r>) -> Self {
        Self { store }
    }

    /// Resolve `path` against the tree at `root` to a blob or subtree.
    ///
    /// # Errors
    ///
    /// [`GitError::NotFound`] if any path segment is absent, or if a
    /// non-final segment resolves to a file instead of a directory.
    pub fn resolve(&self, root: &ObjectId, path: &RepoPath) -> Result<Resolved<'r>, GitError> {
        let mut tree = self.store.tree(root)?;
        let segments = path.segments();
        let (last, parents) = segments.split_last().ok_or_else(|| GitError::Internal {
            message: "empty path in resolve".into(),
        })?;

        for name in parents {
            // Pull the child id out before reassigning: the entry borrows
            // the tree it came from.
            let child = {
                let entry = tree.get_name(*name).ok_or_else(|| GitError::NotFound {
                    what: path.to_string(),
                })?;
                if entry.kind() != Some(git2::ObjectType::Tree) {
                    return Err(GitError::NotFound {
                        what: path.to_string(),
                    });
                }
                object_id(entry.id())?
            };
            tree = self.store.tree(&child)?;
        }

        let entry = tree.get_name(*last).ok_or_else(|| GitError::NotFound {
            what: path.to_string(),
        })?;

        match entry.kind() {
            Some(git2::ObjectType::Tree) => {
                Ok(Resolved::Tree(self.store.tree(&object_id(entry.id())?)?))
            }
            Some(git2::ObjectType::Blob) => {
                Ok(Resolved::Blob(self.store.blob(&object_id(entry.id())?)?))
            }
            _ => Err(GitError::NotFound {
                what: path.to_string(),
            }),
        }
    }

    /// Read a regular file's bytes at `path`.
    ///
    /// # Errors
    ///
    /// [`GitError::NotFound`] if absent; [`GitError::StructuralConflict`]
    /// if the path names a directory.
    pub fn file_bytes(&self, root: &ObjectId, path: &RepoPath) -> Result<Vec<u8>, GitError> {
        match self.resolve(root, path)? {
            Resolved::Blob(blob) => Ok(blob.content().to_vec()),
            Resolved::Tree(_) => Err(GitError::StructuralConflict {
                path: path.to_string(),
                message: "expected a file, found a directory".into(),
            }),
        }
    }

    /// Recursively enumerate every regular file under `path` (or under the
    /// whole tree when `path` is `None`), excluding directory entries.
    ///
    /// Returned paths are relative to the repository root, not to `path`.
    pub fn list_files(
        &self,
        root: &ObjectId,
        path: Option<&RepoPath>,
    ) -> Result<Vec<FileEntry>, GitError> {
        let (tree, base) = match path {
            None => (self.store.tree(root)?, String::new()),
            Some(path) => match self.resolve(root, path)? {
                Resolved::Tree(tree) => (tree, format!("{path}/")),
                Resolved::Blob(_) => {
                    return Err(GitError::StructuralConflict {
                        path: path.to_string(),
                        message: "expected a directory, found a file".into(),
                    });
                }
            },
        };

        let mut files = Vec::new();
        let error: RefCell<Option<GitError>> = RefCell::new(None);

        let walk = tree.walk(git2::TreeWalkMode::PreOrder, |prefix, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob) || entry.filemode() != MODE_BLOB {
                return git2::TreeWalkResult::Ok;
            }
            let Some(name) = entry.name() else {
                return git2::TreeWalkResult::Ok;
            };

            let collected = object_id(entry.id())
                .and_then(|id| self.store.blob_bytes(&id))
                .and_then(|content| {
                    Ok(FileEntry {
                        path: RepoPath::new(format!("{base}{prefix}{name}"))?,
                        content,
                    })
                });

            match collected {
                Ok(entry) => {
                    files.push(entry);
                    git2::TreeWalkResult::Ok
                }
                Err(e) => {
                    *error.borrow_mut() = Some(e);
                    git2::TreeWalkResult::Abort
                }
            }
        });

        if let Some(err) = error.into_inner() {
            return Err(err);
        }
        walk?;

        Ok(files)
    }
}
