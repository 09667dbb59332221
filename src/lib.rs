//! gitsync - a git object-model synchronization engine
//!
//! gitsync publishes structured content into a version-controlled repository
//! by editing git objects directly: blobs, trees, commits and refs. There is
//! never a working-tree checkout; every mutation is a surgical, path-scoped
//! rewrite of the tree graph that preserves content addressing and structural
//! sharing. A single tracked branch is cloned (or bootstrapped), edited in
//! memory, committed, and pushed over smart HTTP(S) or SSH, with the SSH host
//! key verified against an operator-configured fingerprint before any
//! protocol data is exchanged.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types and configuration
//! - [`git`] - Single interface for all git operations: object store,
//!   tree editing, path resolution, repository lifecycle, secure transport
//!
//! # Correctness Invariants
//!
//! 1. Objects are immutable and content-addressed; an "edit" always produces
//!    a new root tree id while prior roots remain valid and addressable
//! 2. Editing a path rewrites only the chain of ancestor trees on that path;
//!    siblings are shared by reference, never rehashed
//! 3. A refresh aligns the local view with the remote unconditionally: the
//!    tracked branch is force-reset to the fetched remote value, discarding
//!    un-pushed local commits rather than merging or rebasing them
//! 4. A host key fingerprint mismatch refuses the connection before any git
//!    protocol exchange

pub mod core;
pub mod git;

pub use crate::core::config::SyncConfig;
pub use crate::core::types::{FileEntry, ObjectId, RepoPath};
pub use crate::git::{ContentRepo, GitError};
