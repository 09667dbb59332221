//! git
//!
//! Single interface for all git operations.
//!
//! This module is the **only doorway** to git. Every repository read and
//! write flows through it, via the `git2` crate exclusively (no shelling out
//! to the git CLI), and no other module imports `git2` directly.
//!
//! # Components
//!
//! - [`ObjectStore`] - content-addressed storage of blobs, trees and commits
//! - [`TreeEditor`] - copy-on-write, path-scoped tree mutation
//! - [`PathResolver`] - read-side traversal of committed trees
//! - [`ContentRepo`] - clone / pull / commit / push lifecycle over one
//!   tracked branch
//! - [`Transport`] - credentials plus host-key fingerprint verification for
//!   the SSH and HTTP(S) transports
//!
//! # Invariants
//!
//! - Objects are never mutated in place; edits allocate fresh trees and
//!   return new root ids
//! - There is no working-tree checkout at any point; all content lives in
//!   the object database
//! - The tracked branch is the only local branch ref this crate moves,
//!   whether by commit or by reset to the remote value

mod errors;
mod repo;
mod store;
mod transport;
mod tree;

pub use errors::GitError;
pub use repo::ContentRepo;
pub use store::{CommitInfo, ObjectStore};
pub use transport::{Credentials, HostFingerprint, Transport};
pub use tree::{PathResolver, Resolved, TreeEditor};
