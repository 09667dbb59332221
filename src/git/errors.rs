//! git::errors
//!
//! Typed failure categories for git operations. The categorization is what
//! lets the lifecycle treat push divergence as deferrable while everything
//! else propagates.

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::types::TypeError;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Requested path, object or ref is absent. Recoverable: callers
    /// typically substitute a default.
    #[error("not found: {what}")]
    NotFound {
        /// The path, object id or ref that was missing
        what: String,
    },

    /// The remote rejected our credentials. Fatal for clone and fetch.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The remote could not be reached or the connection broke mid-exchange.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Host key fingerprint mismatch or unsupported fingerprint format.
    /// Always fatal; the connection is refused before any protocol bytes
    /// are exchanged.
    #[error("host key verification failed: {message}")]
    HostVerification { message: String },

    /// Push rejected because the remote branch moved ahead of the local
    /// parent. The only deferrable error: the lifecycle logs a warning and
    /// leaves the local branch ahead until a later run succeeds.
    #[error("branch '{branch}' has diverged from the remote: {message}")]
    Diverged { branch: String, message: String },

    /// An edit path expects a directory where a file exists, or vice versa.
    /// Signals caller-side data inconsistency.
    #[error("structural conflict at '{path}': {message}")]
    StructuralConflict { path: String, message: String },

    /// A domain value failed validation.
    #[error(transparent)]
    InvalidType(#[from] TypeError),

    /// Configuration was rejected at the lifecycle boundary.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Anything libgit2 reports that has no dedicated category.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::NotFound {
                what: context.to_string(),
            },
            _ => classify(err, Some(context)),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        classify(err, None)
    }
}

fn classify(err: git2::Error, context: Option<&str>) -> GitError {
    let message = match context {
        Some(ctx) => format!("{}: {}", ctx, err.message()),
        None => err.message().to_string(),
    };

    match err.code() {
        git2::ErrorCode::NotFound => GitError::NotFound { what: message },
        git2::ErrorCode::Auth => GitError::Authentication { message },
        git2::ErrorCode::Certificate => GitError::HostVerification { message },
        git2::ErrorCode::NotFastForward => GitError::Diverged {
            branch: String::new(),
            message,
        },
        _ => match err.class() {
            git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh => {
                GitError::Connection { message }
            }
            _ => GitError::Internal { message },
        },
    }
}
