//! Repository lifecycle: open-or-clone, branch checkout, and the
//! commit/push cycle.
//!
//! [`ContentRepo`] is the top-level handle. Opening one either reuses
//! an existing clone under the working directory (refreshing its
//! remote-tracking refs) or clones from scratch, then makes sure the
//! tracked branch exists locally and HEAD points at it. The worktree
//! itself is never populated; all reads and writes go through the
//! object database.
//!
//! The handle carries a working root tree id. Updates rewrite that
//! tree in the object store without committing; a later
//! [`ContentRepo::commit_and_push`] turns the accumulated edits into a
//! single commit. A push rejected because the remote moved ahead is
//! logged and deferred rather than surfaced as an error; the next
//! refresh adopts the remote history (discarding the un-pushed
//! commit) so the cycle after it can publish again.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::core::config::SyncConfig;
use crate::core::types::{BranchName, FileEntry, ObjectId, RepoPath};
use crate::git::errors::GitError;
use crate::git::store::{git_oid, object_id, CommitInfo, ObjectStore, MODE_BLOB};
use crate::git::transport::Transport;
use crate::git::tree::{PathResolver, TreeEditor};

const REMOTE_NAME: &str = "origin";
const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Files written to an empty remote so the tracked branch has a root
/// commit to build on.
const BOOTSTRAP_README_NAME: &str = "README.md";
const BOOTSTRAP_README: &[u8] = b"# GitSync\n";
const BOOTSTRAP_METADATA_NAME: &str = "GitSync.json";

/// A synchronized content repository.
///
/// Owns the underlying git repository, the transport configuration and
/// the working root tree id that edits accumulate onto.
pub struct ContentRepo {
    repo: git2::Repository,
    config: SyncConfig,
    transport: Transport,
    working_dir: PathBuf,
    tree_id: ObjectId,
}

impl std::fmt::Debug for ContentRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRepo")
            .field("working_dir", &self.working_dir)
            .field("branch", &self.config.branch)
            .field("tree_id", &self.tree_id)
            .finish_non_exhaustive()
    }
}

impl ContentRepo {
    /// Open the repository under `working_dir`, cloning it first when
    /// it does not exist yet.
    ///
    /// An existing clone has its TLS verification setting reconciled
    /// with the configuration and its remote-tracking refs refreshed.
    /// A fresh clone that fails part-way is rolled back by removing
    /// the working directory. Either way, the tracked branch is then
    /// checked out (bootstrapping an initial commit when both the
    /// local and remote histories are empty) and the working root is
    /// set to the branch tip's tree.
    pub fn open(config: SyncConfig, working_dir: &Path) -> Result<Self, GitError> {
        config.validate()?;
        let transport = Transport::from_config(&config)?;

        let repo = if working_dir.join(".git").is_dir() {
            info!(path = %working_dir.display(), "opening existing repository");
            let repo = git2::Repository::open(working_dir)?;
            Self::reconcile_ssl_verify(&repo, &config)?;
            Self::fetch_remote(&repo, &config, &transport)?;
            repo
        } else {
            info!(url = %config.repo_url, path = %working_dir.display(), "cloning repository");
            Self::clone_into(working_dir, &config, &transport)?
        };

        Self::ensure_branch(&repo, &config, &transport)?;
        let tree_id = Self::branch_tree_id(&repo, &config.branch)?;

        Ok(Self {
            repo,
            config,
            transport,
            working_dir: working_dir.to_path_buf(),
            tree_id,
        })
    }

    /// The id of the working root tree that edits accumulate onto.
    pub fn working_root(&self) -> &ObjectId {
        &self.tree_id
    }

    /// The branch this repository tracks.
    pub fn branch(&self) -> &BranchName {
        &self.config.branch
    }

    /// The directory holding the clone.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Align the local view with the remote.
    ///
    /// Fetches remote-tracking refs, force-resets the tracked branch
    /// to the fetched remote value, and moves the working root to the
    /// new tip. Un-pushed local commits (including a previously
    /// deferred diverged push) and uncommitted working-root edits are
    /// discarded in favor of the remote history.
    pub fn pull(&mut self) -> Result<(), GitError> {
        info!(branch = %self.config.branch, "pulling changes from the remote");
        Self::fetch_remote(&self.repo, &self.config, &self.transport)?;
        self.tree_id = Self::branch_tree_id(&self.repo, &self.config.branch)?;
        Ok(())
    }

    /// Apply `files` to the working root and return the new root id.
    ///
    /// Without a scope each file is written in place, overwriting the
    /// blob at its path and leaving every sibling untouched. With a
    /// scope the subtree at that path is replaced outright by a tree
    /// built from `files` alone, dropping anything else beneath it.
    /// Nothing is committed; the edit only moves the working root.
    pub fn update_objects(
        &mut self,
        files: &[FileEntry],
        scope: Option<&RepoPath>,
    ) -> Result<ObjectId, GitError> {
        let store = ObjectStore::new(&self.repo);
        let editor = TreeEditor::new(store);
        let new_root = editor.update(&self.tree_id, files, scope)?;
        debug!(old = %self.tree_id, new = %new_root, files = files.len(), "working root updated");
        self.tree_id = new_root;
        Ok(self.tree_id.clone())
    }

    /// Read a single file's bytes from the working root.
    pub fn file_contents(&self, path: &RepoPath) -> Result<Vec<u8>, GitError> {
        let store = ObjectStore::new(&self.repo);
        PathResolver::new(store).file_bytes(&self.tree_id, path)
    }

    /// Enumerate every regular file under `path` in the working root,
    /// or the whole tree when `path` is `None`.
    pub fn file_objects(&self, path: Option<&RepoPath>) -> Result<Vec<FileEntry>, GitError> {
        let store = ObjectStore::new(&self.repo);
        PathResolver::new(store).list_files(&self.tree_id, path)
    }

    /// Commit the working root onto the tracked branch and push.
    ///
    /// A working root identical to the branch tip's tree is a no-op.
    /// A push rejected because the remote history moved ahead is
    /// logged and deferred; every other failure is an error.
    pub fn commit_and_push(&mut self, message: &str) -> Result<(), GitError> {
        let tip = self.branch_tip()?;
        if object_id(tip.tree_id())? == self.tree_id {
            info!(branch = %self.config.branch, "no changes found, nothing to commit");
            return Ok(());
        }

        let store = ObjectStore::new(&self.repo);
        let tree = store.tree(&self.tree_id)?;
        let signature = Self::signature(&self.config)?;
        let local_ref = local_ref(&self.config.branch);

        info!(branch = %self.config.branch, tree = %self.tree_id, "committing working tree");
        self.repo.commit(
            Some(&local_ref),
            &signature,
            &signature,
            message,
            &tree,
            &[&tip],
        )?;

        Self::push_with_deferral(&self.repo, &self.config, &self.transport)
    }

    /// Information about the tracked branch's tip commit.
    pub fn tip_info(&self) -> Result<CommitInfo, GitError> {
        let tip = self.branch_tip()?;
        ObjectStore::new(&self.repo).commit_info(&object_id(tip.id())?)
    }

    /// Release the repository handle.
    pub fn close(self) {
        debug!(path = %self.working_dir.display(), "releasing repository handle");
    }

    fn branch_tip(&self) -> Result<git2::Commit<'_>, GitError> {
        let local_ref = local_ref(&self.config.branch);
        let reference = self.repo.find_reference(&local_ref)?;
        Ok(reference.peel_to_commit()?)
    }

    fn branch_tree_id(repo: &git2::Repository, branch: &BranchName) -> Result<ObjectId, GitError> {
        let tip = repo.find_reference(&local_ref(branch))?.peel_to_commit()?;
        object_id(tip.tree_id())
    }

    /// Align the clone's `http.sslVerify` with the configuration.
    fn reconcile_ssl_verify(repo: &git2::Repository, config: &SyncConfig) -> Result<(), GitError> {
        let mut git_config = repo.config()?;
        let current = git_config.get_bool("http.sslVerify").unwrap_or(true);
        if current != config.verify_ssl {
            info!(
                verify_ssl = config.verify_ssl,
                "TLS verification setting changed, updating repository config"
            );
            git_config.set_bool("http.sslVerify", config.verify_ssl)?;
        }
        Ok(())
    }

    /// Initialize a clone under `working_dir` and fetch the remote.
    ///
    /// On failure the directory is removed so a later open starts from
    /// a clean slate instead of a half-initialized clone.
    fn clone_into(
        working_dir: &Path,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<git2::Repository, GitError> {
        fs::create_dir_all(working_dir).map_err(|err| GitError::Internal {
            message: format!(
                "failed to create working directory '{}': {err}",
                working_dir.display()
            ),
        })?;

        let repo = git2::Repository::init(working_dir)?;
        if let Err(err) = Self::configure_and_fetch(&repo, config, transport) {
            error!(url = %config.repo_url, "clone failed, rolling back working directory");
            drop(repo);
            if let Err(rm) = fs::remove_dir_all(working_dir) {
                warn!(
                    path = %working_dir.display(),
                    error = %rm,
                    "failed to remove working directory after clone failure"
                );
            }
            return Err(err);
        }
        Ok(repo)
    }

    /// Wire up the origin remote, record TLS settings, fetch, and note
    /// the remote's default branch.
    fn configure_and_fetch(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        repo.remote_with_fetch(REMOTE_NAME, &config.effective_url(), FETCH_REFSPEC)?;
        repo.config()?.set_bool("http.sslVerify", config.verify_ssl)?;

        let default_branch = Self::fetch_with_default_branch(repo, transport)?;

        if let Some(refname) = default_branch {
            if let Some(short) = refname.strip_prefix("refs/heads/") {
                let tracking = format!("refs/remotes/{REMOTE_NAME}/{short}");
                if repo.find_reference(&tracking).is_ok() {
                    repo.reference_symbolic(
                        "refs/remotes/origin/HEAD",
                        &tracking,
                        true,
                        "clone: record remote HEAD",
                    )?;
                    debug!(target = %tracking, "recorded remote HEAD");
                }
            }
        }

        Ok(())
    }

    /// Fetch the configured refspecs and report the remote's default
    /// branch, when it advertises one. An empty remote advertises
    /// nothing; the caller falls back to bootstrap in that case.
    fn fetch_with_default_branch(
        repo: &git2::Repository,
        transport: &Transport,
    ) -> Result<Option<String>, GitError> {
        let mut remote = repo.find_remote(REMOTE_NAME)?;

        let default_branch = {
            let conn =
                remote.connect_auth(git2::Direction::Fetch, Some(transport.callbacks()), None)?;
            conn.default_branch()
                .ok()
                .and_then(|buf| buf.as_str().map(String::from))
        };

        let mut opts = transport.fetch_options();
        let refspecs: [&str; 0] = [];
        remote.fetch(&refspecs, Some(&mut opts), None)?;
        Ok(default_branch)
    }

    /// Refresh remote-tracking refs, then force the tracked branch to
    /// the fetched remote value.
    fn fetch_remote(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        let mut opts = transport.fetch_options();
        let refspecs: [&str; 0] = [];
        remote.fetch(&refspecs, Some(&mut opts), None)?;
        debug!("remote-tracking refs refreshed");
        Self::reset_branch_to_remote(repo, config)
    }

    /// Move the tracked branch ref to the remote-tracking value.
    ///
    /// Divergence is resolved by adopting the remote history outright:
    /// un-pushed local commits are discarded, never merged or rebased.
    /// A deferred push is recovered this way on the next run, with the
    /// caller re-publishing its content on top of the remote tip.
    /// No-op when the remote does not have the branch yet or when no
    /// local branch ref exists to move.
    fn reset_branch_to_remote(
        repo: &git2::Repository,
        config: &SyncConfig,
    ) -> Result<(), GitError> {
        let remote_ref = format!("refs/remotes/{REMOTE_NAME}/{}", config.branch);
        let target = match repo.find_reference(&remote_ref) {
            Ok(tracking) => tracking.peel_to_commit()?.id(),
            Err(_) => return Ok(()),
        };
        let current = match repo.find_reference(&local_ref(&config.branch)) {
            Ok(branch) => branch.target(),
            Err(_) => return Ok(()),
        };
        if current == Some(target) {
            return Ok(());
        }

        if let Some(old) = current {
            if let Ok((ahead, _)) = repo.graph_ahead_behind(old, target) {
                if ahead > 0 {
                    warn!(
                        branch = %config.branch,
                        commits = ahead,
                        "discarding un-pushed local commits, adopting the remote history"
                    );
                }
            }
        }
        info!(branch = %config.branch, "resetting tracked branch to the remote value");
        repo.reference(
            &local_ref(&config.branch),
            target,
            true,
            "pull: reset to remote",
        )?;
        Ok(())
    }

    /// Make the tracked branch exist locally and point HEAD at it.
    ///
    /// The branch base is chosen in order of preference: the branch's
    /// remote-tracking ref, the remote's default branch, the current
    /// local HEAD. When none of those yields a commit the repository
    /// is empty on both sides and an initial commit is bootstrapped
    /// and pushed.
    fn ensure_branch(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        let local_ref = local_ref(&config.branch);
        let branch_exists = repo.find_reference(&local_ref).is_ok();
        let head_on_branch = repo
            .find_reference("HEAD")
            .ok()
            .and_then(|head| head.symbolic_target().map(String::from))
            .as_deref()
            == Some(local_ref.as_str());

        if branch_exists && head_on_branch {
            return Ok(());
        }

        if !branch_exists {
            let remote_ref = format!("refs/remotes/{REMOTE_NAME}/{}", config.branch);
            if let Ok(tracking) = repo.find_reference(&remote_ref) {
                info!(branch = %config.branch, "creating local branch from remote-tracking ref");
                let target = tracking.peel_to_commit()?.id();
                repo.reference(&local_ref, target, false, "checkout: track remote branch")?;
            } else if let Ok(remote_head) = repo.find_reference("refs/remotes/origin/HEAD") {
                info!(branch = %config.branch, "creating local branch from the remote default branch");
                let target = remote_head
                    .resolve()?
                    .target()
                    .ok_or_else(|| GitError::Internal {
                        message: "remote HEAD resolved to a non-direct reference".to_string(),
                    })?;
                repo.reference(&local_ref, target, false, "checkout: base on remote HEAD")?;
            } else if let Ok(commit) = repo.head().and_then(|head| head.peel_to_commit()) {
                info!(branch = %config.branch, "creating local branch from local HEAD");
                repo.reference(&local_ref, commit.id(), false, "checkout: base on local HEAD")?;
            } else {
                info!(branch = %config.branch, "empty repository, bootstrapping initial commit");
                Self::bootstrap(repo, config, transport)?;
            }
        }

        info!(branch = %config.branch, "checking out tracked branch");
        repo.set_head(&local_ref)?;
        Ok(())
    }

    /// Create the root commit for an empty repository and push it.
    ///
    /// The commit carries a README placeholder and an empty metadata
    /// file so consumers always find a valid starting tree.
    fn bootstrap(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        let store = ObjectStore::new(repo);

        let readme = store.put_blob(BOOTSTRAP_README)?;
        let metadata_bytes =
            serde_json::to_vec(&serde_json::Map::new()).map_err(|err| GitError::Internal {
                message: format!("failed to encode bootstrap metadata: {err}"),
            })?;
        let metadata = store.put_blob(&metadata_bytes)?;

        let mut builder = store.treebuilder(None)?;
        builder.insert(BOOTSTRAP_README_NAME, git_oid(&readme)?, MODE_BLOB)?;
        builder.insert(BOOTSTRAP_METADATA_NAME, git_oid(&metadata)?, MODE_BLOB)?;
        let tree = store.tree(&object_id(builder.write()?)?)?;

        let signature = Self::signature(config)?;
        let local_ref = local_ref(&config.branch);
        repo.commit(
            Some(&local_ref),
            &signature,
            &signature,
            "Initial commit",
            &tree,
            &[],
        )?;

        Self::push_with_deferral(repo, config, transport)
    }

    /// Push the tracked branch, downgrading a divergence rejection to
    /// a logged deferral.
    fn push_with_deferral(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        match Self::push_branch(repo, config, transport) {
            Err(GitError::Diverged { branch, message }) => {
                error!(branch = %branch, "could not push updates to the remote repository");
                warn!(
                    branch = %branch,
                    message = %message,
                    "local history has diverged from the remote, deferring the push to the next cycle"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn push_branch(
        repo: &git2::Repository,
        config: &SyncConfig,
        transport: &Transport,
    ) -> Result<(), GitError> {
        let local_ref = local_ref(&config.branch);
        let refspec = format!("{local_ref}:{local_ref}");
        let mut remote = repo.find_remote(REMOTE_NAME)?;

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut opts = transport.push_options(&rejection);

        info!(branch = %config.branch, "pushing tracked branch");
        let outcome = remote.push(&[refspec.as_str()], Some(&mut opts));
        let rejected = rejection.borrow_mut().take();

        match outcome {
            Err(err) if err.code() == git2::ErrorCode::NotFastForward => {
                Err(GitError::Diverged {
                    branch: config.branch.to_string(),
                    message: err.message().to_string(),
                })
            }
            Err(err) => Err(err.into()),
            Ok(()) => match rejected {
                Some(message)
                    if message.contains("fast-forward")
                        || message.contains("fastforward")
                        || message.contains("fetch first") =>
                {
                    Err(GitError::Diverged {
                        branch: config.branch.to_string(),
                        message,
                    })
                }
                Some(message) => Err(GitError::Internal {
                    message: format!("push rejected: {message}"),
                }),
                None => Ok(()),
            },
        }
    }

    fn signature(config: &SyncConfig) -> Result<git2::Signature<'static>, GitError> {
        let (name, email) = config.author_identity()?;
        Ok(git2::Signature::now(&name, &email)?)
    }
}

fn local_ref(branch: &BranchName) -> String {
    format!("refs/heads/{branch}")
}
