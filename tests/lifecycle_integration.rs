//! Integration tests for the repository lifecycle.
//!
//! These tests run against real git repositories created via tempfile:
//! a bare repository stands in for the remote and [`ContentRepo`]
//! clones from it over the local transport. Shallow fetching is
//! disabled because the local transport does not support it.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Once;

use tempfile::TempDir;

use gitsync::core::types::BranchName;
use gitsync::{ContentRepo, FileEntry, GitError, RepoPath, SyncConfig};

/// Test fixture holding a bare "remote" repository plus scratch space
/// for clones.
struct RemoteFixture {
    dir: TempDir,
}

/// Route lifecycle events to the test output, honoring RUST_LOG.
fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl RemoteFixture {
    /// Create an empty bare remote.
    fn empty() -> Self {
        init_logging();
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "--bare", "remote.git"]);
        // Make the advertised default branch deterministic across git
        // versions.
        run_git(
            &dir.path().join("remote.git"),
            &["symbolic-ref", "HEAD", "refs/heads/main"],
        );
        Self { dir }
    }

    /// Create a bare remote seeded with one commit on `main` holding
    /// the given files.
    fn seeded(files: &[(&str, &str)]) -> Self {
        let fixture = Self::empty();
        let seed = fixture.dir.path().join("seed");
        std::fs::create_dir(&seed).unwrap();
        run_git(&seed, &["init"]);
        run_git(&seed, &["checkout", "-b", "main"]);
        run_git(&seed, &["config", "user.email", "seed@example.com"]);
        run_git(&seed, &["config", "user.name", "Seed"]);

        for (path, content) in files {
            let full = seed.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
        run_git(&seed, &["add", "."]);
        run_git(&seed, &["commit", "-m", "seed"]);
        let url = fixture.url();
        run_git(&seed, &["push", &url, "main"]);
        fixture
    }

    /// The remote URL (a filesystem path).
    fn url(&self) -> String {
        self.dir
            .path()
            .join("remote.git")
            .to_string_lossy()
            .into_owned()
    }

    fn remote_path(&self) -> PathBuf {
        self.dir.path().join("remote.git")
    }

    /// A fresh working directory for a clone.
    fn workdir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Sync configuration pointing at this remote.
    fn config(&self, branch: &str) -> SyncConfig {
        SyncConfig {
            repo_url: self.url(),
            branch: BranchName::new(branch).unwrap(),
            author: "Test Bot <bot@example.com>".to_string(),
            username: None,
            password: None,
            verify_ssl: true,
            server_fingerprint: None,
            // The local transport does not support shallow fetches.
            fetch_depth: 0,
        }
    }

    /// Open a content repo in a fresh working directory.
    fn open(&self, workdir: &str) -> ContentRepo {
        ContentRepo::open(self.config("main"), &self.workdir(workdir))
            .expect("failed to open content repo")
    }

    /// The remote tip of `branch`, via the git CLI.
    fn remote_tip(&self, branch: &str) -> String {
        git_stdout(&self.remote_path(), &["rev-parse", &format!("refs/heads/{branch}")])
    }

    /// Number of commits on the remote `branch`.
    fn remote_commit_count(&self, branch: &str) -> usize {
        git_stdout(
            &self.remote_path(),
            &["rev-list", "--count", &format!("refs/heads/{branch}")],
        )
        .parse()
        .unwrap()
    }
}

/// Run a git command in the given directory, panicking on failure.
fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Run a git command and return its trimmed stdout.
fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn path(s: &str) -> RepoPath {
    RepoPath::new(s).unwrap()
}

fn entry(p: &str, content: &str) -> FileEntry {
    FileEntry::new(p, content.as_bytes()).unwrap()
}

#[test]
fn bootstraps_an_empty_remote() {
    let fixture = RemoteFixture::empty();
    let repo = fixture.open("work");

    assert_eq!(repo.file_contents(&path("README.md")).unwrap(), b"# GitSync\n");
    assert_eq!(repo.file_contents(&path("GitSync.json")).unwrap(), b"{}");

    // The bootstrap commit was pushed, so the remote branch now exists.
    assert_eq!(fixture.remote_commit_count("main"), 1);

    let tip = repo.tip_info().unwrap();
    assert_eq!(tip.summary, "Initial commit");
    assert_eq!(tip.author_name, "Test Bot");
    assert_eq!(tip.author_email, "bot@example.com");
}

#[test]
fn clones_a_seeded_remote_and_reads_files() {
    let fixture = RemoteFixture::seeded(&[
        ("a.txt", "alpha"),
        ("docs/guide.md", "# Guide\n"),
    ]);
    let repo = fixture.open("work");

    assert_eq!(repo.file_contents(&path("a.txt")).unwrap(), b"alpha");
    assert_eq!(repo.file_contents(&path("docs/guide.md")).unwrap(), b"# Guide\n");

    let mut paths: Vec<String> = repo
        .file_objects(None)
        .unwrap()
        .into_iter()
        .map(|f| f.path.to_string())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["a.txt", "docs/guide.md"]);
}

#[test]
fn update_commit_push_round_trip() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    let mut writer = fixture.open("writer");
    let new_root = writer
        .update_objects(&[entry("nested/dir/new.txt", "payload")], None)
        .unwrap();
    assert_eq!(&new_root, writer.working_root());
    writer.commit_and_push("add nested file").unwrap();

    // A second clone sees the pushed content.
    let reader = fixture.open("reader");
    assert_eq!(
        reader.file_contents(&path("nested/dir/new.txt")).unwrap(),
        b"payload"
    );
    assert_eq!(reader.file_contents(&path("a.txt")).unwrap(), b"alpha");
    assert_eq!(reader.tip_info().unwrap().summary, "add nested file");
}

#[test]
fn commit_without_changes_is_a_noop() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);
    let mut repo = fixture.open("work");

    let before = fixture.remote_commit_count("main");
    repo.commit_and_push("nothing to do").unwrap();
    assert_eq!(fixture.remote_commit_count("main"), before);

    // Writing identical content produces the same tree, still a no-op.
    repo.update_objects(&[entry("a.txt", "alpha")], None).unwrap();
    repo.commit_and_push("still nothing").unwrap();
    assert_eq!(fixture.remote_commit_count("main"), before);
}

#[test]
fn unscoped_update_preserves_siblings() {
    let fixture = RemoteFixture::seeded(&[
        ("docs/a.md", "A"),
        ("docs/b.md", "B"),
        ("root.txt", "root"),
    ]);
    let mut repo = fixture.open("work");

    repo.update_objects(&[entry("docs/a.md", "A2")], None).unwrap();

    assert_eq!(repo.file_contents(&path("docs/a.md")).unwrap(), b"A2");
    assert_eq!(repo.file_contents(&path("docs/b.md")).unwrap(), b"B");
    assert_eq!(repo.file_contents(&path("root.txt")).unwrap(), b"root");
}

#[test]
fn scoped_update_replaces_the_subtree() {
    let fixture = RemoteFixture::seeded(&[
        ("docs/a.md", "A"),
        ("docs/b.md", "B"),
        ("root.txt", "root"),
    ]);
    let mut repo = fixture.open("work");

    // File paths are relative to the scope.
    repo.update_objects(&[entry("c.md", "C")], Some(&path("docs")))
        .unwrap();

    // The old contents of docs/ are gone, siblings outside it remain.
    assert_eq!(repo.file_contents(&path("docs/c.md")).unwrap(), b"C");
    assert!(matches!(
        repo.file_contents(&path("docs/a.md")),
        Err(GitError::NotFound { .. })
    ));
    assert_eq!(repo.file_contents(&path("root.txt")).unwrap(), b"root");

    let mut scoped: Vec<String> = repo
        .file_objects(Some(&path("docs")))
        .unwrap()
        .into_iter()
        .map(|f| f.path.to_string())
        .collect();
    scoped.sort();
    assert_eq!(scoped, vec!["docs/c.md"]);
}

#[test]
fn structural_conflict_is_rejected() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);
    let mut repo = fixture.open("work");

    let err = repo
        .update_objects(&[entry("a.txt/inner", "x")], None)
        .unwrap_err();
    assert!(matches!(err, GitError::StructuralConflict { .. }));

    let err = repo.update_objects(&[entry("a.txt", "blob again")], None);
    assert!(err.is_ok(), "overwriting a file in place must stay legal");
}

#[test]
fn diverged_push_is_deferred_not_fatal() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    // Both clones start from the seed commit.
    let mut first = fixture.open("first");
    let mut second = fixture.open("second");

    first.update_objects(&[entry("first.txt", "1")], None).unwrap();
    first.commit_and_push("first writer").unwrap();
    let remote_tip = fixture.remote_tip("main");

    // The second writer never pulled, so its push is non-fast-forward.
    second.update_objects(&[entry("second.txt", "2")], None).unwrap();
    second.commit_and_push("second writer").unwrap();

    // The rejection was deferred: no error above, and the remote still
    // points at the first writer's commit.
    assert_eq!(fixture.remote_tip("main"), remote_tip);
    assert_eq!(
        second.file_contents(&path("second.txt")).unwrap(),
        b"2",
        "the deferred commit stays on the local branch"
    );
}

#[test]
fn pull_adopts_the_remote_history() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    let mut writer = fixture.open("writer");
    let mut reader = fixture.open("reader");

    writer.update_objects(&[entry("b.txt", "beta")], None).unwrap();
    writer.commit_and_push("add beta").unwrap();

    reader.pull().unwrap();

    // Remote-tracking ref, local branch and working root all moved to
    // the remote tip.
    let reader_dir = fixture.workdir("reader");
    let remote_tip = fixture.remote_tip("main");
    assert_eq!(
        git_stdout(&reader_dir, &["rev-parse", "refs/remotes/origin/main"]),
        remote_tip
    );
    assert_eq!(
        git_stdout(&reader_dir, &["rev-parse", "refs/heads/main"]),
        remote_tip
    );
    assert_eq!(reader.file_contents(&path("b.txt")).unwrap(), b"beta");
}

#[test]
fn deferred_divergence_recovers_on_the_next_run() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    let mut first = fixture.open("first");
    let mut second = fixture.open("second");

    first.update_objects(&[entry("first.txt", "1")], None).unwrap();
    first.commit_and_push("first writer").unwrap();

    // This push diverges and is deferred.
    let tip_before = fixture.remote_tip("main");
    second.update_objects(&[entry("second.txt", "2")], None).unwrap();
    second.commit_and_push("second writer").unwrap();
    assert_eq!(fixture.remote_tip("main"), tip_before);
    second.close();

    // Reopening the same working directory adopts the remote history:
    // the deferred commit is discarded, not merged.
    let mut second = fixture.open("second");
    assert!(matches!(
        second.file_contents(&path("second.txt")),
        Err(GitError::NotFound { .. })
    ));
    assert_eq!(second.file_contents(&path("first.txt")).unwrap(), b"1");

    // Re-publishing on top of the remote tip now succeeds.
    second.update_objects(&[entry("second.txt", "2")], None).unwrap();
    second.commit_and_push("recovered").unwrap();

    let verify = fixture.open("verify");
    assert_eq!(verify.tip_info().unwrap().summary, "recovered");
    assert_eq!(verify.file_contents(&path("second.txt")).unwrap(), b"2");
    assert_eq!(verify.file_contents(&path("first.txt")).unwrap(), b"1");
}

#[test]
fn checks_out_a_non_default_remote_branch() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    // Push a second branch with different content.
    let seed = fixture.dir.path().join("seed");
    run_git(&seed, &["checkout", "-b", "develop"]);
    std::fs::write(seed.join("develop.txt"), "dev").unwrap();
    run_git(&seed, &["add", "develop.txt"]);
    run_git(&seed, &["commit", "-m", "develop content"]);
    run_git(&seed, &["push", &fixture.url(), "develop"]);

    let repo = ContentRepo::open(fixture.config("develop"), &fixture.workdir("work"))
        .expect("failed to open develop branch");
    assert_eq!(repo.file_contents(&path("develop.txt")).unwrap(), b"dev");
    assert_eq!(repo.branch().as_str(), "develop");
}

#[test]
fn reopening_an_existing_clone_reuses_it() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);

    let mut repo = fixture.open("work");
    repo.update_objects(&[entry("b.txt", "beta")], None).unwrap();
    repo.commit_and_push("add beta").unwrap();
    repo.close();

    // Same working directory: the second open must pull, not re-clone.
    let reopened = fixture.open("work");
    assert_eq!(reopened.file_contents(&path("b.txt")).unwrap(), b"beta");
    assert_eq!(reopened.tip_info().unwrap().summary, "add beta");
}

#[test]
fn failed_clone_rolls_back_the_working_directory() {
    let fixture = RemoteFixture::empty();
    let mut config = fixture.config("main");
    config.repo_url = fixture
        .dir
        .path()
        .join("no-such-remote.git")
        .to_string_lossy()
        .into_owned();

    let workdir = fixture.workdir("work");
    let result = ContentRepo::open(config, &workdir);
    assert!(result.is_err());
    assert!(
        !workdir.exists(),
        "a failed clone must not leave a half-initialized directory"
    );
}

#[test]
fn missing_paths_report_not_found() {
    let fixture = RemoteFixture::seeded(&[("a.txt", "alpha")]);
    let repo = fixture.open("work");

    assert!(matches!(
        repo.file_contents(&path("nope.txt")),
        Err(GitError::NotFound { .. })
    ));
    assert!(matches!(
        repo.file_objects(Some(&path("no/such/dir"))),
        Err(GitError::NotFound { .. })
    ));
}
