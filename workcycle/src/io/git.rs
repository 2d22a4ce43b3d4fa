//! Git adapter for the worker's workspace.
//!
//! Completion pushes work and eventually discards the worker's worktree, so
//! every git interaction goes through a small explicit wrapper around `git`
//! subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Ensure the worktree is fully clean (including untracked files).
    #[instrument(skip_all)]
    pub fn ensure_clean(&self) -> Result<()> {
        let entries = self.status_porcelain()?;
        if entries.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(dirty_count = entries.len(), "worktree not clean");
        let mut msg = String::from("working tree not clean:\n");
        for entry in entries {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// Push `source` to `dest` on `remote`.
    #[instrument(skip_all, fields(remote, source, dest))]
    pub fn push(&self, remote: &str, source: &str, dest: &str) -> Result<()> {
        let refspec = format!("{source}:refs/heads/{dest}");
        debug!(%refspec, "pushing");
        self.run_checked(&["push", remote, &refspec])?;
        Ok(())
    }

    /// Commit `branch` points at on `remote` (queries the remote, not local
    /// refs). `None` if the branch does not exist there.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn remote_branch_sha(&self, remote: &str, branch: &str) -> Result<Option<String>> {
        let head = format!("refs/heads/{branch}");
        let out = self.run(&["ls-remote", "--exit-code", "--heads", remote, &head])?;
        match out.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let sha = stdout
                    .lines()
                    .find_map(|line| {
                        let (sha, name) = line.split_once('\t')?;
                        (name.trim() == head).then(|| sha.trim().to_string())
                    })
                    .ok_or_else(|| anyhow!("git ls-remote {remote}: no sha for {head}"))?;
                Ok(Some(sha))
            }
            // ls-remote --exit-code uses 2 for "no matching refs".
            Some(2) => Ok(None),
            _ => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(anyhow!("git ls-remote {remote} failed: {}", stderr.trim()))
            }
        }
    }

    pub fn head_sha(&self) -> Result<String> {
        Ok(self.run_capture(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// True if `ancestor` is reachable from `descendant`. A commit unknown to
    /// the local repository counts as not reachable.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let out = self.run(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                debug!(stderr = %stderr.trim(), "merge-base could not compare commits");
                Ok(false)
            }
        }
    }

    /// Absolute path of the repository's common git directory.
    pub fn common_dir(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--git-common-dir"])?;
        let dir = PathBuf::from(out.trim());
        if dir.is_absolute() {
            Ok(dir)
        } else {
            Ok(self.workdir.join(dir))
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// The worker's checkout, as the completion protocol sees it.
pub trait Workspace {
    /// Active branch, or `None` when the workspace is gone or unusable.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Push local `source` to branch `dest` on the configured remote.
    fn push(&self, source: &str, dest: &str) -> Result<()>;

    /// Discard the workspace. Must refuse unless the local HEAD is verified
    /// to be contained in `branch` on the remote.
    fn teardown(&self, branch: &str) -> Result<()>;
}

/// [`Workspace`] over a git linked worktree.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    git: Git,
    remote: String,
}

impl GitWorkspace {
    pub fn new(workdir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            git: Git::new(workdir),
            remote: remote.into(),
        }
    }
}

impl Workspace for GitWorkspace {
    fn current_branch(&self) -> Result<Option<String>> {
        if !self.git.workdir().is_dir() {
            debug!(workdir = %self.git.workdir().display(), "workspace missing");
            return Ok(None);
        }
        match self.git.current_branch() {
            Ok(branch) => Ok(Some(branch)),
            Err(err) => {
                warn!(err = %err, "workspace branch unavailable");
                Ok(None)
            }
        }
    }

    fn push(&self, source: &str, dest: &str) -> Result<()> {
        self.git.push(&self.remote, source, dest)
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn teardown(&self, branch: &str) -> Result<()> {
        let Some(remote_sha) = self.git.remote_branch_sha(&self.remote, branch)? else {
            bail!(
                "refusing to tear down workspace: branch {branch} not found on {}",
                self.remote
            );
        };
        let head = self.git.head_sha()?;
        if head != remote_sha && !self.git.is_ancestor(&head, &remote_sha)? {
            bail!(
                "refusing to tear down workspace: HEAD {head} is not on {}/{branch}",
                self.remote
            );
        }
        self.git
            .ensure_clean()
            .context("refusing to tear down workspace")?;

        let common = self.git.common_dir()?;
        let main_worktree = common
            .parent()
            .ok_or_else(|| anyhow!("git common dir has no parent {}", common.display()))?;
        let workdir = self.git.workdir().to_string_lossy().into_owned();
        let output = Command::new("git")
            .args(["worktree", "remove", "--force", &workdir])
            .current_dir(main_worktree)
            .output()
            .context("spawn git worktree remove")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git worktree remove failed: {}", stderr.trim());
        }
        info!(workdir = %workdir, "workspace torn down");
        Ok(())
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? notes.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "notes.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.rs -> new.rs").expect("parse");
        assert_eq!(e.path, "new.rs");
    }

    #[test]
    fn rejects_short_line() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn missing_workdir_has_no_branch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = GitWorkspace::new(temp.path().join("gone"), "origin");
        assert_eq!(ws.current_branch().expect("branch"), None);
    }
}
