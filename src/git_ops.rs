//! Version-control plumbing: subprocess `git` (and `gh` for pull
//! requests), with full output capture.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use chrono::Local;
use tracing::{error, info, warn};

/// Run an external command in `dir`, returning stdout on success. On a
/// non-zero exit the error carries the combined output so build and git
/// failures stay diagnosable.
pub fn run_command(dir: &Path, program: &str, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new(program)
        .current_dir(dir)
        .args(args)
        .output()
        .with_context(|| format!("failed to run `{} {}`", program, args.join(" ")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        anyhow::bail!(
            "command `{} {}` failed with {}\n\n--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
            program,
            args.join(" "),
            output.status,
            stdout,
            stderr
        );
    }
    Ok(stdout)
}

/// Resolve the workspace directory for a named checkout: a `temp`
/// directory next to the current project, so generated trees never land
/// inside this tool's own checkout.
pub fn workspace_dir(repo_name: &str) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()
        .context("cannot determine current directory")?
        .canonicalize()
        .context("cannot canonicalize current directory")?;
    let parent = cwd
        .parent()
        .context("current directory has no parent to host the workspace")?;
    let workspace = parent.join("temp").join(repo_name);
    fs::create_dir_all(parent.join("temp")).context("failed to create workspace directory")?;
    info!("generated project will live in {}", workspace.display());
    Ok(workspace)
}

/// Bring the checkout at `dir` to a pristine copy of `origin/<branch>`,
/// cloning first if the directory does not exist yet.
pub fn ensure_repository(dir: &Path, repo_url: &str, base_branch: &str) -> anyhow::Result<()> {
    if dir.exists() {
        info!(
            "repository directory exists; resetting to a clean state from origin/{}",
            base_branch
        );
        run_command(dir, "git", &["fetch", "origin"])?;
        run_command(dir, "git", &["checkout", base_branch])?;
        run_command(
            dir,
            "git",
            &["reset", "--hard", &format!("origin/{}", base_branch)],
        )?;
        run_command(dir, "git", &["clean", "-fdx"])?;
    } else {
        info!("cloning repository from {}", repo_url);
        let parent = dir.parent().context("workspace directory has no parent")?;
        let target = dir
            .file_name()
            .and_then(|n| n.to_str())
            .context("workspace directory has no name")?;
        run_command(
            parent,
            "git",
            &[
                "clone",
                "--branch",
                base_branch,
                "--single-branch",
                repo_url,
                target,
            ],
        )?;
    }
    Ok(())
}

/// Branch name for one pipeline run: `feature/<key>_<timestamp>`.
pub fn feature_branch_name(issue_key: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    format!("feature/{}_{}", issue_key, timestamp)
}

/// Create and check out a fresh feature branch.
pub fn create_feature_branch(dir: &Path, issue_key: &str) -> anyhow::Result<String> {
    let branch = feature_branch_name(issue_key);
    info!("creating and checking out feature branch {}", branch);
    run_command(dir, "git", &["checkout", "-b", &branch])?;
    Ok(branch)
}

/// Make sure `.gitignore` contains `entry`, creating the file if needed.
pub fn add_gitignore_entry(dir: &Path, entry: &str) -> anyhow::Result<()> {
    let path = dir.join(".gitignore");
    let current = if path.exists() {
        fs::read_to_string(&path).context("failed to read .gitignore")?
    } else {
        String::new()
    };

    if current.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }

    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    fs::write(&path, updated).context("failed to update .gitignore")?;
    info!("added '{}' to .gitignore", entry);
    Ok(())
}

/// Stage everything, commit, and optionally push the branch. A push
/// failure is reported but does not fail the run; the commit is the part
/// that must never be lost.
pub fn commit_and_push(dir: &Path, message: &str, branch: &str, push: bool) -> anyhow::Result<()> {
    info!("committing changes on {}", branch);
    run_command(dir, "git", &["add", "."])?;
    run_command(dir, "git", &["commit", "-m", message])?;

    if push {
        info!("pushing changes to origin/{}", branch);
        if let Err(err) = run_command(dir, "git", &["push", "origin", branch]) {
            error!("git push failed: {:#}", err);
            error!("check repository permissions; the commit exists locally");
        }
    }
    Ok(())
}

/// Open a pull request through the `gh` CLI. Returns the PR URL, or
/// `None` when `gh` is unavailable or rejects the request; the pipeline
/// result does not depend on it.
pub fn create_pull_request(
    dir: &Path,
    base_branch: &str,
    feature_branch: &str,
    title: &str,
) -> Option<String> {
    info!("attempting to create a pull request");
    let body = "Automated PR created by autoforge. Please review the changes.";
    match run_command(
        dir,
        "gh",
        &[
            "pr",
            "create",
            "--base",
            base_branch,
            "--head",
            feature_branch,
            "--title",
            title,
            "--body",
            body,
        ],
    ) {
        Ok(output) => {
            let url = output.trim().to_string();
            info!("created pull request: {}", url);
            Some(url)
        }
        Err(err) => {
            let text = format!("{:#}", err);
            if text.contains("No such file") || text.contains("failed to run") {
                warn!("the 'gh' CLI is not installed; skipping pull-request creation");
            } else {
                warn!("failed to create pull request: {}", text);
                warn!("ensure 'gh auth login' has been run and the remote is configured");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_command_captures_stdout() {
        let dir = tempdir().unwrap();
        let out = run_command(dir.path(), "echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_command_failure_carries_output() {
        let dir = tempdir().unwrap();
        let err = run_command(dir.path(), "false", &[]).unwrap_err().to_string();
        assert!(err.contains("--- STDOUT ---"));
        assert!(err.contains("--- STDERR ---"));
    }

    #[test]
    fn test_run_command_missing_binary() {
        let dir = tempdir().unwrap();
        assert!(run_command(dir.path(), "no-such-binary-zzz", &[]).is_err());
    }

    #[test]
    fn test_feature_branch_name_shape() {
        let branch = feature_branch_name("PROJ-42");
        assert!(branch.starts_with("feature/PROJ-42_"));
        let suffix = branch.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 14);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_add_gitignore_entry_creates_and_deduplicates() {
        let dir = tempdir().unwrap();
        add_gitignore_entry(dir.path(), "target/").unwrap();
        add_gitignore_entry(dir.path(), "target/").unwrap();
        let content = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content.matches("target/").count(), 1);
    }

    #[test]
    fn test_add_gitignore_entry_appends_to_existing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log").unwrap();
        add_gitignore_entry(dir.path(), "target/").unwrap();
        let content = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(content.contains("*.log"));
        assert!(content.contains("target/"));
    }
}
