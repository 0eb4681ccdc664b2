//! Persisted run artifacts in the working tree: the prior-requirements
//! snapshot, the running changelog, and the failure-analysis document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use tracing::info;

/// Hidden directory inside the working tree for pipeline state.
pub const STATE_DIR: &str = ".ai-state";
/// Last-processed request text, used by the change gate.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";
/// Running changelog at the tree root.
pub const CHANGELOG_FILE: &str = "AI_CHANGELOG.md";
/// Written when the healing loop gives up.
pub const FAILURE_ANALYSIS_FILE: &str = "BUILD_FAILURE_ANALYSIS.md";

/// The request text from the previous run, or empty on a first run.
pub fn read_previous_requirements(root: &Path) -> String {
    let path = root.join(STATE_DIR).join(REQUIREMENTS_FILE);
    match fs::read_to_string(&path) {
        Ok(content) => {
            info!("found previous request state file for comparison");
            content
        }
        Err(_) => {
            info!("no previous request state found; treating this as an initial run");
            String::new()
        }
    }
}

/// Append `content` to `path` under a date/branch metadata header,
/// creating the file and its parents as needed. Keeps a running history
/// rather than overwriting.
pub fn append_with_metadata(path: &Path, content: &str, branch: &str) -> anyhow::Result<()> {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let entry = format!(
        "\n\n---\n**Date:** {}\n**Branch:** {}\n---\n\n{}\n--- END ---\n",
        timestamp, branch, content
    );

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut full = fs::read_to_string(path).unwrap_or_default();
    full.push_str(&entry);
    fs::write(path, full).with_context(|| format!("failed to append to {}", path.display()))?;
    info!("appended entry to {}", path.display());
    Ok(())
}

/// Record the request text that produced this run.
pub fn record_requirements(root: &Path, request: &str, branch: &str) -> anyhow::Result<()> {
    append_with_metadata(
        &root.join(STATE_DIR).join(REQUIREMENTS_FILE),
        request,
        branch,
    )
}

/// Append one changelog entry at the tree root.
pub fn append_changelog(root: &Path, changelog: &str, branch: &str) -> anyhow::Result<()> {
    append_with_metadata(&root.join(CHANGELOG_FILE), changelog, branch)
}

/// Write the failure-analysis document for human review after the
/// healing loop aborted. Overwrites any previous analysis.
pub fn write_failure_analysis(root: &Path, diagnosis: &str) -> anyhow::Result<PathBuf> {
    let path = root.join(FAILURE_ANALYSIS_FILE);
    let content = format!(
        "# Build Failure Analysis\n\n\
         The generated code failed the build verification step and automated \
         repair did not converge. Analysis of the final failure:\n\n---\n\n{}\n",
        diagnosis
    );
    fs::write(&path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote build failure analysis to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_previous_requirements_empty_on_first_run() {
        let dir = tempdir().unwrap();
        assert_eq!(read_previous_requirements(dir.path()), "");
    }

    #[test]
    fn test_record_then_read_requirements() {
        let dir = tempdir().unwrap();
        record_requirements(dir.path(), "build a login page", "feature/x").unwrap();
        let stored = read_previous_requirements(dir.path());
        assert!(stored.contains("build a login page"));
        assert!(stored.contains("**Branch:** feature/x"));
    }

    #[test]
    fn test_append_keeps_history() {
        let dir = tempdir().unwrap();
        append_changelog(dir.path(), "first entry", "b1").unwrap();
        append_changelog(dir.path(), "second entry", "b2").unwrap();
        let content = fs::read_to_string(dir.path().join(CHANGELOG_FILE)).unwrap();
        assert!(content.contains("first entry"));
        assert!(content.contains("second entry"));
        let first = content.find("first entry").unwrap();
        let second = content.find("second entry").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_failure_analysis_contains_diagnosis() {
        let dir = tempdir().unwrap();
        let path = write_failure_analysis(dir.path(), "the linker is missing").unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("# Build Failure Analysis"));
        assert!(content.contains("the linker is missing"));
    }
}
