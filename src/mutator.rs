//! Applies parsed file operations to a working tree.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{error, info, warn};

use crate::parser::{FileAction, FileOperation};

/// Merges a proposed new version of a file into its existing content.
/// The production implementation delegates to the merge oracle; tests
/// swap in deterministic stand-ins.
pub trait Merger {
    fn merge(&self, existing: &str, incoming: &str) -> anyhow::Result<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The operation named an absolute path or one that climbs out of the
    /// working tree. Nothing outside the tree root may ever be written.
    #[error("path escapes the working tree: {path}")]
    PathEscape { path: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Join `relative` under `root`, refusing absolute paths and `..`
/// traversal.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, MutationError> {
    let candidate = Path::new(relative);
    let escapes = candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if relative.is_empty() || escapes {
        return Err(MutationError::PathEscape {
            path: relative.to_string(),
        });
    }
    Ok(root.join(candidate))
}

fn write_file(path: &Path, content: &str) -> Result<(), MutationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| MutationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| MutationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply a single operation under `root`.
///
/// - `Create` overwrites unconditionally, creating parent directories.
/// - `Modify` merges into the existing file via `merger`; a missing file
///   degrades to `Create`, and a blank or failed merge leaves the file
///   exactly as it was (a file is never truncated by a bad merge).
/// - `Refactor` deletes any existing file first, then writes fresh.
pub fn apply(op: &FileOperation, root: &Path, merger: &dyn Merger) -> Result<(), MutationError> {
    if op.content.is_empty() {
        // Parsed batches never carry empty content; guard anyway.
        warn!("ignoring operation with empty content for {}", op.path);
        return Ok(());
    }

    let target = resolve(root, &op.path)?;

    match op.action {
        FileAction::Create => {
            write_file(&target, &op.content)?;
            info!("created {}", target.display());
        }
        FileAction::Modify => {
            if !target.exists() {
                warn!(
                    "cannot modify missing file {}; treating as a new file",
                    target.display()
                );
                write_file(&target, &op.content)?;
                return Ok(());
            }

            let existing = fs::read_to_string(&target).map_err(|source| MutationError::Io {
                path: target.clone(),
                source,
            })?;

            match merger.merge(&existing, &op.content) {
                Ok(merged) if merged.trim().is_empty() => {
                    warn!(
                        "merge produced no output for {}; keeping original content",
                        target.display()
                    );
                }
                Ok(merged) => {
                    write_file(&target, &merged)?;
                    info!("merged and updated {}", target.display());
                }
                Err(err) => {
                    warn!(
                        "merge failed for {}: {}; keeping original content",
                        target.display(),
                        err
                    );
                }
            }
        }
        FileAction::Refactor => {
            if target.exists() {
                fs::remove_file(&target).map_err(|source| MutationError::Io {
                    path: target.clone(),
                    source,
                })?;
                info!("deleted {} for refactoring", target.display());
            }
            write_file(&target, &op.content)?;
            info!("refactored {}", target.display());
        }
    }

    Ok(())
}

/// Apply every operation in a batch, best-effort: a failing operation is
/// logged and skipped, the rest still run. Returns how many applied
/// cleanly.
pub fn apply_batch(ops: &[FileOperation], root: &Path, merger: &dyn Merger) -> usize {
    let mut applied = 0;
    for op in ops {
        match apply(op, root, merger) {
            Ok(()) => applied += 1,
            Err(err) => error!("failed to apply operation for {}: {}", op.path, err),
        }
    }
    applied
}
