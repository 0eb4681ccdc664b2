//! Working-tree context for the oracle prompts: file listings, a
//! rendered tree, and the whole-tree source snapshot the repair oracle
//! reads.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::warn;

/// Directories that never belong in oracle context even when not
/// gitignored.
const EXCLUDED_DIRS: [&str; 4] = [".git", ".ai-state", "target", "node_modules"];

fn is_excluded(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

/// All regular files under `root`, relative paths, gitignore-aware,
/// sorted for deterministic prompts.
pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .git_ignore(true)
        .git_global(true)
        .build();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().map_or(false, |ft| ft.is_file()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(root) else {
                    continue;
                };
                if is_excluded(relative) {
                    continue;
                }
                files.push(relative.to_path_buf());
            }
            Err(err) => warn!("error walking {}: {}", root.display(), err),
        }
    }

    files.sort();
    files
}

/// Newline-separated relative paths, or a note when the tree is empty.
pub fn list_files(root: &Path) -> String {
    let files = collect_files(root);
    if files.is_empty() {
        return "No existing files found. This appears to be a new project.".to_string();
    }
    files
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whole-tree source snapshot in the framing the repair oracle expects.
/// Files that are not valid UTF-8 are skipped with a warning.
pub fn snapshot_tree(root: &Path) -> String {
    let mut snapshot = String::new();
    for relative in collect_files(root) {
        let rel_display = relative.to_string_lossy().replace('\\', "/");
        match fs::read_to_string(root.join(&relative)) {
            Ok(content) => {
                snapshot.push_str(&format!("--- FILE START: {} ---\n", rel_display));
                snapshot.push_str(&content);
                if !content.ends_with('\n') {
                    snapshot.push('\n');
                }
                snapshot.push_str(&format!("--- FILE END: {} ---\n\n", rel_display));
            }
            Err(err) => warn!("could not read {} for snapshot: {}", rel_display, err),
        }
    }
    snapshot
}
