//! Parses generated output into file operations.
//!
//! The generation and repair oracles answer with one or more marked
//! segments:
//!
//! ```text
//! // Create File: src/widget.py
//! <payload until the next marker or end of input>
//! // Modify File: src/app.py
//! <payload>
//! ```
//!
//! A segment ends at the next header line, full stop. Payload that itself
//! contains a line shaped like a header will terminate the segment early;
//! that is the documented contract with the oracle, not something this
//! parser tries to out-guess.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// What to do with the file named by a segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Write a new file (or overwrite an existing one wholesale).
    Create,
    /// Merge the payload into the existing file.
    Modify,
    /// Delete the existing file, then write the payload as its successor.
    Refactor,
}

/// One parsed segment: an action, a tree-relative path, and the cleaned
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub action: FileAction,
    pub path: String,
    pub content: String,
}

/// The header tags, matched case-sensitively and in this order.
const HEADER_TAGS: [(&str, FileAction); 3] = [
    ("// Create File:", FileAction::Create),
    ("// Modify File:", FileAction::Modify),
    ("// Refactored File:", FileAction::Refactor),
];

/// Try to read a line as a segment header. Leading whitespace is allowed;
/// the tag itself is a literal.
fn parse_header(line: &str) -> Option<(FileAction, &str)> {
    let candidate = line.trim_start();
    for (tag, action) in HEADER_TAGS {
        if let Some(rest) = candidate.strip_prefix(tag) {
            return Some((action, rest.trim()));
        }
    }
    None
}

/// Parse a whole oracle response into an ordered batch of operations.
///
/// Never fails: text without any recognizable header yields an empty
/// batch, and segments whose payload is empty after extraction are
/// dropped with a warning.
pub fn parse(text: &str) -> Vec<FileOperation> {
    let mut batch = Vec::new();
    let mut current: Option<(FileAction, String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some((action, path)) = parse_header(line) {
            if let Some(segment) = current.take() {
                finish_segment(segment, &mut batch);
            }
            current = Some((action, path.to_string(), Vec::new()));
        } else if let Some((_, _, payload)) = current.as_mut() {
            payload.push(line);
        }
        // Lines before the first header are preamble and ignored.
    }

    if let Some(segment) = current.take() {
        finish_segment(segment, &mut batch);
    }

    batch
}

fn finish_segment(segment: (FileAction, String, Vec<&str>), batch: &mut Vec<FileOperation>) {
    let (action, path, payload) = segment;

    if path.is_empty() {
        warn!("skipping segment with empty file path");
        return;
    }

    let content = extract(&payload.join("\n"));
    if content.is_empty() {
        warn!("skipping empty code block for {}", path);
        return;
    }

    batch.push(FileOperation {
        action,
        path,
        content,
    });
}

static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^`{3,}[A-Za-z0-9_+.-]*$").expect("fence pattern"));

fn is_fence_line(line: &str) -> bool {
    FENCE_LINE.is_match(line.trim())
}

/// Closing fences carry no language tag.
fn is_closing_fence(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '`')
}

/// Strip incidental formatting from a segment payload.
///
/// A payload wrapped in a fenced block (``` or ```lang ... ```) yields
/// its inner content; anything else is returned trimmed. Stray fence
/// lines left unbalanced by an oracle mistake are removed. The result is
/// a fixpoint: running `extract` on its own output changes nothing, even
/// for doubly-fenced input.
pub fn extract(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    // Peel whole-payload fences, outermost first.
    loop {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() >= 2
            && is_fence_line(lines[0])
            && is_closing_fence(lines[lines.len() - 1])
        {
            text = lines[1..lines.len() - 1].join("\n").trim().to_string();
        } else {
            break;
        }
    }

    // Drop an unpaired trailing fence marker; keep balanced interior
    // pairs (they are content, e.g. markdown examples).
    let fence_count = text.lines().filter(|l| is_fence_line(l)).count();
    if fence_count % 2 == 1 {
        let mut seen = 0;
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| {
                if is_fence_line(line) {
                    seen += 1;
                    seen != fence_count
                } else {
                    true
                }
            })
            .collect();
        text = kept.join("\n").trim().to_string();
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_segments_in_order() {
        let text = "// Create File: a.txt\nhello\n// Modify File: b.txt\n```\nworld\n```";
        let batch = parse(text);
        assert_eq!(
            batch,
            vec![
                FileOperation {
                    action: FileAction::Create,
                    path: "a.txt".to_string(),
                    content: "hello".to_string(),
                },
                FileOperation {
                    action: FileAction::Modify,
                    path: "b.txt".to_string(),
                    content: "world".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_refactored_header() {
        let batch = parse("// Refactored File: src/core.py\nnew body\n");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, FileAction::Refactor);
        assert_eq!(batch[0].path, "src/core.py");
        assert_eq!(batch[0].content, "new body");
    }

    #[test]
    fn test_parse_markerless_text_yields_empty_batch() {
        assert!(parse("just an explanation, no markers here").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_parse_header_tags_are_case_sensitive() {
        assert!(parse("// create file: a.txt\nbody").is_empty());
        assert!(parse("// CREATE FILE: a.txt\nbody").is_empty());
    }

    #[test]
    fn test_parse_drops_empty_segments() {
        let text = "// Create File: empty.txt\n\n// Create File: full.txt\ncontent";
        let batch = parse(text);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path, "full.txt");
    }

    #[test]
    fn test_parse_drops_fence_only_segment() {
        let text = "// Create File: empty.txt\n```\n```\n// Create File: full.txt\nx";
        let batch = parse(text);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path, "full.txt");
    }

    #[test]
    fn test_parse_ignores_preamble() {
        let text = "Here is the fix you asked for:\n\n// Create File: a.txt\nbody";
        let batch = parse(text);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].content, "body");
    }

    #[test]
    fn test_parse_path_is_trimmed() {
        let batch = parse("// Create File:   a.txt  \nbody");
        assert_eq!(batch[0].path, "a.txt");
    }

    #[test]
    fn test_parse_preserves_source_order_for_many_segments() {
        let mut text = String::new();
        for i in 0..5 {
            text.push_str(&format!("// Create File: f{}.txt\nbody {}\n", i, i));
        }
        let batch = parse(&text);
        assert_eq!(batch.len(), 5);
        for (i, op) in batch.iter().enumerate() {
            assert_eq!(op.path, format!("f{}.txt", i));
            assert_eq!(op.content, format!("body {}", i));
        }
    }

    #[test]
    fn test_header_inside_payload_starts_new_segment() {
        // The boundary rule is purely "next header wins".
        let text = "// Create File: a.txt\nline one\n// Modify File: b.txt\nline two";
        let batch = parse(text);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].content, "line one");
    }

    #[test]
    fn test_extract_unfenced_trims() {
        assert_eq!(extract("  hello world \n"), "hello world");
    }

    #[test]
    fn test_extract_fenced_block() {
        assert_eq!(extract("```\nfn main() {}\n```"), "fn main() {}");
    }

    #[test]
    fn test_extract_fenced_block_with_language_tag() {
        assert_eq!(extract("```java\nclass A {}\n```"), "class A {}");
    }

    #[test]
    fn test_extract_is_idempotent() {
        let inputs = [
            "plain text",
            "```\ncode\n```",
            "```python\nx = 1\n```",
            "````\ndeep fence\n````",
            "```\n```\ninner\n```\n```",
            "text\n```\nbalanced interior\n```\nmore",
            "dangling\n```",
        ];
        for input in inputs {
            let once = extract(input);
            assert_eq!(extract(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_extract_tolerates_double_fencing() {
        let doubled = "```\n```rust\nlet x = 1;\n```\n```";
        assert_eq!(extract(doubled), "let x = 1;");
    }

    #[test]
    fn test_extract_strips_stray_trailing_fence() {
        assert_eq!(extract("some code\n```"), "some code");
    }

    #[test]
    fn test_extract_keeps_balanced_interior_fences() {
        let text = "intro\n```\nexample\n```\noutro";
        assert_eq!(extract(text), text);
    }
}
