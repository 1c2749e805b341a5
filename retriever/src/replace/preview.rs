use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffOp, TextDiff};
use std::path::{Path, PathBuf};

use crate::errors::SearchResult;

/// A hunk of changes in a file diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// The 1-based starting line in the original file
    pub original_start_line: usize,
    /// The 1-based starting line in the new file
    pub new_start_line: usize,
    pub original_lines: Vec<String>,
    pub new_lines: Vec<String>,
}

/// What a replace would change in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub hunks: Vec<DiffHunk>,
    /// Matches that would be replaced
    pub replacements: usize,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

fn changed_lines(diff: &TextDiff<'_, '_, '_, str>, op: &DiffOp, tag: ChangeTag) -> Vec<String> {
    diff.iter_changes(op)
        .filter(|change| change.tag() == tag)
        .map(|change| change.value().trim_end_matches(&['\r', '\n'][..]).to_string())
        .collect()
}

/// Line based diff between old and new content
pub fn generate_file_diff(old_content: &str, new_content: &str, path: &Path) -> FileDiff {
    let diff = TextDiff::from_lines(old_content, new_content);
    let mut hunks = Vec::new();

    for group in diff.grouped_ops(0) {
        for op in group {
            let (original_start, new_start) = match op {
                DiffOp::Equal { .. } => continue,
                DiffOp::Insert { old_index, new_index, .. }
                | DiffOp::Delete { old_index, new_index, .. }
                | DiffOp::Replace { old_index, new_index, .. } => (old_index, new_index),
            };
            hunks.push(DiffHunk {
                original_start_line: original_start + 1,
                new_start_line: new_start + 1,
                original_lines: changed_lines(&diff, &op, ChangeTag::Delete),
                new_lines: changed_lines(&diff, &op, ChangeTag::Insert),
            });
        }
    }

    FileDiff {
        path: path.to_path_buf(),
        hunks,
        replacements: 0,
    }
}

/// Serializes preview diffs for tools consuming them
pub fn diffs_to_json(diffs: &[FileDiff]) -> SearchResult<String> {
    Ok(serde_json::to_string_pretty(diffs)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_hunks() {
        let diff = generate_file_diff(
            "keep\nfoo = 1\nkeep\nfoo()\n",
            "keep\nbar = 1\nkeep\nbar()\n",
            Path::new("a.txt"),
        );
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(diff.hunks[0].original_start_line, 2);
        assert_eq!(diff.hunks[0].original_lines, vec!["foo = 1"]);
        assert_eq!(diff.hunks[0].new_lines, vec!["bar = 1"]);
        assert_eq!(diff.hunks[1].new_start_line, 4);

        assert!(generate_file_diff("same\n", "same\n", Path::new("a.txt")).is_empty());
    }

    #[test]
    fn test_diffs_to_json() -> SearchResult<()> {
        let mut diff = generate_file_diff("foo\n", "bar\n", Path::new("a.txt"));
        diff.replacements = 1;
        let json = diffs_to_json(&[diff.clone()])?;
        let parsed: Vec<FileDiff> = serde_json::from_str(&json)?;
        assert_eq!(parsed, vec![diff]);
        Ok(())
    }
}
