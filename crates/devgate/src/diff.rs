//! Unified diffs for proposed file writes.

use similar::{ChangeTag, TextDiff};

/// A line diff between the current and the proposed content of a file
#[derive(Debug, Clone, PartialEq)]
pub struct FileDiff {
    /// Unified diff text with `a/` and `b/` headers; empty when nothing changed
    pub unified: String,
    pub added: usize,
    pub removed: usize,
}

impl FileDiff {
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

#[must_use]
pub fn unified_diff(path: &str, old: &str, new: &str) -> FileDiff {
    let diff = TextDiff::from_lines(old, new);

    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }

    let unified = if added + removed == 0 {
        String::new()
    } else {
        diff.unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", path), &format!("b/{}", path))
            .to_string()
    };

    FileDiff {
        unified,
        added,
        removed,
    }
}
