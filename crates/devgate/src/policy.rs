//! Safety checks applied by tool handlers before they touch the filesystem, a shell or the web.
//!
//! None of these checks is a security boundary. The path denylist is a substring match on the
//! resolved path and the command blocklist is a substring match on the raw command text; both
//! are trivially bypassed (symlinks, spacing, aliases, `$(...)`). They exist to stop a model
//! from casually wandering into secrets or destructive commands, with the approval gate as the
//! real control.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyViolation {
    #[error("Access to '{path}' is restricted because it may contain credentials")]
    RestrictedPath { path: String },

    #[error("Blocked for safety: the command contains '{pattern}'")]
    BlockedCommand { pattern: String },

    #[error(
        "The requested span of {requested} lines exceeds the limit of {max} lines per read. \
         Read in chunks of {max} lines or less (next call: startLine: {start}, endLine: {suggested_end})"
    )]
    ReadSpanTooLarge {
        requested: usize,
        max: usize,
        start: usize,
        suggested_end: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyPolicy {
    /// Substrings that mark a path as credential material
    pub denied_path_markers: Vec<String>,
    /// Substrings that mark a shell command as destructive
    pub blocked_commands: Vec<String>,
    /// Maximum number of lines returned by a single file read
    pub read_chunk_lines: usize,
    /// Maximum length of a web search query, in characters
    pub max_query_chars: usize,
    /// Maximum number of web search results requested
    pub max_search_results: usize,
    /// Maximum recursion depth for directory listings
    pub max_list_depth: usize,
}

pub const DEFAULT_DENIED_PATH_MARKERS: &[&str] = &[
    ".env",
    "id_rsa",
    "id_ed25519",
    "id_ecdsa",
    ".pem",
    ".ssh",
    ".aws",
    ".netrc",
    "credentials",
];

pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "sudo",
    "su -",
    "mkfs",
    "dd if=",
    ":(){",
    "format c:",
    "shutdown",
    "reboot",
];

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            denied_path_markers: DEFAULT_DENIED_PATH_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            read_chunk_lines: 300,
            max_query_chars: 200,
            max_search_results: 3,
            max_list_depth: 5,
        }
    }
}

impl SafetyPolicy {
    /// Resolve a tool-supplied path against the project root and check it against the denylist
    pub fn resolve_path(&self, root: &Path, raw: &str) -> Result<PathBuf, PolicyViolation> {
        let joined = root.join(raw);
        let resolved = normalize(&joined);
        let shown = resolved.to_string_lossy();
        if self
            .denied_path_markers
            .iter()
            .any(|marker| shown.contains(marker.as_str()))
        {
            tracing::warn!(path = %shown, "denied access to restricted path");
            return Err(PolicyViolation::RestrictedPath {
                path: raw.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Reject commands containing a blocklisted substring
    pub fn check_command(&self, command: &str) -> Result<(), PolicyViolation> {
        match self
            .blocked_commands
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
        {
            Some(pattern) => {
                tracing::warn!(%command, %pattern, "blocked shell command");
                Err(PolicyViolation::BlockedCommand {
                    pattern: pattern.clone(),
                })
            }
            None => Ok(()),
        }
    }

    /// Check a 1-based, inclusive line span against the read ceiling
    pub fn check_read_span(&self, start: usize, end: usize) -> Result<(), PolicyViolation> {
        let requested = (end + 1).saturating_sub(start);
        if requested > self.read_chunk_lines {
            return Err(PolicyViolation::ReadSpanTooLarge {
                requested,
                max: self.read_chunk_lines,
                start,
                suggested_end: start + self.read_chunk_lines - 1,
            });
        }
        Ok(())
    }

    /// Truncate a search query to the configured number of characters
    pub fn bound_query(&self, query: &str) -> String {
        query.chars().take(self.max_query_chars).collect()
    }

    pub fn clamp_depth(&self, depth: usize) -> usize {
        depth.min(self.max_list_depth)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let policy = SafetyPolicy::default();
        let resolved = policy
            .resolve_path(Path::new("/work/project"), "src/../README.md")
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/work/project/README.md"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let policy = SafetyPolicy::default();
        let resolved = policy
            .resolve_path(Path::new("/work/project"), "/tmp/./notes.txt")
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/notes.txt"));
    }

    #[test]
    fn test_credential_paths_are_denied() {
        let policy = SafetyPolicy::default();
        let root = Path::new("/work/project");
        for raw in [".env", "config/.env.local", "../../home/me/.ssh/id_rsa", "aws/credentials"] {
            let error = policy.resolve_path(root, raw).unwrap_err();
            assert_eq!(
                error,
                PolicyViolation::RestrictedPath {
                    path: raw.to_string()
                }
            );
        }
    }

    #[test]
    fn test_traversal_is_checked_after_resolution() {
        let policy = SafetyPolicy::default();
        // The marker only appears once `..` is resolved against the root
        let root = Path::new("/home/me/.ssh/project");
        assert!(policy.resolve_path(root, "../id_rsa").is_err());
    }

    #[test]
    fn test_blocked_commands() {
        let policy = SafetyPolicy::default();
        assert!(policy.check_command("ls -la").is_ok());
        assert!(policy.check_command("cargo test").is_ok());
        let error = policy.check_command("cd / && rm -rf /").unwrap_err();
        assert_eq!(
            error,
            PolicyViolation::BlockedCommand {
                pattern: "rm -rf".into()
            }
        );
        assert!(policy.check_command("sudo apt install foo").is_err());
        assert!(policy.check_command("mkfs.ext4 /dev/sda1").is_err());
    }

    #[test]
    fn test_blocklist_is_only_a_substring_match() {
        // Documented gap: spacing defeats the blocklist
        let policy = SafetyPolicy::default();
        assert!(policy.check_command("rm  -rf /").is_ok());
    }

    #[test]
    fn test_read_span_ceiling() {
        let policy = SafetyPolicy::default();
        assert!(policy.check_read_span(1, 300).is_ok());
        assert!(policy.check_read_span(301, 600).is_ok());

        let error = policy.check_read_span(1, 301).unwrap_err();
        assert_eq!(
            error,
            PolicyViolation::ReadSpanTooLarge {
                requested: 301,
                max: 300,
                start: 1,
                suggested_end: 300
            }
        );
        let message = error.to_string();
        assert!(message.contains("startLine: 1, endLine: 300"));
    }

    #[test]
    fn test_query_is_truncated_on_char_boundary() {
        let policy = SafetyPolicy {
            max_query_chars: 3,
            ..SafetyPolicy::default()
        };
        assert_eq!(policy.bound_query("héllo"), "hél");
        assert_eq!(policy.bound_query("ab"), "ab");
    }

    #[test]
    fn test_depth_is_clamped() {
        let policy = SafetyPolicy::default();
        assert_eq!(policy.clamp_depth(2), 2);
        assert_eq!(policy.clamp_depth(50), 5);
    }
}
