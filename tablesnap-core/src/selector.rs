/*!
Previous-snapshot selection.

Snapshots of one base name share a directory, distinguished only by their
timestamp suffix. The selector lists the directory, keeps the files its
[`SnapshotMatcher`] accepts and picks the lexicographically last, which is the
most recent as long as every candidate carries a timestamp.
*/

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metadata::parse_snapshot_file_name;
use crate::{Result, TableSnapError};

/// Decides whether a file belongs to the snapshot series of a base name
pub trait SnapshotMatcher: Send + Sync {
    fn matches(&self, file_name: &str, base_file_name: &str) -> bool;
}

/// Accepts exactly `{base}.json` and `{base}_{YYYY-MM-DD_HHMM}.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixMatcher;

impl SnapshotMatcher for PrefixMatcher {
    fn matches(&self, file_name: &str, base_file_name: &str) -> bool {
        parse_snapshot_file_name(file_name).is_some_and(|(base, _)| base == base_file_name)
    }
}

/// Accepts any file whose name contains the base name.
///
/// Kept for directories written by older tooling. `users` also matches
/// `users_archive_2020.json`, so this can select an unrelated file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl SnapshotMatcher for SubstringMatcher {
    fn matches(&self, file_name: &str, base_file_name: &str) -> bool {
        file_name.contains(base_file_name)
    }
}

/// Configurable choice of [`SnapshotMatcher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Prefix,
    Substring,
}

impl MatchMode {
    pub fn matcher(self) -> Box<dyn SnapshotMatcher> {
        match self {
            MatchMode::Prefix => Box::new(PrefixMatcher),
            MatchMode::Substring => Box::new(SubstringMatcher),
        }
    }
}

/// Finds the most recent prior snapshot in a directory
pub struct SnapshotSelector {
    matcher: Box<dyn SnapshotMatcher>,
}

impl SnapshotSelector {
    pub fn new<M: SnapshotMatcher + 'static>(matcher: M) -> Self {
        Self {
            matcher: Box::new(matcher),
        }
    }

    pub fn from_mode(mode: MatchMode) -> Self {
        Self {
            matcher: mode.matcher(),
        }
    }

    /// All matching regular files in `directory`, sorted by file name
    ///
    /// A missing directory yields an empty list.
    pub fn list_matching(&self, directory: &Path, base_file_name: &str) -> Result<Vec<PathBuf>> {
        if !directory.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(directory).map_err(|e| {
            TableSnapError::persistence(format!(
                "Failed to list {}: {e}",
                directory.display()
            ))
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if self.matcher.matches(name, base_file_name) {
                matches.push(entry.path());
            }
        }

        matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(matches)
    }

    /// The lexicographically last matching file, if any
    pub fn find_previous(&self, directory: &Path, base_file_name: &str) -> Result<Option<PathBuf>> {
        let previous = self
            .list_matching(directory, base_file_name)?
            .pop();

        debug!(
            directory = %directory.display(),
            base = %base_file_name,
            previous = ?previous,
            "Selected previous snapshot"
        );
        Ok(previous)
    }
}

impl Default for SnapshotSelector {
    fn default() -> Self {
        Self::from_mode(MatchMode::default())
    }
}

impl std::fmt::Debug for SnapshotSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSelector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"[]").unwrap();
    }

    #[test]
    fn test_picks_latest_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "t_2024-01-01_0000.json");
        touch(temp_dir.path(), "t_2024-02-01_0000.json");

        let previous = SnapshotSelector::default()
            .find_previous(temp_dir.path(), "t")
            .unwrap();

        assert_eq!(previous, Some(temp_dir.path().join("t_2024-02-01_0000.json")));
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let previous = SnapshotSelector::default()
            .find_previous(temp_dir.path(), "t")
            .unwrap();
        assert!(previous.is_none());
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let previous = SnapshotSelector::default()
            .find_previous(&temp_dir.path().join("absent"), "t")
            .unwrap();
        assert!(previous.is_none());
    }

    #[test]
    fn test_prefix_ignores_unrelated_names() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "users_2024-01-01_0000.json");
        touch(temp_dir.path(), "users_archive_2020.json");
        touch(temp_dir.path(), "superusers_2025-01-01_0000.json");

        let previous = SnapshotSelector::new(PrefixMatcher)
            .find_previous(temp_dir.path(), "users")
            .unwrap();

        assert_eq!(previous, Some(temp_dir.path().join("users_2024-01-01_0000.json")));
    }

    #[test]
    fn test_substring_keeps_legacy_behaviour() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "users_2024-01-01_0000.json");
        touch(temp_dir.path(), "users_archive_2020.json");

        let previous = SnapshotSelector::from_mode(MatchMode::Substring)
            .find_previous(temp_dir.path(), "users")
            .unwrap();

        assert_eq!(previous, Some(temp_dir.path().join("users_archive_2020.json")));
    }

    #[test]
    fn test_untimestamped_file_matches_prefix() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "t.json");

        let matching = SnapshotSelector::default()
            .list_matching(temp_dir.path(), "t")
            .unwrap();
        assert_eq!(matching, vec![temp_dir.path().join("t.json")]);
    }

    #[test]
    fn test_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("t_2099-01-01_0000.json")).unwrap();
        touch(temp_dir.path(), "t_2024-01-01_0000.json");

        let previous = SnapshotSelector::default()
            .find_previous(temp_dir.path(), "t")
            .unwrap();
        assert_eq!(previous, Some(temp_dir.path().join("t_2024-01-01_0000.json")));
    }

    #[test]
    fn test_matchers_directly() {
        assert!(PrefixMatcher.matches("t_2024-01-01_0000.json", "t"));
        assert!(!PrefixMatcher.matches("t_2024-01-01_0000.json.tmp", "t"));
        assert!(!PrefixMatcher.matches("changes_t_2024-01-01_0000.json", "t"));
        assert!(SubstringMatcher.matches("changes_t_2024-01-01_0000.json", "t"));
    }
}
