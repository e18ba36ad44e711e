//! Classifies local entries against a remote snapshot.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::local::FileEntry;
use crate::remote::RemoteTreeMap;

/// Verdict for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    New,
    Modified,
    Unchanged,
    /// Present remotely only. Reported, never applied.
    Deleted,
}

impl DiffStatus {
    /// Whether a push has to upload this path.
    pub fn is_change(&self) -> bool {
        matches!(self, DiffStatus::New | DiffStatus::Modified)
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DiffStatus::New => "new",
            DiffStatus::Modified => "modified",
            DiffStatus::Unchanged => "unchanged",
            DiffStatus::Deleted => "deleted",
        };
        write!(f, "{}", label)
    }
}

/// One verdict per path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub path: String,
    pub status: DiffStatus,
    /// The local entry behind a `New` or `Modified` verdict.
    pub entry: Option<FileEntry>,
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl DiffSummary {
    /// Entries a push would upload.
    pub fn changes(&self) -> usize {
        self.new + self.modified
    }
}

/// Diffs local entries against a remote snapshot, in input order.
///
/// `None` means the branch could not be resolved: every entry is new.
pub fn diff(local: &[FileEntry], remote: Option<&RemoteTreeMap>) -> Vec<DiffResult> {
    local
        .iter()
        .map(|entry| {
            let status = match remote.and_then(|tree| tree.get(entry.path())) {
                None => DiffStatus::New,
                Some(remote_sha) if *remote_sha != entry.hash() => DiffStatus::Modified,
                Some(_) => DiffStatus::Unchanged,
            };
            DiffResult {
                path: entry.path().to_string(),
                status,
                entry: status.is_change().then(|| entry.clone()),
            }
        })
        .collect()
}

/// Paths present remotely but absent locally, sorted.
pub fn remote_only(local: &[FileEntry], remote: &RemoteTreeMap) -> Vec<DiffResult> {
    let local_paths: HashSet<&str> = local.iter().map(FileEntry::path).collect();
    let mut deleted: Vec<DiffResult> = remote
        .keys()
        .filter(|path| !local_paths.contains(path.as_str()))
        .map(|path| DiffResult {
            path: path.clone(),
            status: DiffStatus::Deleted,
            entry: None,
        })
        .collect();
    deleted.sort_by(|a, b| a.path.cmp(&b.path));
    deleted
}

/// The entries a push has to upload, in diff order.
pub fn changed_entries(results: &[DiffResult]) -> Vec<FileEntry> {
    results
        .iter()
        .filter(|r| r.status.is_change())
        .filter_map(|r| r.entry.clone())
        .collect()
}

pub fn summarize(results: &[DiffResult]) -> DiffSummary {
    results
        .iter()
        .fold(DiffSummary::default(), |mut summary, result| {
            match result.status {
                DiffStatus::New => summary.new += 1,
                DiffStatus::Modified => summary.modified += 1,
                DiffStatus::Unchanged => summary.unchanged += 1,
                DiffStatus::Deleted => summary.deleted += 1,
            }
            summary
        })
}
