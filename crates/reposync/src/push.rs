//! Remote tree fetch and the atomic multi-file commit.
//!
//! A push creates blobs, then one tree on top of the current root tree, then
//! one commit whose only parent is the current head, and finally moves the
//! branch. Nothing is visible on the remote until the last step succeeds,
//! so a failure at any point leaves the branch where it was.

use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::config::{BlobFailurePolicy, SyncSettings};
use crate::diff::{changed_entries, DiffResult};
use crate::error::{Result, SyncError};
use crate::local::FileEntry;
use crate::progress::ProgressReporter;
use crate::remote::{blob_map, Credential, RemoteRepository, RemoteTreeMap, RepoRef, TreeItem};

/// Repository and branch a sync reads from and pushes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub repo: RepoRef,
    pub branch: String,
}

impl SyncTarget {
    pub fn new(repo: RepoRef, branch: impl Into<String>) -> Self {
        Self {
            repo,
            branch: branch.into(),
        }
    }
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo, self.branch)
    }
}

/// Commit message and failure policy for one push.
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub message: String,
    pub blob_failure_policy: BlobFailurePolicy,
}

impl PushOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blob_failure_policy: BlobFailurePolicy::default(),
        }
    }

    /// Options using the configured failure policy.
    pub fn from_settings(message: impl Into<String>, settings: &SyncSettings) -> Self {
        Self {
            message: message.into(),
            blob_failure_policy: settings.blob_failure_policy,
        }
    }

    pub fn with_policy(mut self, policy: BlobFailurePolicy) -> Self {
        self.blob_failure_policy = policy;
        self
    }
}

/// A file left out of a push because its blob could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Summary of a successful push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    /// The commit the branch now points at.
    pub commit_sha: String,
    /// Paths included in the commit, in upload order.
    pub uploaded: Vec<String>,
    /// Paths whose upload failed and were left out.
    pub skipped: Vec<SkippedFile>,
}

impl PushOutcome {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

fn branch_not_found(branch: &str) -> SyncError {
    SyncError::NotFound(format!(
        "Branch '{}' not found. Ensure the repository exists and is initialized.",
        branch
    ))
}

/// Fetches the blob snapshot of a branch.
///
/// Returns `None` when the branch cannot be resolved, which callers treat
/// as "every local file is new".
pub async fn fetch_remote_tree(
    remote: &dyn RemoteRepository,
    credential: &Credential,
    target: &SyncTarget,
) -> Result<Option<RemoteTreeMap>> {
    let span = info_span!("sync.fetch_tree", target = %target);
    async {
        let Some(head) = remote
            .branch_head(credential, &target.repo, &target.branch)
            .await?
        else {
            log::info!("Branch {} does not exist yet", target);
            return Ok(None);
        };

        let tree_sha = remote.commit_tree(credential, &target.repo, &head).await?;
        let entries = remote
            .tree_entries(credential, &target.repo, &tree_sha)
            .await?;
        let map = blob_map(&entries);
        log::debug!("Fetched {} remote files from {}", map.len(), target);
        Ok(Some(map))
    }
    .instrument(span)
    .await
}

/// Pushes `files` as a single commit on top of the branch head.
pub async fn push(
    remote: &dyn RemoteRepository,
    credential: &Credential,
    target: &SyncTarget,
    files: &[FileEntry],
    options: &PushOptions,
    progress: &dyn ProgressReporter,
) -> Result<PushOutcome> {
    if files.is_empty() {
        return Err(SyncError::Validation("No changes to push.".to_string()));
    }

    let span = info_span!("sync.push", target = %target, files = files.len());
    run_push(remote, credential, target, files, options, progress)
        .instrument(span)
        .await
}

/// Pushes the `new` and `modified` entries of a diff.
///
/// Fails without touching the remote when there is nothing to push.
pub async fn push_changes(
    remote: &dyn RemoteRepository,
    credential: &Credential,
    target: &SyncTarget,
    results: &[DiffResult],
    options: &PushOptions,
    progress: &dyn ProgressReporter,
) -> Result<PushOutcome> {
    let changes = changed_entries(results);
    push(remote, credential, target, &changes, options, progress).await
}

async fn run_push(
    remote: &dyn RemoteRepository,
    credential: &Credential,
    target: &SyncTarget,
    files: &[FileEntry],
    options: &PushOptions,
    progress: &dyn ProgressReporter,
) -> Result<PushOutcome> {
    let total = files.len();
    let repo = &target.repo;

    progress.report(0, total, "Getting latest commit...");
    let head = remote
        .branch_head(credential, repo, &target.branch)
        .await?
        .ok_or_else(|| branch_not_found(&target.branch))?;
    let base_tree = remote.commit_tree(credential, repo, &head).await?;

    let mut items = Vec::with_capacity(total);
    let mut uploaded = Vec::with_capacity(total);
    let mut skipped = Vec::new();
    let mut last_error = None;

    for (index, file) in files.iter().enumerate() {
        progress.report(index + 1, total, &format!("Uploading {}...", file.path()));

        match remote.create_blob(credential, repo, file.content()).await {
            Ok(sha) => {
                items.push(TreeItem::blob(file.path(), sha));
                uploaded.push(file.path().to_string());
            }
            Err(e) if options.blob_failure_policy == BlobFailurePolicy::Skip => {
                log::warn!("Failed to upload blob for {}: {}", file.path(), e);
                skipped.push(SkippedFile {
                    path: file.path().to_string(),
                    reason: e.to_string(),
                });
                last_error = Some(e);
            }
            Err(e) => {
                log::error!("Failed to upload blob for {}, aborting push: {}", file.path(), e);
                return Err(e);
            }
        }
    }

    if items.is_empty() {
        // Nothing made it up; committing would only add an empty commit.
        return Err(last_error
            .unwrap_or_else(|| SyncError::Validation("No changes to push.".to_string())));
    }

    progress.report(total, total, "Creating tree...");
    let tree_sha = remote
        .create_tree(credential, repo, &base_tree, &items)
        .await?;

    progress.report(total, total, "Creating commit...");
    let commit_sha = remote
        .create_commit(credential, repo, &options.message, &tree_sha, &[head])
        .await?;

    progress.report(total, total, "Updating branch...");
    remote
        .update_ref(credential, repo, &target.branch, &commit_sha)
        .await?;

    progress.report(total, total, "Done!");
    if skipped.is_empty() {
        log::info!("Pushed {} files to {} ({})", uploaded.len(), target, commit_sha);
    } else {
        log::warn!(
            "Pushed {} files to {} ({}), {} skipped",
            uploaded.len(),
            target,
            commit_sha,
            skipped.len()
        );
    }

    Ok(PushOutcome {
        commit_sha,
        uploaded,
        skipped,
    })
}
