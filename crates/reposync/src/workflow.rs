//! Manual sync workflow: authenticate, pick a repository and folder,
//! review the diff, push.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bot::WatchBot;
use crate::config::SyncSettings;
use crate::diff::{changed_entries, diff, remote_only, summarize, DiffResult, DiffSummary};
use crate::error::{Result, SyncError};
use crate::local::{read_directory, read_file_list, DirectoryHandle, FileEntry, SelectedFile};
use crate::progress::ProgressReporter;
use crate::push::{fetch_remote_tree, push_changes, PushOptions, PushOutcome, SyncTarget};
use crate::remote::{parse_repo_url, Credential, RemoteRepository, RepoInfo, RepoRef};

/// Steps of the manual workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStep {
    Auth,
    RepoSelect,
    Diff,
    Sync,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncStep::Auth => "auth",
            SyncStep::RepoSelect => "repoSelect",
            SyncStep::Diff => "diff",
            SyncStep::Sync => "sync",
        };
        write!(f, "{}", label)
    }
}

/// A local folder chosen by the user.
#[derive(Clone)]
pub enum LocalSelection {
    /// Flat listing from a folder picker. Paths include the folder name.
    Files(Vec<SelectedFile>),
    /// A traversable directory.
    Directory(Arc<dyn DirectoryHandle>),
}

impl LocalSelection {
    async fn read(&self, progress: &dyn ProgressReporter) -> Result<Vec<FileEntry>> {
        match self {
            LocalSelection::Files(files) => read_file_list(files, progress).await,
            LocalSelection::Directory(root) => read_directory(root.as_ref()).await,
        }
    }
}

impl std::fmt::Debug for LocalSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalSelection::Files(files) => write!(f, "Files({} entries)", files.len()),
            LocalSelection::Directory(root) => write!(f, "Directory({})", root.name()),
        }
    }
}

/// Drives one manual sync session.
///
/// Steps only move forward, except for [`SyncWorkflow::go_back`] from the
/// diff to the repository selection and a failed push, which returns to the
/// diff with the previous results intact.
pub struct SyncWorkflow {
    remote: Arc<dyn RemoteRepository>,
    settings: SyncSettings,
    step: SyncStep,
    credential: Option<Credential>,
    repositories: Vec<RepoInfo>,
    selected: Option<RepoInfo>,
    branches: Vec<String>,
    branch: Option<String>,
    selection: Option<LocalSelection>,
    results: Vec<DiffResult>,
    deleted: Vec<DiffResult>,
    last_error: Option<String>,
    outcome: Option<PushOutcome>,
}

impl SyncWorkflow {
    pub fn new(remote: Arc<dyn RemoteRepository>, settings: SyncSettings) -> Self {
        Self {
            remote,
            settings,
            step: SyncStep::Auth,
            credential: None,
            repositories: Vec::new(),
            selected: None,
            branches: Vec::new(),
            branch: None,
            selection: None,
            results: Vec::new(),
            deleted: Vec::new(),
            last_error: None,
            outcome: None,
        }
    }

    pub fn step(&self) -> SyncStep {
        self.step
    }

    /// The credential accepted in the auth step, for the host to persist.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn repositories(&self) -> &[RepoInfo] {
        &self.repositories
    }

    pub fn selected_repository(&self) -> Option<&RepoInfo> {
        self.selected.as_ref()
    }

    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn diff_results(&self) -> &[DiffResult] {
        &self.results
    }

    /// Remote paths with no local counterpart. Never pushed as deletions.
    pub fn remote_only(&self) -> &[DiffResult] {
        &self.deleted
    }

    pub fn summary(&self) -> DiffSummary {
        summarize(&self.results)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn outcome(&self) -> Option<&PushOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.step == SyncStep::Sync && self.outcome.is_some()
    }

    pub fn target(&self) -> Option<SyncTarget> {
        let repo = self.selected.as_ref()?;
        let branch = self.branch.as_ref()?;
        Some(SyncTarget::new(repo.repo_ref(), branch.clone()))
    }

    /// Records a failure for display and hands it back to the caller.
    fn fail<T>(&mut self, err: SyncError) -> Result<T> {
        log::warn!("Sync step {} failed: {}", self.step, err);
        self.last_error = Some(err.to_string());
        Err(err)
    }

    fn expect_step(&self, allowed: &[SyncStep], action: &str) -> Result<()> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(SyncError::Validation(format!(
                "Cannot {} during the {} step",
                action, self.step
            )))
        }
    }

    fn require_credential(&self) -> Result<Credential> {
        self.credential
            .clone()
            .ok_or_else(|| SyncError::Auth("please enter an access token".to_string()))
    }

    /// Validates a token by listing repositories.
    ///
    /// On failure the workflow stays in the auth step.
    pub async fn authenticate(&mut self, token: &str) -> Result<&[RepoInfo]> {
        self.expect_step(&[SyncStep::Auth], "authenticate")?;
        self.last_error = None;

        let credential = match Credential::new(token) {
            Ok(credential) => credential,
            Err(e) => return self.fail(e),
        };
        match self.remote.list_repositories(&credential).await {
            Ok(repositories) => {
                log::info!("Authenticated, {} repositories visible", repositories.len());
                self.credential = Some(credential);
                self.repositories = repositories;
                self.step = SyncStep::RepoSelect;
                Ok(&self.repositories)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Reloads the repository list.
    pub async fn refresh_repositories(&mut self) -> Result<&[RepoInfo]> {
        self.expect_step(&[SyncStep::RepoSelect], "refresh repositories")?;
        let credential = self.require_credential()?;
        match self.remote.list_repositories(&credential).await {
            Ok(repositories) => {
                self.repositories = repositories;
                Ok(&self.repositories)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Creates a repository and selects it.
    pub async fn create_repository(&mut self, name: &str, private: bool) -> Result<&RepoInfo> {
        self.expect_step(&[SyncStep::RepoSelect], "create a repository")?;
        let name = name.trim();
        if name.is_empty() {
            return self.fail(SyncError::Validation(
                "Please enter a repository name.".to_string(),
            ));
        }

        let credential = self.require_credential()?;
        let repo = match self
            .remote
            .create_repository(&credential, name, private)
            .await
        {
            Ok(repo) => repo,
            Err(e) => return self.fail(e),
        };
        self.repositories.insert(0, repo.clone());
        self.select(repo).await?;
        self.selected
            .as_ref()
            .ok_or_else(|| SyncError::NotFound(name.to_string()))
    }

    /// Selects a listed repository and loads its branches.
    ///
    /// Returns the chosen branch: the default branch if it exists, else the
    /// first branch, else the configured fallback.
    pub async fn select_repository(&mut self, repo: &RepoRef) -> Result<&str> {
        self.expect_step(&[SyncStep::RepoSelect], "select a repository")?;
        let Some(info) = self
            .repositories
            .iter()
            .find(|r| r.repo_ref() == *repo)
            .cloned()
        else {
            return self.fail(SyncError::NotFound(format!("repository '{}'", repo)));
        };
        self.select(info).await
    }

    /// Selects a listed repository by URL or `owner/repo`.
    pub async fn select_repository_url(&mut self, url: &str) -> Result<&str> {
        let repo = match parse_repo_url(url) {
            Ok(repo) => repo,
            Err(e) => return self.fail(e),
        };
        self.select_repository(&repo).await
    }

    async fn select(&mut self, info: RepoInfo) -> Result<&str> {
        let credential = self.require_credential()?;
        let branches = match self
            .remote
            .list_branches(&credential, &info.repo_ref())
            .await
        {
            Ok(branches) => branches,
            Err(e) => return self.fail(e),
        };

        let branch = if branches.contains(&info.default_branch) {
            info.default_branch.clone()
        } else if let Some(first) = branches.first() {
            first.clone()
        } else {
            self.settings.branch.clone()
        };

        log::debug!("Selected {} on branch {}", info.full_name, branch);
        self.last_error = None;
        self.selected = Some(info);
        self.branches = branches;
        self.branch = Some(branch);
        self.results.clear();
        self.deleted.clear();
        Ok(self.branch.as_deref().unwrap_or_default())
    }

    /// Overrides the branch chosen by repository selection.
    pub fn select_branch(&mut self, branch: &str) -> Result<()> {
        self.expect_step(&[SyncStep::RepoSelect], "select a branch")?;
        if self.selected.is_none() {
            return self.fail(SyncError::Validation(
                "Please select a repository first.".to_string(),
            ));
        }
        let branch = branch.trim();
        if branch.is_empty() {
            return self.fail(SyncError::Validation(
                "Branch name must not be empty.".to_string(),
            ));
        }
        self.branch = Some(branch.to_string());
        Ok(())
    }

    /// Reads the folder, fetches the remote tree and diffs them.
    pub async fn select_folder(
        &mut self,
        selection: LocalSelection,
        progress: &dyn ProgressReporter,
    ) -> Result<&[DiffResult]> {
        self.expect_step(&[SyncStep::RepoSelect], "select a folder")?;
        let Some(target) = self.target() else {
            return self.fail(SyncError::Validation(
                "Please select a repository first.".to_string(),
            ));
        };
        self.selection = Some(selection);
        self.scan(&target, progress).await?;
        self.step = SyncStep::Diff;
        Ok(&self.results)
    }

    /// Re-reads the selected folder and recomputes the diff.
    pub async fn rescan(&mut self, progress: &dyn ProgressReporter) -> Result<&[DiffResult]> {
        self.expect_step(&[SyncStep::Diff], "rescan")?;
        let Some(target) = self.target() else {
            return self.fail(SyncError::Validation(
                "Please select a repository first.".to_string(),
            ));
        };
        self.scan(&target, progress).await?;
        Ok(&self.results)
    }

    async fn scan(&mut self, target: &SyncTarget, progress: &dyn ProgressReporter) -> Result<()> {
        let credential = self.require_credential()?;
        let Some(selection) = self.selection.clone() else {
            return self.fail(SyncError::Validation(
                "Please select a folder.".to_string(),
            ));
        };

        let entries = match selection.read(progress).await {
            Ok(entries) => entries,
            Err(e) => return self.fail(e),
        };
        let tree = match fetch_remote_tree(self.remote.as_ref(), &credential, target).await {
            Ok(tree) => tree,
            Err(e) => return self.fail(e),
        };

        self.results = diff(&entries, tree.as_ref());
        self.deleted = tree
            .as_ref()
            .map(|tree| remote_only(&entries, tree))
            .unwrap_or_default();
        self.last_error = None;

        let summary = self.summary();
        log::info!(
            "Diff against {}: {} new, {} modified, {} unchanged",
            target,
            summary.new,
            summary.modified,
            summary.unchanged
        );
        Ok(())
    }

    /// Returns from the diff to the repository selection.
    pub fn go_back(&mut self) -> Result<()> {
        self.expect_step(&[SyncStep::Diff], "go back")?;
        self.step = SyncStep::RepoSelect;
        self.results.clear();
        self.deleted.clear();
        self.selection = None;
        self.last_error = None;
        Ok(())
    }

    /// Pushes the new and modified files.
    ///
    /// An empty change set is rejected before any network call. A failed
    /// push returns to the diff step with the results kept for a retry.
    pub async fn push(
        &mut self,
        message: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<&PushOutcome> {
        self.expect_step(&[SyncStep::Diff], "push")?;
        if changed_entries(&self.results).is_empty() {
            return self.fail(SyncError::Validation(
                "No changes to push. All files are up to date.".to_string(),
            ));
        }
        if let Some(repo) = self.selected.as_ref().filter(|r| !r.can_push()) {
            let err = SyncError::Permission(format!("no push access to {}", repo.full_name));
            return self.fail(err);
        }
        let Some(target) = self.target() else {
            return self.fail(SyncError::Validation(
                "Please select a repository first.".to_string(),
            ));
        };
        let credential = self.require_credential()?;

        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.settings.commit_message)
            .to_string();
        let options = PushOptions::from_settings(message, &self.settings);

        self.step = SyncStep::Sync;
        self.last_error = None;
        let result = push_changes(
            self.remote.as_ref(),
            &credential,
            &target,
            &self.results,
            &options,
            progress,
        )
        .await;

        match result {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.outcome
                    .as_ref()
                    .ok_or_else(|| SyncError::Validation("push outcome missing".to_string()))
            }
            Err(e) => {
                self.step = SyncStep::Diff;
                self.fail(e)
            }
        }
    }

    /// Clears selections and results, keeping the credential.
    pub fn reset(&mut self) {
        self.step = if self.credential.is_some() {
            SyncStep::RepoSelect
        } else {
            SyncStep::Auth
        };
        self.selected = None;
        self.branches.clear();
        self.branch = None;
        self.selection = None;
        self.results.clear();
        self.deleted.clear();
        self.last_error = None;
        self.outcome = None;
    }

    /// Builds a watch bot for the selected repository, branch and folder.
    ///
    /// Requires a directory selection: a flat file list is a one-off
    /// snapshot and cannot be re-read.
    pub fn watch_bot(&self) -> Result<WatchBot> {
        let target = self.target().ok_or_else(|| {
            SyncError::Validation("Please select a repository first.".to_string())
        })?;
        let root = match &self.selection {
            Some(LocalSelection::Directory(root)) => Arc::clone(root),
            _ => {
                return Err(SyncError::Validation(
                    "The watch bot needs a selected folder handle.".to_string(),
                ))
            }
        };
        Ok(WatchBot::new(
            Arc::clone(&self.remote),
            self.require_credential()?,
            target,
            root,
            self.settings.clone(),
        ))
    }
}
