//! In-memory [`RemoteRepository`] with git-like object semantics.
//!
//! Objects are content addressed, branch updates are fast-forward only and
//! every call is recorded, so tests can assert exactly which round trips a
//! sync made. Failures can be injected per operation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sha1::{Digest, Sha1};

use super::credential::Credential;
use super::types::{ObjectKind, RemoteTreeEntry, RepoInfo, RepoOwner, TreeItem, REGULAR_FILE_MODE};
use super::url::RepoRef;
use super::RemoteRepository;
use crate::error::{classify_status, Result, SyncError};
use crate::hash::{blob_sha, FileContent};

/// Operations of [`RemoteRepository`], as recorded by [`MemoryRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListRepositories,
    CreateRepository,
    ListBranches,
    BranchHead,
    CommitTree,
    TreeEntries,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl RemoteOp {
    /// Whether the operation writes to the remote.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteOp::CreateRepository
                | RemoteOp::CreateBlob
                | RemoteOp::CreateTree
                | RemoteOp::CreateCommit
                | RemoteOp::UpdateRef
        )
    }
}

/// A failure returned by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// An HTTP status, classified the same way as real responses.
    Status(u16),
    /// A transport failure.
    Network,
}

#[derive(Debug, Clone)]
struct Fault {
    op: RemoteOp,
    remaining: usize,
    failure: InjectedFailure,
}

#[derive(Debug, Clone)]
struct CommitObject {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Clone)]
struct RepoState {
    info: RepoInfo,
    branches: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    login: String,
    token: Option<String>,
    latency: Duration,
    next_id: u64,
    repos: HashMap<RepoRef, RepoState>,
    blobs: HashMap<String, Vec<u8>>,
    /// Flattened trees: blob path to blob id.
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, CommitObject>,
    calls: Vec<RemoteOp>,
    faults: Vec<Fault>,
    rejected_blobs: HashSet<Vec<u8>>,
}

/// A hosting service kept entirely in memory.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn object_id(kind: &str, payload: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", kind, payload.len()).as_bytes());
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn unprocessable(message: impl Into<String>) -> SyncError {
    SyncError::Api {
        status: 422,
        body: message.into(),
    }
}

impl State {
    fn store_tree(&mut self, files: BTreeMap<String, String>) -> String {
        let mut payload = String::new();
        for (path, sha) in &files {
            payload.push_str(&format!("{} {}\n", sha, path));
        }
        let id = object_id("tree", payload.as_bytes());
        self.trees.insert(id.clone(), files);
        id
    }

    fn store_commit(&mut self, tree: String, parents: Vec<String>, message: &str) -> String {
        // The counter stands in for the author timestamp.
        self.next_id += 1;
        let payload = format!(
            "tree {}\nparents {}\nserial {}\n\n{}",
            tree,
            parents.join(" "),
            self.next_id,
            message
        );
        let id = object_id("commit", payload.as_bytes());
        self.commits.insert(
            id.clone(),
            CommitObject {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        id
    }

    fn store_blob(&mut self, bytes: Vec<u8>) -> String {
        let id = blob_sha(&bytes);
        self.blobs.insert(id.clone(), bytes);
        id
    }

    /// Stores `files` as a commit on top of `parent`'s tree.
    fn commit_files(
        &mut self,
        parent: Option<&str>,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> String {
        let mut tree = parent
            .and_then(|sha| self.commits.get(sha))
            .and_then(|commit| self.trees.get(&commit.tree))
            .cloned()
            .unwrap_or_default();
        for (path, bytes) in files {
            let sha = self.store_blob(bytes.to_vec());
            tree.insert(path.to_string(), sha);
        }
        let tree_sha = self.store_tree(tree);
        let parents = parent.map(|p| vec![p.to_string()]).unwrap_or_default();
        self.store_commit(tree_sha, parents, message)
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut pending = vec![descendant.to_string()];
        let mut seen = HashSet::new();
        while let Some(sha) = pending.pop() {
            if sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn repo(&self, repo: &RepoRef) -> Result<&RepoState> {
        self.repos
            .get(repo)
            .ok_or_else(|| SyncError::NotFound(format!("repository '{}'", repo)))
    }
}

impl MemoryRemote {
    /// Creates an empty remote whose authenticated user is `octo`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                login: "octo".to_string(),
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the login that owns repositories created through the API.
    pub fn with_login(self, login: &str) -> Self {
        self.lock().login = login.to_string();
        self
    }

    /// Only accepts credentials carrying exactly this token.
    pub fn require_token(self, token: &str) -> Self {
        self.lock().token = Some(token.to_string());
        self
    }

    /// Delays every call by `latency` before it touches any state.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Adds a repository. With no files the repository has no commits and no branches.
    pub fn with_repository(
        self,
        owner: &str,
        name: &str,
        default_branch: &str,
        files: &[(&str, &str)],
    ) -> Self {
        {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            let mut branches = BTreeMap::new();
            if !files.is_empty() {
                let files: Vec<(&str, &[u8])> =
                    files.iter().map(|(p, c)| (*p, c.as_bytes())).collect();
                let head = state.commit_files(None, &files, "Initial commit");
                branches.insert(default_branch.to_string(), head);
            }
            state.repos.insert(
                RepoRef::new(owner, name),
                RepoState {
                    info: RepoInfo {
                        id,
                        name: name.to_string(),
                        full_name: format!("{}/{}", owner, name),
                        owner: RepoOwner {
                            login: owner.to_string(),
                        },
                        private: false,
                        default_branch: default_branch.to_string(),
                        permissions: None,
                    },
                    branches,
                },
            );
        }
        self
    }

    /// Commits files to a branch outside the sync engine, as another client would.
    ///
    /// Creates the branch if it does not exist. Returns the new head.
    pub fn commit_external(
        &self,
        repo: &RepoRef,
        branch: &str,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> Result<String> {
        let mut state = self.lock();
        let parent = state.repo(repo)?.branches.get(branch).cloned();
        let head = state.commit_files(parent.as_deref(), files, message);
        if let Some(repo) = state.repos.get_mut(repo) {
            repo.branches.insert(branch.to_string(), head.clone());
        }
        Ok(head)
    }

    /// Current head of a branch.
    pub fn head_of(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        let state = self.lock();
        state.repos.get(repo)?.branches.get(branch).cloned()
    }

    /// Files on a branch with their bytes, or `None` if the branch does not exist.
    pub fn files_at(&self, repo: &RepoRef, branch: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let state = self.lock();
        let head = state.repos.get(repo)?.branches.get(branch)?;
        let commit = state.commits.get(head)?;
        let tree = state.trees.get(&commit.tree)?;
        Some(
            tree.iter()
                .filter_map(|(path, sha)| Some((path.clone(), state.blobs.get(sha)?.clone())))
                .collect(),
        )
    }

    pub fn commit_message(&self, commit_sha: &str) -> Option<String> {
        self.lock()
            .commits
            .get(commit_sha)
            .map(|c| c.message.clone())
    }

    pub fn commit_parents(&self, commit_sha: &str) -> Option<Vec<String>> {
        self.lock()
            .commits
            .get(commit_sha)
            .map(|c| c.parents.clone())
    }

    /// Number of commits reachable from a branch head.
    pub fn history_len(&self, repo: &RepoRef, branch: &str) -> usize {
        let state = self.lock();
        let mut next = state
            .repos
            .get(repo)
            .and_then(|r| r.branches.get(branch))
            .cloned();
        let mut len = 0;
        while let Some(sha) = next {
            len += 1;
            next = state
                .commits
                .get(&sha)
                .and_then(|c| c.parents.first().cloned());
        }
        len
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_on(&self, op: RemoteOp, times: usize, failure: InjectedFailure) {
        self.lock().faults.push(Fault {
            op,
            remaining: times,
            failure,
        });
    }

    /// Rejects blob uploads whose content equals `bytes`.
    pub fn reject_blob_content(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().rejected_blobs.insert(bytes.into());
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RemoteOp> {
        self.lock().calls.clone()
    }

    /// Calls that write to the remote.
    pub fn mutation_calls(&self) -> Vec<RemoteOp> {
        self.calls().into_iter().filter(|op| op.is_mutation()).collect()
    }

    pub fn count(&self, op: RemoteOp) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Waits out the latency, then records the call and applies auth and faults.
    async fn enter(&self, op: RemoteOp, credential: &Credential) -> Result<MutexGuard<'_, State>> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.push(op);

        if let Some(token) = &state.token {
            if token != credential.expose() {
                return Err(classify_status(401, "Bad credentials", "user"));
            }
        }

        if let Some(fault) = state
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0)
        {
            fault.remaining -= 1;
            let failure = fault.failure;
            state.faults.retain(|f| f.remaining > 0);
            return Err(match failure {
                InjectedFailure::Status(status) => {
                    classify_status(status, "injected failure", &format!("{:?}", op))
                }
                InjectedFailure::Network => {
                    SyncError::Network("connection reset by peer".to_string())
                }
            });
        }

        Ok(state)
    }
}

#[async_trait]
impl RemoteRepository for MemoryRemote {
    async fn list_repositories(&self, credential: &Credential) -> Result<Vec<RepoInfo>> {
        let state = self.enter(RemoteOp::ListRepositories, credential).await?;
        let mut repos: Vec<RepoInfo> = state.repos.values().map(|r| r.info.clone()).collect();
        // Newest first, like `sort=updated`.
        repos.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(repos)
    }

    async fn create_repository(
        &self,
        credential: &Credential,
        name: &str,
        private: bool,
    ) -> Result<RepoInfo> {
        let mut state = self.enter(RemoteOp::CreateRepository, credential).await?;
        let login = state.login.clone();
        let key = RepoRef::new(login.clone(), name);
        if state.repos.contains_key(&key) {
            return Err(unprocessable("name already exists on this account"));
        }

        let readme = format!("# {}\n", name);
        let head = state.commit_files(None, &[("README.md", readme.as_bytes())], "Initial commit");
        state.next_id += 1;
        let info = RepoInfo {
            id: state.next_id,
            name: name.to_string(),
            full_name: key.to_string(),
            owner: RepoOwner { login },
            private,
            default_branch: "main".to_string(),
            permissions: None,
        };
        state.repos.insert(
            key,
            RepoState {
                info: info.clone(),
                branches: BTreeMap::from([("main".to_string(), head)]),
            },
        );
        Ok(info)
    }

    async fn list_branches(&self, credential: &Credential, repo: &RepoRef) -> Result<Vec<String>> {
        let state = self.enter(RemoteOp::ListBranches, credential).await?;
        Ok(state.repo(repo)?.branches.keys().cloned().collect())
    }

    async fn branch_head(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>> {
        let state = self.enter(RemoteOp::BranchHead, credential).await?;
        Ok(state.repo(repo)?.branches.get(branch).cloned())
    }

    async fn commit_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        commit_sha: &str,
    ) -> Result<String> {
        let state = self.enter(RemoteOp::CommitTree, credential).await?;
        state.repo(repo)?;
        state
            .commits
            .get(commit_sha)
            .map(|c| c.tree.clone())
            .ok_or_else(|| SyncError::NotFound(format!("commit {}", commit_sha)))
    }

    async fn tree_entries(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        tree_sha: &str,
    ) -> Result<Vec<RemoteTreeEntry>> {
        let state = self.enter(RemoteOp::TreeEntries, credential).await?;
        state.repo(repo)?;
        let tree = state
            .trees
            .get(tree_sha)
            .ok_or_else(|| SyncError::NotFound(format!("tree {}", tree_sha)))?;

        // Recursive listings include the directories as tree entries.
        let mut directories = BTreeSet::new();
        for path in tree.keys() {
            let mut parts: Vec<&str> = path.split('/').collect();
            parts.pop();
            for depth in 1..=parts.len() {
                directories.insert(parts[..depth].join("/"));
            }
        }

        let mut entries: Vec<RemoteTreeEntry> = directories
            .into_iter()
            .map(|path| RemoteTreeEntry {
                sha: object_id("tree", path.as_bytes()),
                path,
                mode: "040000".to_string(),
                kind: ObjectKind::Tree,
            })
            .collect();
        entries.extend(tree.iter().map(|(path, sha)| RemoteTreeEntry {
            path: path.clone(),
            mode: REGULAR_FILE_MODE.to_string(),
            kind: ObjectKind::Blob,
            sha: sha.clone(),
        }));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn create_blob(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        content: &FileContent,
    ) -> Result<String> {
        let mut state = self.enter(RemoteOp::CreateBlob, credential).await?;
        state.repo(repo)?;
        if state.rejected_blobs.contains(content.as_bytes()) {
            return Err(unprocessable("blob content rejected"));
        }
        Ok(state.store_blob(content.as_bytes().to_vec()))
    }

    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        base_tree: &str,
        items: &[TreeItem],
    ) -> Result<String> {
        let mut state = self.enter(RemoteOp::CreateTree, credential).await?;
        state.repo(repo)?;
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| unprocessable(format!("base_tree {} does not exist", base_tree)))?;

        for item in items {
            if item.kind != ObjectKind::Blob || !state.blobs.contains_key(&item.sha) {
                return Err(unprocessable(format!(
                    "tree.sha {} is not a valid blob",
                    item.sha
                )));
            }
            tree.insert(item.path.clone(), item.sha.clone());
        }
        Ok(state.store_tree(tree))
    }

    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String> {
        let mut state = self.enter(RemoteOp::CreateCommit, credential).await?;
        state.repo(repo)?;
        if !state.trees.contains_key(tree_sha) {
            return Err(unprocessable(format!("tree {} does not exist", tree_sha)));
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(unprocessable(format!("parent {} does not exist", missing)));
        }
        Ok(state.store_commit(tree_sha.to_string(), parents.to_vec(), message))
    }

    async fn update_ref(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> Result<()> {
        let mut state = self.enter(RemoteOp::UpdateRef, credential).await?;
        let current = state
            .repo(repo)?
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| unprocessable("Reference does not exist"))?;
        if !state.commits.contains_key(commit_sha) {
            return Err(unprocessable(format!("object {} does not exist", commit_sha)));
        }
        if !state.is_ancestor(&current, commit_sha) {
            return Err(unprocessable("Update is not a fast forward"));
        }
        if let Some(repo) = state.repos.get_mut(repo) {
            repo.branches.insert(branch.to_string(), commit_sha.to_string());
        }
        Ok(())
    }
}
