//! Remote repository access.
//!
//! [`RemoteRepository`] is the primitive object API the engine needs from a
//! hosting service: listing, object creation and reference updates. Every
//! call takes the caller's [`Credential`]; implementations hold no identity
//! of their own.

pub mod credential;
pub mod github;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod types;
pub mod url;

use async_trait::async_trait;

use crate::error::Result;
use crate::hash::FileContent;

pub use credential::Credential;
pub use github::GitHubClient;
#[cfg(any(test, feature = "mock"))]
pub use memory::{InjectedFailure, MemoryRemote, RemoteOp};
pub use types::{
    blob_map, ObjectKind, RemoteTreeEntry, RemoteTreeMap, RepoInfo, RepoOwner, RepoPermissions,
    TreeItem, REGULAR_FILE_MODE,
};
pub use url::{parse_repo_url, RepoRef};

/// Primitive operations against a remote hosting API.
///
/// Each method is one independent round trip. Objects created by
/// `create_blob`, `create_tree` and `create_commit` are immutable and have
/// no visible effect until `update_ref` moves a branch onto them.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Lists repositories visible to the credential.
    async fn list_repositories(&self, credential: &Credential) -> Result<Vec<RepoInfo>>;

    /// Creates a repository with an initial commit so its default branch exists.
    async fn create_repository(
        &self,
        credential: &Credential,
        name: &str,
        private: bool,
    ) -> Result<RepoInfo>;

    /// Lists branch names. Empty for a repository without commits.
    async fn list_branches(&self, credential: &Credential, repo: &RepoRef) -> Result<Vec<String>>;

    /// Resolves a branch to its head commit id, `None` if the branch does not exist.
    async fn branch_head(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>>;

    /// Returns the root tree id of a commit.
    async fn commit_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        commit_sha: &str,
    ) -> Result<String>;

    /// Lists a tree recursively.
    async fn tree_entries(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        tree_sha: &str,
    ) -> Result<Vec<RemoteTreeEntry>>;

    /// Stores file content and returns its blob id.
    async fn create_blob(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        content: &FileContent,
    ) -> Result<String>;

    /// Creates a tree from `base_tree` plus `items` and returns its id.
    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        base_tree: &str,
        items: &[TreeItem],
    ) -> Result<String>;

    /// Creates a commit and returns its id.
    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String>;

    /// Moves a branch to `commit_sha`. Never forced: the server rejects a
    /// commit that does not descend from the current head.
    async fn update_ref(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> Result<()>;
}
