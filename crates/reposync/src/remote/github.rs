//! REST client for the GitHub repository and git database APIs.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::credential::Credential;
use super::types::{RemoteTreeEntry, RepoInfo, TreeItem};
use super::url::RepoRef;
use super::RemoteRepository;
use crate::config::SyncSettings;
use crate::error::{classify_status, Result, SyncError};
use crate::hash::FileContent;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
    description: &'a str,
}

#[derive(Serialize)]
struct CreateBlobRequest<'a> {
    content: &'a str,
    encoding: &'a str,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: &'a [TreeItem],
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [String],
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<RemoteTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct BranchResponse {
    name: String,
}

/// Client for a GitHub-compatible REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    repository_description: String,
}

impl GitHubClient {
    /// Creates a client with timeouts and endpoint taken from settings.
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            repository_description: settings.repository_description.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn repo_url(&self, repo: &RepoRef, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, repo.owner, repo.repo, path)
    }

    /// URL of a branch reference. Each branch segment is percent-encoded.
    fn branch_ref_url(&self, repo: &RepoRef, endpoint: &str, branch: &str) -> Result<Url> {
        let base = self.repo_url(repo, &format!("git/{}/heads", endpoint));
        let mut url = Url::parse(&base)
            .map_err(|e| SyncError::Config(format!("Invalid API URL '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Config(format!("Invalid API URL '{}'", base)))?
            .extend(branch.split('/'));
        Ok(url)
    }

    fn request(&self, method: Method, url: &str, credential: &Credential) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Sends a request and turns non-success statuses into errors.
    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::debug!("{} failed with status {}", context, status);
        Err(classify_status(status.as_u16(), &body, context))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = self.send(request, context).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Encodes content for the blob endpoint: base64 for binary, utf-8 for text.
pub(crate) fn blob_payload(content: &FileContent) -> (String, &'static str) {
    match content {
        FileContent::Text(text) => (text.clone(), "utf-8"),
        FileContent::Binary(bytes) => (
            base64::engine::general_purpose::STANDARD.encode(bytes),
            "base64",
        ),
    }
}

#[async_trait]
impl RemoteRepository for GitHubClient {
    async fn list_repositories(&self, credential: &Credential) -> Result<Vec<RepoInfo>> {
        let url = format!(
            "{}/user/repos?sort=updated&per_page=100&type=all",
            self.base_url
        );
        let request = self.request(Method::GET, &url, credential);
        self.send_json(request, "repository list").await
    }

    async fn create_repository(
        &self,
        credential: &Credential,
        name: &str,
        private: bool,
    ) -> Result<RepoInfo> {
        let url = format!("{}/user/repos", self.base_url);
        let request = self
            .request(Method::POST, &url, credential)
            .json(&CreateRepoRequest {
                name,
                private,
                // Creates a README so the default branch exists.
                auto_init: true,
                description: &self.repository_description,
            });
        let repo: RepoInfo = self.send_json(request, "repository creation").await?;
        log::info!("Created repository {}", repo.full_name);
        Ok(repo)
    }

    async fn list_branches(&self, credential: &Credential, repo: &RepoRef) -> Result<Vec<String>> {
        let url = self.repo_url(repo, "branches?per_page=100");
        let request = self.request(Method::GET, &url, credential);
        match self
            .send_json::<Vec<BranchResponse>>(request, &format!("repository '{}'", repo))
            .await
        {
            Ok(branches) => Ok(branches.into_iter().map(|b| b.name).collect()),
            // Empty repositories have no branches to list.
            Err(SyncError::NotFound(_)) | Err(SyncError::Api { status: 409, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn branch_head(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>> {
        let url = self.branch_ref_url(repo, "ref", branch)?;
        let request = self.request(Method::GET, url.as_str(), credential);
        let response = request.send().await?;

        let status = response.status();
        // 409 is returned for a repository without any commits.
        if status == StatusCode::NOT_FOUND || status == StatusCode::CONFLICT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status.as_u16(),
                &body,
                &format!("branch '{}'", branch),
            ));
        }

        let reference: RefResponse = response.json().await?;
        Ok(Some(reference.object.sha))
    }

    async fn commit_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        commit_sha: &str,
    ) -> Result<String> {
        let url = self.repo_url(repo, &format!("git/commits/{}", commit_sha));
        let request = self.request(Method::GET, &url, credential);
        let commit: CommitResponse = self
            .send_json(request, &format!("commit {}", commit_sha))
            .await?;
        Ok(commit.tree.sha)
    }

    async fn tree_entries(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        tree_sha: &str,
    ) -> Result<Vec<RemoteTreeEntry>> {
        let url = self.repo_url(repo, &format!("git/trees/{}?recursive=1", tree_sha));
        let request = self.request(Method::GET, &url, credential);
        let tree: TreeResponse = self
            .send_json(request, &format!("tree {}", tree_sha))
            .await?;
        if tree.truncated {
            log::warn!(
                "Remote tree {} of {} was truncated by the server; unseen files will be treated as new",
                tree_sha,
                repo
            );
        }
        Ok(tree.tree)
    }

    async fn create_blob(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        content: &FileContent,
    ) -> Result<String> {
        let url = self.repo_url(repo, "git/blobs");
        let (content, encoding) = blob_payload(content);
        let request = self
            .request(Method::POST, &url, credential)
            .json(&CreateBlobRequest {
                content: &content,
                encoding,
            });
        let blob: ShaResponse = self.send_json(request, "blob").await?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        base_tree: &str,
        items: &[TreeItem],
    ) -> Result<String> {
        let url = self.repo_url(repo, "git/trees");
        let request = self
            .request(Method::POST, &url, credential)
            .json(&CreateTreeRequest {
                base_tree,
                tree: items,
            });
        let tree: ShaResponse = self.send_json(request, "tree").await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String> {
        let url = self.repo_url(repo, "git/commits");
        let request = self
            .request(Method::POST, &url, credential)
            .json(&CreateCommitRequest {
                message,
                tree: tree_sha,
                parents,
            });
        let commit: ShaResponse = self.send_json(request, "commit").await?;
        Ok(commit.sha)
    }

    async fn update_ref(
        &self,
        credential: &Credential,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> Result<()> {
        let url = self.branch_ref_url(repo, "refs", branch)?;
        let request = self
            .request(Method::PATCH, url.as_str(), credential)
            .json(&UpdateRefRequest {
                sha: commit_sha,
                force: false,
            });
        self.send(request, &format!("branch '{}'", branch)).await?;
        Ok(())
    }
}
