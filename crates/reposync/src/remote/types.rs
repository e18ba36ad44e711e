//! Data types exchanged with the repository API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::url::RepoRef;

/// File mode for regular, non-executable files.
pub const REGULAR_FILE_MODE: &str = "100644";

/// Snapshot of one branch: blob path to blob id.
///
/// Only blobs are present; directories never appear as keys.
pub type RemoteTreeMap = HashMap<String, String>;

/// Owner of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

/// Permissions the authenticated identity has on a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// Remote repository identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: RepoOwner,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_branch_name")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<RepoPermissions>,
}

fn default_branch_name() -> String {
    "main".to_string()
}

impl RepoInfo {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.owner.login.clone(), self.name.clone())
    }

    /// Whether the identity may push. Unknown permissions are assumed allowed
    /// and left for the server to reject.
    pub fn can_push(&self) -> bool {
        self.permissions.map(|p| p.push || p.admin).unwrap_or(true)
    }
}

/// Kind of object referenced from a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a recursively listed remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub sha: String,
}

/// An entry added to a new tree on top of a base tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub sha: String,
}

impl TreeItem {
    /// A regular-file blob entry.
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: REGULAR_FILE_MODE.to_string(),
            kind: ObjectKind::Blob,
            sha: sha.into(),
        }
    }
}

/// Builds a [`RemoteTreeMap`] from a recursive listing, keeping blobs only.
pub fn blob_map(entries: &[RemoteTreeEntry]) -> RemoteTreeMap {
    entries
        .iter()
        .filter(|entry| entry.kind == ObjectKind::Blob)
        .map(|entry| (entry.path.clone(), entry.sha.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_info_deserializes_api_payload() {
        let json = r#"{
            "id": 42,
            "name": "studio",
            "full_name": "octo/studio",
            "owner": {"login": "octo", "id": 1},
            "private": true,
            "default_branch": "trunk",
            "permissions": {"admin": false, "push": true, "pull": true},
            "description": null
        }"#;
        let repo: RepoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(repo.repo_ref(), RepoRef::new("octo", "studio"));
        assert_eq!(repo.default_branch, "trunk");
        assert!(repo.private);
        assert!(repo.can_push());
    }

    #[test]
    fn test_repo_info_without_permissions() {
        let json = r#"{"id": 1, "name": "r", "full_name": "o/r", "owner": {"login": "o"}}"#;
        let repo: RepoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(repo.default_branch, "main");
        assert!(repo.permissions.is_none());
        assert!(repo.can_push());
    }

    #[test]
    fn test_read_only_repo_cannot_push() {
        let mut repo: RepoInfo = serde_json::from_str(
            r#"{"id": 1, "name": "r", "full_name": "o/r", "owner": {"login": "o"}}"#,
        )
        .unwrap();
        repo.permissions = Some(RepoPermissions {
            admin: false,
            push: false,
            pull: true,
        });
        assert!(!repo.can_push());
    }

    #[test]
    fn test_blob_map_filters_directories() {
        let entries = vec![
            RemoteTreeEntry {
                path: "src".into(),
                mode: "040000".into(),
                kind: ObjectKind::Tree,
                sha: "t1".into(),
            },
            RemoteTreeEntry {
                path: "src/main.rs".into(),
                mode: REGULAR_FILE_MODE.into(),
                kind: ObjectKind::Blob,
                sha: "b1".into(),
            },
            RemoteTreeEntry {
                path: "vendor/lib".into(),
                mode: "160000".into(),
                kind: ObjectKind::Commit,
                sha: "c1".into(),
            },
        ];
        let map = blob_map(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("src/main.rs").map(String::as_str), Some("b1"));
    }

    #[test]
    fn test_tree_item_serializes_type_field() {
        let item = TreeItem::blob("a.txt", "abc");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "a.txt", "mode": "100644", "type": "blob", "sha": "abc"})
        );
    }
}
