//! Directory capability used by the local tree reader.
//!
//! Any host that can list a directory, descend into a child and read a file
//! can be scanned. [`FsDirectory`] covers the local filesystem and
//! [`MemoryDirectory`] provides an in-memory tree for tests and previews.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SyncError};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Access state of a directory handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// One child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// MIME type reported by the host, if it knows one.
    pub mime_type: Option<String>,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            mime_type: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            mime_type: None,
        }
    }
}

/// A recursively enumerable directory.
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    /// Name of this directory.
    fn name(&self) -> &str;

    /// Lists the direct children. Order is unspecified.
    async fn list(&self) -> Result<Vec<DirEntry>>;

    /// Opens a child directory.
    async fn descend(&self, name: &str) -> Result<Box<dyn DirectoryHandle>>;

    /// Reads a child file.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Reports the current read permission without prompting.
    async fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    /// Asks for read permission, prompting the user if the host can.
    async fn request_permission(&self) -> PermissionState {
        self.query_permission().await
    }
}

fn io_error(path: &Path, source: std::io::Error, reading_file: bool) -> SyncError {
    if source.kind() == ErrorKind::PermissionDenied {
        return SyncError::Permission(format!("cannot access '{}'", path.display()));
    }
    if reading_file {
        SyncError::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    } else {
        SyncError::ReadDirectory {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    name: String,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DirectoryHandle for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<DirEntry>> {
        let mut read_dir = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e, false))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_error(&self.path, e, false))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                log::warn!("Skipping non UTF-8 file name in {}", self.path.display());
                continue;
            };

            // Links are not followed, so a link back to an ancestor cannot loop.
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    log::debug!("Skipping unreadable entry {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if file_type.is_symlink() {
                log::debug!("Skipping symlink {}", entry.path().display());
                continue;
            }

            if file_type.is_dir() {
                entries.push(DirEntry::directory(name));
            } else if file_type.is_file() {
                entries.push(DirEntry::file(name));
            }
        }

        Ok(entries)
    }

    async fn descend(&self, name: &str) -> Result<Box<dyn DirectoryHandle>> {
        Ok(Box::new(FsDirectory::new(self.path.join(name))))
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(&path, e, true))
    }

    async fn query_permission(&self) -> PermissionState {
        match tokio::fs::read_dir(&self.path).await {
            Ok(_) => PermissionState::Granted,
            Err(_) => PermissionState::Denied,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    mime_type: Option<String>,
}

#[derive(Debug)]
struct MemoryTree {
    files: BTreeMap<String, MemoryFile>,
    permission: PermissionState,
    grant_on_request: bool,
}

/// An in-memory directory tree.
///
/// Clones and handles returned by [`DirectoryHandle::descend`] share the
/// same tree, so edits made through one handle are visible to a scan
/// running through another.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    /// Path of this directory inside the tree, empty for the root.
    prefix: String,
    tree: Arc<RwLock<MemoryTree>>,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            tree: Arc::new(RwLock::new(MemoryTree {
                files: BTreeMap::new(),
                permission: PermissionState::Granted,
                grant_on_request: true,
            })),
        }
    }

    /// Builder form of [`MemoryDirectory::write_file`].
    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.write_file(path, bytes);
        self
    }

    /// Creates or replaces a file at a slash-separated path below this handle.
    pub fn write_file(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.insert(path, bytes.into(), None);
    }

    /// Creates or replaces a file with a host-reported MIME type.
    pub fn write_file_with_mime(&self, path: &str, bytes: impl Into<Vec<u8>>, mime_type: &str) {
        self.insert(path, bytes.into(), Some(mime_type.to_string()));
    }

    /// Removes a file. Returns false if it did not exist.
    pub fn remove_file(&self, path: &str) -> bool {
        let key = self.key(path);
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.files.remove(&key).is_some()
    }

    /// Sets the permission reported by queries, and what a request yields.
    pub fn set_permission(&self, state: PermissionState, grant_on_request: bool) {
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.permission = state;
        tree.grant_on_request = grant_on_request;
    }

    fn insert(&self, path: &str, bytes: Vec<u8>, mime_type: Option<String>) {
        let key = self.key(path);
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        tree.files.insert(key, MemoryFile { bytes, mime_type });
    }

    fn key(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn child_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<DirEntry>> {
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        let child_prefix = self.child_prefix();

        let mut entries: Vec<DirEntry> = Vec::new();
        for (path, file) in tree.files.range(child_prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&child_prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if !entries
                        .iter()
                        .any(|e| e.kind == EntryKind::Directory && e.name == dir)
                    {
                        entries.push(DirEntry::directory(dir));
                    }
                }
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    kind: EntryKind::File,
                    mime_type: file.mime_type.clone(),
                }),
            }
        }

        Ok(entries)
    }

    async fn descend(&self, name: &str) -> Result<Box<dyn DirectoryHandle>> {
        Ok(Box::new(MemoryDirectory {
            name: name.to_string(),
            prefix: self.key(name),
            tree: Arc::clone(&self.tree),
        }))
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let key = self.key(name);
        let tree = self.tree.read().unwrap_or_else(|e| e.into_inner());
        tree.files
            .get(&key)
            .map(|file| file.bytes.clone())
            .ok_or_else(|| SyncError::ReadFile {
                path: PathBuf::from(&key),
                source: std::io::Error::from(ErrorKind::NotFound),
            })
    }

    async fn query_permission(&self) -> PermissionState {
        self.tree.read().unwrap_or_else(|e| e.into_inner()).permission
    }

    async fn request_permission(&self) -> PermissionState {
        let mut tree = self.tree.write().unwrap_or_else(|e| e.into_inner());
        if tree.permission != PermissionState::Granted && tree.grant_on_request {
            tree.permission = PermissionState::Granted;
        }
        tree.permission
    }
}
