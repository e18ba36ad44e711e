//! Reads a folder selection into hashed [`FileEntry`] values.

use std::path::PathBuf;

use tracing::{info_span, Instrument};

use super::exclude::{is_excluded_name, is_excluded_path, normalize_selected_path};
use super::handle::{DirectoryHandle, EntryKind, PermissionState};
use super::FileEntry;
use crate::error::{Result, SyncError};
use crate::hash::{is_binary, FileContent};
use crate::progress::ProgressReporter;

/// Where the bytes of a selected file live.
#[derive(Debug, Clone)]
pub enum FileData {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// One file from a flat folder-picker selection.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// Path as reported by the picker, including the selected folder's name.
    pub relative_path: String,
    pub mime_type: Option<String>,
    pub data: FileData,
}

impl SelectedFile {
    pub fn from_bytes(relative_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            mime_type: None,
            data: FileData::Bytes(bytes.into()),
        }
    }

    pub fn from_path(relative_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            mime_type: None,
            data: FileData::Path(path.into()),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    async fn read(&self) -> Result<Vec<u8>> {
        match &self.data {
            FileData::Bytes(bytes) => Ok(bytes.clone()),
            FileData::Path(path) => tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    SyncError::Permission(format!("cannot read '{}'", path.display()))
                } else {
                    SyncError::ReadFile {
                        path: path.clone(),
                        source: e,
                    }
                }
            }),
        }
    }
}

fn build_entry(path: String, bytes: Vec<u8>, mime_type: Option<&str>) -> FileEntry {
    let binary = is_binary(&path, mime_type);
    FileEntry::hashed(path, FileContent::from_bytes(bytes, binary))
}

/// Reads a flat folder-picker selection.
///
/// The picker's root folder segment is stripped from every path and the
/// exclusion policy is applied to the normalized path. Reports
/// `Reading <name>...` for each file considered.
pub async fn read_file_list(
    files: &[SelectedFile],
    progress: &dyn ProgressReporter,
) -> Result<Vec<FileEntry>> {
    if files.is_empty() {
        return Err(SyncError::Validation(
            "No files selected. Please select a project folder.".to_string(),
        ));
    }

    let span = info_span!("sync.read_file_list", files = files.len());
    read_selected(files, progress).instrument(span).await
}

async fn read_selected(
    files: &[SelectedFile],
    progress: &dyn ProgressReporter,
) -> Result<Vec<FileEntry>> {
    let selected: Vec<(String, &SelectedFile)> = files
        .iter()
        .filter_map(|file| {
            let Some(path) = normalize_selected_path(&file.relative_path) else {
                log::debug!("Skipping selection root entry '{}'", file.relative_path);
                return None;
            };
            (!is_excluded_path(&path)).then_some((path, file))
        })
        .collect();

    let total = selected.len();
    let mut entries = Vec::with_capacity(total);

    for (index, (path, file)) in selected.into_iter().enumerate() {
        let name = path.rsplit('/').next().unwrap_or(&path);
        progress.report(index + 1, total, &format!("Reading {}...", name));

        let bytes = file.read().await?;
        entries.push(build_entry(path, bytes, file.mime_type.as_deref()));
    }

    log::info!("Read {} of {} selected files", entries.len(), files.len());
    Ok(entries)
}

/// Makes sure the handle can be read, asking for access if needed.
async fn ensure_permission(root: &dyn DirectoryHandle) -> Result<()> {
    if root.query_permission().await == PermissionState::Granted {
        return Ok(());
    }
    if root.request_permission().await == PermissionState::Granted {
        return Ok(());
    }
    Err(SyncError::Permission(format!(
        "access to folder '{}' was denied; please select the folder again",
        root.name()
    )))
}

/// Lists one directory, collecting files and queueing subdirectories.
async fn read_level(
    dir: &dyn DirectoryHandle,
    prefix: &str,
    entries: &mut Vec<FileEntry>,
    pending: &mut Vec<(Box<dyn DirectoryHandle>, String)>,
) -> Result<()> {
    for child in dir.list().await? {
        // Exclusion is checked on the raw name before anything is read.
        if is_excluded_name(&child.name) {
            continue;
        }

        let path = if prefix.is_empty() {
            child.name.clone()
        } else {
            format!("{}/{}", prefix, child.name)
        };

        match child.kind {
            EntryKind::File => {
                let bytes = dir.read_file(&child.name).await?;
                entries.push(build_entry(path, bytes, child.mime_type.as_deref()));
            }
            EntryKind::Directory => {
                let handle = dir.descend(&child.name).await?;
                pending.push((handle, path));
            }
        }
    }
    Ok(())
}

/// Reads every non-excluded file below a directory handle, depth first.
///
/// Paths are relative to the handle, so the handle's own name never
/// appears. Fails with a permission error if access cannot be obtained.
pub async fn read_directory(root: &dyn DirectoryHandle) -> Result<Vec<FileEntry>> {
    ensure_permission(root).await?;

    let span = info_span!("sync.read_directory", root = root.name());
    walk(root).instrument(span).await
}

async fn walk(root: &dyn DirectoryHandle) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let mut pending = Vec::new();

    read_level(root, "", &mut entries, &mut pending).await?;
    while let Some((dir, prefix)) = pending.pop() {
        read_level(dir.as_ref(), &prefix, &mut entries, &mut pending).await?;
    }

    log::info!("Scanned {} files in '{}'", entries.len(), root.name());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::blob_sha;
    use crate::local::handle::MemoryDirectory;
    use crate::progress::NoProgress;

    fn paths(entries: &[FileEntry]) -> Vec<String> {
        let mut paths: Vec<String> = entries.iter().map(|e| e.path().to_string()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_file_list_excludes_and_normalizes() {
        let files = vec![
            SelectedFile::from_bytes("project/node_modules/x.js", "x"),
            SelectedFile::from_bytes("project/.git/HEAD", "ref: refs/heads/main"),
            SelectedFile::from_bytes("project/src/app.ts", "export {}"),
        ];

        let entries = read_file_list(&files, &NoProgress).await.unwrap();
        assert_eq!(paths(&entries), vec!["src/app.ts"]);
        assert_eq!(entries[0].content_hash(), Some(blob_sha(b"export {}").as_str()));
    }

    #[tokio::test]
    async fn test_file_list_skips_root_only_paths() {
        let files = vec![
            SelectedFile::from_bytes("project", "odd"),
            SelectedFile::from_bytes("project/a.txt", "a"),
        ];
        let entries = read_file_list(&files, &NoProgress).await.unwrap();
        assert_eq!(paths(&entries), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_file_list_empty_selection_is_rejected() {
        let err = read_file_list(&[], &NoProgress).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_file_list_uses_mime_type_for_binary() {
        let files = vec![
            SelectedFile::from_bytes("p/photo", vec![0xff, 0xd8]).with_mime_type("image/jpeg"),
            SelectedFile::from_bytes("p/notes.txt", "hi").with_mime_type("text/plain"),
        ];
        let entries = read_file_list(&files, &NoProgress).await.unwrap();
        let photo = entries.iter().find(|e| e.path() == "photo").unwrap();
        let notes = entries.iter().find(|e| e.path() == "notes.txt").unwrap();
        assert!(photo.is_binary());
        assert!(!notes.is_binary());
    }

    #[tokio::test]
    async fn test_file_list_reports_progress() {
        let seen = std::sync::Mutex::new(Vec::new());
        let reporter = |current: usize, total: usize, status: &str| {
            seen.lock().unwrap().push(format!("{}/{} {}", current, total, status));
        };
        let files = vec![
            SelectedFile::from_bytes("p/a.txt", "a"),
            SelectedFile::from_bytes("p/dist/b.js", "b"),
            SelectedFile::from_bytes("p/c/d.txt", "d"),
        ];
        read_file_list(&files, &reporter).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["1/2 Reading a.txt...", "2/2 Reading d.txt..."]
        );
    }

    #[tokio::test]
    async fn test_read_directory_excludes_and_recurses() {
        let root = MemoryDirectory::new("project")
            .with_file("node_modules/x.js", "x")
            .with_file(".git/HEAD", "ref")
            .with_file(".DS_Store", "junk")
            .with_file("src/app.ts", "export {}")
            .with_file("src/deep/er/still.txt", "deep")
            .with_file("build/out.js", "out")
            .with_file("README.md", "# readme");

        let entries = read_directory(&root).await.unwrap();
        assert_eq!(
            paths(&entries),
            vec!["README.md", "src/app.ts", "src/deep/er/still.txt"]
        );
    }

    #[tokio::test]
    async fn test_read_directory_requests_permission() {
        let root = MemoryDirectory::new("project").with_file("a.txt", "a");
        root.set_permission(PermissionState::Prompt, true);
        let entries = read_directory(&root).await.unwrap();
        assert_eq!(paths(&entries), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_read_directory_denied_permission_fails() {
        let root = MemoryDirectory::new("project").with_file("a.txt", "a");
        root.set_permission(PermissionState::Denied, false);
        let err = read_directory(&root).await.unwrap_err();
        assert!(matches!(err, SyncError::Permission(_)));
    }
}
