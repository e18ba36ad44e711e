//! Local tree reading: turns a folder selection into hashed file entries.

pub mod exclude;
pub mod handle;
pub mod reader;

use std::borrow::Cow;

use crate::hash::{content_sha, FileContent};

pub use exclude::{is_excluded_name, is_excluded_path, normalize_selected_path};
pub use handle::{
    DirEntry, DirectoryHandle, EntryKind, FsDirectory, MemoryDirectory, PermissionState,
};
pub use reader::{read_directory, read_file_list, FileData, SelectedFile};

/// One unit of local content under sync.
///
/// Entries are rebuilt on every scan and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: String,
    content: FileContent,
    content_hash: Option<String>,
}

impl FileEntry {
    /// Creates an entry without computing its content hash.
    pub fn new(path: impl Into<String>, content: FileContent) -> Self {
        Self {
            path: path.into(),
            content,
            content_hash: None,
        }
    }

    /// Creates an entry and computes its content hash up front.
    pub fn hashed(path: impl Into<String>, content: FileContent) -> Self {
        Self::new(path, content).with_hash()
    }

    /// Shorthand for a UTF-8 text entry.
    pub fn text(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self::hashed(path, FileContent::Text(text.into()))
    }

    /// Shorthand for a binary entry.
    pub fn binary(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::hashed(path, FileContent::Binary(bytes.into()))
    }

    /// Returns the entry with its content hash filled in.
    pub fn with_hash(mut self) -> Self {
        if self.content_hash.is_none() {
            self.content_hash = Some(content_sha(&self.content));
        }
        self
    }

    /// Normalized forward-slash path relative to the selected root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub fn is_binary(&self) -> bool {
        self.content.is_binary()
    }

    /// The precomputed content hash, if any.
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    /// The content hash, computing it when it was not precomputed.
    pub fn hash(&self) -> Cow<'_, str> {
        match &self.content_hash {
            Some(sha) => Cow::Borrowed(sha),
            None => Cow::Owned(content_sha(&self.content)),
        }
    }

    /// Last path segment, for log lines.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
