//! Builders for remote fixtures and local folder selections.

#![allow(dead_code)]

use reposync::local::SelectedFile;
use reposync::remote::MemoryRemote;
use reposync::MemoryDirectory;

/// Builder for a [`MemoryRemote`] holding one repository.
pub struct RemoteBuilder {
    owner: String,
    name: String,
    default_branch: String,
    files: Vec<(String, String)>,
    token: Option<String>,
}

impl RemoteBuilder {
    pub fn new() -> Self {
        Self {
            owner: "octo".to_string(),
            name: "studio".to_string(),
            default_branch: "main".to_string(),
            files: Vec::new(),
            token: None,
        }
    }

    pub fn repository(mut self, owner: &str, name: &str) -> Self {
        self.owner = owner.to_string();
        self.name = name.to_string();
        self
    }

    pub fn default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    /// Adds a file to the initial commit.
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    /// Only accept this token.
    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn build(self) -> MemoryRemote {
        let files: Vec<(&str, &str)> = self
            .files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let remote = MemoryRemote::new().with_repository(
            &self.owner,
            &self.name,
            &self.default_branch,
            &files,
        );
        match self.token {
            Some(token) => remote.require_token(&token),
            None => remote,
        }
    }
}

impl Default for RemoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a local folder, usable as a directory handle or a picker listing.
pub struct FolderBuilder {
    name: String,
    files: Vec<(String, Vec<u8>)>,
}

impl FolderBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            files: Vec::new(),
        }
    }

    /// Adds a file at a path relative to the folder.
    pub fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.to_string(), content.into()));
        self
    }

    pub fn directory(&self) -> MemoryDirectory {
        let root = MemoryDirectory::new(self.name.clone());
        for (path, content) in &self.files {
            root.write_file(path, content.clone());
        }
        root
    }

    /// Picker-style listing: every path is prefixed with the folder name.
    pub fn selected_files(&self) -> Vec<SelectedFile> {
        self.files
            .iter()
            .map(|(path, content)| {
                SelectedFile::from_bytes(format!("{}/{}", self.name, path), content.clone())
            })
            .collect()
    }
}
