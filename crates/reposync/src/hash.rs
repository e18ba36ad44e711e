//! Content addressing compatible with git blob object ids.
//!
//! A blob id is `sha1("blob " + <byte length> + "\0" + <bytes>)` rendered as
//! lowercase hex. Computing it locally lets us compare a file against the
//! remote tree without uploading anything.

use sha1::{Digest, Sha1};

/// MIME type prefixes that are read as raw bytes.
const BINARY_MIME_PREFIXES: &[&str] = &["image/", "audio/", "video/"];

/// File name suffixes that are read as raw bytes regardless of MIME type.
const BINARY_SUFFIXES: &[&str] = &[".pdf", ".zip"];

/// Content of a local file, either decoded text or opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Builds content from raw bytes using the binary classification flag.
    ///
    /// Text is decoded as UTF-8; invalid sequences become U+FFFD, so the
    /// hash is computed over the decoded text, not the original bytes.
    pub fn from_bytes(bytes: Vec<u8>, is_binary: bool) -> Self {
        if is_binary {
            return FileContent::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => FileContent::Text(text),
            Err(err) => FileContent::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        }
    }

    /// Returns the bytes that make up the blob body.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, FileContent::Binary(_))
    }

    /// Size of the blob body in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes the git blob id of raw bytes.
pub fn blob_sha(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Computes the git blob id of file content.
pub fn content_sha(content: &FileContent) -> String {
    blob_sha(content.as_bytes())
}

/// Decides whether a file is read as bytes or as UTF-8 text.
///
/// Uses the MIME type reported by the host when there is one, otherwise
/// guesses it from the file name. The heuristic is known to misfile some
/// text formats (`.svg` guesses as `image/svg+xml`), but changing it would
/// change the hashes of content that has already been pushed.
pub fn is_binary(file_name: &str, mime_type: Option<&str>) -> bool {
    let mime = mime_type
        .filter(|m| !m.is_empty())
        .or_else(|| mime_guess::from_path(file_name).first_raw())
        .unwrap_or("");

    if BINARY_MIME_PREFIXES
        .iter()
        .any(|prefix| mime.starts_with(prefix))
    {
        return true;
    }

    BINARY_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}
