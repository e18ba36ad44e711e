//! Bearer credential passed explicitly to every remote call.
//!
//! The engine never reads or persists tokens on its own; the host hands a
//! [`Credential`] to each operation. [`Credential::resolve`] covers the
//! usual sources in priority order:
//!
//! 1. **Direct value** (e.g. typed into a settings form)
//! 2. **File reference** (Docker secrets, `~/.config/...`)
//! 3. **Env var reference** (CI, `GITHUB_TOKEN`)

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, SyncError};

/// An access token for the repository API.
#[derive(Clone)]
pub struct Credential {
    token: Arc<SecretString>,
}

impl Credential {
    /// Wraps a token. Surrounding whitespace is trimmed.
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(SyncError::Validation(
                "Please enter an access token.".to_string(),
            ));
        }
        Ok(Self {
            token: Arc::new(SecretString::from(token.to_string())),
        })
    }

    /// Resolves a token from the first configured source.
    pub fn resolve(
        direct: Option<&str>,
        file_path: Option<&str>,
        env_var: Option<&str>,
    ) -> Result<Self> {
        if let Some(value) = direct.filter(|v| !v.is_empty()) {
            return Self::new(value);
        }

        if let Some(path) = file_path.filter(|p| !p.is_empty()) {
            let expanded = expand_home(path);
            let content =
                std::fs::read_to_string(&expanded).map_err(|e| SyncError::ReadFile {
                    path: expanded.into(),
                    source: e,
                })?;
            return Self::new(content);
        }

        if let Some(var_name) = env_var.filter(|v| !v.is_empty()) {
            return match std::env::var(var_name) {
                Ok(value) => Self::new(value),
                Err(std::env::VarError::NotPresent) => Err(SyncError::Config(format!(
                    "Environment variable '{}' not set",
                    var_name
                ))),
                Err(std::env::VarError::NotUnicode(_)) => Err(SyncError::Config(format!(
                    "Environment variable '{}' contains invalid UTF-8",
                    var_name
                ))),
            };
        }

        Err(SyncError::Config(
            "No token source provided (need one of: direct value, file path, or env var name)"
                .to_string(),
        ))
    }

    /// Value for the `Authorization` header.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Exposes the raw token, e.g. for the host to persist it.
    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
