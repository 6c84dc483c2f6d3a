//! Platform-normal paths and URLs with recognized schemes.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// A path relative to a package root, such as a sibling-package path
/// dependency. Construction rejects absolute paths and lexically
/// normalizes `.`/`..` components, rejecting any path that escapes the
/// package root, so two equivalent relative paths (`./vendor/lib` and
/// `vendor/lib`) compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePath(PathBuf);

impl RelativePath {
    pub fn new(raw: impl AsRef<Path>) -> Result<Self> {
        let raw = raw.as_ref();
        use std::path::Component;
        let mut normalized = PathBuf::new();
        for component in raw.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidRecipe(format!(
                        "dependency path must be relative: {}",
                        raw.display()
                    )));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(Error::InvalidRecipe(format!(
                            "dependency path escapes its package root: {}",
                            raw.display()
                        )));
                    }
                }
                Component::Normal(part) => normalized.push(part),
            }
        }
        Ok(RelativePath(normalized))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl std::fmt::Display for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A repository URL restricted to schemes the resolver understands.
/// `Display` renders a normalized form (lowercase scheme and host, no
/// trailing slash) used to compare repository dependencies for
/// identity regardless of how each recipe happened to spell the url.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryUrl {
    raw: String,
    scheme: String,
    host: String,
    path: String,
}

const SUPPORTED_SCHEMES: &[&str] = &["git+https", "git+ssh", "https"];

impl RepositoryUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let scheme = raw
            .split_once("://")
            .map(|(scheme, _)| scheme.to_string())
            .ok_or_else(|| Error::InvalidRecipe(format!("not a url: {raw}")))?;
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(Error::Unsupported(format!(
                "unsupported repository url scheme: {scheme}"
            )));
        }
        // Validate general URL shape (host present) using the `url` crate,
        // stripping the `git+` prefix it doesn't recognize on its own.
        let parseable = raw.strip_prefix("git+").unwrap_or(raw);
        let parsed = url::Url::parse(parseable)
            .map_err(|e| Error::InvalidRecipe(format!("invalid repository url {raw}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidRecipe(format!("repository url has no host: {raw}")))?
            .to_lowercase();
        let mut path = parsed.path().to_string();
        if path.len() > 1 {
            path = path.trim_end_matches('/').to_string();
        }
        Ok(RepositoryUrl {
            raw: raw.to_string(),
            scheme,
            host,
            path,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for RepositoryUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)
    }
}
