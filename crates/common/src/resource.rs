//! Resource references embedded in the harness document

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// What a harness resource is loaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Stylesheet,
    Script,
}

impl ResourceKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            ResourceKind::Stylesheet => "text/css",
            ResourceKind::Script => "application/javascript",
        }
    }
}

/// Where a resource is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "href", rename_all = "snake_case")]
pub enum Location {
    /// Path relative to the working directory, `/`-separated, served by the
    /// ephemeral server
    Local(String),
    /// URL passed through to the browser untouched
    Remote(String),
}

/// A (location, kind) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub location: Location,
    pub kind: ResourceKind,
}

impl Resource {
    /// Build a resource from a caller-supplied entry.
    ///
    /// Entries starting with `http` are treated as URLs; everything else is
    /// a filesystem path rewritten relative to `cwd`.
    pub fn from_entry(entry: &str, cwd: &Path, kind: ResourceKind) -> Self {
        if is_remote(entry) {
            Self::remote(entry, kind)
        } else {
            Self::local(Path::new(entry), cwd, kind)
        }
    }

    pub fn local(path: &Path, cwd: &Path, kind: ResourceKind) -> Self {
        Self {
            location: Location::Local(to_url_path(&relative_to(path, cwd))),
            kind,
        }
    }

    pub fn remote(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            location: Location::Remote(url.into()),
            kind,
        }
    }

    /// The reference as written into the document
    pub fn href(&self) -> &str {
        match &self.location {
            Location::Local(path) => path,
            Location::Remote(url) => url,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.location, Location::Remote(_))
    }
}

/// URL-form entries are recognised by prefix only.
pub fn is_remote(entry: &str) -> bool {
    entry.starts_with("http")
}

/// Express `path` relative to `base`.
///
/// Relative inputs are first anchored at `base`, and both sides are
/// normalized lexically, so `relative_to("/w/a/../b.js", "/w")` is `b.js`.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(&base.join(path));
    let base = normalize(base);

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let shared = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[shared..] {
        relative.push(part.as_os_str());
    }
    relative
}

/// Render a path with forward slashes for embedding in a URL
pub fn to_url_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
