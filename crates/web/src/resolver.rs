//! Resource resolution against ordered server roots

use std::path::{Component, Path, PathBuf};

use specrun_common::ServerRoots;
use tracing::debug;

/// A file found under one of the roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Path the content was read from
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub mime: String,
}

/// Find `relative` under the first root that holds it.
///
/// Roots are tried in order and later roots are never consulted once one
/// matches. Returns `None` when no root holds a readable file, including
/// for paths that try to climb out of a root.
pub async fn resolve(roots: &ServerRoots, relative: &str) -> Option<Resolved> {
    let relative = Path::new(relative);
    if !is_contained(relative) {
        debug!("Refusing to resolve {}", relative.display());
        return None;
    }

    for root in roots.iter() {
        let candidate = root.join(relative);
        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => {}
            _ => continue,
        }
        match tokio::fs::read(&candidate).await {
            Ok(content) => {
                let mime = content_type(&candidate);
                debug!("Resolved {} -> {}", relative.display(), candidate.display());
                return Some(Resolved {
                    path: candidate,
                    content,
                    mime,
                });
            }
            Err(e) => {
                debug!("Skipping unreadable {}: {}", candidate.display(), e);
            }
        }
    }

    None
}

/// MIME type from the file extension
pub fn content_type(path: &Path) -> String {
    // Pinned: newer mime tables report text/javascript
    if matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("js") | Some("mjs")
    ) {
        return "application/javascript".to_string();
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Only plain descending relative paths may be served
fn is_contained(path: &Path) -> bool {
    let mut has_name = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    has_name
}
