//! Project roots and path normalization.
//!
//! Target paths in sync-start tags are written relative to a project root:
//! the nearest ancestor directory holding a root-marker entry.

use std::path::{Component, Path, PathBuf};

/// Find the nearest ancestor of `file` (starting at its parent) that contains
/// an entry named `marker`.
pub fn find_root(file: &Path, marker: &str) -> Option<PathBuf> {
    return file
        .ancestors()
        .skip(1)
        .find(|dir| return dir.join(marker).exists())
        .map(Path::to_path_buf);
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
///
/// `..` never climbs above the root of an absolute path. In a relative path it
/// is kept once there is no named component left to drop.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                },
                Some(Component::Prefix(_) | Component::RootDir) => {},
                Some(Component::CurDir | Component::ParentDir) | None => normalized.push(".."),
            },
            Component::Normal(_) | Component::Prefix(_) | Component::RootDir => normalized.push(component),
        }
    }
    return normalized;
}

/// Display `path` relative to `root` with `/` separators.
/// Paths outside the root are displayed as given.
pub fn root_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.is_absolute() {
        return relative.to_string_lossy().into_owned();
    }
    return relative
        .components()
        .map(|c| return c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
}

/// The project root for `file`, falling back to `fallback` when no marker
/// exists above it.
pub fn root_or(file: &Path, marker: &str, fallback: &Path) -> PathBuf {
    return find_root(file, marker).unwrap_or_else(|| return fallback.to_path_buf());
}
