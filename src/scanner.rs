//! Expands include globs and paths into the list of files to check.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::Error;
use crate::root;

/// Characters that make a path component a glob pattern.
const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// Version-control metadata directories, never descended into.
const VCS_DIRS: [&str; 3] = [".git", ".hg", ".svn"];

/// Compiled exclude globs and ignore files.
struct Filters {
    /// Exclude globs, matched against absolute paths.
    exclude: GlobSet,
    /// One matcher per ignore file, rooted at that file's directory.
    ignores: Vec<Gitignore>,
}

impl Filters {
    /// Whether `path` is excluded or ignored.
    fn rejects(&self, path: &Path, is_dir: bool) -> bool {
        if !is_dir && self.exclude.is_match(path) {
            return true;
        }
        return self.ignores.iter().any(|gitignore| {
            return path.starts_with(gitignore.path())
                && gitignore.matched_path_or_any_parents(path, is_dir).is_ignore();
        });
    }
}

/// Build a glob matcher where `*` never crosses a path separator.
fn compile_glob(pattern: &str) -> Result<GlobMatcher, Error> {
    return GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| return glob.compile_matcher())
        .map_err(|e| {
            return Error::InvalidGlob {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            };
        });
}

/// Build one set from several exclude globs.
fn compile_set(patterns: &[String]) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern).literal_separator(true).build().map_err(|e| {
            return Error::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            };
        })?;
        builder.add(glob);
    }
    return builder.build().map_err(|e| {
        return Error::InvalidGlob {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        };
    });
}

/// Every file matching one glob, walking only beneath its literal prefix.
fn expand_glob(pattern: &str, filters: Option<&Filters>) -> Result<Vec<PathBuf>, Error> {
    let matcher = compile_glob(pattern)?;
    let start = literal_prefix(pattern);
    if !start.exists() {
        debug!(pattern, "glob prefix does not exist");
        return Ok(Vec::new());
    }
    return Ok(walk(&start, filters)
        .into_iter()
        .filter(|path| return matcher.is_match(path))
        .collect());
}

/// Files named by the ignore-file globs, each parsed into a matcher.
fn load_ignore_files(ignore_files: &[String]) -> Result<Vec<Gitignore>, Error> {
    let mut paths = BTreeSet::new();
    for pattern in ignore_files {
        paths.extend(expand_glob(pattern, None)?);
    }

    let mut ignores = Vec::new();
    for path in paths {
        let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let mut builder = GitignoreBuilder::new(&dir);
        if let Some(e) = builder.add(&path) {
            return Err(Error::InvalidIgnoreFile {
                path,
                reason: e.to_string(),
            });
        }
        let gitignore = builder.build().map_err(|e| {
            return Error::InvalidIgnoreFile {
                path: path.clone(),
                reason: e.to_string(),
            };
        })?;
        debug!(file = %path.display(), rules = gitignore.num_ignores(), "loaded ignore file");
        ignores.push(gitignore);
    }
    return Ok(ignores);
}

/// The leading components of a glob that contain no pattern characters.
fn literal_prefix(pattern: &str) -> PathBuf {
    return Path::new(pattern)
        .components()
        .take_while(|c| return !c.as_os_str().to_string_lossy().contains(GLOB_META))
        .collect();
}

/// Expand include globs and paths into a sorted, deduplicated list of
/// absolute files, minus anything excluded or ignored.
///
/// Relative entries resolve against `base`. A directory includes every file
/// beneath it.
///
/// # Errors
///
/// Returns `Error::InvalidGlob` for a glob that does not compile and
/// `Error::InvalidIgnoreFile` for an ignore file that cannot be parsed.
pub fn list_files(
    base: &Path,
    include: &[String],
    exclude: &[String],
    ignore_files: &[String],
) -> Result<Vec<PathBuf>, Error> {
    let filters = Filters {
        exclude: compile_set(exclude)?,
        ignores: load_ignore_files(ignore_files)?,
    };

    let mut files = BTreeSet::new();
    for entry in include {
        let path = root::normalize(&base.join(entry));
        if path.is_file() {
            if !filters.rejects(&path, false) {
                files.insert(path);
            }
        } else if path.is_dir() {
            files.extend(walk(&path, Some(&filters)));
        } else {
            let pattern = path.to_string_lossy();
            files.extend(expand_glob(&pattern, Some(&filters))?);
        }
    }

    debug!(count = files.len(), "listed files");
    return Ok(files.into_iter().collect());
}

/// Whether `entry` is a version-control directory below the walk's start.
fn is_vcs_dir(entry: &DirEntry) -> bool {
    return entry.depth() > 0
        && entry.file_type().is_dir()
        && VCS_DIRS.iter().any(|name| return entry.file_name() == *name);
}

/// Every file beneath `start`, skipping rejected entries, version-control
/// directories, and their contents. Entries that cannot be read are logged
/// and skipped.
fn walk(start: &Path, filters: Option<&Filters>) -> Vec<PathBuf> {
    return WalkDir::new(start)
        .into_iter()
        .filter_entry(|entry| {
            return !is_vcs_dir(entry)
                && filters.is_none_or(|f| return !f.rejects(entry.path(), entry.file_type().is_dir()));
        })
        .filter_map(|entry| {
            return match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable path");
                    None
                },
            };
        })
        .map(|entry| return root::normalize(entry.path()))
        .filter(|path| return path.is_file())
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "x\n").unwrap();
        return path;
    }

    fn glob(root: &Path, pattern: &str) -> String {
        return root.join(pattern).to_string_lossy().into_owned();
    }

    #[test]
    fn star_does_not_cross_directories() {
        let dir = tempfile::tempdir().unwrap();
        let top = touch(dir.path(), "a.js");
        touch(dir.path(), "sub/b.js");

        let files = list_files(dir.path(), &[glob(dir.path(), "*.js")], &[], &[]).unwrap();
        assert_eq!(files, vec![top]);
    }

    #[test]
    fn double_star_recurses_and_output_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let b = touch(dir.path(), "sub/b.js");
        let a = touch(dir.path(), "a.js");
        touch(dir.path(), "c.md");

        let files = list_files(dir.path(), &[glob(dir.path(), "**/*.js")], &[], &[]).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn excludes_remove_matches() {
        let dir = tempfile::tempdir().unwrap();
        let keep = touch(dir.path(), "src/keep.js");
        touch(dir.path(), "src/vendor/skip.js");

        let files = list_files(
            dir.path(),
            &[glob(dir.path(), "src/**/*.js")],
            &[glob(dir.path(), "**/vendor/**")],
            &[],
        )
        .unwrap();
        assert_eq!(files, vec![keep]);
    }

    #[test]
    fn gitignore_rules_apply_beneath_their_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "build/\n*.gen.js\n").unwrap();
        let kept = touch(dir.path(), "src/a.js");
        touch(dir.path(), "src/a.gen.js");
        touch(dir.path(), "build/out.js");

        let files = list_files(
            dir.path(),
            &[dir.path().to_string_lossy().into_owned()],
            &[],
            &[glob(dir.path(), ".gitignore")],
        )
        .unwrap();
        assert_eq!(files, vec![dir.path().join(".gitignore"), kept]);
    }

    #[test]
    fn literal_files_and_relative_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "docs/a.md");

        let files = list_files(dir.path(), &["docs/a.md".to_string(), "docs/./a.md".to_string()], &[], &[]).unwrap();
        assert_eq!(files, vec![a]);
    }

    #[test]
    fn unmatched_glob_is_empty_and_bad_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(dir.path(), &[glob(dir.path(), "nope/**/*.js")], &[], &[]).unwrap().is_empty());
        assert!(matches!(
            list_files(dir.path(), &[glob(dir.path(), "src/[.js")], &[], &[]),
            Err(Error::InvalidGlob { .. })
        ));
    }

    #[test]
    fn literal_prefix_stops_at_first_pattern() {
        assert_eq!(literal_prefix("/a/b/**/*.js"), PathBuf::from("/a/b"));
        assert_eq!(literal_prefix("/a/{x,y}/c"), PathBuf::from("/a"));
        assert_eq!(literal_prefix("/a/b.js"), PathBuf::from("/a/b.js"));
    }

    #[test]
    fn version_control_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let kept = touch(dir.path(), "a.js");
        touch(dir.path(), ".git/objects/ab/cdef");
        touch(dir.path(), ".git/HEAD");
        touch(dir.path(), "sub/.hg/store");

        let files = list_files(dir.path(), &[dir.path().to_string_lossy().into_owned()], &[], &[]).unwrap();
        assert_eq!(files, vec![kept]);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlinks_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let kept = touch(dir.path(), "a.js");
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let files = list_files(dir.path(), &[dir.path().to_string_lossy().into_owned()], &[], &[]).unwrap();
        assert_eq!(files, vec![kept]);
    }
}
