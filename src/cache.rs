//! Builds the cross-file marker cache.
//!
//! Requested files are parsed first and may be fixed. Every existing file they
//! target is then parsed read-only, unless it turns out to be another name
//! for a file already cached, in which case it becomes an alias of that file.
//! Parsed data is always keyed by the canonical path; every other spelling of
//! the same file is an alias of it.
//! Targets of read-only files are only checked for existence and aliasing;
//! reference resolution goes one level deep.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Options;
use crate::error::Error;
use crate::grammar::TagSyntax;
use crate::lines;
use crate::parser::{MarkerParser, NormalizedTarget, ParseEvent, PathNormalizer};
use crate::root;
use crate::types::{CacheEntry, ErrorCode, ErrorDetails, FileInfo, Marker, MarkerCache};

/// Resolves tag targets against one file's project root.
struct ProjectNormalizer {
    /// Root directory target paths are relative to.
    root: PathBuf,
}

impl PathNormalizer for ProjectNormalizer {
    fn normalize(&self, target: &str) -> Option<NormalizedTarget> {
        let file = root::normalize(&self.root.join(target));
        return Some(NormalizedTarget {
            exists: file.is_file(),
            file,
        });
    }
}

/// Mutable state while the cache is assembled.
struct CacheBuilder<'a> {
    /// The cache under construction.
    cache: MarkerCache,
    /// Run options.
    options: &'a Options,
    /// Compiled tag patterns, shared by every file.
    syntax: TagSyntax,
}

impl CacheBuilder<'_> {
    /// Cache one file, parsing it or recording it as an alias.
    /// Target paths found in it are added to `references`.
    fn add_file(&mut self, path: &Path, fixable: bool, references: &mut BTreeSet<PathBuf>) {
        let canonical = match std::fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(e) if !fixable && e.kind() == std::io::ErrorKind::NotFound => {
                self.cache.entries.insert(path.to_path_buf(), CacheEntry::Missing);
                return;
            },
            Err(e) => {
                let info = unreadable(path, fixable, &e);
                self.cache.entries.insert(path.to_path_buf(), CacheEntry::Parsed(info));
                return;
            },
        };

        if self.alias_existing(path, &canonical) {
            return;
        }

        let mut info = self.parse_file(&canonical, fixable);
        info.aliases = vec![path.to_path_buf(), canonical.clone()];
        for target in info.markers.values().flat_map(|m| return m.targets.values()) {
            let queued = !fixable || target.file.is_file();
            if queued {
                references.insert(target.file.clone());
            } else {
                self.cache
                    .entries
                    .entry(target.file.clone())
                    .or_insert(CacheEntry::Missing);
            }
        }

        if path != canonical.as_path() {
            self.cache
                .entries
                .insert(path.to_path_buf(), CacheEntry::Alias(canonical.clone()));
        }
        self.cache.entries.insert(canonical, CacheEntry::Parsed(info));
        return;
    }

    /// Record `path` as an alias if its canonical form is already parsed.
    fn alias_existing(&mut self, path: &Path, canonical: &Path) -> bool {
        let Some(CacheEntry::Parsed(info)) = self.cache.entries.get_mut(canonical) else {
            return false;
        };
        info.aliases.push(path.to_path_buf());
        if path != canonical {
            debug!(alias = %path.display(), owner = %canonical.display(), "aliased cached file");
            self.cache
                .entries
                .insert(path.to_path_buf(), CacheEntry::Alias(canonical.to_path_buf()));
        }
        return true;
    }

    /// Sort and deduplicate alias lists, then hand over the cache.
    fn finish(mut self) -> MarkerCache {
        for entry in self.cache.entries.values_mut() {
            if let CacheEntry::Parsed(info) = entry {
                info.aliases.sort();
                info.aliases.dedup();
            }
        }
        return self.cache;
    }

    /// Check a third-level reference for existence and aliasing without parsing it.
    fn note_reference(&mut self, path: &Path) {
        match std::fs::canonicalize(path) {
            Ok(canonical) => {
                self.alias_existing(path, &canonical);
            },
            Err(_) => {
                self.cache.entries.insert(path.to_path_buf(), CacheEntry::Missing);
            },
        }
        return;
    }

    /// Run the marker parser over one file. Content that is not valid UTF-8
    /// is decoded lossily; only failing to open or read the file is an error.
    fn parse_file(&self, path: &Path, fixable: bool) -> FileInfo {
        debug!(file = %path.display(), fixable, "parsing");
        let root = root::root_or(path, &self.options.root_marker, &self.options.working_dir);
        let normalizer = ProjectNormalizer { root };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return unreadable(path, fixable, &e),
        };

        let mut info = FileInfo {
            read_only: !fixable,
            ..FileInfo::default()
        };
        let mut parser = MarkerParser::new(path, &self.syntax, &normalizer);
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            match lines::next_line(&mut reader, &mut buf) {
                Ok(true) => record_events(&mut info, parser.parse_line(&lines::text(&buf)), fixable),
                Ok(false) => break,
                Err(e) => return unreadable(path, fixable, &e),
            }
        }
        record_events(&mut info, parser.finish(), fixable);

        return info;
    }
}

/// Build the marker cache for `files` and everything they reference.
///
/// # Errors
///
/// Returns `Error::InvalidCommentSyntax` if the configured comment prefixes
/// cannot be compiled. Unreadable files are recorded as `could-not-parse`
/// errors on the file instead.
pub fn build(options: &Options, files: &[PathBuf]) -> Result<MarkerCache, Error> {
    let mut builder = CacheBuilder {
        cache: MarkerCache::default(),
        options,
        syntax: TagSyntax::new(&options.comments)?,
    };

    let requested: BTreeSet<PathBuf> = files.iter().map(|f| return root::normalize(f)).collect();
    let mut referenced = BTreeSet::new();
    for file in &requested {
        builder.add_file(file, true, &mut referenced);
    }

    let mut further = BTreeSet::new();
    for file in &referenced {
        if !builder.cache.entries.contains_key(file) {
            builder.add_file(file, false, &mut further);
        }
    }

    for file in &further {
        if !builder.cache.entries.contains_key(file) {
            builder.note_reference(file);
        }
    }

    return Ok(builder.finish());
}

/// Apply parser events to a file record.
fn record_events(info: &mut FileInfo, events: Vec<ParseEvent>, fixable: bool) {
    for event in events {
        match event {
            ParseEvent::ErrorRaised(error) => info.errors.push(error),
            ParseEvent::MarkerClosed(closed) => {
                info.markers.insert(
                    closed.id,
                    Marker {
                        checksum: closed.checksum,
                        comment_end: closed.comment_end,
                        comment_start: closed.comment_start,
                        fixable,
                        targets: closed.targets,
                    },
                );
            },
        }
    }
    return;
}

/// A file record carrying only a `could-not-parse` error.
fn unreadable(path: &Path, fixable: bool, error: &std::io::Error) -> FileInfo {
    debug!(file = %path.display(), %error, "could not read file");
    return FileInfo {
        aliases: vec![path.to_path_buf()],
        errors: vec![ErrorDetails {
            code: ErrorCode::CouldNotParse,
            fix: None,
            location: None,
            reason: format!("Could not parse {}: {error}", path.display()),
        }],
        markers: BTreeMap::new(),
        read_only: !fixable,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        return dir;
    }

    fn options(root: &Path) -> Options {
        return Options::with_defaults(root);
    }

    fn parsed<'c>(cache: &'c MarkerCache, path: &Path) -> &'c FileInfo {
        let Some(CacheEntry::Parsed(info)) = cache.entries.get(path) else {
            panic!("{} was not parsed", path.display());
        };
        return info;
    }

    #[test]
    fn referenced_files_are_parsed_read_only() {
        let dir = project();
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        std::fs::write(&a, "// sync-start:m 1 b.js\nx\n// sync-end:m\n").unwrap();
        std::fs::write(&b, "// sync-start:m 2 a.js\ny\n// sync-end:m\n").unwrap();

        let cache = build(&options(dir.path()), &[a.clone()]).unwrap();
        let a_info = parsed(&cache, &a);
        let b_info = parsed(&cache, &b);
        assert!(!a_info.read_only);
        assert!(b_info.read_only);
        assert!(a_info.markers["m"].fixable);
        assert!(!b_info.markers["m"].fixable);
        assert_eq!(b_info.markers["m"].targets[&1].file, a);
    }

    #[test]
    fn missing_targets_are_recorded_as_missing() {
        let dir = project();
        let a = dir.path().join("a.js");
        std::fs::write(&a, "// sync-start:m 1 gone.js\nx\n// sync-end:m\n").unwrap();

        let cache = build(&options(dir.path()), &[a.clone()]).unwrap();
        let gone = dir.path().join("gone.js");
        assert!(matches!(cache.entries.get(&gone), Some(CacheEntry::Missing)));
        assert!(cache.resolve(&gone).is_none());
        let codes: Vec<_> = parsed(&cache, &a).errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::FileDoesNotExist]);
    }

    #[test]
    fn targets_resolve_against_the_root_marker() {
        let dir = project();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        let a = docs.join("a.md");
        let b = dir.path().join("src/b.js");
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(&a, "# sync-start:m 1 src/b.js\nx\n# sync-end:m\n").unwrap();
        std::fs::write(&b, "// sync-start:m 2 docs/a.md\ny\n// sync-end:m\n").unwrap();

        let cache = build(&options(dir.path()), &[a.clone()]).unwrap();
        assert_eq!(parsed(&cache, &a).markers["m"].targets[&1].file, b);
        assert!(parsed(&cache, &b).read_only);
    }

    #[test]
    fn unreadable_file_records_could_not_parse() {
        let dir = project();
        let a = dir.path().join("folder.js");
        std::fs::create_dir_all(&a).unwrap();

        let cache = build(&options(dir.path()), &[a.clone()]).unwrap();
        let info = parsed(&cache, &a);
        assert_eq!(info.errors.len(), 1);
        assert_eq!(info.errors[0].code, ErrorCode::CouldNotParse);
        assert!(info.markers.is_empty());
    }

    #[test]
    fn binary_content_parses_without_errors() {
        let dir = project();
        let png = dir.path().join("logo.png");
        std::fs::write(&png, [0x89_u8, b'P', b'N', b'G', 0xff, 0xfe, b'\n']).unwrap();
        let latin1 = dir.path().join("notes.md");
        std::fs::write(&latin1, b"# sync-start:m 1 b.js\ncaf\xe9\n# sync-end:m\n").unwrap();

        let cache = build(&options(dir.path()), &[png.clone(), latin1.clone()]).unwrap();
        assert!(parsed(&cache, &png).errors.is_empty());
        let notes = parsed(&cache, &latin1);
        assert_eq!(notes.markers["m"].checksum, crate::checksum::checksum(&["caf\u{fffd}\n"]));
        assert!(notes.errors.iter().all(|e| e.code != ErrorCode::CouldNotParse));
    }

    #[test]
    fn input_order_does_not_change_the_cache() {
        let dir = project();
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        let c = dir.path().join("c.js");
        std::fs::write(&a, "// sync-start:m 1 b.js\n// sync-start:n c.js\nx\n// sync-end:m\n// sync-end:n\n").unwrap();
        std::fs::write(&b, "// sync-start:m 2 a.js\ny\n// sync-end:m\n").unwrap();
        std::fs::write(&c, "// sync-start:n 3 a.js\nz\n// sync-end:n\n").unwrap();

        let forward = build(&options(dir.path()), &[a.clone(), b.clone()]).unwrap();
        let backward = build(&options(dir.path()), &[b, a]).unwrap();
        assert_eq!(format!("{forward:?}"), format!("{backward:?}"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_target_becomes_an_alias() {
        let dir = project();
        let a = dir.path().join("a.js");
        let real = dir.path().join("real.js");
        let link = dir.path().join("link.js");
        std::fs::write(&a, "// sync-start:m 1 link.js\nx\n// sync-end:m\n").unwrap();
        std::fs::write(&real, "// sync-start:m 2 a.js\ny\n// sync-end:m\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let cache = build(&options(dir.path()), &[a.clone(), real.clone()]).unwrap();
        assert!(matches!(cache.entries.get(&link), Some(CacheEntry::Alias(owner)) if *owner == real));
        let real_info = parsed(&cache, &real);
        assert!(!real_info.read_only);
        assert!(real_info.is_known_as(&link));
        assert!(std::ptr::eq(cache.resolve(&link).unwrap(), real_info));
    }

    #[cfg(unix)]
    #[test]
    fn canonical_path_owns_data_even_when_a_link_sorts_first() {
        let dir = project();
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        let link = dir.path().join("0link.js");
        std::fs::write(&a, "// sync-start:m 1 b.js\nx\n// sync-end:m\n").unwrap();
        std::fs::write(&b, "// sync-start:m 2 a.js\ny\n// sync-end:m\n").unwrap();
        std::os::unix::fs::symlink(&b, &link).unwrap();

        let cache = build(&options(dir.path()), &[link.clone(), a.clone(), b.clone()]).unwrap();
        assert!(matches!(cache.entries.get(&link), Some(CacheEntry::Alias(owner)) if *owner == b));
        let b_info = parsed(&cache, &b);
        assert!(b_info.is_known_as(&link));
        assert!(!b_info.read_only);

        let sources: Vec<&Path> = cache.source_files().collect();
        assert_eq!(sources, vec![a.as_path(), b.as_path()]);
    }
}
