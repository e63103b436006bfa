/// Core domain types: markers, targets, the marker cache, and reported errors.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Rendered in human-readable messages when a declaration carries no checksum.
pub const NO_CHECKSUM: &str = "No checksum";

/// One entry of the marker cache, keyed by the path it was reached by.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// The path is another name for a file already parsed under the owner path.
    Alias(PathBuf),
    /// The path was referenced as a target but does not exist.
    Missing,
    /// The file was parsed; this entry owns its data.
    Parsed(FileInfo),
}

/// Classification of everything checksync can report about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The file could not be opened or read.
    CouldNotParse,
    /// Sync-start tags for one marker use different comment styles.
    DifferentCommentSyntax,
    /// The same target was given twice for one marker.
    DuplicateTarget,
    /// A sync-end directly followed its sync-start.
    EmptyMarker,
    /// A sync-end without an open marker of the same id.
    EndTagWithoutStartTag,
    /// A declared target does not exist.
    FileDoesNotExist,
    /// The sync-end keyword matched but its arguments did not decode.
    MalformedEndTag,
    /// The sync-start keyword matched but its arguments did not decode.
    MalformedStartTag,
    /// A declaration's checksum no longer matches its target's content.
    MismatchedChecksum,
    /// The target has no marker of the same id pointing back.
    NoReturnTag,
    /// A marker names its own file as a target.
    SelfTargeting,
    /// A sync-start appeared after the block's content began.
    StartTagAfterContent,
    /// The file ended while a marker was still open.
    StartTagWithoutEndTag,
}

impl ErrorCode {
    /// How this code is weighed when deciding exit codes and auto-fix.
    pub const fn severity(self) -> Severity {
        return match self {
            Self::MismatchedChecksum => Severity::Mismatch,
            Self::DuplicateTarget | Self::EmptyMarker | Self::EndTagWithoutStartTag => {
                Severity::Warning
            },
            Self::CouldNotParse
            | Self::DifferentCommentSyntax
            | Self::FileDoesNotExist
            | Self::MalformedEndTag
            | Self::MalformedStartTag
            | Self::NoReturnTag
            | Self::SelfTargeting
            | Self::StartTagAfterContent
            | Self::StartTagWithoutEndTag => Severity::Error,
        };
    }
}

/// A single problem found in a file.
/// Absence of `fix` marks it unfixable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Classification of the problem.
    pub code: ErrorCode,
    /// The rewrite that resolves the problem, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixAction>,
    /// Where in the file the problem was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Human-readable explanation.
    pub reason: String,
}

impl ErrorDetails {
    /// An unfixable error at the given line.
    pub fn at_line(code: ErrorCode, line: u32, reason: String) -> Self {
        return Self {
            code,
            fix: None,
            location: Some(Location::line(line)),
            reason,
        };
    }

    /// Whether this error keeps auto-fix from running.
    pub const fn blocks_fixing(&self) -> bool {
        return self.fix.is_none() && matches!(self.code.severity(), Severity::Error);
    }
}

/// Per-file record in the marker cache.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// Every path this file is known by, its own path included.
    pub aliases: Vec<PathBuf>,
    /// Parse-time errors recorded for this file.
    pub errors: Vec<ErrorDetails>,
    /// Markers keyed by id.
    pub markers: BTreeMap<String, Marker>,
    /// True for files pulled in only as targets; they are never patched.
    pub read_only: bool,
}

impl FileInfo {
    /// Whether `path` is one of the names this file is known by.
    pub fn is_known_as(&self, path: &Path) -> bool {
        return self.aliases.iter().any(|alias| return alias == path);
    }
}

/// A line replacement or deletion that resolves an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FixAction {
    /// Drop the line entirely.
    #[allow(dead_code, reason = "the patcher honors deletions, but no current error produces one")]
    Delete {
        /// Exact original text of the line; the key used to find it.
        declaration: String,
        /// What the fix does, for reporting.
        description: String,
        /// One-based line the fix was computed for.
        line: u32,
    },
    /// Swap the line for new text.
    Replace {
        /// Exact original text of the line; the key used to find it.
        declaration: String,
        /// What the fix does, for reporting.
        description: String,
        /// One-based line the fix was computed for.
        line: u32,
        /// Replacement line, without a terminator.
        text: String,
    },
}

impl FixAction {
    /// The exact line text this fix applies to.
    pub fn declaration(&self) -> &str {
        return match self {
            Self::Delete { declaration, .. } | Self::Replace { declaration, .. } => declaration,
        };
    }

    /// Human-readable summary of the fix.
    pub fn description(&self) -> &str {
        return match self {
            Self::Delete { description, .. } | Self::Replace { description, .. } => description,
        };
    }

    /// The line the fix was computed for.
    pub const fn line(&self) -> u32 {
        return match self {
            Self::Delete { line, .. } | Self::Replace { line, .. } => *line,
        };
    }
}

/// Position of an error within a file. Columns are one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Last column of the offending span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    /// One-based line number.
    pub line: u32,
    /// First column of the offending span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
}

impl Location {
    /// A location covering a whole line.
    pub const fn line(line: u32) -> Self {
        return Self {
            end_column: None,
            line,
            start_column: None,
        };
    }
}

/// One sync-tagged block as seen from the file that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Checksum of the block's content in this file.
    pub checksum: String,
    /// Trailing comment closer on the sync-start tags, if any.
    pub comment_end: Option<String>,
    /// Comment prefix used on the sync-start tags.
    pub comment_start: String,
    /// True only when the owning file was explicitly requested.
    pub fixable: bool,
    /// Declared targets keyed by the one-based line of their sync-start tag.
    pub targets: BTreeMap<u32, Target>,
}

/// The relationship between one source declaration and its target's actual
/// state. Only produced for relationships that need attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEdge {
    /// Id shared by the source and target markers.
    pub marker_id: String,
    /// Checksum the source declaration records for the target.
    pub source_checksum: Option<String>,
    /// Comment closer of the source's sync-start tags.
    pub source_comment_end: Option<String>,
    /// Comment prefix of the source's sync-start tags.
    pub source_comment_start: String,
    /// Exact text of the source's sync-start line.
    pub source_declaration: String,
    /// Line of the source's sync-start tag.
    pub source_line: u32,
    /// The target marker's actual checksum; `None` when there is no return tag.
    pub target_checksum: Option<String>,
    /// The declared target file.
    pub target_file: PathBuf,
    /// Line of the return tag in the target; `None` when there is none.
    pub target_line: Option<u32>,
}

/// The cross-file view of every parsed file, built once per run.
#[derive(Debug, Clone, Default)]
pub struct MarkerCache {
    /// Parsed files keyed by canonical path; aliases and missing files keyed by
    /// the lexically normalized path they were reached by.
    pub entries: BTreeMap<PathBuf, CacheEntry>,
}

impl MarkerCache {
    /// The file info for `path`, following an alias to its owner.
    /// `None` for missing files and paths never seen.
    pub fn resolve(&self, path: &Path) -> Option<&FileInfo> {
        return match self.entries.get(path)? {
            CacheEntry::Alias(owner) => match self.entries.get(owner)? {
                CacheEntry::Parsed(info) => Some(info),
                CacheEntry::Alias(_) | CacheEntry::Missing => None,
            },
            CacheEntry::Missing => None,
            CacheEntry::Parsed(info) => Some(info),
        };
    }

    /// Paths of files that own their data and may be reported on.
    pub fn source_files(&self) -> impl Iterator<Item = &Path> {
        return self.entries.iter().filter_map(|(path, entry)| {
            return match entry {
                CacheEntry::Parsed(info) if !info.read_only => Some(path.as_path()),
                CacheEntry::Alias(_) | CacheEntry::Missing | CacheEntry::Parsed(_) => None,
            };
        });
    }
}

/// How an error affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Unfixable; blocks auto-fix and fails the run.
    Error,
    /// Fixable checksum mismatch.
    Mismatch,
    /// Reported but otherwise harmless.
    Warning,
}

/// A reference from one sync-start line to the corresponding block elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Checksum the declaration records for the target; `None` if not yet computed.
    pub checksum: Option<String>,
    /// Exact text of the sync-start line, without its line terminator.
    pub declaration: String,
    /// Normalized absolute path of the target file.
    pub file: PathBuf,
}
