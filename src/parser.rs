//! Line-oriented marker parser.
//!
//! `MarkerParser` consumes one file's lines in order and emits `ParseEvent`s:
//! completed markers and classified errors. It never touches the filesystem;
//! target paths are resolved through a `PathNormalizer` supplied by the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::checksum::checksum;
use crate::grammar::{ArgsSpan, EndTag, StartTag, TagLine, TagSyntax};
use crate::types::{ErrorCode, ErrorDetails, Location, Target};

/// A marker whose sync-end was reached (or whose file ended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedMarker {
    /// Checksum of the accumulated content.
    pub checksum: String,
    /// Comment closer of the marker's sync-start tags.
    pub comment_end: Option<String>,
    /// Comment prefix of the marker's sync-start tags.
    pub comment_start: String,
    /// Marker id.
    pub id: String,
    /// Recorded targets keyed by sync-start line.
    pub targets: BTreeMap<u32, Target>,
}

/// A target path after resolution against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget {
    /// Whether the resolved path is an existing file.
    pub exists: bool,
    /// Absolute, lexically normalized path.
    pub file: PathBuf,
}

/// State for a marker between its sync-start and sync-end.
#[derive(Debug, Default)]
struct OpenMarker {
    /// Comment closer seen on the first sync-start.
    comment_end: Option<String>,
    /// Comment prefix seen on the first sync-start.
    comment_start: String,
    /// Content lines, each terminated by `\n`.
    content: Vec<String>,
    /// Line of the first sync-start.
    opened_at: u32,
    /// Whether any sync-start for this marker targeted its own file.
    self_targeted: bool,
    /// Recorded targets keyed by normalized path.
    targets: BTreeMap<PathBuf, OpenTarget>,
}

impl OpenMarker {
    /// Finish the marker, computing the checksum of its content.
    fn close(self, id: String) -> ClosedMarker {
        let targets = self
            .targets
            .into_iter()
            .map(|(file, t)| {
                return (
                    t.line,
                    Target {
                        checksum: t.checksum,
                        declaration: t.declaration,
                        file,
                    },
                );
            })
            .collect();
        return ClosedMarker {
            checksum: checksum(&self.content),
            comment_end: self.comment_end,
            comment_start: self.comment_start,
            id,
            targets,
        };
    }

    /// A marker that only ever pointed at its own file is dropped.
    fn is_only_self_targeted(&self) -> bool {
        return self.self_targeted && self.targets.is_empty();
    }
}

/// A target recorded on an open marker.
#[derive(Debug)]
struct OpenTarget {
    /// Checksum written in the declaration.
    checksum: Option<String>,
    /// Exact declaration line.
    declaration: String,
    /// Line of the declaration.
    line: u32,
}

/// Something the parser wants its caller to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A problem in the file's tags.
    ErrorRaised(ErrorDetails),
    /// A marker is complete.
    MarkerClosed(ClosedMarker),
}

/// Resolves the target path written in a sync-start tag.
pub trait PathNormalizer {
    /// Resolve `target`; `None` records no target for the tag.
    fn normalize(&self, target: &str) -> Option<NormalizedTarget>;
}

/// Per-file marker state machine.
pub struct MarkerParser<'a> {
    /// The file being parsed, as normalized by the caller.
    file: &'a Path,
    /// One-based number of the most recent line.
    line_number: u32,
    /// Target resolution.
    normalizer: &'a dyn PathNormalizer,
    /// Markers between their sync-start and sync-end, by id.
    open: BTreeMap<String, OpenMarker>,
    /// Compiled tag patterns.
    syntax: &'a TagSyntax,
}

impl<'a> MarkerParser<'a> {
    /// Close the marker for an end tag.
    fn end_tag(&mut self, tag: &EndTag<'_>) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        let line = self.line_number;

        let Some(marker) = self.open.remove(tag.id) else {
            events.push(ParseEvent::ErrorRaised(ErrorDetails::at_line(
                ErrorCode::EndTagWithoutStartTag,
                line,
                format!(
                    "Sync-end for '{}' found, but there was no corresponding sync-start",
                    tag.id
                ),
            )));
            return events;
        };

        if marker.content.is_empty() {
            events.push(ParseEvent::ErrorRaised(ErrorDetails::at_line(
                ErrorCode::EmptyMarker,
                line,
                format!("Sync-tag '{}' has no content", tag.id),
            )));
        }
        if !marker.is_only_self_targeted() {
            events.push(ParseEvent::MarkerClosed(marker.close(tag.id.to_string())));
        }
        return events;
    }

    /// Close every still-open marker at end of input, reporting each as unterminated.
    pub fn finish(self) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        for (id, marker) in self.open {
            let line = marker
                .targets
                .values()
                .map(|t| return t.line)
                .min()
                .unwrap_or(marker.opened_at);
            events.push(ParseEvent::ErrorRaised(ErrorDetails::at_line(
                ErrorCode::StartTagWithoutEndTag,
                line,
                format!("Sync-start '{id}' has no corresponding sync-end"),
            )));
            if !marker.is_only_self_targeted() {
                events.push(ParseEvent::MarkerClosed(marker.close(id)));
            }
        }
        return events;
    }

    /// Error for a tag whose keyword matched but whose arguments did not.
    fn malformed(&self, code: ErrorCode, span: ArgsSpan, reason: &str) -> Vec<ParseEvent> {
        return vec![ParseEvent::ErrorRaised(ErrorDetails {
            code,
            fix: None,
            location: Some(Location {
                end_column: Some(span.end_column),
                line: self.line_number,
                start_column: Some(span.start_column),
            }),
            reason: reason.to_string(),
        })];
    }

    /// Create a parser for `file`.
    pub fn new(file: &'a Path, syntax: &'a TagSyntax, normalizer: &'a dyn PathNormalizer) -> Self {
        return Self {
            file,
            line_number: 0,
            normalizer,
            open: BTreeMap::new(),
            syntax,
        };
    }

    /// Feed the next line, without its terminator.
    pub fn parse_line(&mut self, line: &str) -> Vec<ParseEvent> {
        self.line_number = self.line_number.saturating_add(1);

        return match self.syntax.classify(line) {
            TagLine::End(tag) => self.end_tag(&tag),
            TagLine::MalformedEnd(span) => self.malformed(
                ErrorCode::MalformedEndTag,
                span,
                "Malformed sync-end: format should be 'sync-end:<label>'",
            ),
            TagLine::MalformedStart(span) => self.malformed(
                ErrorCode::MalformedStartTag,
                span,
                "Malformed sync-start: format should be 'sync-start:<label> [checksum] <filename> <optional_comment_end>'",
            ),
            TagLine::NotATag => {
                for marker in self.open.values_mut() {
                    marker.content.push(format!("{line}\n"));
                }
                Vec::new()
            },
            TagLine::Start(tag) => self.start_tag(&tag, line),
        };
    }

    /// Open a marker, or add a target to one that is already open.
    fn start_tag(&mut self, tag: &StartTag<'_>, declaration: &str) -> Vec<ParseEvent> {
        let line = self.line_number;
        let normalized = self.normalizer.normalize(tag.target);
        let mut errors = Vec::new();

        let is_new = !self.open.contains_key(tag.id);
        let marker = self.open.entry(tag.id.to_string()).or_insert_with(|| {
            return OpenMarker {
                comment_end: tag.comment_end.map(str::to_string),
                comment_start: tag.comment_start.to_string(),
                opened_at: line,
                ..OpenMarker::default()
            };
        });

        if !is_new
            && (marker.comment_start != tag.comment_start
                || marker.comment_end.as_deref() != tag.comment_end)
        {
            errors.push(ErrorDetails::at_line(
                ErrorCode::DifferentCommentSyntax,
                line,
                format!(
                    "Sync-start tags for '{}' given in different comment styles. Please use the same style for all sync-start tags that have identical identifiers.",
                    tag.id
                ),
            ));
        }

        if let Some(target) = normalized {
            if target.file == self.file {
                marker.self_targeted = true;
                errors.push(ErrorDetails::at_line(
                    ErrorCode::SelfTargeting,
                    line,
                    format!("Sync-tag '{}' cannot target itself", tag.id),
                ));
            } else {
                if !target.exists {
                    errors.push(ErrorDetails::at_line(
                        ErrorCode::FileDoesNotExist,
                        line,
                        format!(
                            "Sync-start for '{}' points to '{}', which does not exist or is not a file",
                            tag.id, tag.target
                        ),
                    ));
                }
                if marker.targets.contains_key(&target.file) {
                    errors.push(ErrorDetails::at_line(
                        ErrorCode::DuplicateTarget,
                        line,
                        format!("Duplicate target '{}' for sync-tag '{}'", tag.target, tag.id),
                    ));
                }
                marker.targets.insert(
                    target.file,
                    OpenTarget {
                        checksum: tag.checksum.map(str::to_string),
                        declaration: declaration.to_string(),
                        line,
                    },
                );
            }
        }

        if !marker.content.is_empty() {
            errors.push(ErrorDetails::at_line(
                ErrorCode::StartTagAfterContent,
                line,
                format!("Sync-start for '{}' found after content started", tag.id),
            ));
        }

        return errors.into_iter().map(ParseEvent::ErrorRaised).collect();
    }
}
