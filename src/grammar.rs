//! Sync-tag syntax: recognizing tags on a line and formatting sync-start lines.
//!
//! Recognition happens in two stages. A detect pattern built from the
//! configured comment prefixes decides whether a line is a tag at all; a
//! second, strict pattern decodes the tag's arguments. A line that passes the
//! first stage but fails the second is a malformed tag rather than content.
//!
//! ```text
//! <comment-start> sync-start:<id> [<checksum>] <target> [<comment-end>]
//! <comment-start> sync-end:<id>
//! ```

use regex::Regex;

use crate::error::Error;

/// Decodes the text after `sync-end:`.
const END_ARGS: &str = r"^\s*([\w-]+)(?:\s.*)?$";

/// Decodes the text after `sync-start:`.
const START_ARGS: &str = r"^\s*([\w-]+)\s+(?:(\d+)\s+)?(\S+)(?:\s+(.*?))?\s*$";

/// A decoded `sync-end` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTag<'a> {
    /// Marker id being closed.
    pub id: &'a str,
}

/// A decoded `sync-start` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag<'a> {
    /// Recorded checksum of the target block, if any.
    pub checksum: Option<&'a str>,
    /// Trailing comment closer, if any.
    pub comment_end: Option<&'a str>,
    /// The comment prefix the tag was written with.
    pub comment_start: &'a str,
    /// Marker id being opened.
    pub id: &'a str,
    /// Target path, relative to the project root.
    pub target: &'a str,
}

/// What a single line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLine<'a> {
    /// A well-formed `sync-end`.
    End(EndTag<'a>),
    /// `sync-end:` was present but its arguments did not decode.
    MalformedEnd(ArgsSpan),
    /// `sync-start:` was present but its arguments did not decode.
    MalformedStart(ArgsSpan),
    /// Ordinary content.
    NotATag,
    /// A well-formed `sync-start`.
    Start(StartTag<'a>),
}

/// One-based column span of a tag's argument text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgsSpan {
    /// Last column of the arguments.
    pub end_column: u32,
    /// First column of the arguments.
    pub start_column: u32,
}

/// Compiled tag patterns for one set of comment prefixes.
#[derive(Debug, Clone)]
pub struct TagSyntax {
    /// Strict decoder for end-tag arguments.
    end_args: Regex,
    /// Detects `<comment> sync-end:` and captures the arguments.
    end_tag: Regex,
    /// Strict decoder for start-tag arguments.
    start_args: Regex,
    /// Detects `<comment> sync-start:` and captures the comment and arguments.
    start_tag: Regex,
}

impl TagSyntax {
    /// Classify a line (without its terminator).
    pub fn classify<'a>(&self, line: &'a str) -> TagLine<'a> {
        if let Some(caps) = self.start_tag.captures(line) {
            let (Some(comment), Some(args)) = (caps.get(2), caps.get(3)) else {
                return TagLine::NotATag;
            };
            let Some(decoded) = self.start_args.captures(args.as_str()) else {
                return TagLine::MalformedStart(args_span(line, args.start()));
            };
            let (Some(id), Some(target)) = (decoded.get(1), decoded.get(3)) else {
                return TagLine::MalformedStart(args_span(line, args.start()));
            };
            return TagLine::Start(StartTag {
                checksum: decoded.get(2).map(|m| return m.as_str()),
                comment_end: decoded
                    .get(4)
                    .map(|m| return m.as_str())
                    .filter(|end| return !end.is_empty()),
                comment_start: comment.as_str(),
                id: id.as_str(),
                target: target.as_str(),
            });
        }

        if let Some(caps) = self.end_tag.captures(line) {
            let Some(args) = caps.get(3) else {
                return TagLine::NotATag;
            };
            let Some(id) = self.end_args.captures(args.as_str()).and_then(|d| return d.get(1))
            else {
                return TagLine::MalformedEnd(args_span(line, args.start()));
            };
            return TagLine::End(EndTag { id: id.as_str() });
        }

        return TagLine::NotATag;
    }

    /// Compile tag patterns for the given comment prefixes, tried in order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommentSyntax` if no prefixes are given, a prefix
    /// is blank, or the patterns fail to compile.
    pub fn new(comments: &[String]) -> Result<Self, Error> {
        if comments.is_empty() {
            return Err(Error::InvalidCommentSyntax {
                reason: "at least one comment prefix is required".to_string(),
            });
        }
        if comments.iter().any(|c| return c.trim().is_empty()) {
            return Err(Error::InvalidCommentSyntax {
                reason: "comment prefixes cannot be blank".to_string(),
            });
        }

        let alternation = comments
            .iter()
            .map(|c| return regex::escape(c.trim()))
            .collect::<Vec<_>>()
            .join("|");

        return Ok(Self {
            end_args: compile(END_ARGS)?,
            end_tag: compile(&format!(r"^(\s*)({alternation})\s*sync-end:(.*)$"))?,
            start_args: compile(START_ARGS)?,
            start_tag: compile(&format!(r"^(\s*)({alternation})\s*sync-start:(.*)$"))?,
        });
    }
}

/// Column span from a byte offset to the end of the line.
fn args_span(line: &str, args_start: usize) -> ArgsSpan {
    let before = line.get(..args_start).map_or(0, |s| return s.chars().count());
    let total = line.chars().count();
    let start_column = u32::try_from(before.saturating_add(1)).unwrap_or(u32::MAX);
    let end_column = u32::try_from(total).unwrap_or(u32::MAX).max(start_column);
    return ArgsSpan {
        end_column,
        start_column,
    };
}

/// Compile a pattern, mapping failures into the crate error.
///
/// # Errors
///
/// Returns `Error::InvalidCommentSyntax` if the pattern does not compile.
fn compile(pattern: &str) -> Result<Regex, Error> {
    return Regex::new(pattern).map_err(|e| {
        return Error::InvalidCommentSyntax {
            reason: e.to_string(),
        };
    });
}

/// Render a sync-start line.
///
/// `<indent><comment-start> sync-start:<id> <checksum> <target>[ <comment-end>]`
pub fn format_start_tag(
    indent: &str,
    comment_start: &str,
    id: &str,
    checksum: &str,
    target: &str,
    comment_end: Option<&str>,
) -> String {
    let mut line = format!("{indent}{comment_start} sync-start:{id} {checksum} {target}");
    if let Some(end) = comment_end {
        line.push(' ');
        line.push_str(end);
    }
    return line;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax() -> TagSyntax {
        let comments = ["//", "#", "{/*"].map(String::from);
        return TagSyntax::new(&comments).unwrap();
    }

    #[test]
    fn decodes_full_start_tag() {
        let line = "  {/* sync-start:intro 1234 docs/intro.md */}";
        let TagLine::Start(tag) = syntax().classify(line) else {
            panic!("expected start tag");
        };
        assert_eq!(tag.comment_start, "{/*");
        assert_eq!(tag.id, "intro");
        assert_eq!(tag.checksum, Some("1234"));
        assert_eq!(tag.target, "docs/intro.md");
        assert_eq!(tag.comment_end, Some("*/}"));
    }

    #[test]
    fn checksum_is_optional() {
        let TagLine::Start(tag) = syntax().classify("# sync-start:a-b_c other.py") else {
            panic!("expected start tag");
        };
        assert_eq!(tag.id, "a-b_c");
        assert_eq!(tag.checksum, None);
        assert_eq!(tag.target, "other.py");
        assert_eq!(tag.comment_end, None);
    }

    #[test]
    fn numeric_target_without_checksum() {
        let TagLine::Start(tag) = syntax().classify("// sync-start:n 42") else {
            panic!("expected start tag");
        };
        assert_eq!(tag.checksum, None);
        assert_eq!(tag.target, "42");
    }

    #[test]
    fn end_tag_with_comment_closer() {
        let line = "{/* sync-end:intro */}";
        assert_eq!(
            syntax().classify(line),
            TagLine::End(EndTag { id: "intro" })
        );
    }

    #[test]
    fn malformed_start_reports_argument_span() {
        let line = "// sync-start:only-an-id";
        let TagLine::MalformedStart(span) = syntax().classify(line) else {
            panic!("expected malformed start");
        };
        assert_eq!(span.start_column, 15);
        assert_eq!(span.end_column, 24);
    }

    #[test]
    fn malformed_end() {
        assert!(matches!(syntax().classify("// sync-end:"), TagLine::MalformedEnd(_)));
        assert!(matches!(syntax().classify("// sync-end: !!"), TagLine::MalformedEnd(_)));
    }

    #[test]
    fn text_before_comment_is_not_a_tag() {
        assert_eq!(syntax().classify("let x = 1; // sync-start:a 1 b.js"), TagLine::NotATag);
        assert_eq!(syntax().classify("plain content"), TagLine::NotATag);
        assert_eq!(syntax().classify("-- sync-start:a 1 b.js"), TagLine::NotATag);
    }

    #[test]
    fn rejects_empty_comment_list() {
        assert!(TagSyntax::new(&[]).is_err());
        assert!(TagSyntax::new(&[" ".to_string()]).is_err());
    }

    #[test]
    fn formats_start_tag() {
        assert_eq!(
            format_start_tag("    ", "//", "greet", "42", "src/b.js", None),
            "    // sync-start:greet 42 src/b.js"
        );
        assert_eq!(
            format_start_tag("", "{/*", "greet", "42", "b.jsx", Some("*/}")),
            "{/* sync-start:greet 42 b.jsx */}"
        );
    }

    #[test]
    fn formatted_tag_decodes_back() {
        let line = format_start_tag("\t", "#", "block", "99", "a/b.py", None);
        let TagLine::Start(tag) = syntax().classify(&line) else {
            panic!("expected start tag");
        };
        assert_eq!(tag.checksum, Some("99"));
        assert_eq!(tag.target, "a/b.py");
        assert!(line.starts_with("\t# sync-start:block"));
    }
}
