//! Turns a file's cache record and broken edges into reportable errors.

use std::path::Path;

use crate::config::Options;
use crate::edges::generate_edges;
use crate::grammar::format_start_tag;
use crate::root;
use crate::types::{
    CacheEntry, ErrorCode, ErrorDetails, FixAction, Location, MarkerCache, MarkerEdge, NO_CHECKSUM,
};

/// Every error for `file`: its parse-time errors first, then one error per
/// broken edge. Read-only files, aliases, and unknown files yield nothing.
pub fn generate_errors<'a>(
    options: &'a Options,
    file: &'a Path,
    cache: &'a MarkerCache,
) -> impl Iterator<Item = ErrorDetails> + 'a {
    let parse_errors: &[ErrorDetails] = match cache.entries.get(file) {
        Some(CacheEntry::Parsed(info)) if !info.read_only => info.errors.as_slice(),
        Some(CacheEntry::Alias(_) | CacheEntry::Missing | CacheEntry::Parsed(_)) | None => &[],
    };
    let root = root::root_or(file, &options.root_marker, &options.working_dir);

    return parse_errors
        .iter()
        .cloned()
        .chain(generate_edges(file, cache).map(move |edge| return edge_error(&root, &edge)));
}

/// The error describing one broken edge.
fn edge_error(root: &Path, edge: &MarkerEdge) -> ErrorDetails {
    let relative = root::root_relative(root, &edge.target_file);
    let (Some(target_checksum), Some(target_line)) =
        (edge.target_checksum.as_deref(), edge.target_line)
    else {
        return ErrorDetails::at_line(
            ErrorCode::NoReturnTag,
            edge.source_line,
            format!("No return tag named '{}' in '{relative}'", edge.marker_id),
        );
    };

    let recorded = edge.source_checksum.as_deref().unwrap_or(NO_CHECKSUM);
    let indent = edge
        .source_declaration
        .split_once(edge.source_comment_start.as_str())
        .map_or("", |(indent, _)| return indent);
    let text = format_start_tag(
        indent,
        &edge.source_comment_start,
        &edge.marker_id,
        target_checksum,
        &relative,
        edge.source_comment_end.as_deref(),
    );

    return ErrorDetails {
        code: ErrorCode::MismatchedChecksum,
        fix: Some(FixAction::Replace {
            declaration: edge.source_declaration.clone(),
            description: format!(
                "Updated checksum for sync-tag '{}' referencing '{relative}:{target_line}' from {recorded} to {target_checksum}.",
                edge.marker_id
            ),
            line: edge.source_line,
            text,
        }),
        location: Some(Location::line(edge.source_line)),
        reason: format!(
            "Looks like you changed the target content for sync-tag '{}' in '{relative}:{target_line}'. Make sure you've made corresponding changes in the source file, if necessary ({recorded} != {target_checksum})",
            edge.marker_id
        ),
    };
}
