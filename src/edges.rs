//! Walks one source file's markers against the cache to find broken links.

use std::path::Path;

use crate::types::{CacheEntry, FileInfo, Marker, MarkerCache, MarkerEdge, Target};

/// Compare one declared target against the target file's current state.
/// `None` when the declaration is already correct.
fn edge_for_target(
    cache: &MarkerCache,
    source: &FileInfo,
    id: &str,
    marker: &Marker,
    line: u32,
    target: &Target,
) -> Option<MarkerEdge> {
    let target_marker = cache.resolve(&target.file).and_then(|info| return info.markers.get(id));
    let return_tag = target_marker.and_then(|tm| {
        return tm
            .targets
            .iter()
            .find(|(_, back)| return source.is_known_as(&back.file))
            .map(|(back_line, _)| return (*back_line, tm.checksum.as_str()));
    });

    if let Some((_, actual)) = return_tag
        && target.checksum.as_deref() == Some(actual)
    {
        return None;
    }

    return Some(MarkerEdge {
        marker_id: id.to_string(),
        source_checksum: target.checksum.clone(),
        source_comment_end: marker.comment_end.clone(),
        source_comment_start: marker.comment_start.clone(),
        source_declaration: target.declaration.clone(),
        source_line: line,
        target_checksum: return_tag.map(|(_, checksum)| return checksum.to_string()),
        target_file: target.file.clone(),
        target_line: return_tag.map(|(back_line, _)| return back_line),
    });
}

/// Yield an edge for every declaration in `file` that is out of date or has
/// no return tag. Read-only files, aliases, and files not in the cache yield
/// nothing.
pub fn generate_edges<'a>(
    file: &'a Path,
    cache: &'a MarkerCache,
) -> impl Iterator<Item = MarkerEdge> + 'a {
    let source = match cache.entries.get(file) {
        Some(CacheEntry::Parsed(info)) if !info.read_only => Some(info),
        Some(CacheEntry::Alias(_) | CacheEntry::Missing | CacheEntry::Parsed(_)) | None => None,
    };

    return source.into_iter().flat_map(move |info| {
        return info
            .markers
            .iter()
            .filter(|(_, marker)| return marker.fixable)
            .flat_map(move |(id, marker)| {
                return marker.targets.iter().filter_map(move |(line, target)| {
                    return edge_for_target(cache, info, id, marker, *line, target);
                });
            });
    });
}
