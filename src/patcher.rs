//! Rewrites sync-start declarations in place.
//!
//! A patched file is streamed line by line into a temporary file in the same
//! directory, which then replaces the original. Lines that are not an exact
//! match for a broken declaration are copied byte for byte, each terminated
//! by a single `\n`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::Error;
use crate::lines;
use crate::types::{ErrorDetails, FixAction};

/// What a patch run did, or in dry-run mode would have done.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Fixes in file order. Identical declaration lines each appear once per line.
    pub applied: Vec<FixAction>,
    /// Size of the rewritten file.
    pub bytes_written: u64,
}

/// Apply fixes to `file`. `errors_by_declaration` maps exact line text to the
/// errors reported for that line; the first error carrying a fix is applied
/// to every line with that text.
///
/// With `dry_run` the file is read and the outcome computed, but nothing is
/// written. An empty map is a no-op.
///
/// # Errors
///
/// Returns `Error::PatchFailed` if the file cannot be read or the rewritten
/// copy cannot be written or moved into place. The original file is left
/// untouched in that case.
pub fn fix(
    file: &Path,
    errors_by_declaration: &HashMap<String, Vec<ErrorDetails>>,
    dry_run: bool,
) -> Result<PatchOutcome, Error> {
    if errors_by_declaration.is_empty() {
        return Ok(PatchOutcome::default());
    }
    let failed = |source: io::Error| {
        return Error::PatchFailed {
            file: file.to_path_buf(),
            source,
        };
    };

    // Symlinks are patched through, never replaced by a regular file.
    let target = std::fs::canonicalize(file).map_err(failed)?;
    let reader = BufReader::new(File::open(&target).map_err(failed)?);

    if dry_run {
        let outcome = rewrite(reader, io::sink(), errors_by_declaration).map_err(failed)?;
        debug!(file = %file.display(), bytes = outcome.bytes_written, "dry run, nothing written");
        return Ok(outcome);
    }

    let dir = target.parent().unwrap_or_else(|| return Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(failed)?;
    let outcome = rewrite(reader, BufWriter::new(temp.as_file_mut()), errors_by_declaration)
        .map_err(failed)?;

    let permissions = std::fs::metadata(&target).map_err(failed)?.permissions();
    temp.as_file().set_permissions(permissions).map_err(failed)?;
    temp.persist(&target).map_err(|e| return failed(e.error))?;

    debug!(file = %file.display(), bytes = outcome.bytes_written, "patched");
    return Ok(outcome);
}

/// Stream `reader` into `writer`, swapping or dropping matched lines.
///
/// Declarations are matched against the same lossy decoding the parser saw;
/// unmatched lines are written back as their original bytes.
fn rewrite<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    errors_by_declaration: &HashMap<String, Vec<ErrorDetails>>,
) -> io::Result<PatchOutcome> {
    let mut outcome = PatchOutcome::default();
    let mut line = Vec::new();

    while lines::next_line(&mut reader, &mut line)? {
        let fix = errors_by_declaration
            .get(lines::text(&line).as_ref())
            .and_then(|errors| return errors.iter().find_map(|e| return e.fix.as_ref()));

        let written = match fix {
            Some(FixAction::Delete { .. }) => None,
            Some(FixAction::Replace { text, .. }) => Some(text.as_bytes()),
            None => Some(line.as_slice()),
        };
        if let Some(bytes) = written {
            writer.write_all(bytes)?;
            writer.write_all(b"\n")?;
            let length = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            outcome.bytes_written = outcome.bytes_written.saturating_add(length).saturating_add(1);
        }
        if let Some(action) = fix {
            info!(line = action.line(), "{}", action.description());
            outcome.applied.push(action.clone());
        }
    }

    writer.flush()?;
    return Ok(outcome);
}
