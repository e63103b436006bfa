//! Human-readable and JSON rendering of a run's results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Error;
use crate::root;
use crate::types::{ErrorCode, ErrorDetails, FixAction, Location, Severity};

/// Version stamped into JSON reports.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What happened to fixable mismatches this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixState {
    /// Fixes were written.
    Applied,
    /// Fixes were computed but not written.
    DryRun,
    /// Auto-fix was not asked for.
    NotRequested,
    /// Auto-fix was asked for but unfixable errors stopped it.
    Refused,
}

/// One flattened record of a `--json-items` report.
#[derive(Serialize)]
struct Item<'a> {
    /// See [`ErrorDetails::code`].
    code: ErrorCode,
    /// Path of the file the error belongs to.
    file: &'a str,
    /// See [`ErrorDetails::fix`].
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<&'a FixAction>,
    /// Whether this is a fixable violation or a plain error.
    #[serde(rename = "type")]
    kind: ItemKind,
    /// See [`ErrorDetails::location`].
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    /// See [`ErrorDetails::reason`].
    reason: &'a str,
}

/// Discriminates `--json-items` records.
#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum ItemKind {
    /// Anything without a fix.
    Error,
    /// A checksum mismatch that auto-fix can resolve.
    Violation,
}

/// `--json-items` document.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemsReport<'a> {
    /// Every error, file by file.
    items: Vec<Item<'a>>,
    /// The command line as launched.
    launch_string: &'a str,
    /// Version of checksync.
    version: &'a str,
}

/// `--json` document.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilesReport<'a> {
    /// Errors keyed by display path; files without errors are omitted.
    files: BTreeMap<&'a str, &'a [ErrorDetails]>,
    /// The command line as launched.
    launch_string: &'a str,
    /// Version of checksync.
    version: &'a str,
}

/// Where report text goes.
#[derive(Debug, Clone, Copy)]
pub struct OutputSink {
    /// Whether `verbose` lines are shown.
    verbose: bool,
}

impl OutputSink {
    /// Print an error line to stderr.
    pub fn error(self, message: &str) {
        eprintln!("{message}");
        return;
    }

    /// Print a normal report line to stdout.
    pub fn info(self, message: &str) {
        println!("{message}");
        return;
    }

    /// A sink that shows verbose lines only when asked to.
    pub const fn new(verbose: bool) -> Self {
        return Self { verbose };
    }

    /// Print a line to stdout only in verbose mode.
    pub fn verbose(self, message: &str) {
        if self.verbose {
            self.info(message);
        }
        return;
    }
}

/// The errors found for one file, ready to report.
#[derive(Debug, Clone)]
pub struct FileResult {
    /// Path shown to the user.
    pub display: String,
    /// Everything found in the file.
    pub errors: Vec<ErrorDetails>,
    /// Absolute path of the file.
    pub path: PathBuf,
}

impl FileResult {
    /// Pair a file with its errors, naming it relative to `working_dir`.
    pub fn new(working_dir: &Path, path: &Path, errors: Vec<ErrorDetails>) -> Self {
        return Self {
            display: root::root_relative(working_dir, path),
            errors,
            path: path.to_path_buf(),
        };
    }
}

/// Totals over a run, from which the exit code is derived.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Unfixable errors.
    pub errors: usize,
    /// Files checked.
    pub files: usize,
    /// Fixable checksum mismatches.
    pub violations: usize,
    /// Harmless problems.
    pub warnings: usize,
}

impl RunSummary {
    /// Count one error under its severity.
    pub fn record(&mut self, error: &ErrorDetails) {
        let counter = match error.code.severity() {
            Severity::Error => &mut self.errors,
            Severity::Mismatch => &mut self.violations,
            Severity::Warning => &mut self.warnings,
        };
        *counter = counter.saturating_add(1);
        return;
    }
}

/// `path:line` for an error, or just the path when it has no line.
fn location(display: &str, error: &ErrorDetails) -> String {
    return match error.location {
        Some(location) => format!("{display}:{}", location.line),
        None => display.to_string(),
    };
}

/// Render the `--json` report.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn json_files(launch_string: &str, results: &[FileResult]) -> Result<String, Error> {
    let files = results
        .iter()
        .filter(|result| return !result.errors.is_empty())
        .map(|result| return (result.display.as_str(), result.errors.as_slice()))
        .collect();
    let report = FilesReport {
        files,
        launch_string,
        version: VERSION,
    };
    return Ok(serde_json::to_string_pretty(&report)?);
}

/// Render the `--json-items` report.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn json_items(launch_string: &str, results: &[FileResult]) -> Result<String, Error> {
    let items = results
        .iter()
        .flat_map(|result| {
            return result.errors.iter().map(|error| {
                return Item {
                    code: error.code,
                    file: result.display.as_str(),
                    fix: error.fix.as_ref(),
                    kind: if error.fix.is_some() { ItemKind::Violation } else { ItemKind::Error },
                    location: error.location,
                    reason: error.reason.as_str(),
                };
            });
        })
        .collect();
    let report = ItemsReport {
        items,
        launch_string,
        version: VERSION,
    };
    return Ok(serde_json::to_string_pretty(&report)?);
}

/// Text line announcing a fix, written or pending.
pub fn fix_line(display: &str, fix: &FixAction, state: FixState) -> String {
    let label = match state {
        FixState::Applied => "FIXED  ",
        FixState::DryRun | FixState::NotRequested | FixState::Refused => "PENDING",
    };
    return format!("{label} {display}:{} Fix: {}", fix.line(), fix.description());
}

/// Text line for one error, or `None` if it will be announced as a fix.
pub fn error_line(display: &str, error: &ErrorDetails, state: FixState) -> Option<String> {
    let fixing = matches!(state, FixState::Applied | FixState::DryRun);
    let label = match error.code.severity() {
        Severity::Error => "ERROR  ",
        Severity::Mismatch if fixing && error.fix.is_some() => return None,
        Severity::Mismatch => "STALE  ",
        Severity::Warning => "WARN   ",
    };
    return Some(format!("{label} {}: {}", location(display, error), error.reason));
}

/// Closing lines of a text report.
pub fn summary_lines(summary: &RunSummary, state: FixState) -> Vec<String> {
    let RunSummary { errors, files, violations, warnings } = *summary;
    if errors == 0 && violations == 0 {
        if warnings > 0 {
            return vec![format!("All {files} files in sync ({warnings} warnings)")];
        }
        return vec![format!("All {files} files in sync")];
    }

    let mut lines = vec![String::new(), format!("{errors} errors, {violations} mismatched, {warnings} warnings")];
    match state {
        FixState::Applied if violations > 0 => lines.push(format!("Fixed {violations} mismatched checksums")),
        FixState::Applied => {},
        FixState::DryRun => lines.push(format!("{violations} fixes pending; dry run, nothing written")),
        FixState::NotRequested if violations > 0 => {
            lines.push("Run `checksync -u` to update mismatched checksums".to_string());
        },
        FixState::NotRequested => {},
        FixState::Refused => lines.push("Auto-fix refused: resolve the errors above first".to_string()),
    }
    return lines;
}
