//! The check run: list files, build the cache, report, and optionally fix.

use std::collections::HashMap;
use std::process::ExitCode;

use tracing::{debug, info};

use crate::cache;
use crate::config::{Options, OutputFormat};
use crate::error::Error;
use crate::patcher;
use crate::report::{self, FileResult, FixState, OutputSink, RunSummary};
use crate::scanner;
use crate::types::ErrorDetails;
use crate::violations::generate_errors;

/// How a run ended, as seen by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Nothing could continue: bad config, I/O failure, or a failed patch.
    Catastrophic,
    /// Fixable mismatches remain.
    Desynchronized,
    /// No file matched the include globs.
    NoFiles,
    /// Unfixable errors were found.
    ParseErrors,
    /// Everything is in sync.
    Success,
    /// The command line could not be parsed.
    UnknownArgs,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub const fn code(self) -> u8 {
        return match self {
            Self::Success => 0,
            Self::NoFiles => 1,
            Self::ParseErrors => 2,
            Self::Desynchronized => 3,
            Self::UnknownArgs => 4,
            Self::Catastrophic => 5,
        };
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        return Self::from(status.code());
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// What to exit with.
    pub status: ExitStatus,
    /// Totals over every checked file.
    pub summary: RunSummary,
}

/// Check every file the options select, report, and fix when asked to.
///
/// Auto-fix is all or nothing: a single unfixable error anywhere leaves every
/// file untouched.
///
/// # Errors
///
/// Returns scanner and config errors, `Error::InvalidCommentSyntax` from the
/// cache, `Error::Json` from reporting, and `Error::PatchFailed` if a file
/// could not be rewritten.
pub fn check(options: &Options) -> Result<RunOutcome, Error> {
    let sink = OutputSink::new(options.verbose);
    let files = scanner::list_files(
        &options.working_dir,
        &options.include,
        &options.exclude,
        &options.ignore_files,
    )?;
    if files.is_empty() {
        sink.error("No matching files");
        return Ok(RunOutcome {
            status: ExitStatus::NoFiles,
            summary: RunSummary::default(),
        });
    }
    sink.verbose(&format!("Checking {} files", files.len()));

    let cache = cache::build(options, &files)?;
    let mut summary = RunSummary {
        files: files.len(),
        ..RunSummary::default()
    };
    let results: Vec<FileResult> = cache
        .source_files()
        .map(|file| {
            let errors: Vec<ErrorDetails> = generate_errors(options, file, &cache).collect();
            for error in &errors {
                summary.record(error);
            }
            return FileResult::new(&options.working_dir, file, errors);
        })
        .collect();

    let state = fix_state(options, &results);
    debug!(?summary, ?state, "checked");
    let text = matches!(options.output, OutputFormat::Text);

    for result in &results {
        if text {
            for line in result.errors.iter().filter_map(|e| return report::error_line(&result.display, e, state)) {
                sink.info(&line);
            }
        }
        if matches!(state, FixState::Applied | FixState::DryRun) {
            apply_fixes(result, state, text.then_some(sink))?;
        }
    }

    match options.output {
        OutputFormat::Json => sink.info(&report::json_files(&options.launch_string, &results)?),
        OutputFormat::JsonItems => sink.info(&report::json_items(&options.launch_string, &results)?),
        OutputFormat::Text => {
            for line in report::summary_lines(&summary, state) {
                sink.info(&line);
            }
        },
    }

    return Ok(RunOutcome {
        status: exit_status(&summary, state),
        summary,
    });
}

/// Patch one file's fixable errors, announcing each fix on `sink`.
///
/// # Errors
///
/// Returns `Error::PatchFailed` if the file could not be rewritten.
fn apply_fixes(result: &FileResult, state: FixState, sink: Option<OutputSink>) -> Result<(), Error> {
    let mut by_declaration: HashMap<String, Vec<ErrorDetails>> = HashMap::new();
    for error in &result.errors {
        if let Some(fix) = &error.fix {
            by_declaration
                .entry(fix.declaration().to_string())
                .or_default()
                .push(error.clone());
        }
    }
    if by_declaration.is_empty() {
        return Ok(());
    }

    let dry_run = matches!(state, FixState::DryRun);
    let outcome = patcher::fix(&result.path, &by_declaration, dry_run)?;
    info!(file = %result.display, fixes = outcome.applied.len(), dry_run, "patched file");
    if let Some(sink) = sink {
        for fix in &outcome.applied {
            sink.info(&report::fix_line(&result.display, fix, state));
        }
    }
    return Ok(());
}

/// Derive the exit status from a run's totals.
const fn exit_status(summary: &RunSummary, state: FixState) -> ExitStatus {
    if summary.errors > 0 {
        return ExitStatus::ParseErrors;
    }
    if summary.violations > 0 && !matches!(state, FixState::Applied) {
        return ExitStatus::Desynchronized;
    }
    return ExitStatus::Success;
}

/// Decide whether this run may fix, given everything it found.
fn fix_state(options: &Options, results: &[FileResult]) -> FixState {
    if !options.auto_fix {
        return FixState::NotRequested;
    }
    let blocked = results
        .iter()
        .flat_map(|result| return result.errors.iter())
        .any(ErrorDetails::blocks_fixing);
    if blocked {
        return FixState::Refused;
    }
    if options.dry_run {
        return FixState::DryRun;
    }
    return FixState::Applied;
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::checksum::checksum;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        return dir;
    }

    fn options(root: &Path, globs: &[&str]) -> Options {
        let mut options = Options::with_defaults(root);
        options.include = globs.iter().map(|g| return root.join(g).to_string_lossy().into_owned()).collect();
        options.output = OutputFormat::Json;
        return options;
    }

    /// `a.js` records `a_checksum` for `b.js`; `b.js` is correct about `a.js`.
    fn write_pair(root: &Path, a_checksum: &str) {
        std::fs::write(
            root.join("a.js"),
            format!("// sync-start:greet {a_checksum} b.js\nhello\n// sync-end:greet\n"),
        )
        .unwrap();
        std::fs::write(
            root.join("b.js"),
            format!("// sync-start:greet {} a.js\nhowdy\n// sync-end:greet\n", checksum(&["hello\n"])),
        )
        .unwrap();
    }

    #[test]
    fn exit_codes_are_stable() {
        let codes: Vec<u8> = [
            ExitStatus::Success,
            ExitStatus::NoFiles,
            ExitStatus::ParseErrors,
            ExitStatus::Desynchronized,
            ExitStatus::UnknownArgs,
            ExitStatus::Catastrophic,
        ]
        .iter()
        .map(|s| s.code())
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn no_files_matched() {
        let dir = project();
        let outcome = check(&options(dir.path(), &["*.nothing"])).unwrap();
        assert_eq!(outcome.status, ExitStatus::NoFiles);
    }

    #[test]
    fn mismatch_without_fix_is_desynchronized() {
        let dir = project();
        write_pair(dir.path(), "111");
        let outcome = check(&options(dir.path(), &["*.js"])).unwrap();
        assert_eq!(outcome.status, ExitStatus::Desynchronized);
        assert_eq!(outcome.summary.violations, 1);
        assert_eq!(outcome.summary.files, 2);
    }

    #[test]
    fn auto_fix_converges() {
        let dir = project();
        write_pair(dir.path(), "111");
        let mut opts = options(dir.path(), &["*.js"]);
        opts.auto_fix = true;

        assert_eq!(check(&opts).unwrap().status, ExitStatus::Success);
        let fixed = std::fs::read_to_string(dir.path().join("a.js")).unwrap();
        assert_eq!(
            fixed,
            format!("// sync-start:greet {} b.js\nhello\n// sync-end:greet\n", checksum(&["howdy\n"]))
        );

        opts.auto_fix = false;
        let second = check(&opts).unwrap();
        assert_eq!(second.status, ExitStatus::Success);
        assert_eq!(second.summary, RunSummary { files: 2, ..RunSummary::default() });
    }

    #[test]
    fn dry_run_leaves_files_and_reports_desynchronized() {
        let dir = project();
        write_pair(dir.path(), "111");
        let before = std::fs::read_to_string(dir.path().join("a.js")).unwrap();
        let mut opts = options(dir.path(), &["*.js"]);
        opts.auto_fix = true;
        opts.dry_run = true;

        assert_eq!(check(&opts).unwrap().status, ExitStatus::Desynchronized);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.js")).unwrap(), before);
    }

    #[test]
    fn unfixable_error_refuses_every_fix() {
        let dir = project();
        write_pair(dir.path(), "111");
        std::fs::write(dir.path().join("c.js"), "// sync-start:lonely 1 gone.js\nx\n// sync-end:lonely\n").unwrap();
        let before = std::fs::read_to_string(dir.path().join("a.js")).unwrap();
        let mut opts = options(dir.path(), &["*.js"]);
        opts.auto_fix = true;

        let outcome = check(&opts).unwrap();
        assert_eq!(outcome.status, ExitStatus::ParseErrors);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.js")).unwrap(), before);
    }

    #[test]
    fn binary_files_in_a_walked_directory_do_not_block_fixing() {
        let dir = project();
        write_pair(dir.path(), "111");
        std::fs::write(dir.path().join("logo.png"), [0x89_u8, b'P', b'N', b'G', 0xff, 0xfe, b'\n']).unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects/ab")).unwrap();
        std::fs::write(dir.path().join(".git/objects/ab/cdef"), [0x78_u8, 0x9c, 0xff, 0x00]).unwrap();
        let mut opts = options(dir.path(), &[]);
        opts.include = vec![dir.path().to_string_lossy().into_owned()];
        opts.auto_fix = true;

        let outcome = check(&opts).unwrap();
        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.summary.errors, 0);
        assert_eq!(outcome.summary.files, 4);
        let fixed = std::fs::read_to_string(dir.path().join("a.js")).unwrap();
        assert!(fixed.starts_with(&format!("// sync-start:greet {} b.js\n", checksum(&["howdy\n"]))));
    }

    #[test]
    fn warnings_do_not_fail_the_run() {
        let dir = project();
        std::fs::write(dir.path().join("a.js"), "// sync-end:stray\n").unwrap();
        let outcome = check(&options(dir.path(), &["*.js"])).unwrap();
        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.summary.warnings, 1);
    }
}
