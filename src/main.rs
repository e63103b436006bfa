mod cache;
mod checksum;
mod commands;
mod config;
mod edges;
mod error;
mod grammar;
mod lines;
mod logging;
mod parser;
mod patcher;
mod report;
mod root;
mod scanner;
mod types;
mod violations;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::debug;

use crate::commands::{ExitStatus, RunOutcome};
use crate::config::{Config, Options, OutputFormat, absolutize};
use crate::error::Error;

/// Command-line arguments. Anything given here wins over `.checksync.toml`.
#[derive(Parser, Debug)]
#[command(
    name = "checksync",
    version,
    about = "Keep tagged blocks of text in sync across files"
)]
struct Cli {
    /// Comma-separated comment prefixes that may introduce a sync tag
    #[arg(short, long, value_name = "LIST")]
    comments: Option<String>,

    /// Explicit config file
    #[arg(long, value_name = "PATH", conflicts_with = "no_config")]
    config: Option<PathBuf>,

    /// With --update-tags, report fixes without writing them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Exclude files matching this glob (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Comma-separated globs of ignore files to honor
    #[arg(long, value_name = "LIST", conflicts_with = "no_ignore_file")]
    ignore_files: Option<String>,

    /// Globs or paths of files to check (default: the working directory)
    #[arg(value_name = "INCLUDE_GLOBS")]
    include: Vec<String>,

    /// Print a JSON report of errors keyed by file
    #[arg(long, conflicts_with = "json_items")]
    json: bool,

    /// Print a JSON report of flattened violations and errors
    #[arg(long)]
    json_items: bool,

    /// Do not look for a .checksync.toml
    #[arg(long)]
    no_config: bool,

    /// Do not honor any ignore files
    #[arg(long)]
    no_ignore_file: bool,

    /// File whose presence marks a project root
    #[arg(short = 'm', long, value_name = "NAME")]
    root_marker: Option<String>,

    /// Rewrite mismatched checksums in place
    #[arg(short = 'u', long)]
    update_tags: bool,

    /// Verbose output and debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
                _ => ExitStatus::UnknownArgs,
            };
            if let Err(io) = e.print() {
                eprintln!("{e}\nerror: could not write usage: {io}");
            }
            return status.into();
        },
    };

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("warning: logging unavailable: {e}");
    }

    return match run(cli) {
        Ok(outcome) => {
            debug!(summary = ?outcome.summary, status = ?outcome.status, "run finished");
            outcome.status.into()
        },
        Err(e) => {
            eprintln!("error: {e}");
            ExitStatus::Catastrophic.into()
        },
    };
}

/// Merge config and command line into run options.
///
/// # Errors
///
/// Returns config loading errors.
fn build_options(cli: Cli, working_dir: &Path, launch_string: String) -> Result<Options, Error> {
    let file_config = if cli.no_config {
        Config {
            dir: working_dir.to_path_buf(),
            ..Config::default()
        }
    } else if let Some(path) = &cli.config {
        Config::load(&working_dir.join(path))?
    } else {
        Config::discover(working_dir)?
    };
    debug!(dir = %file_config.dir.display(), "configuration resolved");

    let mut options = Options::with_defaults(working_dir);
    options.auto_fix = cli.update_tags || file_config.auto_fix.unwrap_or(false);
    options.dry_run = cli.dry_run || file_config.dry_run.unwrap_or(false);
    options.launch_string = launch_string;
    options.verbose = cli.verbose;

    if let Some(comments) = cli.comments.as_deref().map(split_list).or(file_config.comments) {
        options.comments = comments;
    }
    if let Some(root_marker) = cli.root_marker.or(file_config.root_marker) {
        options.root_marker = root_marker;
    }

    options.include = if !cli.include.is_empty() {
        absolutize(working_dir, &cli.include)
    } else if !file_config.include.is_empty() {
        file_config.include
    } else {
        vec![working_dir.to_string_lossy().into_owned()]
    };
    options.exclude = if cli.exclude.is_empty() {
        file_config.exclude
    } else {
        absolutize(working_dir, &cli.exclude)
    };

    if cli.no_ignore_file {
        options.ignore_files = Vec::new();
    } else if let Some(list) = &cli.ignore_files {
        options.ignore_files = absolutize(working_dir, &split_list(list));
    } else if let Some(ignore_files) = file_config.ignore_files {
        options.ignore_files = ignore_files;
    }

    if cli.json_items {
        options.output = OutputFormat::JsonItems;
    } else if cli.json || file_config.json.unwrap_or(false) {
        options.output = OutputFormat::Json;
    }

    return Ok(options);
}

/// Resolve options from the environment and run the check.
///
/// # Errors
///
/// Returns any error that aborts the run.
fn run(cli: Cli) -> Result<RunOutcome, Error> {
    let working_dir = std::env::current_dir()?;
    let launch_string = std::env::args().collect::<Vec<_>>().join(" ");
    let options = build_options(cli, &working_dir, launch_string)?;
    return commands::check(&options);
}

/// Split a comma-separated flag value, dropping blanks.
fn split_list(list: &str) -> Vec<String> {
    return list
        .split(',')
        .map(str::trim)
        .filter(|item| return !item.is_empty())
        .map(String::from)
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(args: &[&str], dir: &Path) -> Options {
        let cli = Cli::try_parse_from(std::iter::once("checksync").chain(args.iter().copied())).unwrap();
        return build_options(cli, dir, "checksync".to_string()).unwrap();
    }

    #[test]
    fn defaults_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&["--no-config"], dir.path());
        assert_eq!(opts.comments, vec!["//", "#", "{/*"]);
        assert_eq!(opts.root_marker, "package.json");
        assert_eq!(opts.include, vec![dir.path().to_string_lossy().into_owned()]);
        assert_eq!(opts.ignore_files, vec![dir.path().join(".gitignore").to_string_lossy().into_owned()]);
        assert_eq!(opts.output, OutputFormat::Text);
        assert!(!opts.auto_fix);
    }

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".checksync.toml"),
            "include = [\"docs/**\"]\ncomments = [\"#\"]\nroot_marker = \".root\"\njson = true\n",
        )
        .unwrap();

        let from_config = options(&[], dir.path());
        assert_eq!(from_config.comments, vec!["#"]);
        assert_eq!(from_config.root_marker, ".root");
        assert_eq!(from_config.output, OutputFormat::Json);
        assert_eq!(from_config.include, vec![dir.path().join("docs/**").to_string_lossy().into_owned()]);

        let overridden = options(&["-c", "//, ;", "-m", "Cargo.toml", "--json-items", "-u", "src/*.rs"], dir.path());
        assert_eq!(overridden.comments, vec!["//", ";"]);
        assert_eq!(overridden.root_marker, "Cargo.toml");
        assert_eq!(overridden.output, OutputFormat::JsonItems);
        assert!(overridden.auto_fix);
        assert_eq!(overridden.include, vec![dir.path().join("src/*.rs").to_string_lossy().into_owned()]);
    }

    #[test]
    fn ignore_files_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        assert!(options(&["--no-config", "--no-ignore-file"], dir.path()).ignore_files.is_empty());
        let custom = options(&["--no-config", "--ignore-files", ".gitignore,.prettierignore"], dir.path());
        assert_eq!(custom.ignore_files.len(), 2);
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let parsed = Cli::try_parse_from(["checksync", "--json", "--json-items"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from(["checksync", "--bogus"]);
        assert_eq!(parsed.unwrap_err().kind(), ErrorKind::UnknownArgument);
    }
}
