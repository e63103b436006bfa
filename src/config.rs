use std::path::{Path, PathBuf};

use crate::error::Error;

/// Name of the config file looked up in the working directory and its ancestors.
pub const CONFIG_FILE_NAME: &str = ".checksync.toml";

/// Comment prefixes recognized when none are configured.
pub const DEFAULT_COMMENTS: [&str; 3] = ["//", "#", "{/*"];

/// Ignore files honored when none are configured.
pub const DEFAULT_IGNORE_FILE: &str = ".gitignore";

/// Root marker used when none is configured.
pub const DEFAULT_ROOT_MARKER: &str = "package.json";

/// Project configuration loaded from `.checksync.toml`.
/// Every key is optional; command-line flags take precedence.
#[derive(Debug, Default)]
pub struct Config {
    /// Whether mismatched checksums are rewritten.
    pub auto_fix: Option<bool>,
    /// Comment prefixes that may introduce a sync tag.
    pub comments: Option<Vec<String>>,
    /// Directory holding the config file; relative globs resolve against it.
    pub dir: PathBuf,
    /// Report fixes without writing them.
    pub dry_run: Option<bool>,
    /// Globs of files never scanned, made absolute.
    pub exclude: Vec<String>,
    /// Globs of ignore files, made absolute.
    pub ignore_files: Option<Vec<String>>,
    /// Globs of files to scan, made absolute.
    pub include: Vec<String>,
    /// Emit a JSON report instead of text.
    pub json: Option<bool>,
    /// Name of the file marking a project root.
    pub root_marker: Option<String>,
}

/// Raw TOML structure for `.checksync.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ChecksyncTomlConfig {
    /// See [`Config::auto_fix`].
    auto_fix: Option<bool>,
    /// See [`Config::comments`].
    comments: Option<Vec<String>>,
    /// See [`Config::dry_run`].
    dry_run: Option<bool>,
    /// See [`Config::exclude`].
    #[serde(default)]
    exclude: Vec<String>,
    /// See [`Config::ignore_files`].
    ignore_files: Option<Vec<String>>,
    /// See [`Config::include`].
    #[serde(default)]
    include: Vec<String>,
    /// See [`Config::json`].
    json: Option<bool>,
    /// See [`Config::root_marker`].
    root_marker: Option<String>,
}

impl Config {
    /// Find `.checksync.toml` in `start` or the nearest ancestor holding one.
    /// Returns an empty config if there is none.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Config::load`] for a config file that exists.
    pub fn discover(start: &Path) -> Result<Self, Error> {
        let found = start
            .ancestors()
            .map(|dir| return dir.join(CONFIG_FILE_NAME))
            .find(|candidate| return candidate.is_file());

        return match found {
            Some(path) => Self::load(&path),
            None => Ok(Self {
                dir: start.to_path_buf(),
                ..Self::default()
            }),
        };
    }

    /// Load a specific config file.
    /// Returns an error if the file exists but is malformed; never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if the file does not exist,
    /// `Error::Io` if reading fails, `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` for values that can never work.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: ChecksyncTomlConfig = toml::from_str(&content)?;
        if raw.comments.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "`comments` must list at least one comment prefix".to_string(),
            });
        }
        if raw.root_marker.as_ref().is_some_and(|m| return m.trim().is_empty()) {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "`root_marker` cannot be empty".to_string(),
            });
        }

        let dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        return Ok(Self {
            auto_fix: raw.auto_fix,
            comments: raw.comments,
            dry_run: raw.dry_run,
            exclude: absolutize(&dir, &raw.exclude),
            ignore_files: raw.ignore_files.map(|globs| return absolutize(&dir, &globs)),
            include: absolutize(&dir, &raw.include),
            json: raw.json,
            root_marker: raw.root_marker,
            dir,
        });
    }
}

/// Everything a run needs, after merging config and command line.
#[derive(Debug, Clone)]
pub struct Options {
    /// Rewrite mismatched checksums.
    pub auto_fix: bool,
    /// Comment prefixes that may introduce a sync tag, tried in order.
    pub comments: Vec<String>,
    /// With `auto_fix`, report fixes without writing.
    pub dry_run: bool,
    /// Absolute exclude globs.
    pub exclude: Vec<String>,
    /// Absolute ignore-file globs.
    pub ignore_files: Vec<String>,
    /// Absolute include globs or paths.
    pub include: Vec<String>,
    /// The command line as launched, echoed in JSON reports.
    pub launch_string: String,
    /// Report format.
    pub output: OutputFormat,
    /// File whose presence marks a project root.
    pub root_marker: String,
    /// Print verbose progress.
    pub verbose: bool,
    /// Directory the run started in; root of last resort.
    pub working_dir: PathBuf,
}

impl Options {
    /// Options with defaults for everything but the working directory.
    pub fn with_defaults(working_dir: &Path) -> Self {
        return Self {
            auto_fix: false,
            comments: DEFAULT_COMMENTS.map(String::from).to_vec(),
            dry_run: false,
            exclude: Vec::new(),
            ignore_files: absolutize(working_dir, &[DEFAULT_IGNORE_FILE.to_string()]),
            include: Vec::new(),
            launch_string: String::new(),
            output: OutputFormat::Text,
            root_marker: DEFAULT_ROOT_MARKER.to_string(),
            verbose: false,
            working_dir: working_dir.to_path_buf(),
        };
    }
}

/// How results are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `{version, launchString, files}`.
    Json,
    /// `{version, launchString, items}`.
    JsonItems,
    /// Human-readable lines.
    Text,
}

/// Resolve globs relative to `dir`, leaving absolute ones alone.
pub fn absolutize(dir: &Path, globs: &[String]) -> Vec<String> {
    return globs
        .iter()
        .map(|glob| {
            if Path::new(glob).is_absolute() {
                return glob.clone();
            }
            return dir.join(glob).to_string_lossy().into_owned();
        })
        .collect();
}
