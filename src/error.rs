/// Crate-level error types for checksync runs.
use std::path::PathBuf;

/// Errors that abort a run or a single command.
///
/// Problems found *inside* scanned files (malformed tags, stale checksums) are
/// never represented here; those are `ErrorDetails` values reported per file.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A config file exists but its contents are not usable.
    #[error("config invalid: {}: {reason}", path.display())]
    ConfigInvalid {
        /// Path to the offending config file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An explicitly requested config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// The configured comment prefixes could not be compiled into tag patterns.
    #[error("invalid comment syntax: {reason}")]
    InvalidCommentSyntax {
        /// Description of the compile failure.
        reason: String,
    },

    /// An include or exclude glob failed to compile.
    #[error("invalid glob `{pattern}`: {reason}")]
    InvalidGlob {
        /// The glob as given by the user.
        pattern: String,
        /// Description of the compile failure.
        reason: String,
    },

    /// An ignore file could not be parsed.
    #[error("invalid ignore file: {}: {reason}", path.display())]
    InvalidIgnoreFile {
        /// Path to the ignore file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of a report failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// Rewriting a file failed part way. The file may not reflect every fix.
    #[error("failed to patch {}: {source}", file.display())]
    PatchFailed {
        /// File that was being patched.
        file: PathBuf,
        /// The underlying I/O failure.
        source: std::io::Error,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}
