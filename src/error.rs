//! Error types for apk_rebuild operations.
//!
//! Every fatal condition the core can hit is modelled here with an actionable
//! message and recovery suggestions. External tool failures are
//! absent: they are captured as [`crate::tools::ToolOutcome`] values and never
//! abort a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for apk_rebuild operations
pub type Result<T> = std::result::Result<T, RebuildError>;

/// Main error type for all apk_rebuild operations
#[derive(Error, Debug)]
pub enum RebuildError {
    /// Precondition violations detected before any tool runs for a unit
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// Required external tools or keystore credentials are unusable
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// Manifest or security config could not be repaired
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Operation being performed (e.g., "reading manifest")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// .apks / .xapk archive errors
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Tool download errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration file errors
    #[error("Config error in {path}: {source}")]
    Config {
        /// Config file path
        path: PathBuf,
        /// Parse error
        #[source]
        source: toml::de::Error,
    },
}

/// Conditions that make a package unit (or the whole run) impossible to start
#[derive(Error, Debug)]
pub enum PreconditionError {
    /// Working tree from an unfinished prior run exists
    #[error(
        "Directory {} already exists, probably {} was already processed. Remove the directory and run again.",
        working_tree.display(),
        package.display()
    )]
    AlreadyProcessed {
        /// Source package path
        package: PathBuf,
        /// Stale working tree path
        working_tree: PathBuf,
    },

    /// Source file does not exist
    #[error("File {} not found", path.display())]
    SourceMissing {
        /// Missing source path
        path: PathBuf,
    },

    /// Container extension is not one of .apk, .aab, .xapk
    #[error("Unsupported file extension '{extension}'. Supported: .apk, .aab, .xapk")]
    UnsupportedFormat {
        /// Offending extension (empty if none)
        extension: String,
    },

    /// A derived intermediate would overwrite an existing file
    #[error("{} already exists and would be overwritten", path.display())]
    OutputExists {
        /// Conflicting path
        path: PathBuf,
    },
}

/// Aggregated availability failures for external tools and keystores
#[derive(Error, Debug)]
pub enum ToolError {
    /// One or more checks failed; every failing check is listed
    #[error("Some tools are missing or unusable:\n  - {}", issues.join("\n  - "))]
    Unavailable {
        /// One entry per failing check
        issues: Vec<String>,
    },
}

/// Errors raised while repairing the manifest or security config
#[derive(Error, Debug)]
pub enum PatchError {
    /// Document is not well-formed XML
    #[error("Malformed XML in {}: {reason}", path.display())]
    Malformed {
        /// Document path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Document expected inside the working tree is absent
    #[error("{} not found in working tree", path.display())]
    MissingDocument {
        /// Expected document path
        path: PathBuf,
    },

    /// Document lacks the element that must be patched
    #[error("Element <{element}> not found in {}", path.display())]
    MissingElement {
        /// Element name
        element: String,
        /// Document path
        path: PathBuf,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl RebuildError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            RebuildError::Precondition(PreconditionError::AlreadyProcessed {
                working_tree, ..
            }) => vec![
                format!("Remove {} and run again", working_tree.display()),
                "Use --preserve only when you intend to keep the decompiled tree".to_string(),
            ],
            RebuildError::Precondition(PreconditionError::UnsupportedFormat { .. }) => vec![
                "Pass a .apk, .aab or .xapk file".to_string(),
            ],
            RebuildError::Precondition(PreconditionError::OutputExists { path }) => vec![
                format!("Move {} out of the way and run again", path.display()),
            ],
            RebuildError::Tool(ToolError::Unavailable { .. }) => vec![
                "Install a Java runtime and make sure `java` is on PATH".to_string(),
                "Check network access to github.com for tool downloads".to_string(),
                "Verify --ks, --ks-pass, --ks-alias and --ks-alias-pass".to_string(),
            ],
            RebuildError::Patch(PatchError::MissingDocument { .. }) => vec![
                "Check the decompiler output above; it probably failed".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading manifest", "creating directory".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| RebuildError::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}
